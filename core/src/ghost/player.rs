//! Ghost pool and lockstep playback
//!
//! [`DemoGhostPlayer`] owns every ghost and the render target they draw
//! into. The host drives it from three places:
//!
//! - [`on_tick`](DemoGhostPlayer::on_tick) once per simulation tick
//! - [`on_render`](DemoGhostPlayer::on_render) once per render frame
//! - [`on_session_start`](DemoGhostPlayer::on_session_start) after each map load
//!
//! Setup and control calls come from the user and may parse files; the
//! three callbacks never do.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::{GhostConfig, demo_file_name};
use crate::demo::{CustomEvent, DemoParser, DemoRecord};
use crate::error::GhostError;
use crate::host::{FileResolver, GhostAppearance, LiveSessionClock, MapOrdering, RenderTarget};
use crate::time::{format_time, ticks_to_duration};

use super::color::Color;
use super::entity::DemoGhostEntity;
use super::GhostId;

/// Owner of the ghost pool
pub struct DemoGhostPlayer<R: RenderTarget> {
    ghosts: BTreeMap<GhostId, DemoGhostEntity>,
    render: R,
    parser: DemoParser,
    is_playing: bool,
    is_full_game: bool,
    sync: bool,
    appearance: GhostAppearance,
    demo_extension: String,
}

impl<R: RenderTarget> DemoGhostPlayer<R> {
    pub fn new(render: R, config: &GhostConfig) -> Self {
        Self {
            ghosts: BTreeMap::new(),
            render,
            parser: DemoParser::new().with_events(true),
            is_playing: false,
            is_full_game: false,
            sync: config.sync,
            appearance: config.appearance(),
            demo_extension: config.demo_extension.clone(),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn is_full_game(&self) -> bool {
        self.is_full_game
    }

    pub fn sync_enabled(&self) -> bool {
        self.sync
    }

    pub fn set_sync(&mut self, sync: bool) {
        self.sync = sync;
    }

    pub fn ghost(&self, id: GhostId) -> Option<&DemoGhostEntity> {
        self.ghosts.get(&id)
    }

    pub fn ghosts(&self) -> impl Iterator<Item = &DemoGhostEntity> {
        self.ghosts.values()
    }

    pub fn len(&self) -> usize {
        self.ghosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ghosts.is_empty()
    }

    pub fn render_target(&self) -> &R {
        &self.render
    }

    // =========================================================================
    // Setup
    // =========================================================================

    fn load(&self, path: &Path) -> Result<DemoRecord, GhostError> {
        let mut record = self
            .parser
            .parse_file(path)
            .map_err(|source| GhostError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        self.parser.adjust(&mut record);
        Ok(record)
    }

    /// Add a parsed demo to the pool: a new ghost for an unknown id, the
    /// next segment for an existing one
    fn insert_segment(&mut self, id: GhostId, record: DemoRecord) {
        match self.ghosts.get_mut(&id) {
            Some(ghost) => {
                tracing::debug!(id, map = record.map_name(), "Appending segment");
                ghost.append_segment(record);
            }
            None => {
                tracing::debug!(id, map = record.map_name(), "Creating ghost");
                let ghost = DemoGhostEntity::new(id, record, self.appearance.clone());
                self.ghosts.insert(id, ghost);
            }
        }
    }

    /// Parse `path` and create ghost `id` from it, or append it to an
    /// existing ghost `id` as its next level. The pool is untouched if the
    /// demo cannot be parsed.
    pub fn setup_ghost_from_demo(&mut self, path: &Path, id: GhostId) -> Result<(), GhostError> {
        let record = self.load(path)?;
        self.insert_segment(id, record);
        Ok(())
    }

    fn with_extension(&self, name: &str) -> PathBuf {
        demo_file_name(name, &self.demo_extension)
    }

    /// Replace ghost `id` with a single-level ghost
    pub fn setup_from_demo(
        &mut self,
        name: &str,
        id: GhostId,
        files: &dyn FileResolver,
        maps: &dyn MapOrdering,
    ) -> Result<&DemoGhostEntity, GhostError> {
        let path = files.resolve(&self.with_extension(name));
        let record = self.load(&path)?;

        self.delete_ghost_by_id(id);
        self.insert_segment(id, record);
        self.is_full_game = false;
        self.update_ghosts_same_map(maps);

        tracing::info!(id, path = %path.display(), "Ghost created");
        self.ghosts.get(&id).ok_or(GhostError::UnknownGhost(id))
    }

    /// Replace ghost `id` with a full-game ghost built from `base`,
    /// `base_2`, `base_3`, … up to the first missing file.
    ///
    /// With `first_index` of 2 or more, the run starts at `base_<first_index>`
    /// and `base` itself is not used.
    pub fn setup_from_sequence(
        &mut self,
        base: &str,
        first_index: Option<u32>,
        id: GhostId,
        files: &dyn FileResolver,
        maps: &dyn MapOrdering,
    ) -> Result<&DemoGhostEntity, GhostError> {
        let resolved = files.resolve(&self.with_extension(base));
        let stem = resolved.with_extension("");
        let numbered = |n: u32| {
            let mut name = stem.as_os_str().to_os_string();
            name.push(format!("_{}.{}", n, self.demo_extension));
            PathBuf::from(name)
        };

        let first_index = first_index.filter(|&n| n >= 2);
        let first = match first_index {
            Some(n) => numbered(n),
            None => resolved.clone(),
        };
        if !files.exists(&first) {
            return Err(GhostError::MissingDemo(first));
        }

        let mut paths = vec![first];
        let mut counter = first_index.map_or(2, |n| n + 1);
        loop {
            let next = numbered(counter);
            if !files.exists(&next) {
                break;
            }
            paths.push(next);
            counter += 1;
        }

        let records = paths
            .iter()
            .map(|path| self.load(path))
            .collect::<Result<Vec<_>, _>>()?;

        self.delete_ghost_by_id(id);
        for record in records {
            self.insert_segment(id, record);
        }
        self.is_full_game = true;
        self.update_ghosts_same_map(maps);

        tracing::info!(id, segments = paths.len(), "Full-game ghost created");
        self.ghosts.get(&id).ok_or(GhostError::UnknownGhost(id))
    }

    // =========================================================================
    // Control surface
    // =========================================================================

    /// Remove one ghost. Returns whether it existed.
    pub fn delete_ghost_by_id(&mut self, id: GhostId) -> bool {
        match self.ghosts.remove(&id) {
            Some(mut ghost) => {
                ghost.delete_ghost(&mut self.render);
                true
            }
            None => false,
        }
    }

    pub fn delete_all(&mut self) {
        for ghost in self.ghosts.values_mut() {
            ghost.delete_ghost(&mut self.render);
        }
        self.ghosts.clear();
        self.is_playing = false;
    }

    fn ghost_mut(&mut self, id: GhostId) -> Result<&mut DemoGhostEntity, GhostError> {
        self.ghosts.get_mut(&id).ok_or(GhostError::UnknownGhost(id))
    }

    /// Delay ghost `id`'s start by `delay` ticks
    pub fn set_offset(&mut self, id: GhostId, delay: i64) -> Result<&DemoGhostEntity, GhostError> {
        let ghost = self.ghost_mut(id)?;
        ghost.set_offset(-delay);
        Ok(ghost)
    }

    pub fn set_color(&mut self, id: GhostId, color: Color) -> Result<(), GhostError> {
        let ghost = self.ghosts.get_mut(&id).ok_or(GhostError::UnknownGhost(id))?;
        ghost.set_color(color, &mut self.render);
        Ok(())
    }

    /// Switch every ghost to `model`
    pub fn update_ghosts_model(&mut self, model: &str) {
        self.appearance.model = model.to_string();
        for ghost in self.ghosts.values_mut() {
            let appearance = GhostAppearance {
                model: model.to_string(),
                ..ghost.appearance().clone()
            };
            ghost.set_appearance(appearance, &mut self.render);
        }
    }

    /// Rewind every ghost to the start of its run and begin playing
    pub fn start_all(&mut self, maps: &dyn MapOrdering) -> Result<(), GhostError> {
        if maps.current_map().is_none() {
            return Err(GhostError::InMenu);
        }
        for ghost in self.ghosts.values_mut() {
            ghost.set_on_first_map();
            ghost.spawn(&mut self.render);
        }
        self.update_ghosts_same_map(maps);
        self.is_playing = true;
        tracing::info!(ghosts = self.ghosts.len(), "Ghosts started");
        Ok(())
    }

    pub fn spawn_all(&mut self) {
        for ghost in self.ghosts.values_mut() {
            ghost.spawn(&mut self.render);
        }
        self.is_playing = true;
    }

    pub fn pause(&mut self) {
        self.is_playing = false;
    }

    pub fn resume(&mut self) {
        self.is_playing = true;
    }

    /// Stop playback and rewind every ghost to its offset. Full-game ghosts
    /// first move to their segment for the live map.
    pub fn reset_all(&mut self, maps: &dyn MapOrdering) {
        self.is_playing = false;
        let live = maps.current_map();
        for ghost in self.ghosts.values_mut() {
            if self.is_full_game {
                ghost.change_demo(live);
            }
            ghost.level_reset();
        }
    }

    // =========================================================================
    // Map synchronization
    // =========================================================================

    /// Recompute each ghost's relation to the live map
    pub fn update_ghosts_same_map(&mut self, maps: &dyn MapOrdering) {
        let live = maps.current_map();
        let live_index = live.and_then(|m| maps.map_index(m));
        for ghost in self.ghosts.values_mut() {
            let map = ghost.current_map();
            let same_map = live == Some(map);
            let ahead = match (maps.map_index(map), live_index) {
                (Some(ghost_index), Some(live_index)) => ghost_index > live_index,
                _ => false,
            };
            ghost.set_map_relation(same_map, ahead);
        }
    }

    /// Bring every ghost that is neither on the live map nor ahead of it
    /// to the live map's segment and rewind it there
    pub fn sync(&mut self, maps: &dyn MapOrdering) {
        let live = maps.current_map();
        let mut synced = 0;
        for ghost in self.ghosts.values_mut() {
            if !ghost.same_map_as_live() && !ghost.is_ahead_of_live() {
                ghost.change_demo(live);
                ghost.level_reset();
                synced += 1;
            }
        }
        self.update_ghosts_same_map(maps);
        tracing::info!(synced, map = live.unwrap_or(""), "Ghosts synchronized");
    }

    /// Advance every ghost that may move this tick
    pub fn update_ghosts_position(&mut self) {
        let sync = self.sync;
        for ghost in self.ghosts.values_mut() {
            if !ghost.has_finished() && (!sync || ghost.same_map_as_live()) {
                ghost.update_demo_ghost();
            }
        }
    }

    /// Draw every visible ghost `alpha` of the way to its next sample
    pub fn render_ghosts(&mut self, alpha: f32) {
        for ghost in self.ghosts.values_mut() {
            if ghost.has_finished() || !ghost.same_map_as_live() || !ghost.in_playback_window() {
                continue;
            }
            if !ghost.is_spawned() {
                ghost.spawn(&mut self.render);
            }
            ghost.draw(alpha, &mut self.render);
        }
    }

    // =========================================================================
    // Host callbacks
    // =========================================================================

    pub fn on_tick(&mut self, clock: &dyn LiveSessionClock) {
        if self.is_playing && clock.is_running() {
            tracing::trace!(tick = clock.tick(), "Advancing ghosts");
            self.update_ghosts_position();
        }
    }

    pub fn on_render(&mut self, clock: &dyn LiveSessionClock) {
        if self.is_playing && clock.is_running() {
            self.render_ghosts(clock.interpolation_alpha());
        }
    }

    pub fn on_session_start(&mut self, maps: &dyn MapOrdering) {
        if !self.is_playing {
            return;
        }
        self.update_ghosts_same_map(maps);
        if self.is_full_game {
            if self.sync {
                self.sync(maps);
            }
        } else {
            self.reset_all(maps);
            self.resume();
        }
        self.spawn_all();
    }

    /// Events every ghost has passed since the last call
    pub fn take_fired_events(&mut self) -> Vec<(GhostId, CustomEvent)> {
        self.ghosts
            .values_mut()
            .flat_map(|ghost| {
                let id = ghost.id();
                ghost.take_fired_events().into_iter().map(move |e| (id, e))
            })
            .collect()
    }

    // =========================================================================
    // Reporting
    // =========================================================================

    /// One summary line per ghost
    pub fn recap(&self, tick_interval: Duration) -> Vec<RecapLine> {
        let total = self.ghosts.len();
        self.ghosts
            .values()
            .enumerate()
            .map(|(i, ghost)| RecapLine {
                index: i + 1,
                total,
                name: ghost.name().to_string(),
                first_level: ghost.timeline().first_level().to_string(),
                last_level: ghost.timeline().last_level().to_string(),
                time: ticks_to_duration(tick_interval, ghost.total_ticks()),
            })
            .collect()
    }
}

impl<R: RenderTarget> Drop for DemoGhostPlayer<R> {
    fn drop(&mut self) {
        for ghost in self.ghosts.values_mut() {
            ghost.delete_ghost(&mut self.render);
        }
    }
}

/// A ghost's entry in the recap
#[derive(Debug, Clone, PartialEq)]
pub struct RecapLine {
    pub index: usize,
    pub total: usize,
    pub name: String,
    pub first_level: String,
    pub last_level: String,
    pub time: Duration,
}

impl fmt::Display for RecapLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} of {}] {}: {} -> {} in {}",
            self.index,
            self.total,
            self.name,
            self.first_level,
            self.last_level,
            format_time(self.time)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{RecordingRenderTarget, TestSession, linear_record};

    const MAPS: [&str; 3] = ["sp_a1_intro1", "sp_a1_intro2", "sp_a1_intro3"];

    fn player() -> DemoGhostPlayer<RecordingRenderTarget> {
        DemoGhostPlayer::new(RecordingRenderTarget::default(), &GhostConfig::default())
    }

    fn session(map: &str) -> TestSession {
        let mut session = TestSession::new(&MAPS);
        session.load(Some(map));
        session
    }

    #[test]
    fn test_insert_segment_appends_on_existing_id() {
        let mut p = player();
        p.insert_segment(1, linear_record("a", "sp_a1_intro1", 10));
        p.insert_segment(1, linear_record("a", "sp_a1_intro2", 20));
        p.insert_segment(2, linear_record("b", "sp_a1_intro1", 5));

        assert_eq!(p.len(), 2);
        let ghost = p.ghost(1).unwrap();
        assert_eq!(ghost.total_ticks(), 30);
        assert_eq!(ghost.timeline().last_level(), "sp_a1_intro2");
    }

    #[test]
    fn test_start_in_menu_fails() {
        let mut p = player();
        p.insert_segment(0, linear_record("a", "sp_a1_intro1", 10));
        let menu = TestSession::new(&MAPS);

        assert!(matches!(p.start_all(&menu), Err(GhostError::InMenu)));
        assert!(!p.is_playing());
        assert_eq!(p.render_target().acquired, 0);
    }

    #[test]
    fn test_pause_and_resume_keep_cursor() {
        let mut p = player();
        p.insert_segment(0, linear_record("a", "sp_a1_intro1", 100));
        let live = session("sp_a1_intro1");
        p.start_all(&live).unwrap();

        for _ in 0..10 {
            p.on_tick(&live);
        }
        p.pause();
        for _ in 0..10 {
            p.on_tick(&live);
        }
        assert_eq!(p.ghost(0).unwrap().tick(), 10);

        p.resume();
        p.on_tick(&live);
        assert_eq!(p.ghost(0).unwrap().tick(), 11);
    }

    #[test]
    fn test_not_running_does_not_advance() {
        let mut p = player();
        p.insert_segment(0, linear_record("a", "sp_a1_intro1", 100));
        let mut live = session("sp_a1_intro1");
        p.start_all(&live).unwrap();

        live.running = false;
        p.on_tick(&live);
        p.on_render(&live);
        assert_eq!(p.ghost(0).unwrap().tick(), 0);
        assert!(p.render_target().draws.is_empty());
    }

    #[test]
    fn test_sync_holds_ghosts_off_the_live_map() {
        let mut p = player();
        p.set_sync(true);
        p.insert_segment(0, linear_record("a", "sp_a1_intro1", 10));
        p.insert_segment(0, linear_record("a", "sp_a1_intro2", 10));
        p.is_full_game = true;
        let mut live = session("sp_a1_intro1");
        p.start_all(&live).unwrap();

        // the ghost reaches intro2 while the player is still on intro1
        for _ in 0..15 {
            p.on_tick(&live);
        }
        let ghost = p.ghost(0).unwrap();
        assert_eq!(ghost.segment_index(), 1);
        assert_eq!(ghost.tick(), 0);

        // player loads intro2: the ghost is now on the live map and moves on
        live.load(Some("sp_a1_intro2"));
        p.on_session_start(&live);
        p.on_tick(&live);
        assert_eq!(p.ghost(0).unwrap().tick(), 1);
    }

    #[test]
    fn test_render_interpolates_and_spawns() {
        let mut p = player();
        p.insert_segment(0, linear_record("a", "sp_a1_intro1", 10));
        let mut live = session("sp_a1_intro1");
        p.start_all(&live).unwrap();
        p.on_tick(&live);

        live.alpha = 0.5;
        p.on_render(&live);
        let draws = &p.render_target().draws;
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].1.position.x, 1.5);
    }

    #[test]
    fn test_render_retries_failed_spawn() {
        let mut render = RecordingRenderTarget::default();
        render.refuse = true;
        let mut p = DemoGhostPlayer::new(render, &GhostConfig::default());
        p.insert_segment(0, linear_record("a", "sp_a1_intro1", 10));
        let live = session("sp_a1_intro1");
        p.start_all(&live).unwrap();
        assert!(!p.ghost(0).unwrap().is_spawned());

        p.render.refuse = false;
        p.on_render(&live);
        assert!(p.ghost(0).unwrap().is_spawned());
        assert_eq!(p.render_target().draws.len(), 1);
    }

    #[test]
    fn test_session_start_resets_single_level_ghosts() {
        let mut p = player();
        p.insert_segment(0, linear_record("a", "sp_a1_intro1", 100));
        let live = session("sp_a1_intro1");
        p.start_all(&live).unwrap();
        for _ in 0..30 {
            p.on_tick(&live);
        }

        // checkpoint reload of the same map
        p.on_session_start(&live);
        assert!(p.is_playing());
        assert_eq!(p.ghost(0).unwrap().tick(), 0);
    }

    #[test]
    fn test_session_start_ignored_when_stopped() {
        let mut p = player();
        p.insert_segment(0, linear_record("a", "sp_a1_intro1", 100));
        p.on_session_start(&session("sp_a1_intro1"));
        assert!(!p.is_playing());
        assert_eq!(p.render_target().acquired, 0);
    }

    #[test]
    fn test_reset_full_game_moves_to_live_map() {
        let mut p = player();
        p.insert_segment(0, linear_record("a", "sp_a1_intro1", 10));
        p.insert_segment(0, linear_record("a", "sp_a1_intro2", 10));
        p.insert_segment(0, linear_record("a", "sp_a1_intro3", 10));
        p.is_full_game = true;

        p.reset_all(&session("sp_a1_intro3"));
        let ghost = p.ghost(0).unwrap();
        assert_eq!(ghost.segment_index(), 2);
        assert_eq!(ghost.tick(), 0);
        assert!(!p.is_playing());
    }

    #[test]
    fn test_ahead_needs_both_maps_ordered() {
        let mut p = player();
        p.insert_segment(0, linear_record("a", "sp_a1_intro3", 10));
        p.insert_segment(1, linear_record("b", "workshop_map", 10));

        p.update_ghosts_same_map(&session("sp_a1_intro1"));
        assert!(p.ghost(0).unwrap().is_ahead_of_live());
        assert!(!p.ghost(1).unwrap().is_ahead_of_live());

        let mut off_list = TestSession::new(&MAPS);
        off_list.load(Some("mp_coop_start"));
        p.update_ghosts_same_map(&off_list);
        assert!(!p.ghost(0).unwrap().is_ahead_of_live());
    }

    #[test]
    fn test_update_model_respawns() {
        let mut p = player();
        p.insert_segment(0, linear_record("a", "sp_a1_intro1", 10));
        p.insert_segment(1, linear_record("b", "sp_a1_intro1", 10));
        p.spawn_all();

        p.update_ghosts_model("models/player/chell/player.mdl");
        assert_eq!(p.render_target().acquired, 4);
        assert_eq!(p.render_target().released, 2);
        assert_eq!(
            p.render_target().live_appearance(1).unwrap().model,
            "models/player/chell/player.mdl"
        );
    }

    #[test]
    fn test_unknown_ids() {
        let mut p = player();
        assert!(!p.delete_ghost_by_id(3));
        assert!(matches!(p.set_offset(3, 10), Err(GhostError::UnknownGhost(3))));
        assert!(matches!(
            p.set_color(3, Color::WHITE),
            Err(GhostError::UnknownGhost(3))
        ));
    }

    #[test]
    fn test_fired_events_are_tagged() {
        use crate::demo::CustomEventKind;
        use glam::Vec3;

        let record = linear_record("a", "sp_a1_intro1", 5).with_events(vec![CustomEvent {
            tick: 1,
            kind: CustomEventKind::Marker {
                position: Vec3::ONE,
                slot: Some(0),
                tag: None,
            },
        }]);

        let mut p = player();
        p.insert_segment(7, record);
        let live = session("sp_a1_intro1");
        p.start_all(&live).unwrap();
        p.on_tick(&live);
        p.on_tick(&live);

        let events = p.take_fired_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, 7);
        assert!(p.take_fired_events().is_empty());
    }

    #[test]
    fn test_recap_format() {
        let mut p = player();
        p.insert_segment(0, linear_record("alice", "sp_a1_intro1", 60));
        p.insert_segment(0, linear_record("alice", "sp_a1_intro2", 60));
        p.insert_segment(4, linear_record("bob", "sp_a1_intro3", 90));

        let lines: Vec<String> = p
            .recap(Duration::from_millis(50))
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            lines,
            vec![
                "[1 of 2] alice: sp_a1_intro1 -> sp_a1_intro2 in 6.000",
                "[2 of 2] bob: sp_a1_intro3 -> sp_a1_intro3 in 4.500",
            ]
        );
    }

    #[test]
    fn test_recap_time_saturates() {
        let mut p = player();
        p.insert_segment(0, linear_record("alice", "sp_a1_intro1", 60));

        let lines = p.recap(Duration::MAX);
        assert_eq!(lines[0].time, Duration::MAX);
    }

    #[test]
    fn test_delete_all_releases_handles() {
        let mut p = player();
        p.insert_segment(0, linear_record("a", "sp_a1_intro1", 10));
        p.insert_segment(1, linear_record("b", "sp_a1_intro1", 10));
        p.spawn_all();
        assert_eq!(p.render_target().live_count(), 2);

        p.delete_all();
        assert_eq!(p.render_target().live_count(), 0);
        assert!(p.is_empty());
        assert!(!p.is_playing());
    }

    #[test]
    fn test_drop_releases_handles() {
        let mut render = RecordingRenderTarget::default();
        {
            let mut p = DemoGhostPlayer::new(&mut render, &GhostConfig::default());
            p.insert_segment(0, linear_record("a", "sp_a1_intro1", 10));
            p.insert_segment(1, linear_record("b", "sp_a1_intro1", 10));
            p.spawn_all();
        }
        assert_eq!(render.acquired, 2);
        assert_eq!(render.live_count(), 0);
    }
}
