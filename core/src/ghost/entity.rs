//! A single ghost racing alongside the live player

use std::time::Duration;

use crate::demo::{CustomEvent, DemoRecord, PoseSample};
use crate::host::{GhostAppearance, RenderHandle, RenderTarget};
use crate::time::ticks_to_duration;

use super::color::Color;
use super::timeline::GhostTimeline;
use super::GhostId;

/// One race participant.
///
/// The cursor is a segment index plus a local tick inside that segment.
/// The local tick starts at the ghost's offset, so a negative offset keeps
/// it below zero (nothing shown) until the delay has elapsed.
#[derive(Debug)]
pub struct DemoGhostEntity {
    id: GhostId,
    name: String,
    timeline: GhostTimeline,
    segment: usize,
    tick: i64,
    offset: i64,
    appearance: GhostAppearance,
    same_map_as_live: bool,
    is_ahead_of_live: bool,
    has_finished: bool,
    handle: Option<RenderHandle>,
    fired: Vec<CustomEvent>,
}

impl DemoGhostEntity {
    /// New single-segment ghost named after the demo's client
    pub fn new(id: GhostId, record: DemoRecord, appearance: GhostAppearance) -> Self {
        Self {
            id,
            name: record.client_name().to_string(),
            timeline: GhostTimeline::new(record),
            segment: 0,
            tick: 0,
            offset: 0,
            appearance,
            same_map_as_live: false,
            is_ahead_of_live: false,
            has_finished: false,
            handle: None,
            fired: Vec::new(),
        }
    }

    pub fn id(&self) -> GhostId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn timeline(&self) -> &GhostTimeline {
        &self.timeline
    }

    /// Add the next level of a full-game run
    pub fn append_segment(&mut self, record: DemoRecord) {
        self.timeline.append(record);
    }

    pub fn total_ticks(&self) -> u64 {
        self.timeline.total_ticks()
    }

    pub fn segment_index(&self) -> usize {
        self.segment
    }

    /// Local tick in the current segment; negative while a start delay runs
    pub fn tick(&self) -> i64 {
        self.tick
    }

    /// Position on the whole timeline
    pub fn global_tick(&self) -> i64 {
        self.timeline.segment_start(self.segment) as i64 + self.tick
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub fn set_offset(&mut self, offset: i64) {
        self.offset = offset;
    }

    pub fn appearance(&self) -> &GhostAppearance {
        &self.appearance
    }

    pub fn same_map_as_live(&self) -> bool {
        self.same_map_as_live
    }

    pub fn is_ahead_of_live(&self) -> bool {
        self.is_ahead_of_live
    }

    pub(crate) fn set_map_relation(&mut self, same_map: bool, ahead: bool) {
        self.same_map_as_live = same_map;
        self.is_ahead_of_live = ahead;
    }

    pub fn has_finished(&self) -> bool {
        self.has_finished
    }

    pub fn is_spawned(&self) -> bool {
        self.handle.is_some()
    }

    fn current_record(&self) -> Option<&DemoRecord> {
        self.timeline.segment(self.segment)
    }

    /// Map of the segment the cursor is in
    pub fn current_map(&self) -> &str {
        self.current_record().map_or("", |r| r.map_name())
    }

    fn segment_ticks(&self) -> i64 {
        self.current_record().map_or(0, |r| r.playback_ticks() as i64)
    }

    /// Create the renderable if there is none yet
    pub fn spawn(&mut self, render: &mut dyn RenderTarget) {
        if self.handle.is_some() {
            return;
        }
        self.handle = render.acquire(self.id, &self.appearance);
        if self.handle.is_none() {
            tracing::warn!(id = self.id, "Could not create ghost renderable");
        }
    }

    /// Release the renderable, if any
    pub fn delete_ghost(&mut self, render: &mut dyn RenderTarget) {
        if let Some(handle) = self.handle.take() {
            render.release(handle);
        }
    }

    /// Change display attributes, re-creating the renderable if spawned
    pub fn set_appearance(&mut self, appearance: GhostAppearance, render: &mut dyn RenderTarget) {
        self.appearance = appearance;
        if self.handle.is_some() {
            self.delete_ghost(render);
            self.spawn(render);
        }
    }

    pub fn set_color(&mut self, color: Color, render: &mut dyn RenderTarget) {
        let appearance = GhostAppearance {
            color,
            ..self.appearance.clone()
        };
        self.set_appearance(appearance, render);
    }

    /// Rewind the current segment to the ghost's start offset
    pub fn level_reset(&mut self) {
        self.tick = self.offset;
        self.has_finished = false;
        self.fired.clear();
    }

    /// Put the cursor at the start of the whole run
    pub fn set_on_first_map(&mut self) {
        self.segment = 0;
        self.seek(self.offset);
        self.fired.clear();
    }

    /// Move to a global tick. Negative ticks wait at the start of the first
    /// segment; ticks past the end finish the ghost.
    pub fn seek(&mut self, global: i64) {
        self.has_finished = false;
        if global < 0 {
            self.segment = 0;
            self.tick = global;
            return;
        }
        match self.timeline.resolve(global as u64) {
            Some(cursor) => {
                self.segment = cursor.segment;
                self.tick = cursor.local_tick as i64;
            }
            None => {
                self.segment = self.timeline.len().saturating_sub(1);
                self.tick = self.segment_ticks();
                self.has_finished = true;
            }
        }
    }

    /// Jump to the segment recorded on the live map, if the run has one
    pub fn change_demo(&mut self, live_map: Option<&str>) {
        let Some(map) = live_map else {
            return;
        };
        if let Some(segment) = self.timeline.find_map(map, self.segment) {
            if segment != self.segment {
                tracing::debug!(id = self.id, map, segment, "Ghost changed demo");
            }
            self.segment = segment;
        }
    }

    /// Advance by one simulation tick
    pub fn update_demo_ghost(&mut self) {
        if self.has_finished {
            return;
        }

        if let Ok(tick) = i32::try_from(self.tick)
            && let Some(record) = self.timeline.segment(self.segment)
        {
            self.fired.extend(record.events_at(tick).cloned());
        }

        self.tick += 1;
        if self.tick < self.segment_ticks() {
            return;
        }

        // Empty segments have no tick to stand on
        let next = (self.segment + 1..self.timeline.len()).find(|&i| {
            self.timeline
                .segment(i)
                .is_some_and(|r| r.playback_ticks() > 0)
        });

        if let Some(next) = next {
            let previous_map = self.current_map().to_string();
            self.segment = next;
            self.tick = 0;
            // The live map has not changed, so a new level means we left it
            if self.current_map() != previous_map {
                self.same_map_as_live = false;
            }
            tracing::trace!(id = self.id, segment = self.segment, "Ghost entered next segment");
        } else {
            self.has_finished = true;
        }
    }

    /// Whether the ghost currently has a sample to show
    pub fn in_playback_window(&self) -> bool {
        self.tick >= 0 && self.tick < self.segment_ticks()
    }

    /// Pose between the current tick and the next, `alpha` of the way along
    pub fn lerp(&self, alpha: f32) -> Option<PoseSample> {
        if !self.in_playback_window() {
            return None;
        }
        let record = self.current_record()?;
        let tick = self.tick as usize;
        let current = record.sample(tick)?;
        let next = record.sample(tick + 1).unwrap_or(current);
        Some(current.lerp(next, alpha))
    }

    /// Interpolate and push the pose to the renderable
    pub fn draw(&self, alpha: f32, render: &mut dyn RenderTarget) {
        if let (Some(handle), Some(pose)) = (self.handle, self.lerp(alpha)) {
            render.draw(handle, &pose);
        }
    }

    /// Run time including any start delay
    pub fn total_time(&self, tick_interval: Duration) -> Duration {
        let ticks = i64::try_from(self.total_ticks())
            .unwrap_or(i64::MAX)
            .saturating_sub(self.offset)
            .max(0);
        ticks_to_duration(tick_interval, ticks as u64)
    }

    /// Drain events the cursor has passed since the last call
    pub fn take_fired_events(&mut self) -> Vec<CustomEvent> {
        std::mem::take(&mut self.fired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo::CustomEventKind;
    use crate::test_utils::RecordingRenderTarget;
    use glam::Vec3;

    fn record(map: &str, ticks: usize) -> DemoRecord {
        let samples = (0..ticks)
            .map(|i| PoseSample::at(Vec3::new(i as f32, 0.0, 0.0), Vec3::ZERO))
            .collect();
        DemoRecord::new("runner", map, samples)
    }

    fn ghost(ticks: usize) -> DemoGhostEntity {
        DemoGhostEntity::new(
            0,
            record("sp_a1_intro1", ticks),
            GhostAppearance {
                model: "models/props/food_can/food_can_open.mdl".to_string(),
                color: Color::WHITE,
            },
        )
    }

    #[test]
    fn test_finishes_after_total_ticks() {
        let mut g = ghost(50);
        for _ in 0..49 {
            g.update_demo_ghost();
        }
        assert!(!g.has_finished());
        g.update_demo_ghost();
        assert!(g.has_finished());

        // further updates are ignored
        g.update_demo_ghost();
        assert_eq!(g.tick(), 50);
    }

    #[test]
    fn test_crosses_segments() {
        let mut g = ghost(3);
        g.append_segment(record("sp_a1_intro2", 2));
        g.set_map_relation(true, false);

        for _ in 0..3 {
            g.update_demo_ghost();
        }
        assert_eq!(g.segment_index(), 1);
        assert_eq!(g.tick(), 0);
        assert_eq!(g.global_tick(), 3);
        assert!(!g.same_map_as_live());

        g.update_demo_ghost();
        g.update_demo_ghost();
        assert!(g.has_finished());
    }

    #[test]
    fn test_skips_empty_segments() {
        let mut g = ghost(5);
        g.append_segment(DemoRecord::new("runner", "sp_a1_intro2", Vec::new()));
        g.append_segment(record("sp_a1_intro3", 5));

        for _ in 0..5 {
            g.update_demo_ghost();
        }
        assert_eq!(g.segment_index(), 2);
        assert_eq!(g.tick(), 0);
        assert_eq!(g.current_map(), "sp_a1_intro3");
        assert!(g.in_playback_window());

        for _ in 0..4 {
            g.update_demo_ghost();
        }
        assert!(!g.has_finished());
        g.update_demo_ghost();
        assert!(g.has_finished());
    }

    #[test]
    fn test_trailing_empty_segment_finishes() {
        let mut g = ghost(2);
        g.append_segment(DemoRecord::new("runner", "sp_a1_intro2", Vec::new()));

        g.update_demo_ghost();
        g.update_demo_ghost();
        assert!(g.has_finished());
        assert_eq!(g.segment_index(), 0);
    }

    #[test]
    fn test_total_time_saturates() {
        let interval = Duration::from_millis(16);
        let mut g = ghost(60);
        assert_eq!(g.total_time(interval), interval * 60);

        g.set_offset(-i64::MAX);
        assert_eq!(g.total_time(interval), interval.saturating_mul(u32::MAX));

        g.set_offset(i64::MAX);
        assert_eq!(g.total_time(interval), Duration::ZERO);
    }

    #[test]
    fn test_negative_offset_delays_start() {
        let mut g = ghost(10);
        g.set_offset(-5);
        g.level_reset();

        for _ in 0..4 {
            g.update_demo_ghost();
            assert!(g.lerp(0.0).is_none());
        }
        g.update_demo_ghost();
        assert_eq!(g.lerp(0.0).unwrap().position.x, 0.0);
        assert_eq!(g.total_time(Duration::from_millis(10)), Duration::from_millis(150));
    }

    #[test]
    fn test_positive_offset_skips_ahead() {
        let mut g = ghost(10);
        g.append_segment(record("sp_a1_intro2", 10));
        g.set_offset(12);
        g.set_on_first_map();
        assert_eq!(g.segment_index(), 1);
        assert_eq!(g.tick(), 2);
        assert_eq!(g.total_time(Duration::from_secs(1)), Duration::from_secs(8));

        g.set_offset(40);
        g.set_on_first_map();
        assert!(g.has_finished());
        assert_eq!(g.total_time(Duration::from_secs(1)), Duration::ZERO);
    }

    #[test]
    fn test_lerp_between_ticks() {
        let mut g = ghost(4);
        g.update_demo_ghost();
        let pose = g.lerp(0.25).unwrap();
        assert_eq!(pose.position.x, 1.25);

        // last tick holds its own sample
        g.seek(3);
        assert_eq!(g.lerp(0.5).unwrap().position.x, 3.0);
    }

    #[test]
    fn test_change_demo() {
        let mut g = ghost(5);
        g.append_segment(record("sp_a1_intro2", 5));
        g.append_segment(record("sp_a1_intro3", 5));

        g.change_demo(Some("sp_a1_intro3"));
        assert_eq!(g.segment_index(), 2);
        g.change_demo(Some("sp_a4_finale4"));
        assert_eq!(g.segment_index(), 2);
        g.change_demo(None);
        assert_eq!(g.segment_index(), 2);
        g.change_demo(Some("sp_a1_intro1"));
        assert_eq!(g.segment_index(), 0);
    }

    #[test]
    fn test_spawn_and_delete_are_idempotent() {
        let mut render = RecordingRenderTarget::default();
        let mut g = ghost(5);

        g.spawn(&mut render);
        g.spawn(&mut render);
        assert_eq!(render.acquired, 1);

        g.delete_ghost(&mut render);
        g.delete_ghost(&mut render);
        assert_eq!(render.released, 1);
        assert!(!g.is_spawned());
    }

    #[test]
    fn test_set_color_respawns() {
        let mut render = RecordingRenderTarget::default();
        let mut g = ghost(5);
        g.set_color(Color::rgb(255, 0, 0), &mut render);
        assert_eq!(render.acquired, 0);

        g.spawn(&mut render);
        g.set_color(Color::rgb(0, 255, 0), &mut render);
        assert_eq!(render.acquired, 2);
        assert_eq!(render.released, 1);
        assert_eq!(render.live_appearance(0).unwrap().color, Color::rgb(0, 255, 0));
    }

    #[test]
    fn test_fired_events() {
        let event = |tick| CustomEvent {
            tick,
            kind: CustomEventKind::Marker {
                position: Vec3::ZERO,
                slot: None,
                tag: None,
            },
        };
        let demo = record("sp_a1_intro1", 5).with_events(vec![event(0), event(2)]);
        let mut g = DemoGhostEntity::new(
            1,
            demo,
            GhostAppearance {
                model: String::new(),
                color: Color::WHITE,
            },
        );

        g.update_demo_ghost();
        assert_eq!(g.take_fired_events().len(), 1);
        g.update_demo_ghost();
        assert!(g.take_fired_events().is_empty());
        g.update_demo_ghost();
        assert_eq!(g.take_fired_events()[0].tick, 2);
    }
}
