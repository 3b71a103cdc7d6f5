//! Race command - play ghosts against a scripted live route
//!
//! A route file stands in for the live game: the level order, how long the
//! live player spends on each map, and the ghosts to race. The command runs
//! the ghost player headlessly with a fixed-timestep loop, rendering at
//! `--fps` frames per second between simulation ticks.
//!
//! ```toml
//! tick_rate = 60
//! sync = true
//! maps = ["sp_a1_intro1", "sp_a1_intro2"]
//!
//! [[ghost]]
//! demo = "runs/fullgame"
//! full_game = true
//! color = "red"
//!
//! [[leg]]
//! map = "sp_a1_intro1"
//! ticks = 600
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use demoghost_core::demo::{CustomEvent, PoseSample};
use demoghost_core::host::{GhostAppearance, MapList, RenderHandle, SearchPathResolver};
use demoghost_core::{Color, DemoGhostPlayer, GhostConfig, GhostId, LiveSessionClock, RenderTarget};
use serde::Deserialize;

use crate::info::tick_interval;

/// Arguments for the race command
#[derive(Args)]
pub struct RaceArgs {
    /// Route file (.toml)
    pub route: PathBuf,

    /// Render frames per second
    #[arg(long, default_value = "144")]
    pub fps: u32,

    /// Print custom events as ghosts pass them
    #[arg(long)]
    pub events: bool,
}

fn default_tick_rate() -> u32 {
    60
}

/// A scripted live run
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct Route {
    #[serde(default = "default_tick_rate")]
    pub tick_rate: u32,
    /// Overrides the config's `sync` when set
    #[serde(default)]
    pub sync: Option<bool>,
    /// Canonical level order
    pub maps: Vec<String>,
    #[serde(default, rename = "ghost")]
    pub ghosts: Vec<RouteGhost>,
    #[serde(rename = "leg")]
    pub legs: Vec<Leg>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RouteGhost {
    pub demo: String,
    #[serde(default)]
    pub full_game: bool,
    #[serde(default)]
    pub first_index: Option<u32>,
    /// Start delay in ticks
    #[serde(default)]
    pub delay: i64,
    #[serde(default)]
    pub color: Option<Color>,
}

/// Time the live player spends on one map
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct Leg {
    pub map: String,
    pub ticks: u32,
}

impl Route {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let route: Route =
            toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))?;
        anyhow::ensure!(!route.legs.is_empty(), "Route has no legs");
        Ok(route)
    }
}

/// Live clock driven by the race loop
struct RaceClock {
    tick: i32,
    interval: Duration,
    alpha: f32,
}

impl LiveSessionClock for RaceClock {
    fn tick(&self) -> i32 {
        self.tick
    }

    fn tick_interval(&self) -> Duration {
        self.interval
    }

    fn is_running(&self) -> bool {
        true
    }

    fn interpolation_alpha(&self) -> f32 {
        self.alpha
    }
}

/// Counts frames per ghost and remembers the last pose drawn
#[derive(Default)]
struct TallyRender {
    next: u64,
    owners: BTreeMap<RenderHandle, GhostId>,
    frames: BTreeMap<GhostId, (u64, PoseSample)>,
}

impl RenderTarget for TallyRender {
    fn acquire(&mut self, id: GhostId, _appearance: &GhostAppearance) -> Option<RenderHandle> {
        self.next += 1;
        let handle = RenderHandle(self.next);
        self.owners.insert(handle, id);
        Some(handle)
    }

    fn draw(&mut self, handle: RenderHandle, pose: &PoseSample) {
        if let Some(&id) = self.owners.get(&handle) {
            let entry = self.frames.entry(id).or_insert((0, *pose));
            entry.0 += 1;
            entry.1 = *pose;
        }
    }

    fn release(&mut self, handle: RenderHandle) {
        self.owners.remove(&handle);
    }
}

/// Where a ghost ended up
#[derive(Debug)]
pub(crate) struct GhostStatus {
    pub id: GhostId,
    pub map: String,
    pub segment: usize,
    pub tick: i64,
    pub finished: bool,
    pub frames: u64,
    pub last_pose: Option<PoseSample>,
}

#[derive(Debug, Default)]
pub(crate) struct RaceReport {
    pub ticks: u64,
    pub frames: u64,
    pub events: Vec<(String, GhostId, CustomEvent)>,
    pub ghosts: Vec<GhostStatus>,
    pub recap: Vec<String>,
}

/// Execute the race command
pub fn execute(args: RaceArgs, config: &GhostConfig) -> Result<()> {
    let route = Route::load(&args.route)?;
    let base_dir = args.route.parent().unwrap_or(Path::new("."));
    let report = run_race(&route, base_dir, config, args.fps)?;

    if args.events {
        for (map, id, event) in &report.events {
            println!("{} [{:>6}] ghost {}: {}", map, event.tick, id, event);
        }
    }

    println!("Recap of all ghosts:");
    for line in &report.recap {
        println!("  {}", line);
    }
    println!();
    println!("After {} ticks ({} frames):", report.ticks, report.frames);
    for ghost in &report.ghosts {
        let state = if ghost.finished { "finished" } else { "running" };
        print!(
            "  ghost {}: {} on {} (segment {}, tick {}), {} frames drawn",
            ghost.id, state, ghost.map, ghost.segment, ghost.tick, ghost.frames
        );
        match ghost.last_pose {
            Some(pose) => println!(
                ", last at ({:.1}, {:.1}, {:.1})",
                pose.position.x, pose.position.y, pose.position.z
            ),
            None => println!(),
        }
    }

    Ok(())
}

pub(crate) fn run_race(
    route: &Route,
    base_dir: &Path,
    config: &GhostConfig,
    fps: u32,
) -> Result<RaceReport> {
    let interval = tick_interval(route.tick_rate)?;
    let frame_time = tick_interval(fps)?;
    let Some(first_leg) = route.legs.first() else {
        anyhow::bail!("Route has no legs");
    };

    let mut config = config.clone();
    if let Some(sync) = route.sync {
        config.sync = sync;
    }

    let mut search_paths = vec![base_dir.to_path_buf()];
    search_paths.extend(config.search_paths.iter().cloned());
    let resolver = SearchPathResolver::new(search_paths);

    let mut maps = MapList::new(route.maps.iter().cloned());
    maps.set_current(Some(first_leg.map.as_str()));

    let mut player = DemoGhostPlayer::new(TallyRender::default(), &config);
    for (id, ghost) in route.ghosts.iter().enumerate() {
        let id = id as GhostId;
        let result = if ghost.full_game {
            player.setup_from_sequence(&ghost.demo, ghost.first_index, id, &resolver, &maps)
        } else {
            player.setup_from_demo(&ghost.demo, id, &resolver, &maps)
        };
        result.with_context(|| format!("Failed to set up ghost from {}", ghost.demo))?;

        if ghost.delay != 0 {
            player.set_offset(id, ghost.delay)?;
        }
        if let Some(color) = ghost.color {
            player.set_color(id, color)?;
        }
    }

    let mut report = RaceReport {
        recap: player.recap(interval).iter().map(ToString::to_string).collect(),
        ..Default::default()
    };

    player.start_all(&maps)?;

    let mut clock = RaceClock {
        tick: 0,
        interval,
        alpha: 0.0,
    };

    for (i, leg) in route.legs.iter().enumerate() {
        if i > 0 {
            maps.set_current(Some(leg.map.as_str()));
            player.on_session_start(&maps);
        }
        tracing::info!(map = %leg.map, ticks = leg.ticks, "Leg started");

        let mut accumulator = Duration::ZERO;
        let mut ticks = 0;
        while ticks < leg.ticks {
            accumulator += frame_time;
            while accumulator >= interval && ticks < leg.ticks {
                player.on_tick(&clock);
                clock.tick += 1;
                ticks += 1;
                accumulator -= interval;
            }
            clock.alpha = (accumulator.as_secs_f32() / interval.as_secs_f32()).min(0.999);
            player.on_render(&clock);
            report.frames += 1;
        }
        report.ticks += u64::from(leg.ticks);

        for (id, event) in player.take_fired_events() {
            tracing::debug!(id, tick = event.tick, "Event passed");
            report.events.push((leg.map.clone(), id, event));
        }
    }

    report.ghosts = player
        .ghosts()
        .map(|ghost| {
            let (frames, last_pose) = match player.render_target().frames.get(&ghost.id()) {
                Some(&(frames, pose)) => (frames, Some(pose)),
                None => (0, None),
            };
            GhostStatus {
                id: ghost.id(),
                map: ghost.current_map().to_string(),
                segment: ghost.segment_index(),
                tick: ghost.tick(),
                finished: ghost.has_finished(),
                frames,
                last_pose,
            }
        })
        .collect();

    Ok(report)
}
