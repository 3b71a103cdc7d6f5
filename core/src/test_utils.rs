//! Shared test utilities for integration and unit tests

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use glam::Vec3;

use crate::demo::{DemoHeader, DemoRecord, DemoWriter, PoseSample, write_record};
use crate::ghost::GhostId;
use crate::host::{GhostAppearance, LiveSessionClock, MapOrdering, RenderHandle, RenderTarget};

// ============================================================================
// Live session double
// ============================================================================

/// Scripted live session: a tick clock plus a fixed map order
pub struct TestSession {
    pub tick: i32,
    pub running: bool,
    pub alpha: f32,
    pub maps: Vec<String>,
    pub current: Option<String>,
}

impl TestSession {
    pub fn new(maps: &[&str]) -> Self {
        Self {
            tick: 0,
            running: true,
            alpha: 0.0,
            maps: maps.iter().map(|m| m.to_string()).collect(),
            current: None,
        }
    }

    /// Load `map` (or go to the menu)
    pub fn load(&mut self, map: Option<&str>) {
        self.current = map.map(str::to_string);
    }

    pub fn advance(&mut self) {
        self.tick += 1;
    }
}

impl LiveSessionClock for TestSession {
    fn tick(&self) -> i32 {
        self.tick
    }

    fn tick_interval(&self) -> Duration {
        Duration::from_micros(16_667)
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn interpolation_alpha(&self) -> f32 {
        self.alpha
    }
}

impl MapOrdering for TestSession {
    fn current_map(&self) -> Option<&str> {
        self.current.as_deref()
    }

    fn map_index(&self, map: &str) -> Option<usize> {
        self.maps.iter().position(|m| m == map)
    }
}

// ============================================================================
// Render double
// ============================================================================

/// Render target that records what the player asked of it
#[derive(Default)]
pub struct RecordingRenderTarget {
    pub acquired: u32,
    pub released: u32,
    pub draws: Vec<(GhostId, PoseSample)>,
    /// Refuse acquisitions while set
    pub refuse: bool,
    next: u64,
    live: BTreeMap<RenderHandle, (GhostId, GhostAppearance)>,
}

impl RecordingRenderTarget {
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn live_appearance(&self, id: GhostId) -> Option<&GhostAppearance> {
        self.live
            .values()
            .find(|(ghost, _)| *ghost == id)
            .map(|(_, appearance)| appearance)
    }
}

impl RenderTarget for RecordingRenderTarget {
    fn acquire(&mut self, id: GhostId, appearance: &GhostAppearance) -> Option<RenderHandle> {
        if self.refuse {
            return None;
        }
        self.acquired += 1;
        self.next += 1;
        let handle = RenderHandle(self.next);
        self.live.insert(handle, (id, appearance.clone()));
        Some(handle)
    }

    fn draw(&mut self, handle: RenderHandle, pose: &PoseSample) {
        if let Some((id, _)) = self.live.get(&handle) {
            self.draws.push((*id, *pose));
        }
    }

    fn release(&mut self, handle: RenderHandle) {
        self.released += 1;
        self.live.remove(&handle);
    }
}

// ============================================================================
// Fixture demos
// ============================================================================

/// Record whose x position equals the tick number
pub fn linear_record(client: &str, map: &str, ticks: usize) -> DemoRecord {
    let samples = (0..ticks)
        .map(|i| PoseSample::at(Vec3::new(i as f32, 0.0, 64.0), Vec3::new(0.0, 90.0, 0.0)))
        .collect();
    DemoRecord::new(client, map, samples)
}

/// Write a demo file of `ticks` ticks recorded on `map`
pub fn write_demo(path: &Path, client: &str, map: &str, ticks: usize) {
    let data = write_record(Vec::new(), &linear_record(client, map, ticks)).unwrap();
    std::fs::write(path, data).unwrap();
}

/// Write a file that has a valid header but no pose data
pub fn write_empty_demo(path: &Path, map: &str, ticks: i32) {
    let data = DemoWriter::new(Vec::new(), DemoHeader::new("runner", map, ticks))
        .unwrap()
        .finish()
        .unwrap();
    std::fs::write(path, data).unwrap();
}
