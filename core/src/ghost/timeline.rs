//! Multi-segment ghost timelines

use crate::demo::DemoRecord;

/// A position inside a timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub segment: usize,
    pub local_tick: u32,
}

/// One or more demos played back to back.
///
/// A single-level ghost has one segment. A full-game ghost has one segment
/// per level, in the order they were appended. `total_ticks()` is always
/// the sum of the segments' tick counts.
#[derive(Debug, Clone, PartialEq)]
pub struct GhostTimeline {
    segments: Vec<DemoRecord>,
    total_ticks: u64,
}

impl GhostTimeline {
    pub fn new(first: DemoRecord) -> Self {
        let total_ticks = first.playback_ticks() as u64;
        Self {
            segments: vec![first],
            total_ticks,
        }
    }

    /// Add the next level's demo
    pub fn append(&mut self, record: DemoRecord) {
        self.total_ticks += record.playback_ticks() as u64;
        self.segments.push(record);
    }

    pub fn segments(&self) -> &[DemoRecord] {
        &self.segments
    }

    pub fn segment(&self, index: usize) -> Option<&DemoRecord> {
        self.segments.get(index)
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn first_level(&self) -> &str {
        self.segments.first().map_or("", |s| s.map_name())
    }

    pub fn last_level(&self) -> &str {
        self.segments.last().map_or("", |s| s.map_name())
    }

    pub fn total_ticks(&self) -> u64 {
        self.total_ticks
    }

    /// Global tick at which `segment` begins
    pub fn segment_start(&self, segment: usize) -> u64 {
        self.segments
            .iter()
            .take(segment)
            .map(|s| s.playback_ticks() as u64)
            .sum()
    }

    /// Find the segment and local tick for a global tick.
    ///
    /// Returns `None` at or past the end of the timeline.
    pub fn resolve(&self, global: u64) -> Option<Cursor> {
        let mut start = 0u64;
        for (segment, record) in self.segments.iter().enumerate() {
            let len = record.playback_ticks() as u64;
            if global < start + len {
                return Some(Cursor {
                    segment,
                    local_tick: (global - start) as u32,
                });
            }
            start += len;
        }
        None
    }

    /// Segment recorded on `map`, preferring the first match at or after
    /// `from`, then the earliest one
    pub fn find_map(&self, map: &str, from: usize) -> Option<usize> {
        let matches = |(_, s): &(usize, &DemoRecord)| s.map_name() == map;
        self.segments
            .iter()
            .enumerate()
            .skip(from)
            .find(matches)
            .or_else(|| self.segments.iter().enumerate().find(matches))
            .map(|(i, _)| i)
    }
}
