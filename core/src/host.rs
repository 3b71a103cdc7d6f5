//! Capabilities the host game provides to the ghost player
//!
//! The player never talks to an engine directly. The live session's clock,
//! its map identity and ordering, file lookup and the entity/render layer
//! all come in through the traits below, so the same player runs inside a
//! game, a headless tool or a unit test.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::demo::PoseSample;
use crate::ghost::{Color, GhostId};

/// The live simulation's clock
pub trait LiveSessionClock {
    /// Current simulation tick
    fn tick(&self) -> i32;

    /// Duration of one simulation tick
    fn tick_interval(&self) -> Duration;

    /// Whether the simulation is advancing (not paused, not loading)
    fn is_running(&self) -> bool;

    /// Fraction of the way from the last tick to the next one at the time
    /// of the current render frame, in `[0, 1)`
    fn interpolation_alpha(&self) -> f32;
}

/// The live session's current map and the game's level order
pub trait MapOrdering {
    /// Map the player is on; `None` in the main menu
    fn current_map(&self) -> Option<&str>;

    /// Position of `map` in the game's canonical order, if it has one
    fn map_index(&self, map: &str) -> Option<usize>;
}

/// Opaque handle to a spawned ghost renderable
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RenderHandle(pub u64);

/// Display attributes carried by a ghost
#[derive(Debug, Clone, PartialEq)]
pub struct GhostAppearance {
    pub model: String,
    pub color: Color,
}

/// The host's entity and render layer
pub trait RenderTarget {
    /// Create a renderable for a ghost. Returns `None` if the host could
    /// not create one; the player retries on a later frame.
    fn acquire(&mut self, id: GhostId, appearance: &GhostAppearance) -> Option<RenderHandle>;

    /// Move a renderable to `pose`
    fn draw(&mut self, handle: RenderHandle, pose: &PoseSample);

    /// Destroy a renderable
    fn release(&mut self, handle: RenderHandle);
}

impl<T: RenderTarget + ?Sized> RenderTarget for &mut T {
    fn acquire(&mut self, id: GhostId, appearance: &GhostAppearance) -> Option<RenderHandle> {
        (**self).acquire(id, appearance)
    }

    fn draw(&mut self, handle: RenderHandle, pose: &PoseSample) {
        (**self).draw(handle, pose)
    }

    fn release(&mut self, handle: RenderHandle) {
        (**self).release(handle)
    }
}

/// Locates demo files by logical name
pub trait FileResolver {
    /// Where `name` actually lives, if it can be found
    fn locate(&self, name: &Path) -> Option<PathBuf>;

    /// Located path, or `name` unchanged when nothing was found
    fn resolve(&self, name: &Path) -> PathBuf {
        self.locate(name).unwrap_or_else(|| name.to_path_buf())
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// A fixed level order plus the live session's current map
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapList {
    maps: Vec<String>,
    current: Option<String>,
}

impl MapList {
    pub fn new<I, S>(maps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            maps: maps.into_iter().map(Into::into).collect(),
            current: None,
        }
    }

    /// Enter `map`, or the menu when `None`
    pub fn set_current(&mut self, map: Option<&str>) {
        self.current = map.map(str::to_string);
    }

    pub fn maps(&self) -> &[String] {
        &self.maps
    }
}

impl MapOrdering for MapList {
    fn current_map(&self) -> Option<&str> {
        self.current.as_deref()
    }

    fn map_index(&self, map: &str) -> Option<usize> {
        self.maps.iter().position(|m| m == map)
    }
}

/// Looks a name up as given, then under each search directory in order
#[derive(Debug, Clone, Default)]
pub struct SearchPathResolver {
    search_paths: Vec<PathBuf>,
}

impl SearchPathResolver {
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        Self { search_paths }
    }
}

impl FileResolver for SearchPathResolver {
    fn locate(&self, name: &Path) -> Option<PathBuf> {
        if name.is_file() {
            return Some(name.to_path_buf());
        }
        if name.is_absolute() {
            return None;
        }
        self.search_paths
            .iter()
            .map(|dir| dir.join(name))
            .find(|candidate| candidate.is_file())
    }
}
