//! Error types for ghost setup and control
//!
//! Parse failures live in [`crate::demo::ParseError`]; this module covers
//! everything that happens at the pool boundary.

use std::path::PathBuf;

use crate::demo::ParseError;
use crate::ghost::GhostId;

/// Errors reported by [`crate::ghost::DemoGhostPlayer`] operations.
///
/// None of these leave the pool partially modified.
#[derive(Debug, thiserror::Error)]
pub enum GhostError {
    /// A demo could not be read or decoded
    #[error("could not parse \"{}\": {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: ParseError,
    },

    /// The first file of a setup request does not exist
    #[error("demo \"{}\" not found", .0.display())]
    MissingDemo(PathBuf),

    /// An operation referenced a ghost that is not in the pool
    #[error("no ghost with ID {0}")]
    UnknownGhost(GhostId),

    /// Ghosts cannot start while the live session has no map loaded
    #[error("can't start ghosts in menu")]
    InMenu,
}

/// Errors produced while loading [`crate::config::GhostConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", path.display())]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
