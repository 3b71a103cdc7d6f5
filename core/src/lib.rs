//! Demo ghosts: replaying recorded runs alongside a live game
//!
//! This crate parses Source-engine demo recordings into per-tick poses and
//! replays any number of them as "ghosts" in lockstep with a live,
//! fixed-tick simulation, interpolated at the host's render rate.
//!
//! # Architecture
//!
//! - [`demo`] - demo container parsing ([`DemoParser`]) into [`DemoRecord`]s
//! - [`ghost`] - multi-segment timelines, ghost entities and the
//!   [`DemoGhostPlayer`] pool that drives them
//! - [`host`] - capability traits the host game implements (clock, map
//!   order, render target, file lookup)
//! - [`config`] - `config.toml` settings

pub mod config;
pub mod demo;
pub mod error;
pub mod ghost;
pub mod host;
pub mod time;

#[cfg(test)]
mod integration;
#[cfg(test)]
pub mod test_utils;

pub use config::GhostConfig;
pub use demo::{DemoParser, DemoRecord, ParseError, PoseSample};
pub use error::{ConfigError, GhostError};
pub use ghost::{Color, DemoGhostEntity, DemoGhostPlayer, GhostId, GhostTimeline};
pub use host::{FileResolver, LiveSessionClock, MapOrdering, RenderTarget};
