//! Ghost timelines, entities and the playback pool

mod color;
mod entity;
mod player;
mod timeline;

pub use color::{Color, ParseColorError};
pub use entity::DemoGhostEntity;
pub use player::{DemoGhostPlayer, RecapLine};
pub use timeline::{Cursor, GhostTimeline};

/// Externally assigned ghost identifier
pub type GhostId = u32;
