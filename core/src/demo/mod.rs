//! Demo files
//!
//! Reading (and, for fixtures and tools, writing) Source-engine demo
//! recordings.
//!
//! # File layout
//!
//! ```text
//! Header (1072 bytes)
//! ├── magic            "HL2DEMO\0"
//! ├── demo protocol    i32 (3 or 4)
//! ├── network protocol i32
//! ├── server / client / map / game directory   4 × char[260]
//! └── time f32, ticks i32, frames i32, sign-on length i32
//!
//! Messages, repeated until Stop
//! ├── cmd  u8
//! ├── tick i32
//! ├── slot u8              (protocol 4 only)
//! └── body, depending on cmd:
//!     SignOn / Packet  cmd-info × slots, 2 × i32 sequence, i32 size, data
//!     SyncTick         nothing
//!     ConsoleCmd       i32 size, data
//!     UserCmd          i32 sequence, i32 size, bit-packed delta
//!     DataTables       i32 size, data
//!     Stop             nothing
//!     CustomData       i32 channel, i32 size, data   (protocol 4)
//!     StringTables     i32 size, data
//! ```
//!
//! All integers and floats are little-endian.

mod bits;
mod format;
mod parser;
mod types;
mod writer;

pub use bits::{BitReader, BitWriter, UserCmdState, encode_delta};
pub use format::{DemoHeader, HEADER_SIZE, MAX_DEMO_BYTES, MAX_PLAYBACK_TICKS, MessageKind};
pub use parser::{DemoParser, ParseError, read_header};
pub use types::{
    Buttons, CustomEvent, CustomEventKind, DemoRecord, PortalTag, PoseSample, wrap_degrees,
};
pub use writer::{DemoWriter, write_record};
