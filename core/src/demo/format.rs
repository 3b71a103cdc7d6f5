//! Demo container layout: header fields and message commands

/// File magic, including the trailing NUL
pub const DEMO_MAGIC: &[u8; 8] = b"HL2DEMO\0";

/// Width of each fixed-size name field in the header
pub const NAME_FIELD_LEN: usize = 260;

/// Total header size in bytes
pub const HEADER_SIZE: usize = 8 + 4 + 4 + NAME_FIELD_LEN * 4 + 4 + 4 + 4 + 4;

/// Size of one split-screen slot's cmd-info block
pub const CMD_INFO_SIZE: usize = 4 + 12 * 6;

/// Upper bound on demo files read into memory (64 MiB)
pub const MAX_DEMO_BYTES: u64 = 64 * 1024 * 1024;

/// Upper bound on the samples one demo may expand to (six hours at 60 Hz)
pub const MAX_PLAYBACK_TICKS: u32 = 6 * 60 * 60 * 60;

/// Custom-data channel carrying ghost events
pub const GHOST_EVENT_CHANNEL: i32 = 0;

/// Custom event kind byte: entity input
pub const EVENT_ENTITY_INPUT: u8 = 0x01;

/// Custom event kind byte: positional marker
pub const EVENT_MARKER: u8 = 0x02;

/// Slot or tag byte meaning "not present"
pub const NONE_BYTE: u8 = 0xFF;

/// Demo protocol versions understood by the parser
pub const SUPPORTED_PROTOCOLS: [i32; 2] = [3, 4];

/// Demo file header
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DemoHeader {
    pub demo_protocol: i32,
    pub network_protocol: i32,
    pub server_name: String,
    pub client_name: String,
    pub map_name: String,
    pub game_directory: String,
    pub playback_time: f32,
    pub playback_ticks: i32,
    pub playback_frames: i32,
    pub signon_length: i32,
}

impl DemoHeader {
    /// Split-screen slots stored in each Packet's cmd-info
    pub fn slot_count(&self) -> usize {
        if self.demo_protocol >= 4 { 2 } else { 1 }
    }

    /// Whether each message carries a player slot byte
    pub fn has_message_slot(&self) -> bool {
        self.demo_protocol >= 4
    }
}

/// Message commands in the demo stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    SignOn,
    Packet,
    SyncTick,
    ConsoleCmd,
    UserCmd,
    DataTables,
    Stop,
    CustomData,
    StringTables,
}

impl MessageKind {
    /// Decode a command byte; command 8 changed meaning between protocols
    pub fn from_byte(cmd: u8, protocol: i32) -> Option<Self> {
        match (cmd, protocol >= 4) {
            (1, _) => Some(MessageKind::SignOn),
            (2, _) => Some(MessageKind::Packet),
            (3, _) => Some(MessageKind::SyncTick),
            (4, _) => Some(MessageKind::ConsoleCmd),
            (5, _) => Some(MessageKind::UserCmd),
            (6, _) => Some(MessageKind::DataTables),
            (7, _) => Some(MessageKind::Stop),
            (8, true) => Some(MessageKind::CustomData),
            (8, false) => Some(MessageKind::StringTables),
            (9, true) => Some(MessageKind::StringTables),
            _ => None,
        }
    }

    pub fn to_byte(self, protocol: i32) -> u8 {
        match self {
            MessageKind::SignOn => 1,
            MessageKind::Packet => 2,
            MessageKind::SyncTick => 3,
            MessageKind::ConsoleCmd => 4,
            MessageKind::UserCmd => 5,
            MessageKind::DataTables => 6,
            MessageKind::Stop => 7,
            MessageKind::CustomData => 8,
            MessageKind::StringTables => {
                if protocol >= 4 { 9 } else { 8 }
            }
        }
    }
}
