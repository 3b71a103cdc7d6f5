//! Demo parser
//!
//! Decodes a demo container into a [`DemoRecord`]: one pose sample per
//! tick, taken from the slot-0 cmd-info of each Packet message, with input
//! state from the delta-coded user commands.

use std::collections::BTreeMap;
use std::io::{self, Cursor, Read};
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use glam::Vec3;

use super::bits::UserCmdState;
use super::format::*;
use super::types::{CustomEvent, CustomEventKind, DemoRecord, PoseSample, PortalTag, wrap_degrees};

/// Highest pitch kept after adjustment
const MAX_PITCH: f32 = 89.0;

/// Reasons a demo cannot be turned into a record
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("demo too large ({size} bytes, max {max})")]
    TooLarge { size: u64, max: u64 },

    #[error("not a demo file (bad magic)")]
    BadMagic,

    #[error("unsupported demo protocol {0}")]
    UnsupportedProtocol(i32),

    #[error("demo truncated while reading {0}")]
    Truncated(&'static str),

    #[error("unknown message command {cmd} at tick {tick}")]
    UnknownMessage { cmd: u8, tick: i32 },

    #[error("corrupt message at tick {tick}: {reason}")]
    Corrupt { tick: i32, reason: &'static str },

    #[error("tick count mismatch: header declares {declared}, stream reaches {observed}")]
    TickMismatch { declared: i64, observed: i64 },

    #[error("demo spans {ticks} ticks, max {max}")]
    TooManyTicks { ticks: i64, max: u32 },

    #[error("demo declares {0} ticks but contains no pose data")]
    NoPoseData(u32),
}

/// Map an unexpected EOF onto [`ParseError::Truncated`]
fn truncated(what: &'static str) -> impl Fn(io::Error) -> ParseError {
    move |e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            ParseError::Truncated(what)
        } else {
            ParseError::Io(e)
        }
    }
}

/// Demo parser.
///
/// Stateless apart from its options, so one parser can be reused for every
/// file of a sequence.
#[derive(Debug, Clone, Default)]
pub struct DemoParser {
    want_events: bool,
}

impl DemoParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also decode custom events
    pub fn with_events(mut self, want_events: bool) -> Self {
        self.want_events = want_events;
        self
    }

    /// Read and parse a demo file
    pub fn parse_file(&self, path: &Path) -> Result<DemoRecord, ParseError> {
        let size = std::fs::metadata(path)?.len();
        if size > MAX_DEMO_BYTES {
            return Err(ParseError::TooLarge {
                size,
                max: MAX_DEMO_BYTES,
            });
        }
        let data = std::fs::read(path)?;
        let record = self.parse_bytes(&data)?;

        tracing::debug!(
            path = %path.display(),
            map = record.map_name(),
            ticks = record.playback_ticks(),
            events = record.events().len(),
            "Parsed demo"
        );
        Ok(record)
    }

    /// Parse a demo held in memory
    pub fn parse_bytes(&self, data: &[u8]) -> Result<DemoRecord, ParseError> {
        let mut cursor = Cursor::new(data);
        let header = read_header(&mut cursor)?;
        let stream = self.read_messages(&header, &mut cursor)?;

        let samples = build_samples(&header, &stream.poses)?;
        let record = DemoRecord::new(header.client_name, header.map_name, samples)
            .with_game_directory(header.game_directory)
            .with_events(stream.events);
        Ok(record)
    }

    /// Normalize a parsed record so every sample can be treated the same way.
    ///
    /// Wraps angles into `(-180, 180]` with pitch clamped to ±89°, replaces
    /// non-finite components with the previous sample's value, fills leading
    /// all-zero samples from the first real one and re-sorts events.
    /// Running it twice gives the same result as running it once.
    pub fn adjust(&self, record: &mut DemoRecord) {
        let samples = record.samples_mut();

        let mut prev = PoseSample::default();
        for sample in samples.iter_mut() {
            sample.position = finite_or(sample.position, prev.position);
            sample.movement = finite_or(sample.movement, prev.movement);
            sample.angles = normalize_angles(finite_or(sample.angles, prev.angles));
            prev = *sample;
        }

        if let Some(first_valid) = samples.iter().position(|s| !s.is_degenerate()) {
            let template = samples[first_valid];
            for sample in &mut samples[..first_valid] {
                sample.position = template.position;
                sample.angles = template.angles;
            }
        }

        record.events_mut().sort_by_key(|e| e.tick);
    }

    fn read_messages(
        &self,
        header: &DemoHeader,
        cursor: &mut Cursor<&[u8]>,
    ) -> Result<MessageStream, ParseError> {
        let mut stream = MessageStream::default();
        let mut usercmd = UserCmdState::default();
        let len = cursor.get_ref().len() as u64;

        loop {
            if cursor.position() >= len {
                tracing::warn!("Demo ended without a stop message");
                break;
            }

            let cmd = cursor.read_u8().map_err(truncated("message command"))?;
            let tick = cursor
                .read_i32::<LittleEndian>()
                .map_err(truncated("message tick"))?;
            if header.has_message_slot() {
                cursor.read_u8().map_err(truncated("message slot"))?;
            }

            let kind = MessageKind::from_byte(cmd, header.demo_protocol)
                .ok_or(ParseError::UnknownMessage { cmd, tick })?;

            match kind {
                MessageKind::Stop => break,
                MessageKind::SyncTick => {}
                MessageKind::SignOn => {
                    skip(cursor, CMD_INFO_SIZE * header.slot_count() + 8, "cmd-info")?;
                    let size = read_size(cursor, tick)?;
                    skip(cursor, size, "sign-on data")?;
                }
                MessageKind::Packet => {
                    let (position, angles) = read_cmd_info(cursor, header.slot_count())?;
                    skip(cursor, 8, "packet sequence")?;
                    let size = read_size(cursor, tick)?;
                    skip(cursor, size, "packet data")?;

                    stream.poses.insert(
                        tick,
                        PoseSample {
                            position,
                            angles,
                            buttons: usercmd.buttons,
                            movement: usercmd.movement,
                            finished: false,
                        },
                    );
                }
                MessageKind::UserCmd => {
                    skip(cursor, 4, "user command sequence")?;
                    let size = read_size(cursor, tick)?;
                    let payload = read_payload(cursor, size, "user command")?;
                    if usercmd.apply_delta(payload).is_none() {
                        tracing::trace!(tick, "User command shorter than its field flags");
                    }
                }
                MessageKind::ConsoleCmd | MessageKind::DataTables | MessageKind::StringTables => {
                    let size = read_size(cursor, tick)?;
                    skip(cursor, size, "message data")?;
                }
                MessageKind::CustomData => {
                    let channel = cursor
                        .read_i32::<LittleEndian>()
                        .map_err(truncated("custom data channel"))?;
                    let size = read_size(cursor, tick)?;
                    let payload = read_payload(cursor, size, "custom data")?;

                    if self.want_events && channel == GHOST_EVENT_CHANNEL {
                        match decode_custom_event(payload) {
                            Some(kind) => stream.events.push(CustomEvent { tick, kind }),
                            None => tracing::warn!(tick, "Skipping unrecognized custom event"),
                        }
                    }
                }
            }
        }

        Ok(stream)
    }
}

#[derive(Default)]
struct MessageStream {
    poses: BTreeMap<i32, PoseSample>,
    events: Vec<CustomEvent>,
}

/// Read the fixed-size demo header
pub fn read_header<R: Read>(reader: &mut R) -> Result<DemoHeader, ParseError> {
    let mut magic = [0u8; 8];
    reader.read_exact(&mut magic).map_err(truncated("header"))?;
    if &magic != DEMO_MAGIC {
        return Err(ParseError::BadMagic);
    }

    let demo_protocol = reader.read_i32::<LittleEndian>().map_err(truncated("header"))?;
    if !SUPPORTED_PROTOCOLS.contains(&demo_protocol) {
        return Err(ParseError::UnsupportedProtocol(demo_protocol));
    }
    let network_protocol = reader.read_i32::<LittleEndian>().map_err(truncated("header"))?;

    let server_name = read_name(reader)?;
    let client_name = read_name(reader)?;
    let map_name = read_name(reader)?;
    let game_directory = read_name(reader)?;

    let playback_time = reader.read_f32::<LittleEndian>().map_err(truncated("header"))?;
    let playback_ticks = reader.read_i32::<LittleEndian>().map_err(truncated("header"))?;
    let playback_frames = reader.read_i32::<LittleEndian>().map_err(truncated("header"))?;
    let signon_length = reader.read_i32::<LittleEndian>().map_err(truncated("header"))?;

    Ok(DemoHeader {
        demo_protocol,
        network_protocol,
        server_name,
        client_name,
        map_name,
        game_directory,
        playback_time,
        playback_ticks,
        playback_frames,
        signon_length,
    })
}

fn read_name<R: Read>(reader: &mut R) -> Result<String, ParseError> {
    let mut field = [0u8; NAME_FIELD_LEN];
    reader.read_exact(&mut field).map_err(truncated("header"))?;
    let end = field.iter().position(|&b| b == 0).unwrap_or(NAME_FIELD_LEN);
    Ok(String::from_utf8_lossy(&field[..end]).into_owned())
}

/// Read slot 0's view origin and angles, skipping the rest of the cmd-info
fn read_cmd_info(cursor: &mut Cursor<&[u8]>, slots: usize) -> Result<(Vec3, Vec3), ParseError> {
    let mut block = vec![0u8; CMD_INFO_SIZE * slots];
    cursor.read_exact(&mut block).map_err(truncated("cmd-info"))?;

    let vec_at = |offset: usize| {
        Vec3::new(
            LittleEndian::read_f32(&block[offset..]),
            LittleEndian::read_f32(&block[offset + 4..]),
            LittleEndian::read_f32(&block[offset + 8..]),
        )
    };
    // flags (4), view origin (12), view angles (12), ...
    Ok((vec_at(4), vec_at(16)))
}

fn read_size(cursor: &mut Cursor<&[u8]>, tick: i32) -> Result<usize, ParseError> {
    let size = cursor
        .read_i32::<LittleEndian>()
        .map_err(truncated("message size"))?;
    usize::try_from(size).map_err(|_| ParseError::Corrupt {
        tick,
        reason: "negative message size",
    })
}

fn read_payload<'a>(
    cursor: &mut Cursor<&'a [u8]>,
    size: usize,
    what: &'static str,
) -> Result<&'a [u8], ParseError> {
    let start = cursor.position() as usize;
    let data: &'a [u8] = *cursor.get_ref();
    let end = start.checked_add(size).filter(|&end| end <= data.len());
    match end {
        Some(end) => {
            cursor.set_position(end as u64);
            Ok(&data[start..end])
        }
        None => Err(ParseError::Truncated(what)),
    }
}

fn skip(cursor: &mut Cursor<&[u8]>, size: usize, what: &'static str) -> Result<(), ParseError> {
    read_payload(cursor, size, what).map(|_| ())
}

fn decode_custom_event(payload: &[u8]) -> Option<CustomEventKind> {
    let (&kind, rest) = payload.split_first()?;
    let (&slot, rest) = rest.split_first()?;
    let slot = (slot != NONE_BYTE).then_some(slot);

    match kind {
        EVENT_ENTITY_INPUT => {
            let mut fields = rest
                .split(|&b| b == 0)
                .map(|s| String::from_utf8_lossy(s).into_owned());
            Some(CustomEventKind::EntityInput {
                target: fields.next()?,
                class_name: fields.next()?,
                input: fields.next()?,
                parameter: fields.next()?,
                slot,
            })
        }
        EVENT_MARKER => {
            let (&tag, rest) = rest.split_first()?;
            if rest.len() < 12 {
                return None;
            }
            Some(CustomEventKind::Marker {
                position: Vec3::new(
                    LittleEndian::read_f32(rest),
                    LittleEndian::read_f32(&rest[4..]),
                    LittleEndian::read_f32(&rest[8..]),
                ),
                slot,
                tag: PortalTag::from_byte(tag),
            })
        }
        _ => None,
    }
}

/// Expand per-packet poses into one sample per tick.
///
/// Ticks without a packet hold the previous pose; ticks before the first
/// packet take the first packet's pose. A record always has at least one
/// sample.
fn build_samples(
    header: &DemoHeader,
    poses: &BTreeMap<i32, PoseSample>,
) -> Result<Vec<PoseSample>, ParseError> {
    let last_tick = poses.keys().next_back().map(|&t| i64::from(t));
    let declared = i64::from(header.playback_ticks);

    if declared < 0 {
        return Err(ParseError::TickMismatch {
            declared,
            observed: last_tick.unwrap_or(0),
        });
    }

    // Unfinalized recordings leave the header count at zero
    let ticks = if declared == 0 {
        last_tick.map_or(0, |t| t.max(-1) + 1)
    } else {
        declared
    };

    // The final packet may carry the tick one past the last sample; it has
    // no sample of its own and is dropped
    if let Some(last) = last_tick
        && last > ticks
    {
        return Err(ParseError::TickMismatch {
            declared,
            observed: last,
        });
    }

    if ticks > i64::from(MAX_PLAYBACK_TICKS) {
        return Err(ParseError::TooManyTicks {
            ticks,
            max: MAX_PLAYBACK_TICKS,
        });
    }
    // Bounded by MAX_PLAYBACK_TICKS above
    let ticks = ticks as i32;

    let Some((_, first)) = poses.range(0..ticks).next() else {
        return Err(ParseError::NoPoseData(ticks as u32));
    };

    let mut current = *first;
    let mut samples = Vec::with_capacity(ticks as usize);
    for tick in 0..ticks {
        if let Some(pose) = poses.get(&tick) {
            current = *pose;
        }
        samples.push(current);
    }
    if let Some(last) = samples.last_mut() {
        last.finished = true;
    }

    Ok(samples)
}

fn finite_or(value: Vec3, fallback: Vec3) -> Vec3 {
    let pick = |v: f32, f: f32| if v.is_finite() { v } else { f };
    Vec3::new(
        pick(value.x, fallback.x),
        pick(value.y, fallback.y),
        pick(value.z, fallback.z),
    )
}

fn normalize_angles(angles: Vec3) -> Vec3 {
    Vec3::new(
        wrap_degrees(angles.x).clamp(-MAX_PITCH, MAX_PITCH),
        wrap_degrees(angles.y),
        wrap_degrees(angles.z),
    )
}
