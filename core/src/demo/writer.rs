//! Demo container writer
//!
//! Produces files the parser reads back: header, cmd-info packets,
//! delta-coded user commands and ghost custom events. Network payloads are
//! written empty.

use std::io::{self, Write};

use byteorder::{LittleEndian, WriteBytesExt};
use glam::Vec3;

use super::bits::{UserCmdState, encode_delta};
use super::format::*;
use super::types::{Buttons, CustomEventKind, DemoRecord, PortalTag};

/// Network protocol written into generated headers
const DEFAULT_NETWORK_PROTOCOL: i32 = 2001;

impl DemoHeader {
    /// Protocol 4 header for a recording of `ticks` ticks
    pub fn new(client_name: &str, map_name: &str, ticks: i32) -> Self {
        Self {
            demo_protocol: 4,
            network_protocol: DEFAULT_NETWORK_PROTOCOL,
            server_name: "localhost:27015".to_string(),
            client_name: client_name.to_string(),
            map_name: map_name.to_string(),
            game_directory: "portal2".to_string(),
            playback_time: ticks as f32 / 60.0,
            playback_ticks: ticks,
            playback_frames: ticks,
            signon_length: 0,
        }
    }
}

/// Streaming demo writer
pub struct DemoWriter<W: Write> {
    writer: W,
    header: DemoHeader,
    usercmd: UserCmdState,
}

impl<W: Write> DemoWriter<W> {
    /// Write `header` and return a writer positioned at the first message
    pub fn new(mut writer: W, header: DemoHeader) -> io::Result<Self> {
        write_header(&mut writer, &header)?;
        Ok(Self {
            writer,
            header,
            usercmd: UserCmdState::default(),
        })
    }

    fn message(&mut self, kind: MessageKind, tick: i32) -> io::Result<()> {
        self.writer.write_u8(kind.to_byte(self.header.demo_protocol))?;
        self.writer.write_i32::<LittleEndian>(tick)?;
        if self.header.has_message_slot() {
            self.writer.write_u8(0)?;
        }
        Ok(())
    }

    fn sized(&mut self, data: &[u8]) -> io::Result<()> {
        self.writer.write_i32::<LittleEndian>(data.len() as i32)?;
        self.writer.write_all(data)
    }

    /// Packet carrying the slot-0 view for `tick`
    pub fn packet(&mut self, tick: i32, position: Vec3, angles: Vec3) -> io::Result<()> {
        self.message(MessageKind::Packet, tick)?;
        for slot in 0..self.header.slot_count() {
            let (position, angles) = if slot == 0 {
                (position, angles)
            } else {
                (Vec3::ZERO, Vec3::ZERO)
            };
            self.writer.write_i32::<LittleEndian>(0)?; // flags
            write_vec3(&mut self.writer, position)?;
            write_vec3(&mut self.writer, angles)?;
            write_vec3(&mut self.writer, Vec3::ZERO)?; // local angles
            write_vec3(&mut self.writer, Vec3::ZERO)?; // second view origin
            write_vec3(&mut self.writer, Vec3::ZERO)?;
            write_vec3(&mut self.writer, Vec3::ZERO)?;
        }
        self.writer.write_i32::<LittleEndian>(0)?; // in sequence
        self.writer.write_i32::<LittleEndian>(0)?; // out sequence
        self.sized(&[])
    }

    /// User command changing the held input
    pub fn user_cmd(&mut self, tick: i32, buttons: Buttons, movement: Vec3) -> io::Result<()> {
        let next = UserCmdState {
            command_number: self.usercmd.command_number.wrapping_add(1),
            tick_count: tick.max(0) as u32,
            buttons,
            movement,
            ..self.usercmd
        };
        let payload = encode_delta(&self.usercmd, &next);
        self.usercmd = next;

        self.message(MessageKind::UserCmd, tick)?;
        self.writer.write_i32::<LittleEndian>(next.command_number as i32)?;
        self.sized(&payload)
    }

    pub fn console_cmd(&mut self, tick: i32, command: &str) -> io::Result<()> {
        self.message(MessageKind::ConsoleCmd, tick)?;
        let mut data = command.as_bytes().to_vec();
        data.push(0);
        self.sized(&data)
    }

    pub fn sync_tick(&mut self, tick: i32) -> io::Result<()> {
        self.message(MessageKind::SyncTick, tick)
    }

    /// Raw custom data message on an arbitrary channel
    pub fn custom_data(&mut self, tick: i32, channel: i32, payload: &[u8]) -> io::Result<()> {
        self.message(MessageKind::CustomData, tick)?;
        self.writer.write_i32::<LittleEndian>(channel)?;
        self.sized(payload)
    }

    /// Ghost event on the event channel
    pub fn event(&mut self, tick: i32, kind: &CustomEventKind) -> io::Result<()> {
        let mut payload = Vec::new();
        match kind {
            CustomEventKind::EntityInput {
                target,
                class_name,
                input,
                parameter,
                slot,
            } => {
                payload.push(EVENT_ENTITY_INPUT);
                payload.push(slot.unwrap_or(NONE_BYTE));
                for field in [target, class_name, input, parameter] {
                    payload.extend_from_slice(field.as_bytes());
                    payload.push(0);
                }
            }
            CustomEventKind::Marker {
                position,
                slot,
                tag,
            } => {
                payload.push(EVENT_MARKER);
                payload.push(slot.unwrap_or(NONE_BYTE));
                payload.push(tag.map_or(NONE_BYTE, PortalTag::to_byte));
                write_vec3(&mut payload, *position)?;
            }
        }
        self.custom_data(tick, GHOST_EVENT_CHANNEL, &payload)
    }

    /// Write the stop message and hand back the inner writer
    pub fn finish(mut self) -> io::Result<W> {
        let tick = self.header.playback_ticks;
        self.message(MessageKind::Stop, tick)?;
        self.writer.flush()?;
        Ok(self.writer)
    }

    /// Hand back the inner writer without a stop message
    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Write a whole record: one packet per sample, a user command whenever
/// the input changes, then its events and a stop message.
pub fn write_record<W: Write>(writer: W, record: &DemoRecord) -> io::Result<W> {
    let header = DemoHeader {
        game_directory: record.game_directory().to_string(),
        ..DemoHeader::new(
            record.client_name(),
            record.map_name(),
            record.playback_ticks() as i32,
        )
    };
    let mut demo = DemoWriter::new(writer, header)?;

    for (tick, sample) in record.samples().iter().enumerate() {
        let tick = tick as i32;
        if sample.buttons != demo.usercmd.buttons || sample.movement != demo.usercmd.movement {
            demo.user_cmd(tick, sample.buttons, sample.movement)?;
        }
        demo.packet(tick, sample.position, sample.angles)?;
    }
    for event in record.events() {
        demo.event(event.tick, &event.kind)?;
    }

    demo.finish()
}

fn write_header<W: Write>(writer: &mut W, header: &DemoHeader) -> io::Result<()> {
    writer.write_all(DEMO_MAGIC)?;
    writer.write_i32::<LittleEndian>(header.demo_protocol)?;
    writer.write_i32::<LittleEndian>(header.network_protocol)?;
    for name in [
        &header.server_name,
        &header.client_name,
        &header.map_name,
        &header.game_directory,
    ] {
        write_name(writer, name)?;
    }
    writer.write_f32::<LittleEndian>(header.playback_time)?;
    writer.write_i32::<LittleEndian>(header.playback_ticks)?;
    writer.write_i32::<LittleEndian>(header.playback_frames)?;
    writer.write_i32::<LittleEndian>(header.signon_length)?;
    Ok(())
}

/// Fixed-width NUL-padded name; longer names are cut to fit
fn write_name<W: Write>(writer: &mut W, name: &str) -> io::Result<()> {
    let mut field = [0u8; NAME_FIELD_LEN];
    let bytes = name.as_bytes();
    let len = bytes.len().min(NAME_FIELD_LEN - 1);
    field[..len].copy_from_slice(&bytes[..len]);
    writer.write_all(&field)
}

fn write_vec3<W: Write>(writer: &mut W, v: Vec3) -> io::Result<()> {
    writer.write_f32::<LittleEndian>(v.x)?;
    writer.write_f32::<LittleEndian>(v.y)?;
    writer.write_f32::<LittleEndian>(v.z)
}
