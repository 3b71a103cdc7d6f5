//! LSB-first bit reader for packed user commands

use glam::Vec3;

use super::types::Buttons;

/// Reads bits least-significant first, the way user commands are packed
pub struct BitReader<'a> {
    data: &'a [u8],
    bit: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, bit: 0 }
    }

    pub fn remaining(&self) -> usize {
        (self.data.len() * 8).saturating_sub(self.bit)
    }

    pub fn read_bool(&mut self) -> Option<bool> {
        self.read_bits(1).map(|b| b == 1)
    }

    /// Read up to 32 bits
    pub fn read_bits(&mut self, count: u32) -> Option<u32> {
        debug_assert!(count <= 32);
        if self.remaining() < count as usize {
            return None;
        }
        let mut value = 0u32;
        for i in 0..count {
            let byte = self.data[self.bit / 8];
            let bit = (byte >> (self.bit % 8)) & 1;
            value |= (bit as u32) << i;
            self.bit += 1;
        }
        Some(value)
    }

    pub fn read_f32(&mut self) -> Option<f32> {
        self.read_bits(32).map(f32::from_bits)
    }

    /// Read a value that is only present when its leading flag bit is set
    fn read_optional<T>(&mut self, read: impl FnOnce(&mut Self) -> Option<T>) -> Option<Option<T>> {
        if self.read_bool()? {
            read(self).map(Some)
        } else {
            Some(None)
        }
    }
}

/// Input state carried between user commands.
///
/// User commands only transmit fields that changed, so each one is decoded
/// on top of the previous state.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UserCmdState {
    pub command_number: u32,
    pub tick_count: u32,
    pub view_angles: Vec3,
    pub movement: Vec3,
    pub buttons: Buttons,
    pub impulse: u8,
}

impl UserCmdState {
    /// Apply a packed delta. Returns `None` when the payload is cut short;
    /// fields decoded before the cut are kept.
    pub fn apply_delta(&mut self, data: &[u8]) -> Option<()> {
        let mut bits = BitReader::new(data);

        if let Some(v) = bits.read_optional(|b| b.read_bits(32))? {
            self.command_number = v;
        }
        if let Some(v) = bits.read_optional(|b| b.read_bits(32))? {
            self.tick_count = v;
        }
        if let Some(v) = bits.read_optional(BitReader::read_f32)? {
            self.view_angles.x = v;
        }
        if let Some(v) = bits.read_optional(BitReader::read_f32)? {
            self.view_angles.y = v;
        }
        if let Some(v) = bits.read_optional(BitReader::read_f32)? {
            self.view_angles.z = v;
        }
        if let Some(v) = bits.read_optional(BitReader::read_f32)? {
            self.movement.x = v;
        }
        if let Some(v) = bits.read_optional(BitReader::read_f32)? {
            self.movement.y = v;
        }
        if let Some(v) = bits.read_optional(BitReader::read_f32)? {
            self.movement.z = v;
        }
        if let Some(v) = bits.read_optional(|b| b.read_bits(32))? {
            self.buttons = Buttons::from_bits_retain(v);
        }
        if let Some(v) = bits.read_optional(|b| b.read_bits(8))? {
            self.impulse = v as u8;
        }
        Some(())
    }
}

/// LSB-first bit writer, the inverse of [`BitReader`]
#[derive(Default)]
pub struct BitWriter {
    data: Vec<u8>,
    bit: usize,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_bits(&mut self, value: u32, count: u32) {
        for i in 0..count {
            if self.bit % 8 == 0 {
                self.data.push(0);
            }
            let bit = ((value >> i) & 1) as u8;
            if let Some(last) = self.data.last_mut() {
                *last |= bit << (self.bit % 8);
            }
            self.bit += 1;
        }
    }

    pub fn write_bool(&mut self, value: bool) {
        self.write_bits(value as u32, 1);
    }

    pub fn finish(self) -> Vec<u8> {
        self.data
    }
}

/// Pack the fields of `cmd` that differ from `prev`
pub fn encode_delta(prev: &UserCmdState, cmd: &UserCmdState) -> Vec<u8> {
    fn field_u32(w: &mut BitWriter, old: u32, new: u32, width: u32) {
        w.write_bool(old != new);
        if old != new {
            w.write_bits(new, width);
        }
    }

    let mut w = BitWriter::new();
    field_u32(&mut w, prev.command_number, cmd.command_number, 32);
    field_u32(&mut w, prev.tick_count, cmd.tick_count, 32);
    for (old, new) in [
        (prev.view_angles.x, cmd.view_angles.x),
        (prev.view_angles.y, cmd.view_angles.y),
        (prev.view_angles.z, cmd.view_angles.z),
        (prev.movement.x, cmd.movement.x),
        (prev.movement.y, cmd.movement.y),
        (prev.movement.z, cmd.movement.z),
    ] {
        field_u32(&mut w, old.to_bits(), new.to_bits(), 32);
    }
    field_u32(&mut w, prev.buttons.bits(), cmd.buttons.bits(), 32);
    field_u32(&mut w, prev.impulse as u32, cmd.impulse as u32, 8);

    w.finish()
}
