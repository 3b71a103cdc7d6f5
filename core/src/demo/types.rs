//! Parsed demo data
//!
//! A [`DemoRecord`] is the engine-independent result of decoding one demo
//! file: one [`PoseSample`] per recorded tick plus the out-of-band
//! [`CustomEvent`]s that were written alongside the movement.

use std::collections::BTreeMap;
use std::fmt;

use glam::Vec3;

bitflags::bitflags! {
    /// Input buttons held during a tick (`IN_*` bits of the user command)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct Buttons: u32 {
        const ATTACK = 1 << 0;
        const JUMP = 1 << 1;
        const DUCK = 1 << 2;
        const FORWARD = 1 << 3;
        const BACK = 1 << 4;
        const USE = 1 << 5;
        const CANCEL = 1 << 6;
        const LEFT = 1 << 7;
        const RIGHT = 1 << 8;
        const MOVE_LEFT = 1 << 9;
        const MOVE_RIGHT = 1 << 10;
        const ATTACK2 = 1 << 11;
        const RUN = 1 << 12;
        const RELOAD = 1 << 13;
        const ALT1 = 1 << 14;
        const ALT2 = 1 << 15;
        const SCORE = 1 << 16;
        const SPEED = 1 << 17;
        const WALK = 1 << 18;
        const ZOOM = 1 << 19;
    }
}

/// One tick of replay data
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PoseSample {
    /// Eye position in world units
    pub position: Vec3,
    /// View angles in degrees (pitch, yaw, roll)
    pub angles: Vec3,
    /// Buttons held on this tick
    pub buttons: Buttons,
    /// Analog movement (forward, side, up)
    pub movement: Vec3,
    /// Set on the last recorded tick
    pub finished: bool,
}

impl PoseSample {
    /// Sample at `position` looking along `angles`, no input held
    pub fn at(position: Vec3, angles: Vec3) -> Self {
        Self {
            position,
            angles,
            ..Default::default()
        }
    }

    /// Interpolate towards `next` by `t` (0.0 = self, 1.0 = next).
    ///
    /// Angles take the shortest arc so a yaw crossing ±180° does not spin
    /// the long way round. Discrete state (buttons, finished) comes from
    /// `self`.
    pub fn lerp(&self, next: &PoseSample, t: f32) -> PoseSample {
        let t = t.clamp(0.0, 1.0);
        PoseSample {
            position: self.position.lerp(next.position, t),
            angles: Vec3::new(
                lerp_angle(self.angles.x, next.angles.x, t),
                lerp_angle(self.angles.y, next.angles.y, t),
                lerp_angle(self.angles.z, next.angles.z, t),
            ),
            buttons: self.buttons,
            movement: self.movement.lerp(next.movement, t),
            finished: self.finished,
        }
    }

    /// True when position and angles are both exactly zero (no player yet)
    pub fn is_degenerate(&self) -> bool {
        self.position == Vec3::ZERO && self.angles == Vec3::ZERO
    }
}

/// Wrap an angle in degrees into `(-180, 180]`
pub fn wrap_degrees(angle: f32) -> f32 {
    let wrapped = angle.rem_euclid(360.0);
    if wrapped > 180.0 { wrapped - 360.0 } else { wrapped }
}

fn lerp_angle(from: f32, to: f32, t: f32) -> f32 {
    let delta = wrap_degrees(to - from);
    wrap_degrees(from + delta * t)
}

/// Portal channel a positional marker belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortalTag {
    Primary,
    Secondary,
}

impl PortalTag {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(PortalTag::Primary),
            1 => Some(PortalTag::Secondary),
            _ => None,
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            PortalTag::Primary => 0,
            PortalTag::Secondary => 1,
        }
    }
}

/// Side-channel action recorded with a demo
#[derive(Debug, Clone, PartialEq)]
pub enum CustomEventKind {
    /// An input fired on a named map entity
    EntityInput {
        target: String,
        class_name: String,
        input: String,
        parameter: String,
        slot: Option<u8>,
    },
    /// A point of interest in the world (portal placement, checkpoint)
    Marker {
        position: Vec3,
        slot: Option<u8>,
        tag: Option<PortalTag>,
    },
}

/// A custom event and the demo tick it happened on
#[derive(Debug, Clone, PartialEq)]
pub struct CustomEvent {
    pub tick: i32,
    pub kind: CustomEventKind,
}

impl fmt::Display for CustomEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            CustomEventKind::EntityInput {
                target,
                class_name,
                input,
                parameter,
                ..
            } => write!(f, "{} {} {} {}", target, class_name, input, parameter),
            CustomEventKind::Marker {
                position,
                slot,
                tag,
            } => {
                write!(f, "{:.6} {:.6} {:.6}", position.x, position.y, position.z)?;
                match slot {
                    Some(slot) => write!(f, " {}", slot)?,
                    None => write!(f, " -")?,
                }
                match tag {
                    Some(tag) => write!(f, " {}", tag.to_byte()),
                    None => write!(f, " -"),
                }
            }
        }
    }
}

/// A fully parsed demo.
///
/// `playback_ticks()` always equals `samples().len()`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DemoRecord {
    client_name: String,
    map_name: String,
    game_directory: String,
    samples: Vec<PoseSample>,
    events: Vec<CustomEvent>,
}

impl DemoRecord {
    pub fn new(
        client_name: impl Into<String>,
        map_name: impl Into<String>,
        samples: Vec<PoseSample>,
    ) -> Self {
        Self {
            client_name: client_name.into(),
            map_name: map_name.into(),
            game_directory: String::new(),
            samples,
            events: Vec::new(),
        }
    }

    pub fn with_game_directory(mut self, game_directory: impl Into<String>) -> Self {
        self.game_directory = game_directory.into();
        self
    }

    /// Attach custom events, keeping them in tick order
    pub fn with_events(mut self, mut events: Vec<CustomEvent>) -> Self {
        events.sort_by_key(|e| e.tick);
        self.events = events;
        self
    }

    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    pub fn map_name(&self) -> &str {
        &self.map_name
    }

    pub fn game_directory(&self) -> &str {
        &self.game_directory
    }

    pub fn playback_ticks(&self) -> u32 {
        self.samples.len() as u32
    }

    pub fn samples(&self) -> &[PoseSample] {
        &self.samples
    }

    pub(crate) fn samples_mut(&mut self) -> &mut [PoseSample] {
        &mut self.samples
    }

    pub fn sample(&self, tick: usize) -> Option<&PoseSample> {
        self.samples.get(tick)
    }

    pub fn events(&self) -> &[CustomEvent] {
        &self.events
    }

    pub(crate) fn events_mut(&mut self) -> &mut Vec<CustomEvent> {
        &mut self.events
    }

    /// Events recorded on exactly `tick`
    pub fn events_at(&self, tick: i32) -> impl Iterator<Item = &CustomEvent> {
        let start = self.events.partition_point(|e| e.tick < tick);
        self.events[start..].iter().take_while(move |e| e.tick == tick)
    }

    /// Events grouped by tick
    pub fn event_map(&self) -> BTreeMap<i32, Vec<&CustomEvent>> {
        let mut map: BTreeMap<i32, Vec<&CustomEvent>> = BTreeMap::new();
        for event in &self.events {
            map.entry(event.tick).or_default().push(event);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(tick: i32, target: &str) -> CustomEvent {
        CustomEvent {
            tick,
            kind: CustomEventKind::EntityInput {
                target: target.to_string(),
                class_name: "func_button".to_string(),
                input: "Press".to_string(),
                parameter: String::new(),
                slot: None,
            },
        }
    }

    #[test]
    fn test_wrap_degrees() {
        assert_eq!(wrap_degrees(0.0), 0.0);
        assert_eq!(wrap_degrees(180.0), 180.0);
        assert_eq!(wrap_degrees(-180.0), 180.0);
        assert_eq!(wrap_degrees(190.0), -170.0);
        assert_eq!(wrap_degrees(-190.0), 170.0);
        assert_eq!(wrap_degrees(720.0 + 45.0), 45.0);
    }

    #[test]
    fn test_lerp_takes_short_arc() {
        let a = PoseSample::at(Vec3::ZERO, Vec3::new(0.0, 170.0, 0.0));
        let b = PoseSample::at(Vec3::new(10.0, 0.0, 0.0), Vec3::new(0.0, -170.0, 0.0));

        let mid = a.lerp(&b, 0.5);
        assert_eq!(mid.position, Vec3::new(5.0, 0.0, 0.0));
        assert!((mid.angles.y.abs() - 180.0).abs() < 1e-3);
    }

    #[test]
    fn test_lerp_clamps_factor() {
        let a = PoseSample::at(Vec3::ZERO, Vec3::ZERO);
        let b = PoseSample::at(Vec3::ONE, Vec3::ZERO);
        assert_eq!(a.lerp(&b, 2.0).position, Vec3::ONE);
        assert_eq!(a.lerp(&b, -1.0).position, Vec3::ZERO);
    }

    #[test]
    fn test_events_sorted_and_grouped() {
        let record = DemoRecord::new("player", "sp_a1_intro1", vec![PoseSample::default(); 10])
            .with_events(vec![input(5, "b"), input(2, "a"), input(5, "c")]);

        let ticks: Vec<i32> = record.events().iter().map(|e| e.tick).collect();
        assert_eq!(ticks, vec![2, 5, 5]);

        assert_eq!(record.events_at(5).count(), 2);
        assert_eq!(record.events_at(3).count(), 0);

        let map = record.event_map();
        assert_eq!(map.len(), 2);
        assert_eq!(map[&5].len(), 2);
    }

    #[test]
    fn test_event_display() {
        assert_eq!(
            input(0, "door").to_string(),
            "door func_button Press "
        );

        let marker = CustomEvent {
            tick: 0,
            kind: CustomEventKind::Marker {
                position: Vec3::new(1.0, 2.5, -3.0),
                slot: Some(0),
                tag: Some(PortalTag::Secondary),
            },
        };
        assert_eq!(marker.to_string(), "1.000000 2.500000 -3.000000 0 1");
    }

    #[test]
    fn test_buttons_keep_unknown_bits() {
        let buttons = Buttons::from_bits_retain((1 << 1) | (1 << 30));
        assert!(buttons.contains(Buttons::JUMP));
        assert_eq!(buttons.bits(), (1 << 1) | (1 << 30));
    }
}
