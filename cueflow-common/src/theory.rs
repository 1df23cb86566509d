//! Camelot wheel and musical key helpers
//!
//! Pure functions over a closed domain: 24 musical keys, 24 wheel slots
//! (`1A`..`12B`). The A side holds the minor keys, the B side their relative
//! majors. Adjacent positions, the A/B partner at the same position, and the
//! dominant (+7) are the harmonically compatible moves the playlist scorer
//! relies on.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;

/// Sharp-name spellings for the 12 pitch classes, indexed by semitone from C
const PITCH_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Minor-key root (semitone from C) for each wheel position, indexed by
/// `position - 1`. The relative major on the B side sits 3 semitones up.
const MINOR_ROOTS: [u8; 12] = [
    8,  // 1A  = G#m
    3,  // 2A  = D#m
    10, // 3A  = A#m
    5,  // 4A  = Fm
    0,  // 5A  = Cm
    7,  // 6A  = Gm
    2,  // 7A  = Dm
    9,  // 8A  = Am
    4,  // 9A  = Em
    11, // 10A = Bm
    6,  // 11A = F#m
    1,  // 12A = C#m
];

/// Side of the Camelot wheel: `A` minor, `B` major
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WheelSide {
    A,
    B,
}

/// One of the 24 musical keys, e.g. `Am` or `C#`
///
/// Minor keys render with a trailing `m`; majors render bare. Flat spellings
/// (`Db`, `Bbm`, ...) are accepted on parse and normalised to sharps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MusicalKey {
    pitch_class: u8,
    minor: bool,
}

/// A Camelot wheel slot, `1A`..`12B`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Camelot {
    position: u8,
    side: WheelSide,
}

impl MusicalKey {
    /// Construct from a pitch class (semitones from C, 0..12) and mode
    pub fn new(pitch_class: u8, minor: bool) -> Result<Self, Error> {
        if pitch_class >= 12 {
            return Err(Error::InvalidArgument(format!(
                "pitch class out of range: {pitch_class}"
            )));
        }
        Ok(Self { pitch_class, minor })
    }

    /// Semitones from C, 0..12
    pub fn pitch_class(&self) -> u8 {
        self.pitch_class
    }

    /// True for minor keys
    pub fn is_minor(&self) -> bool {
        self.minor
    }

    /// The Camelot slot for this key (bijective over the 24 keys)
    pub fn camelot(&self) -> Camelot {
        // Majors share a slot with their relative minor 3 semitones down.
        let minor_root = if self.minor {
            self.pitch_class
        } else {
            (self.pitch_class + 12 - 3) % 12
        };
        let position = MINOR_ROOTS
            .iter()
            .position(|&root| root == minor_root)
            .expect("every pitch class appears in the wheel") as u8
            + 1;
        Camelot {
            position,
            side: if self.minor { WheelSide::A } else { WheelSide::B },
        }
    }
}

impl Camelot {
    /// Construct from a wheel position (1..=12) and side
    pub fn new(position: u8, side: WheelSide) -> Result<Self, Error> {
        if !(1..=12).contains(&position) {
            return Err(Error::InvalidArgument(format!(
                "camelot position out of range: {position}"
            )));
        }
        Ok(Self { position, side })
    }

    /// Wheel position, 1..=12
    pub fn position(&self) -> u8 {
        self.position
    }

    /// Wheel side
    pub fn side(&self) -> WheelSide {
        self.side
    }

    /// The musical key in this slot (inverse of [`MusicalKey::camelot`])
    pub fn key(&self) -> MusicalKey {
        let minor_root = MINOR_ROOTS[(self.position - 1) as usize];
        match self.side {
            WheelSide::A => MusicalKey {
                pitch_class: minor_root,
                minor: true,
            },
            WheelSide::B => MusicalKey {
                pitch_class: (minor_root + 3) % 12,
                minor: false,
            },
        }
    }

    /// The slot `steps` positions around the wheel, same side
    pub fn step(&self, steps: i8) -> Camelot {
        let shifted = (i16::from(self.position) - 1 + i16::from(steps)).rem_euclid(12);
        Camelot {
            position: shifted as u8 + 1,
            side: self.side,
        }
    }

    /// The A/B partner at the same position
    pub fn partner(&self) -> Camelot {
        Camelot {
            position: self.position,
            side: match self.side {
                WheelSide::A => WheelSide::B,
                WheelSide::B => WheelSide::A,
            },
        }
    }

    /// Harmonically compatible slots: self, ±1 on the same side, the A/B
    /// partner at the same position, and the dominant (+7)
    pub fn neighbors(&self) -> Vec<Camelot> {
        vec![
            *self,
            self.step(-1),
            self.step(1),
            self.partner(),
            self.step(7),
        ]
    }

    /// Minimum number of positions between two slots around the wheel,
    /// ignoring side. `12A` and `1A` are 1 apart.
    pub fn position_distance(&self, other: &Camelot) -> u8 {
        let d = (i16::from(self.position) - i16::from(other.position)).unsigned_abs() as u8 % 12;
        d.min(12 - d)
    }

    /// Transition affinity used by the playlist scorer.
    ///
    /// 1.0 for the same slot, a ±1 step on the same side, or the A/B partner;
    /// 0.6 for a ±2 step or the dominant (±7) on the same side; 0.0 otherwise.
    pub fn compatibility(&self, other: &Camelot) -> f64 {
        if self == other || *other == self.partner() {
            return 1.0;
        }
        if self.side == other.side {
            match self.position_distance(other) {
                1 => 1.0,
                2 | 5 => 0.6, // ±7 around a 12-slot wheel is 5 positions the short way
                _ => 0.0,
            }
        } else {
            0.0
        }
    }
}

impl fmt::Display for MusicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}",
            PITCH_NAMES[self.pitch_class as usize],
            if self.minor { "m" } else { "" }
        )
    }
}

impl FromStr for MusicalKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        let trimmed = s.trim();
        let (note_part, minor) = match trimmed.strip_suffix('m') {
            // "Em" is E minor, but a bare "m" on its own is invalid
            Some(rest) if !rest.is_empty() => (rest, true),
            _ => (trimmed, false),
        };

        let mut chars = note_part.chars();
        let letter = chars
            .next()
            .ok_or_else(|| Error::InvalidArgument(format!("empty key: {s:?}")))?
            .to_ascii_uppercase();
        let base = match letter {
            'C' => 0u8,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => {
                return Err(Error::InvalidArgument(format!("unknown key: {s:?}")));
            }
        };
        let pitch_class = match chars.next() {
            None => base,
            Some('#') => (base + 1) % 12,
            Some('b') => (base + 11) % 12,
            Some(_) => {
                return Err(Error::InvalidArgument(format!("unknown key: {s:?}")));
            }
        };
        if chars.next().is_some() {
            return Err(Error::InvalidArgument(format!("unknown key: {s:?}")));
        }
        Ok(MusicalKey { pitch_class, minor })
    }
}

impl fmt::Display for Camelot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = match self.side {
            WheelSide::A => 'A',
            WheelSide::B => 'B',
        };
        write!(f, "{}{}", self.position, side)
    }
}

impl FromStr for Camelot {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        let trimmed = s.trim();
        let (digits, letter) = trimmed.split_at(trimmed.len().saturating_sub(1));
        let side = match letter {
            "A" | "a" => WheelSide::A,
            "B" | "b" => WheelSide::B,
            _ => {
                return Err(Error::InvalidArgument(format!("unknown camelot: {s:?}")));
            }
        };
        let position: u8 = digits
            .parse()
            .map_err(|_| Error::InvalidArgument(format!("unknown camelot: {s:?}")))?;
        Camelot::new(position, side)
    }
}

impl Serialize for MusicalKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MusicalKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl Serialize for Camelot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Camelot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
