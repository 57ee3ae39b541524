//! Quality flags
//!
//! A DNP3 quality byte. The low five bits mean the same thing for every
//! point type; the high three bits are reused per type, so a bit can only
//! be named together with the [`PointType`] it is attached to.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::measurement::PointType;

/// Quality flags attached to a measurement
///
/// Any byte value is valid. Bits without a meaning for a given point type are
/// carried through untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Flags(u8);

impl Flags {
    // Common to all point types
    pub const ONLINE: u8 = 0x01;
    pub const RESTART: u8 = 0x02;
    pub const COMM_LOST: u8 = 0x04;
    pub const REMOTE_FORCED: u8 = 0x08;
    pub const LOCAL_FORCED: u8 = 0x10;

    // Analog input / analog output status
    pub const OVER_RANGE: u8 = 0x20;
    pub const REFERENCE_ERR: u8 = 0x40;

    // Binary input / double-bit binary input
    pub const CHATTER_FILTER: u8 = 0x20;

    // Binary input / binary output status
    pub const STATE: u8 = 0x80;

    // Counter / frozen counter
    pub const ROLLOVER: u8 = 0x20;
    pub const DISCONTINUITY: u8 = 0x40;

    // Double-bit binary input: two-bit state in bits 6..=7
    pub const DOUBLE_BIT_STATE_MASK: u8 = 0xC0;
    pub const DOUBLE_BIT_STATE_SHIFT: u8 = 6;

    /// Wrap a raw quality byte
    #[inline]
    pub const fn new(value: u8) -> Self {
        Self(value)
    }

    /// No bits set
    #[inline]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Only ONLINE set
    #[inline]
    pub const fn online() -> Self {
        Self(Self::ONLINE)
    }

    /// The raw byte
    #[inline]
    pub const fn value(&self) -> u8 {
        self.0
    }

    /// Whether bit position `bit` (0 = LSB) is set; positions above 7 are never set
    #[inline]
    pub const fn is_set(&self, bit: u8) -> bool {
        bit < 8 && (self.0 >> bit) & 1 == 1
    }

    /// Whether every bit of `mask` is set
    #[inline]
    pub const fn contains(&self, mask: u8) -> bool {
        self.0 & mask == mask
    }

    /// Copy with the bits of `mask` set
    #[inline]
    #[must_use]
    pub const fn with(self, mask: u8) -> Self {
        Self(self.0 | mask)
    }

    /// Copy with the bits of `mask` cleared
    #[inline]
    #[must_use]
    pub const fn without(self, mask: u8) -> Self {
        Self(self.0 & !mask)
    }

    /// Names of the set bits, interpreted for `point_type`
    pub fn names(&self, point_type: PointType) -> Vec<&'static str> {
        bit_names(point_type)
            .iter()
            .enumerate()
            .filter_map(|(bit, name)| match name {
                Some(name) if self.is_set(bit as u8) => Some(*name),
                _ => None,
            })
            .collect()
    }

    /// Set bits that have no meaning for `point_type`
    pub fn unknown_bits(&self, point_type: PointType) -> u8 {
        let known = bit_names(point_type)
            .iter()
            .enumerate()
            .fold(0u8, |mask, (bit, name)| {
                if name.is_some() {
                    mask | (1 << bit)
                } else {
                    mask
                }
            });
        self.0 & !known
    }
}

const COMMON: [&str; 5] = [
    "ONLINE",
    "RESTART",
    "COMM_LOST",
    "REMOTE_FORCED",
    "LOCAL_FORCED",
];

/// Bit meanings per point type, LSB first
fn bit_names(point_type: PointType) -> [Option<&'static str>; 8] {
    let high: [Option<&'static str>; 3] = match point_type {
        PointType::AnalogInput | PointType::AnalogOutputStatus => {
            [Some("OVER_RANGE"), Some("REFERENCE_ERR"), None]
        },
        PointType::BinaryInput => [Some("CHATTER_FILTER"), None, Some("STATE")],
        PointType::BinaryOutputStatus => [None, None, Some("STATE")],
        PointType::Counter | PointType::FrozenCounter => {
            [Some("ROLLOVER"), Some("DISCONTINUITY"), None]
        },
        PointType::DoubleBitBinaryInput => {
            [Some("CHATTER_FILTER"), Some("STATE_LSB"), Some("STATE_MSB")]
        },
    };

    [
        Some(COMMON[0]),
        Some(COMMON[1]),
        Some(COMMON[2]),
        Some(COMMON[3]),
        Some(COMMON[4]),
        high[0],
        high[1],
        high[2],
    ]
}

impl From<u8> for Flags {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

impl From<Flags> for u8 {
    fn from(flags: Flags) -> Self {
        flags.0
    }
}

impl fmt::LowerHex for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}
