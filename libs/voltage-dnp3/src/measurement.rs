//! Point types and measurements
//!
//! A [`Measurement`] is one decoded point value: a typed payload plus the
//! shared quality [`Flags`] and [`Timestamp`]. It is a sum type over the DNP3
//! point types, so sinks handle every type with an exhaustive `match`.
//!
//! The `Display` output is the diagnostic trace format
//! `<TypeName>(<payload>, 0x<quality-hex>, <timestamp-ms>)`, e.g.
//! `AnalogOutputStatus(3.140000, 0x1, 1000)`. Log pipelines grep for it, and
//! [`crate::trace::TraceRecord`] parses it back, so it must stay stable.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::flags::Flags;
use crate::time::Timestamp;

// ============================================================================
// Point types
// ============================================================================

/// DNP3 point types handled by the measurement model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PointType {
    BinaryInput,
    DoubleBitBinaryInput,
    BinaryOutputStatus,
    Counter,
    FrozenCounter,
    AnalogInput,
    AnalogOutputStatus,
}

impl PointType {
    pub const ALL: [PointType; 7] = [
        PointType::BinaryInput,
        PointType::DoubleBitBinaryInput,
        PointType::BinaryOutputStatus,
        PointType::Counter,
        PointType::FrozenCounter,
        PointType::AnalogInput,
        PointType::AnalogOutputStatus,
    ];

    /// Type name as used in the diagnostic format
    pub fn as_str(&self) -> &'static str {
        match self {
            PointType::BinaryInput => "BinaryInput",
            PointType::DoubleBitBinaryInput => "DoubleBitBinaryInput",
            PointType::BinaryOutputStatus => "BinaryOutputStatus",
            PointType::Counter => "Counter",
            PointType::FrozenCounter => "FrozenCounter",
            PointType::AnalogInput => "AnalogInput",
            PointType::AnalogOutputStatus => "AnalogOutputStatus",
        }
    }

    /// Static object group reported for this type (g1, g3, g10, g20, g21, g30, g40)
    pub fn static_group(&self) -> u8 {
        match self {
            PointType::BinaryInput => 1,
            PointType::DoubleBitBinaryInput => 3,
            PointType::BinaryOutputStatus => 10,
            PointType::Counter => 20,
            PointType::FrozenCounter => 21,
            PointType::AnalogInput => 30,
            PointType::AnalogOutputStatus => 40,
        }
    }

    /// Whether the payload is an analog value
    pub fn is_analog(&self) -> bool {
        matches!(self, PointType::AnalogInput | PointType::AnalogOutputStatus)
    }

    /// Whether the point reports the state of an output
    pub fn is_output_status(&self) -> bool {
        matches!(
            self,
            PointType::BinaryOutputStatus | PointType::AnalogOutputStatus
        )
    }
}

impl fmt::Display for PointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PointType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PointType::ALL
            .iter()
            .find(|pt| pt.as_str() == s)
            .copied()
            .ok_or_else(|| format!("Unknown point type: {}", s))
    }
}

// ============================================================================
// Double-bit state
// ============================================================================

/// Two-bit binary state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DoubleBit {
    /// Transition between states (00)
    Intermediate = 0,
    /// Determined off (01)
    Off = 1,
    /// Determined on (10)
    On = 2,
    /// Undeterminable (11)
    Indeterminate = 3,
}

impl DoubleBit {
    /// Decode a wire value; anything outside 0..=3 is INDETERMINATE
    pub fn from_wire(value: u8) -> Self {
        match value {
            0 => DoubleBit::Intermediate,
            1 => DoubleBit::Off,
            2 => DoubleBit::On,
            _ => DoubleBit::Indeterminate,
        }
    }

    /// Decode the state bits (6..=7) of a double-bit quality byte
    pub fn from_flags(flags: Flags) -> Self {
        let bits = (flags.value() & Flags::DOUBLE_BIT_STATE_MASK) >> Flags::DOUBLE_BIT_STATE_SHIFT;
        Self::from_wire(bits)
    }

    pub fn to_wire(&self) -> u8 {
        *self as u8
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DoubleBit::Intermediate => "INTERMEDIATE",
            DoubleBit::Off => "OFF",
            DoubleBit::On => "ON",
            DoubleBit::Indeterminate => "INDETERMINATE",
        }
    }
}

impl fmt::Display for DoubleBit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DoubleBit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INTERMEDIATE" => Ok(DoubleBit::Intermediate),
            "OFF" => Ok(DoubleBit::Off),
            "ON" => Ok(DoubleBit::On),
            "INDETERMINATE" => Ok(DoubleBit::Indeterminate),
            _ => Err(format!("Unknown double-bit state: {}", s)),
        }
    }
}

// ============================================================================
// Payload values
// ============================================================================

/// Untyped view of a measurement payload
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PointValue {
    Binary(bool),
    DoubleBit(DoubleBit),
    Count(u32),
    Analog(f64),
}

impl PointValue {
    /// Exact equality, treating NaN payloads with identical bits as equal
    pub fn same_as(&self, other: &PointValue) -> bool {
        match (self, other) {
            (PointValue::Analog(a), PointValue::Analog(b)) => a.to_bits() == b.to_bits() || a == b,
            _ => self == other,
        }
    }
}

impl fmt::Display for PointValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointValue::Binary(v) => write!(f, "{}", v),
            PointValue::DoubleBit(v) => write!(f, "{}", v),
            PointValue::Count(v) => write!(f, "{}", v),
            PointValue::Analog(v) => f.write_str(&format_analog(*v)),
        }
    }
}

/// Render an analog payload
///
/// Six fixed decimals (`3.140000`) whenever that text parses back to the
/// identical value; otherwise the shortest round-trip text from `ryu`.
pub fn format_analog(value: f64) -> String {
    let fixed = format!("{:.6}", value);
    if !value.is_finite() {
        return fixed;
    }
    match fixed.parse::<f64>() {
        Ok(parsed) if parsed.to_bits() == value.to_bits() => fixed,
        _ => {
            let mut buffer = ryu::Buffer::new();
            buffer.format_finite(value).to_string()
        },
    }
}

// ============================================================================
// Measurements
// ============================================================================

/// Payload with its quality flags and timestamp
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample<T> {
    value: T,
    flags: Flags,
    time: Timestamp,
}

impl<T: Copy> Sample<T> {
    pub fn new(value: T, flags: Flags, time: Timestamp) -> Self {
        Self { value, flags, time }
    }

    #[inline]
    pub fn value(&self) -> T {
        self.value
    }

    #[inline]
    pub fn flags(&self) -> Flags {
        self.flags
    }

    #[inline]
    pub fn time(&self) -> Timestamp {
        self.time
    }
}

/// A decoded measurement, one variant per point type
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", content = "sample")]
pub enum Measurement {
    BinaryInput(Sample<bool>),
    DoubleBitBinaryInput(Sample<DoubleBit>),
    BinaryOutputStatus(Sample<bool>),
    Counter(Sample<u32>),
    FrozenCounter(Sample<u32>),
    AnalogInput(Sample<f64>),
    AnalogOutputStatus(Sample<f64>),
}

impl Measurement {
    pub fn binary_input(value: bool, flags: Flags, time: Timestamp) -> Self {
        Measurement::BinaryInput(Sample::new(value, flags, time))
    }

    pub fn double_bit_binary_input(value: DoubleBit, flags: Flags, time: Timestamp) -> Self {
        Measurement::DoubleBitBinaryInput(Sample::new(value, flags, time))
    }

    pub fn binary_output_status(value: bool, flags: Flags, time: Timestamp) -> Self {
        Measurement::BinaryOutputStatus(Sample::new(value, flags, time))
    }

    pub fn counter(value: u32, flags: Flags, time: Timestamp) -> Self {
        Measurement::Counter(Sample::new(value, flags, time))
    }

    pub fn frozen_counter(value: u32, flags: Flags, time: Timestamp) -> Self {
        Measurement::FrozenCounter(Sample::new(value, flags, time))
    }

    pub fn analog_input(value: f64, flags: Flags, time: Timestamp) -> Self {
        Measurement::AnalogInput(Sample::new(value, flags, time))
    }

    pub fn analog_output_status(value: f64, flags: Flags, time: Timestamp) -> Self {
        Measurement::AnalogOutputStatus(Sample::new(value, flags, time))
    }

    /// Build a measurement of `point_type` from an untyped value
    ///
    /// Returns `None` when the value kind does not fit the point type.
    pub fn from_value(
        point_type: PointType,
        value: PointValue,
        flags: Flags,
        time: Timestamp,
    ) -> Option<Self> {
        let m = match (point_type, value) {
            (PointType::BinaryInput, PointValue::Binary(v)) => Self::binary_input(v, flags, time),
            (PointType::BinaryOutputStatus, PointValue::Binary(v)) => {
                Self::binary_output_status(v, flags, time)
            },
            (PointType::DoubleBitBinaryInput, PointValue::DoubleBit(v)) => {
                Self::double_bit_binary_input(v, flags, time)
            },
            (PointType::Counter, PointValue::Count(v)) => Self::counter(v, flags, time),
            (PointType::FrozenCounter, PointValue::Count(v)) => {
                Self::frozen_counter(v, flags, time)
            },
            (PointType::AnalogInput, PointValue::Analog(v)) => Self::analog_input(v, flags, time),
            (PointType::AnalogOutputStatus, PointValue::Analog(v)) => {
                Self::analog_output_status(v, flags, time)
            },
            _ => return None,
        };
        Some(m)
    }

    pub fn point_type(&self) -> PointType {
        match self {
            Measurement::BinaryInput(_) => PointType::BinaryInput,
            Measurement::DoubleBitBinaryInput(_) => PointType::DoubleBitBinaryInput,
            Measurement::BinaryOutputStatus(_) => PointType::BinaryOutputStatus,
            Measurement::Counter(_) => PointType::Counter,
            Measurement::FrozenCounter(_) => PointType::FrozenCounter,
            Measurement::AnalogInput(_) => PointType::AnalogInput,
            Measurement::AnalogOutputStatus(_) => PointType::AnalogOutputStatus,
        }
    }

    pub fn value(&self) -> PointValue {
        match self {
            Measurement::BinaryInput(s) | Measurement::BinaryOutputStatus(s) => {
                PointValue::Binary(s.value())
            },
            Measurement::DoubleBitBinaryInput(s) => PointValue::DoubleBit(s.value()),
            Measurement::Counter(s) | Measurement::FrozenCounter(s) => PointValue::Count(s.value()),
            Measurement::AnalogInput(s) | Measurement::AnalogOutputStatus(s) => {
                PointValue::Analog(s.value())
            },
        }
    }

    pub fn flags(&self) -> Flags {
        match self {
            Measurement::BinaryInput(s) | Measurement::BinaryOutputStatus(s) => s.flags(),
            Measurement::DoubleBitBinaryInput(s) => s.flags(),
            Measurement::Counter(s) | Measurement::FrozenCounter(s) => s.flags(),
            Measurement::AnalogInput(s) | Measurement::AnalogOutputStatus(s) => s.flags(),
        }
    }

    pub fn time(&self) -> Timestamp {
        match self {
            Measurement::BinaryInput(s) | Measurement::BinaryOutputStatus(s) => s.time(),
            Measurement::DoubleBitBinaryInput(s) => s.time(),
            Measurement::Counter(s) | Measurement::FrozenCounter(s) => s.time(),
            Measurement::AnalogInput(s) | Measurement::AnalogOutputStatus(s) => s.time(),
        }
    }

    /// Analog payload, if this is an analog point
    pub fn as_f64(&self) -> Option<f64> {
        match self.value() {
            PointValue::Analog(v) => Some(v),
            _ => None,
        }
    }

    /// Binary payload, if this is a binary point
    pub fn as_bool(&self) -> Option<bool> {
        match self.value() {
            PointValue::Binary(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({}, {}, {})",
            self.point_type(),
            self.value(),
            self.flags(),
            self.time().milliseconds_since_epoch()
        )
    }
}
