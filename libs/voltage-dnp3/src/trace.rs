//! Diagnostic trace records
//!
//! Parses the `Display` output of [`Measurement`] back into its parts. The
//! format does not carry time quality, so a line yields a [`TraceRecord`]
//! rather than a full measurement.

use std::fmt;
use std::str::FromStr;

use crate::error::{Dnp3Error, Result};
use crate::flags::Flags;
use crate::measurement::{DoubleBit, Measurement, PointType, PointValue};

/// One parsed diagnostic line
#[derive(Debug, Clone, Copy)]
pub struct TraceRecord {
    pub point_type: PointType,
    pub value: PointValue,
    pub flags: u8,
    pub millis: i64,
}

impl PartialEq for TraceRecord {
    fn eq(&self, other: &Self) -> bool {
        self.point_type == other.point_type
            && self.value.same_as(&other.value)
            && self.flags == other.flags
            && self.millis == other.millis
    }
}

impl Measurement {
    /// The record a parse of this measurement's diagnostic line yields
    pub fn trace_record(&self) -> TraceRecord {
        TraceRecord {
            point_type: self.point_type(),
            value: self.value(),
            flags: self.flags().value(),
            millis: self.time().milliseconds_since_epoch(),
        }
    }
}

impl TraceRecord {
    pub fn flags(&self) -> Flags {
        Flags::new(self.flags)
    }
}

impl fmt::Display for TraceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({}, {}, {})",
            self.point_type,
            self.value,
            Flags::new(self.flags),
            self.millis
        )
    }
}

fn invalid(line: &str, reason: &str) -> Dnp3Error {
    Dnp3Error::InvalidTrace(format!("{}: {:?}", reason, line))
}

/// Plain decimal digits; no sign, no whitespace
fn is_digits(text: &str) -> bool {
    !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit())
}

fn parse_value(point_type: PointType, text: &str) -> Option<PointValue> {
    match point_type {
        PointType::BinaryInput | PointType::BinaryOutputStatus => match text {
            "true" => Some(PointValue::Binary(true)),
            "false" => Some(PointValue::Binary(false)),
            _ => None,
        },
        PointType::DoubleBitBinaryInput => {
            text.parse::<DoubleBit>().ok().map(PointValue::DoubleBit)
        },
        PointType::Counter | PointType::FrozenCounter if is_digits(text) => {
            text.parse::<u32>().ok().map(PointValue::Count)
        },
        PointType::AnalogInput | PointType::AnalogOutputStatus if !text.starts_with('+') => {
            text.parse::<f64>().ok().map(PointValue::Analog)
        },
        PointType::Counter
        | PointType::FrozenCounter
        | PointType::AnalogInput
        | PointType::AnalogOutputStatus => None,
    }
}

impl FromStr for TraceRecord {
    type Err = Dnp3Error;

    fn from_str(line: &str) -> Result<Self> {
        let trimmed = line.trim();
        let body = trimmed
            .strip_suffix(')')
            .ok_or_else(|| invalid(line, "missing closing parenthesis"))?;
        let (type_name, args) = body
            .split_once('(')
            .ok_or_else(|| invalid(line, "missing opening parenthesis"))?;

        let point_type = type_name
            .parse::<PointType>()
            .map_err(|e| invalid(line, &e))?;

        let parts: Vec<&str> = args.split(", ").collect();
        let [payload, flags, millis] = parts.as_slice() else {
            return Err(invalid(line, "expected three fields"));
        };

        let value = parse_value(point_type, payload)
            .ok_or_else(|| invalid(line, "bad payload"))?;

        let flags = flags
            .strip_prefix("0x")
            .filter(|hex| !hex.is_empty() && hex.bytes().all(|b| b.is_ascii_hexdigit()))
            .and_then(|hex| u8::from_str_radix(hex, 16).ok())
            .ok_or_else(|| invalid(line, "bad quality byte"))?;

        if !is_digits(millis) {
            return Err(invalid(line, "bad timestamp"));
        }
        let millis = millis
            .parse::<i64>()
            .map_err(|_| invalid(line, "bad timestamp"))?;

        Ok(TraceRecord {
            point_type,
            value,
            flags,
            millis,
        })
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods, clippy::approx_constant)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::time::Timestamp;

    #[test]
    fn test_parse_analog_output_status() {
        let rec: TraceRecord = "AnalogOutputStatus(3.140000, 0x1, 1000)".parse().unwrap();
        assert_eq!(rec.point_type, PointType::AnalogOutputStatus);
        assert_eq!(rec.value, PointValue::Analog(3.14));
        assert_eq!(rec.flags, 0x01);
        assert_eq!(rec.millis, 1000);
    }

    #[test]
    fn test_format_parse_recovers_fields() {
        let t = Timestamp::unsynchronized(123_456).unwrap();
        let samples = [
            Measurement::binary_input(true, Flags::new(0x81), t),
            Measurement::binary_output_status(false, Flags::new(0x00), t),
            Measurement::double_bit_binary_input(DoubleBit::Intermediate, Flags::new(0x21), t),
            Measurement::counter(u32::MAX, Flags::new(0xff), t),
            Measurement::frozen_counter(17, Flags::new(0x41), t),
            Measurement::analog_input(1.0 / 3.0, Flags::new(0x01), t),
            Measurement::analog_output_status(-1e300, Flags::new(0x61), t),
            Measurement::analog_input(f64::NEG_INFINITY, Flags::online(), t),
            Measurement::analog_input(f64::NAN, Flags::online(), t),
        ];
        for m in samples {
            let parsed: TraceRecord = m.to_string().parse().unwrap();
            assert_eq!(parsed, m.trace_record(), "line {}", m);
        }
    }

    #[test]
    fn test_signed_analog_and_large_timestamp_accepted() {
        let rec: TraceRecord = "AnalogInput(-0.500000, 0xff, 281474976710655)".parse().unwrap();
        assert_eq!(rec.value, PointValue::Analog(-0.5));
        assert_eq!(rec.flags, 0xff);
        assert_eq!(rec.millis, 281_474_976_710_655);
    }

    #[test]
    fn test_record_display_matches_measurement() {
        let m = Measurement::counter(5, Flags::online(), Timestamp::synchronized(9).unwrap());
        assert_eq!(m.trace_record().to_string(), m.to_string());
    }

    #[test]
    fn test_rejects_malformed_lines() {
        for line in [
            "",
            "AnalogInput",
            "AnalogInput(1.0, 0x1)",
            "Analog(1.0, 0x1, 5)",
            "BinaryInput(1, 0x1, 5)",
            "Counter(-1, 0x1, 5)",
            "Counter(1, 1, 5)",
            "Counter(1, 0x100, 5)",
            "Counter(1, 0x1, soon)",
            "Counter(+5, 0x1, 3)",
            "Counter(5, 0x+1, 3)",
            "Counter(5, 0x1, +3)",
            "Counter(5, 0x1, -3)",
            "AnalogInput(+1.5, 0x1, 3)",
        ] {
            assert!(
                matches!(line.parse::<TraceRecord>(), Err(Dnp3Error::InvalidTrace(_))),
                "accepted {line:?}"
            );
        }
    }
}
