//! Diagnostic format and timestamp ordering behaviour

#![allow(clippy::disallowed_methods)] // Integration test - unwrap is acceptable
#![allow(clippy::approx_constant)]

use std::cmp::Ordering;
use voltage_dnp3::{
    DoubleBit, Dnp3Error, Flags, Measurement, PointType, PointValue, TimeQuality, Timestamp,
    TraceRecord,
};

#[test]
fn test_analog_output_status_line() {
    let m = Measurement::analog_output_status(
        3.14,
        Flags::new(0x01),
        Timestamp::synchronized(1000).unwrap(),
    );
    assert_eq!(m.to_string(), "AnalogOutputStatus(3.140000, 0x1, 1000)");

    let rec: TraceRecord = m.to_string().parse().unwrap();
    assert_eq!(rec.point_type, PointType::AnalogOutputStatus);
    assert_eq!(rec.value, PointValue::Analog(3.14));
    assert_eq!(rec.flags, 0x01);
    assert_eq!(rec.millis, 1000);
}

#[test]
fn test_format_parse_recovers_analogs_exactly() {
    let t = Timestamp::synchronized(281_474_976_710_655).unwrap();
    let mut v = 1.0e-300_f64;
    while v < 1.0e300 {
        for candidate in [v, -v, v * 1.000_000_1, v / 3.0] {
            let m = Measurement::analog_input(candidate, Flags::new(0x21), t);
            let rec: TraceRecord = m.to_string().parse().unwrap();
            match rec.value {
                PointValue::Analog(parsed) => {
                    assert_eq!(parsed.to_bits(), candidate.to_bits(), "line {}", m)
                },
                other => panic!("unexpected payload {:?}", other),
            }
            assert_eq!(rec.millis, 281_474_976_710_655);
        }
        v *= 7.3;
    }
}

#[test]
fn test_flags_preserved_for_every_byte() {
    let t = Timestamp::unsynchronized(1).unwrap();
    for b in 0..=u8::MAX {
        let m = Measurement::binary_output_status(b & 1 == 1, Flags::new(b), t);
        assert_eq!(m.flags().value(), b);
        let rec: TraceRecord = m.to_string().parse().unwrap();
        assert_eq!(rec.flags, b);
    }
}

#[test]
fn test_double_bit_lines() {
    let t = Timestamp::synchronized(7).unwrap();
    for (wire, text) in [
        (0, "INTERMEDIATE"),
        (1, "OFF"),
        (2, "ON"),
        (3, "INDETERMINATE"),
        (200, "INDETERMINATE"),
    ] {
        let state = DoubleBit::from_wire(wire);
        let m = Measurement::double_bit_binary_input(state, Flags::online(), t);
        assert_eq!(m.to_string(), format!("DoubleBitBinaryInput({}, 0x1, 7)", text));
    }
}

#[test]
fn test_invalid_timestamp_comparison_fails() {
    let invalid = Timestamp::invalid();
    for other in [
        Timestamp::synchronized(1000).unwrap(),
        Timestamp::unsynchronized(1000).unwrap(),
        Timestamp::invalid(),
    ] {
        let err = invalid.try_cmp(&other).unwrap_err();
        assert!(matches!(err, Dnp3Error::InvalidTimestampComparison { .. }));
        assert!(matches!(
            other.try_cmp(&invalid),
            Err(Dnp3Error::InvalidTimestampComparison { .. })
        ));
    }
}

#[test]
fn test_ordering_within_same_quality() {
    let a = Timestamp::new(10, TimeQuality::Unsynchronized).unwrap();
    let b = Timestamp::new(20, TimeQuality::Unsynchronized).unwrap();
    assert_eq!(a.try_cmp(&b).unwrap(), Ordering::Less);
    assert!(matches!(
        a.try_cmp(&Timestamp::synchronized(20).unwrap()),
        Err(Dnp3Error::IncomparableTimestamps { .. })
    ));
}

#[test]
fn test_measurement_serializes_to_json() {
    let m = Measurement::counter(42, Flags::online(), Timestamp::synchronized(1000).unwrap());
    let json = serde_json::to_value(m).unwrap();
    assert_eq!(json["type"], "Counter");
    assert_eq!(json["sample"]["value"], 42);
    assert_eq!(json["sample"]["flags"], 1);
    assert_eq!(json["sample"]["time"]["millis"], 1000);
    assert_eq!(json["sample"]["time"]["quality"], "SYNCHRONIZED");
}
