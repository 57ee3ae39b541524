//! Raw object dispatch into sinks

#![allow(clippy::disallowed_methods)] // Integration test - unwrap is acceptable
#![allow(clippy::approx_constant)]

use tracing_test::traced_test;
use voltage_dnp3::{
    Bytes, Decoder, DispatchStats, EventSink, Measurement, PointCache, PointType, PointValue,
    RawObject, TimeQuality, TracingSink,
};

/// Records the callback sequence
#[derive(Default)]
struct Recorder {
    calls: Vec<String>,
}

impl EventSink for Recorder {
    fn begin_fragment(&mut self) {
        self.calls.push("begin".to_string());
    }

    fn on_update(&mut self, index: u16, measurement: &Measurement) {
        self.calls.push(format!("{} {}", index, measurement));
    }

    fn end_fragment(&mut self) {
        self.calls.push("end".to_string());
    }
}

fn fragment() -> Vec<RawObject> {
    vec![
        RawObject::new(PointType::AnalogOutputStatus, 0, 0x01, 3.14f64.to_le_bytes().to_vec())
            .with_time([0xE8, 0x03, 0, 0, 0, 0], TimeQuality::Synchronized),
        // three-byte counter cannot be decoded
        RawObject::new(PointType::Counter, 3, 0x01, vec![1u8, 2, 3]),
        RawObject::new(PointType::BinaryInput, 7, 0x81, Bytes::new())
            .with_time([0xD0, 0x07, 0, 0, 0, 0], TimeQuality::Unsynchronized),
        RawObject::new(PointType::Counter, 4, 0x01, vec![0x10u8, 0, 0, 0]),
    ]
}

#[test]
#[traced_test]
fn test_malformed_object_dropped_and_rest_delivered() {
    let mut decoder = Decoder::new("rtu-1");
    let mut recorder = Recorder::default();

    let stats = decoder.dispatch(&fragment(), &mut recorder);

    assert_eq!(
        stats,
        DispatchStats {
            delivered: 3,
            dropped: 1
        }
    );
    assert_eq!(
        recorder.calls,
        vec![
            "begin",
            "0 AnalogOutputStatus(3.140000, 0x1, 1000)",
            "7 BinaryInput(true, 0x81, 2000)",
            "4 Counter(16, 0x1, 0)",
            "end",
        ]
    );
    assert!(logs_contain("Dropping object"));
    assert!(logs_contain("Malformed Counter object at index 3"));
}

#[test]
fn test_cache_sees_latest_state() {
    let mut decoder = Decoder::new("rtu-1");
    let mut cache = PointCache::new();

    decoder.dispatch(&fragment(), &mut cache);
    decoder.dispatch(
        &[RawObject::new(PointType::Counter, 4, 0x01, vec![0x20u8, 0])],
        &mut cache,
    );

    assert_eq!(cache.len(), 3);
    assert_eq!(cache.value(PointType::Counter, 4), Some(PointValue::Count(0x20)));
    assert!(cache.get(PointType::Counter, 3).is_none());
    assert_eq!(cache.fragments(), 2);
    assert_eq!(decoder.totals().total(), 5);
}

#[test]
#[traced_test]
fn test_tracing_sink_logs_diagnostic_lines() {
    let mut decoder = Decoder::new("rtu-2");
    let mut sink = TracingSink::new("rtu-2");

    decoder.dispatch(
        &[RawObject::new(PointType::FrozenCounter, 1, 0x01, vec![5u8, 0])],
        &mut sink,
    );

    assert!(logs_contain("FrozenCounter(5, 0x1, 0)"));
    assert!(logs_contain("rtu-2"));
}

#[test]
fn test_dispatch_through_trait_object() {
    let mut decoder = Decoder::new("rtu-3");
    let mut sink: Box<dyn EventSink> = Box::new(PointCache::new());
    let stats = decoder.dispatch(&fragment(), &mut sink);
    assert_eq!(stats.delivered, 3);
}
