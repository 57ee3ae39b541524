//! Raw object conversion
//!
//! The link/transport layers are outside this crate. What arrives here is
//! one [`RawObject`] per point: already split out of its object header, with
//! the quality byte, optional 48-bit time and the little-endian payload
//! bytes. [`Decoder`] turns each into a [`Measurement`] and feeds a sink.

use bytes::{Buf, Bytes};
use tracing::{trace, warn};

use crate::error::{Dnp3Error, Result};
use crate::flags::Flags;
use crate::measurement::{DoubleBit, Measurement, PointType};
use crate::sink::EventSink;
use crate::time::{TimeQuality, Timestamp};

/// 48-bit time as carried by the object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawTime {
    pub bytes: [u8; 6],
    pub quality: TimeQuality,
}

/// One point object as handed over by the decoding layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawObject {
    pub point_type: PointType,
    pub index: u16,
    pub flags: u8,
    pub time: Option<RawTime>,
    pub payload: Bytes,
}

impl RawObject {
    pub fn new(point_type: PointType, index: u16, flags: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            point_type,
            index,
            flags,
            time: None,
            payload: payload.into(),
        }
    }

    /// Attach a 48-bit timestamp
    #[must_use]
    pub fn with_time(mut self, bytes: [u8; 6], quality: TimeQuality) -> Self {
        self.time = Some(RawTime { bytes, quality });
        self
    }

    fn timestamp(&self) -> Timestamp {
        match self.time {
            Some(raw) => Timestamp::from_wire(raw.bytes, raw.quality),
            None => Timestamp::invalid(),
        }
    }

    fn wrong_size(&self, expected: &str) -> Dnp3Error {
        Dnp3Error::malformed(
            self.point_type,
            self.index,
            format!("expected {} bytes, got {}", expected, self.payload.len()),
        )
    }

    /// Convert to a typed measurement
    ///
    /// # Errors
    /// [`Dnp3Error::MalformedPayload`] when the payload length does not fit
    /// the point type.
    pub fn to_measurement(&self) -> Result<Measurement> {
        let flags = Flags::new(self.flags);
        let time = self.timestamp();
        let mut payload = self.payload.clone();

        let m = match self.point_type {
            PointType::BinaryInput | PointType::BinaryOutputStatus => {
                let state = match payload.len() {
                    0 => flags.contains(Flags::STATE),
                    1 => payload.get_u8() != 0,
                    _ => return Err(self.wrong_size("0 or 1")),
                };
                if self.point_type == PointType::BinaryInput {
                    Measurement::binary_input(state, flags, time)
                } else {
                    Measurement::binary_output_status(state, flags, time)
                }
            },
            PointType::DoubleBitBinaryInput => {
                let state = match payload.len() {
                    0 => DoubleBit::from_flags(flags),
                    1 => DoubleBit::from_wire(payload.get_u8()),
                    _ => return Err(self.wrong_size("0 or 1")),
                };
                Measurement::double_bit_binary_input(state, flags, time)
            },
            PointType::Counter | PointType::FrozenCounter => {
                let count = match payload.len() {
                    2 => u32::from(payload.get_u16_le()),
                    4 => payload.get_u32_le(),
                    _ => return Err(self.wrong_size("2 or 4")),
                };
                if self.point_type == PointType::Counter {
                    Measurement::counter(count, flags, time)
                } else {
                    Measurement::frozen_counter(count, flags, time)
                }
            },
            PointType::AnalogInput | PointType::AnalogOutputStatus => {
                let value = match payload.len() {
                    2 => f64::from(payload.get_i16_le()),
                    4 => f64::from(payload.get_f32_le()),
                    8 => payload.get_f64_le(),
                    _ => return Err(self.wrong_size("2, 4 or 8")),
                };
                if self.point_type == PointType::AnalogInput {
                    Measurement::analog_input(value, flags, time)
                } else {
                    Measurement::analog_output_status(value, flags, time)
                }
            },
        };
        Ok(m)
    }
}

/// Outcome of one [`Decoder::dispatch`] call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub delivered: usize,
    pub dropped: usize,
}

impl DispatchStats {
    pub fn total(&self) -> usize {
        self.delivered + self.dropped
    }
}

/// Converts raw fragments for one channel and feeds them to a sink
#[derive(Debug, Clone)]
pub struct Decoder {
    channel: String,
    totals: DispatchStats,
}

impl Decoder {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            totals: DispatchStats::default(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Running totals over every fragment dispatched so far
    pub fn totals(&self) -> DispatchStats {
        self.totals
    }

    /// Deliver one fragment of objects in arrival order
    ///
    /// Malformed objects are logged and skipped; the rest still reach the sink.
    pub fn dispatch<S>(&mut self, objects: &[RawObject], sink: &mut S) -> DispatchStats
    where
        S: EventSink + ?Sized,
    {
        let mut stats = DispatchStats::default();
        sink.begin_fragment();
        for object in objects {
            match object.to_measurement() {
                Ok(measurement) => {
                    trace!(channel = %self.channel, index = object.index, "{}", measurement);
                    sink.on_update(object.index, &measurement);
                    stats.delivered += 1;
                },
                Err(e) => {
                    warn!(channel = %self.channel, "Dropping object: {}", e);
                    stats.dropped += 1;
                },
            }
        }
        sink.end_fragment();

        self.totals.delivered += stats.delivered;
        self.totals.dropped += stats.dropped;
        stats
    }
}
