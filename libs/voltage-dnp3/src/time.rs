//! DNP3 timestamps and clock providers
//!
//! DNP3 carries time as a 48-bit count of milliseconds since the Unix epoch.
//! The object header tells whether the outstation clock was synchronized, so
//! every [`Timestamp`] carries a [`TimeQuality`] next to its value.
//!
//! Timestamps do not implement `PartialOrd`/`Ord`. Ordering goes through
//! [`Timestamp::try_cmp`], which refuses INVALID time and refuses to
//! mix synchronized with unsynchronized clocks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Dnp3Error, Result};

/// Largest value representable by the 48-bit wire encoding
pub const MAX_WIRE_MILLIS: i64 = (1 << 48) - 1;

/// Synchronization state of the clock that produced a timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeQuality {
    /// Clock synchronized with the master
    Synchronized,
    /// Clock running free since restart or loss of sync
    Unsynchronized,
    /// No time information
    Invalid,
}

impl TimeQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeQuality::Synchronized => "SYNCHRONIZED",
            TimeQuality::Unsynchronized => "UNSYNCHRONIZED",
            TimeQuality::Invalid => "INVALID",
        }
    }
}

impl fmt::Display for TimeQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Milliseconds since epoch plus time quality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Timestamp {
    millis: i64,
    quality: TimeQuality,
}

impl Timestamp {
    /// Create a timestamp, validating the 48-bit range
    ///
    /// INVALID timestamps carry no value; `millis` is discarded and stored as 0.
    pub fn new(millis: i64, quality: TimeQuality) -> Result<Self> {
        if quality == TimeQuality::Invalid {
            return Ok(Self::invalid());
        }
        if !(0..=MAX_WIRE_MILLIS).contains(&millis) {
            return Err(Dnp3Error::TimestampOutOfRange { millis });
        }
        Ok(Self { millis, quality })
    }

    /// Synchronized time
    pub fn synchronized(millis: i64) -> Result<Self> {
        Self::new(millis, TimeQuality::Synchronized)
    }

    /// Unsynchronized time
    pub fn unsynchronized(millis: i64) -> Result<Self> {
        Self::new(millis, TimeQuality::Unsynchronized)
    }

    /// No time information
    pub const fn invalid() -> Self {
        Self {
            millis: 0,
            quality: TimeQuality::Invalid,
        }
    }

    /// Decode the 6-byte little-endian wire value
    ///
    /// Every 48-bit value is in range, so this never fails.
    pub fn from_wire(bytes: [u8; 6], quality: TimeQuality) -> Self {
        if quality == TimeQuality::Invalid {
            return Self::invalid();
        }
        let millis = bytes
            .iter()
            .rev()
            .fold(0i64, |acc, b| (acc << 8) | i64::from(*b));
        Self { millis, quality }
    }

    /// Encode as the 6-byte little-endian wire value
    pub fn to_wire(&self) -> [u8; 6] {
        let mut out = [0u8; 6];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = ((self.millis >> (8 * i)) & 0xFF) as u8;
        }
        out
    }

    #[inline]
    pub const fn milliseconds_since_epoch(&self) -> i64 {
        self.millis
    }

    #[inline]
    pub const fn quality(&self) -> TimeQuality {
        self.quality
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.quality != TimeQuality::Invalid
    }

    /// Order two timestamps
    ///
    /// # Errors
    /// - [`Dnp3Error::InvalidTimestampComparison`] if either side is INVALID
    /// - [`Dnp3Error::IncomparableTimestamps`] if one side is synchronized and
    ///   the other is not
    pub fn try_cmp(&self, other: &Timestamp) -> Result<Ordering> {
        if !self.is_valid() || !other.is_valid() {
            return Err(Dnp3Error::InvalidTimestampComparison {
                left: self.quality,
                right: other.quality,
            });
        }
        if self.quality != other.quality {
            return Err(Dnp3Error::IncomparableTimestamps {
                left: self.quality,
                right: other.quality,
            });
        }
        Ok(self.millis.cmp(&other.millis))
    }

    /// Wall-clock rendering, `None` for INVALID time
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        if !self.is_valid() {
            return None;
        }
        DateTime::<Utc>::from_timestamp_millis(self.millis)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.millis)
    }
}

// ============================================================================
// Clock providers
// ============================================================================

/// Source of "now" for stamping locally produced measurements
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall clock, reported as synchronized
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        Timestamp::synchronized(millis).unwrap_or_else(|_| Timestamp::invalid())
    }
}

/// Fixed clock for testing
#[derive(Clone, Copy, Debug)]
pub struct FixedClock {
    now: Timestamp,
}

impl FixedClock {
    pub fn new(now: Timestamp) -> Self {
        Self { now }
    }

    /// Synchronized fixed time; out-of-range values fall back to INVALID
    pub fn at_millis(millis: i64) -> Self {
        Self::new(Timestamp::synchronized(millis).unwrap_or_else(|_| Timestamp::invalid()))
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        self.now
    }
}
