//! VoltageEMS DNP3 Measurement Model
//!
//! Typed DNP3 point measurements and the plumbing around them: quality
//! flags, 48-bit protocol timestamps, decoding of raw point objects, event
//! sinks, and the outstation side (point databases, change events, control
//! commands, configuration).
//!
//! # Key Components
//!
//! - **Measurement**: sum type over the point types, with a stable diagnostic
//!   format such as `AnalogOutputStatus(3.140000, 0x1, 1000)`
//! - **EventSink**: receives decoded measurements from a [`Decoder`]
//! - **Database**: per-session point store with a bounded event buffer
//! - **Outstation**: sessions refreshed from an application [`ValueSource`]

pub mod command;

pub mod config;

pub mod database;

pub mod decode;

pub mod error;

pub mod flags;

pub mod measurement;

pub mod outstation;

pub mod sink;

pub mod time;

pub mod trace;

// Re-exports
pub use bytes::Bytes;

pub use error::{Dnp3Error, Result};
pub use flags::Flags;
pub use measurement::{format_analog, DoubleBit, Measurement, PointType, PointValue, Sample};
pub use time::{Clock, FixedClock, SystemClock, TimeQuality, Timestamp};
pub use trace::TraceRecord;

pub use sink::{EventSink, PointCache, Router, TracingSink};
pub use decode::{Decoder, DispatchStats, RawObject, RawTime};

pub use database::{
    ApplyReport, Database, Event, EventBuffer, EventClass, PointConfig, UpdateBuilder, Updates,
};
pub use command::{
    AnalogOutput, CommandHandler, CommandStatus, Crob, DatabaseCommandHandler, OpType, OperateType,
};
pub use config::{Dnp3Address, OutstationConfig, PointEntry, SessionConfig};
pub use outstation::{Outstation, Session, ValueSource};
