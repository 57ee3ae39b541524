//! Control commands
//!
//! Binary outputs are driven by control relay output blocks ([`Crob`]),
//! analog outputs by [`AnalogOutput`] set-points. A [`CommandHandler`] answers
//! the select and operate steps of each command with a [`CommandStatus`].

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::database::Database;
use crate::flags::Flags;
use crate::measurement::{Measurement, PointType};
use crate::time::{Clock, Timestamp, MAX_WIRE_MILLIS};

// ============================================================================
// Command model
// ============================================================================

/// CROB operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpType {
    Nul = 0,
    PulseOn = 1,
    PulseOff = 2,
    LatchOn = 3,
    LatchOff = 4,
}

impl OpType {
    /// Decode a wire code; unknown codes become `Nul`
    pub fn from_wire(code: u8) -> Self {
        match code {
            1 => OpType::PulseOn,
            2 => OpType::PulseOff,
            3 => OpType::LatchOn,
            4 => OpType::LatchOff,
            _ => OpType::Nul,
        }
    }

    pub fn to_wire(&self) -> u8 {
        *self as u8
    }
}

/// Control relay output block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crob {
    pub op_type: OpType,
    pub count: u8,
    pub on_time_ms: u32,
    pub off_time_ms: u32,
}

impl Crob {
    pub fn new(op_type: OpType) -> Self {
        Self {
            op_type,
            count: 1,
            on_time_ms: 0,
            off_time_ms: 0,
        }
    }

    pub fn latch_on() -> Self {
        Self::new(OpType::LatchOn)
    }

    pub fn latch_off() -> Self {
        Self::new(OpType::LatchOff)
    }

    pub fn pulse_on(on_time_ms: u32) -> Self {
        Self {
            on_time_ms,
            ..Self::new(OpType::PulseOn)
        }
    }

    pub fn pulse_off(off_time_ms: u32) -> Self {
        Self {
            off_time_ms,
            ..Self::new(OpType::PulseOff)
        }
    }
}

/// Analog output set-point, one variant per wire representation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AnalogOutput {
    Int16(i16),
    Int32(i32),
    Float32(f32),
    Double64(f64),
}

impl AnalogOutput {
    pub fn as_f64(&self) -> f64 {
        match *self {
            AnalogOutput::Int16(v) => f64::from(v),
            AnalogOutput::Int32(v) => f64::from(v),
            AnalogOutput::Float32(v) => f64::from(v),
            AnalogOutput::Double64(v) => v,
        }
    }
}

/// How an operate request was issued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperateType {
    SelectBeforeOperate,
    DirectOperate,
    DirectOperateNoAck,
}

impl OperateType {
    pub fn is_direct(&self) -> bool {
        !matches!(self, OperateType::SelectBeforeOperate)
    }
}

/// Command response status (IEEE 1815 codes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandStatus {
    Success = 0,
    Timeout = 1,
    NoSelect = 2,
    FormatError = 3,
    NotSupported = 4,
    AlreadyActive = 5,
    HardwareError = 6,
    Local = 7,
    TooManyOps = 8,
    NotAuthorized = 9,
    AutomationInhibit = 10,
    ProcessingLimited = 11,
    OutOfRange = 12,
    DownstreamLocal = 13,
    AlreadyComplete = 14,
    Blocked = 15,
    Cancelled = 16,
    BlockedOtherMaster = 17,
    DownstreamFail = 18,
    NonParticipating = 126,
    Undefined = 127,
}

impl CommandStatus {
    /// Decode a wire code; unknown codes become `Undefined`
    pub fn from_wire(code: u8) -> Self {
        match code {
            0 => CommandStatus::Success,
            1 => CommandStatus::Timeout,
            2 => CommandStatus::NoSelect,
            3 => CommandStatus::FormatError,
            4 => CommandStatus::NotSupported,
            5 => CommandStatus::AlreadyActive,
            6 => CommandStatus::HardwareError,
            7 => CommandStatus::Local,
            8 => CommandStatus::TooManyOps,
            9 => CommandStatus::NotAuthorized,
            10 => CommandStatus::AutomationInhibit,
            11 => CommandStatus::ProcessingLimited,
            12 => CommandStatus::OutOfRange,
            13 => CommandStatus::DownstreamLocal,
            14 => CommandStatus::AlreadyComplete,
            15 => CommandStatus::Blocked,
            16 => CommandStatus::Cancelled,
            17 => CommandStatus::BlockedOtherMaster,
            18 => CommandStatus::DownstreamFail,
            126 => CommandStatus::NonParticipating,
            _ => CommandStatus::Undefined,
        }
    }

    pub fn to_wire(&self) -> u8 {
        *self as u8
    }

    pub fn is_success(&self) -> bool {
        *self == CommandStatus::Success
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.to_wire())
    }
}

// ============================================================================
// Handler
// ============================================================================

/// Application side of control requests
///
/// Select only validates; operate may write the resulting output status into
/// the session database.
pub trait CommandHandler: Send {
    fn select_crob(&mut self, db: &Database, crob: &Crob, index: u16) -> CommandStatus;

    fn operate_crob(
        &mut self,
        db: &mut Database,
        crob: &Crob,
        index: u16,
        op_type: OperateType,
    ) -> CommandStatus;

    fn select_analog(&mut self, db: &Database, value: AnalogOutput, index: u16) -> CommandStatus;

    fn operate_analog(
        &mut self,
        db: &mut Database,
        value: AnalogOutput,
        index: u16,
        op_type: OperateType,
    ) -> CommandStatus;
}

#[derive(Debug, Clone, Copy)]
struct ActivePulse {
    restore: bool,
    until: Timestamp,
}

/// Commands applied directly to the session's output status points
pub struct DatabaseCommandHandler {
    allow_direct_operate: bool,
    clock: Arc<dyn Clock>,
    pulses: HashMap<u16, ActivePulse>,
}

impl fmt::Debug for DatabaseCommandHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseCommandHandler")
            .field("allow_direct_operate", &self.allow_direct_operate)
            .field("pulses", &self.pulses)
            .finish()
    }
}

impl DatabaseCommandHandler {
    pub fn new(allow_direct_operate: bool, clock: Arc<dyn Clock>) -> Self {
        Self {
            allow_direct_operate,
            clock,
            pulses: HashMap::new(),
        }
    }

    pub fn is_pulse_active(&self, index: u16) -> bool {
        self.pulses.contains_key(&index)
    }

    pub fn active_pulses(&self) -> usize {
        self.pulses.len()
    }

    /// Revert every pulse whose on/off time has elapsed at `now`
    ///
    /// Returns the number of outputs restored. Pulses whose deadline cannot
    /// be ordered against `now` stay active.
    pub fn expire_pulses(&mut self, db: &mut Database, now: Timestamp) -> usize {
        self.restore_due_pulses(db, now).len()
    }

    /// Like [`expire_pulses`](Self::expire_pulses), returning each restored
    /// (index, state)
    pub fn restore_due_pulses(&mut self, db: &mut Database, now: Timestamp) -> Vec<(u16, bool)> {
        let due: Vec<u16> = self
            .pulses
            .iter()
            .filter(|(_, pulse)| {
                matches!(
                    now.try_cmp(&pulse.until),
                    Ok(Ordering::Greater | Ordering::Equal)
                )
            })
            .map(|(index, _)| *index)
            .collect();

        let mut restored = Vec::with_capacity(due.len());
        for index in due {
            if let Some(pulse) = self.pulses.remove(&index) {
                if self.write_binary(db, index, pulse.restore, now).is_success() {
                    debug!(index, state = pulse.restore, "Pulse expired");
                    restored.push((index, pulse.restore));
                }
            }
        }
        restored.sort_unstable();
        restored
    }

    fn current_binary(db: &Database, index: u16) -> Result<bool, CommandStatus> {
        if !db.contains(PointType::BinaryOutputStatus, index) {
            return Err(CommandStatus::OutOfRange);
        }
        db.get(PointType::BinaryOutputStatus, index)
            .and_then(Measurement::as_bool)
            .ok_or(CommandStatus::Undefined)
    }

    fn check_analog(db: &Database, index: u16) -> CommandStatus {
        if !db.contains(PointType::AnalogOutputStatus, index) {
            return CommandStatus::OutOfRange;
        }
        if db.get(PointType::AnalogOutputStatus, index).is_none() {
            return CommandStatus::Undefined;
        }
        CommandStatus::Success
    }

    fn write_binary(
        &self,
        db: &mut Database,
        index: u16,
        state: bool,
        time: Timestamp,
    ) -> CommandStatus {
        let m = Measurement::binary_output_status(state, Flags::online(), time);
        match db.update(index, m) {
            Ok(_) => CommandStatus::Success,
            Err(e) => {
                warn!("Binary output write failed: {}", e);
                CommandStatus::HardwareError
            },
        }
    }

    fn deadline(start: Timestamp, duration_ms: u32) -> Timestamp {
        let millis =
            (start.milliseconds_since_epoch() + i64::from(duration_ms)).min(MAX_WIRE_MILLIS);
        Timestamp::new(millis, start.quality()).unwrap_or(start)
    }
}

impl CommandHandler for DatabaseCommandHandler {
    fn select_crob(&mut self, db: &Database, crob: &Crob, index: u16) -> CommandStatus {
        let current = match Self::current_binary(db, index) {
            Ok(v) => v,
            Err(status) => return status,
        };
        if self.is_pulse_active(index) {
            return CommandStatus::AlreadyActive;
        }
        match crob.op_type {
            OpType::LatchOn | OpType::PulseOn if !current => CommandStatus::Success,
            OpType::LatchOff | OpType::PulseOff if current => CommandStatus::Success,
            _ => CommandStatus::Cancelled,
        }
    }

    fn operate_crob(
        &mut self,
        db: &mut Database,
        crob: &Crob,
        index: u16,
        op_type: OperateType,
    ) -> CommandStatus {
        if op_type.is_direct() && !self.allow_direct_operate {
            return CommandStatus::Blocked;
        }
        let current = match Self::current_binary(db, index) {
            Ok(v) => v,
            Err(status) => return status,
        };
        let now = self.clock.now();

        let status = match crob.op_type {
            OpType::LatchOn => self.write_binary(db, index, true, now),
            OpType::LatchOff => self.write_binary(db, index, false, now),
            OpType::PulseOn | OpType::PulseOff => {
                if self.is_pulse_active(index) {
                    return CommandStatus::AlreadyActive;
                }
                let (state, duration) = if crob.op_type == OpType::PulseOn {
                    (true, crob.on_time_ms)
                } else {
                    (false, crob.off_time_ms)
                };
                let status = self.write_binary(db, index, state, now);
                if status.is_success() {
                    self.pulses.insert(
                        index,
                        ActivePulse {
                            restore: current,
                            until: Self::deadline(now, duration),
                        },
                    );
                }
                status
            },
            OpType::Nul => CommandStatus::Cancelled,
        };
        info!(index, op = ?crob.op_type, %status, "CROB operate");
        status
    }

    fn select_analog(&mut self, db: &Database, _value: AnalogOutput, index: u16) -> CommandStatus {
        Self::check_analog(db, index)
    }

    fn operate_analog(
        &mut self,
        db: &mut Database,
        value: AnalogOutput,
        index: u16,
        op_type: OperateType,
    ) -> CommandStatus {
        if op_type.is_direct() && !self.allow_direct_operate {
            return CommandStatus::Blocked;
        }
        let status = Self::check_analog(db, index);
        if !status.is_success() {
            return status;
        }
        let now = self.clock.now();
        let m = Measurement::analog_output_status(value.as_f64(), Flags::online(), now);
        let status = match db.update(index, m) {
            Ok(_) => CommandStatus::Success,
            Err(e) => {
                warn!("Analog output write failed: {}", e);
                CommandStatus::HardwareError
            },
        };
        info!(index, value = value.as_f64(), %status, "Analog operate");
        status
    }
}
