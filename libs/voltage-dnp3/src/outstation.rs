//! Outstation sessions
//!
//! An [`Outstation`] owns one [`Session`] per configured master. Each session
//! has its own point database and command handler. The application pushes
//! current values in by calling [`Outstation::refresh`] with a
//! [`ValueSource`] that resolves configured element names.
//!
//! Successful operates and pulse expiries are remembered per session and
//! written back to the source at the start of the next refresh. A point whose
//! commanded value the source has not accepted keeps that value and is not
//! read from the source.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

use crate::command::{
    AnalogOutput, CommandHandler, CommandStatus, Crob, DatabaseCommandHandler, OperateType,
};
use crate::config::{OutstationConfig, SessionConfig};
use crate::database::{ApplyReport, Database, UpdateBuilder};
use crate::error::Result;
use crate::flags::Flags;
use crate::measurement::{DoubleBit, Measurement, PointType, PointValue};
use crate::time::{Clock, Timestamp};

/// Resolves element names to current application values
///
/// The `write_*` hooks receive values commanded by a master. Returning
/// `false` leaves the command pending; the default accepts nothing.
pub trait ValueSource {
    fn binary(&self, element: &str) -> Option<bool>;

    fn analog(&self, element: &str) -> Option<f64>;

    fn counter(&self, _element: &str) -> Option<u32> {
        None
    }

    fn double_bit(&self, _element: &str) -> Option<DoubleBit> {
        None
    }

    fn write_binary(&mut self, _element: &str, _state: bool) -> bool {
        false
    }

    fn write_analog(&mut self, _element: &str, _value: f64) -> bool {
        false
    }
}

impl ValueSource for HashMap<String, PointValue> {
    fn binary(&self, element: &str) -> Option<bool> {
        match self.get(element)? {
            PointValue::Binary(v) => Some(*v),
            _ => None,
        }
    }

    fn analog(&self, element: &str) -> Option<f64> {
        match self.get(element)? {
            PointValue::Analog(v) => Some(*v),
            _ => None,
        }
    }

    fn counter(&self, element: &str) -> Option<u32> {
        match self.get(element)? {
            PointValue::Count(v) => Some(*v),
            _ => None,
        }
    }

    fn double_bit(&self, element: &str) -> Option<DoubleBit> {
        match self.get(element)? {
            PointValue::DoubleBit(v) => Some(*v),
            _ => None,
        }
    }

    fn write_binary(&mut self, element: &str, state: bool) -> bool {
        self.insert(element.to_string(), PointValue::Binary(state));
        true
    }

    fn write_analog(&mut self, element: &str, value: f64) -> bool {
        self.insert(element.to_string(), PointValue::Analog(value));
        true
    }
}

fn resolve(
    source: &dyn ValueSource,
    point_type: PointType,
    element: &str,
    flags: Flags,
    time: Timestamp,
) -> Option<Measurement> {
    let m = match point_type {
        PointType::BinaryInput => Measurement::binary_input(source.binary(element)?, flags, time),
        PointType::BinaryOutputStatus => {
            Measurement::binary_output_status(source.binary(element)?, flags, time)
        },
        PointType::DoubleBitBinaryInput => {
            Measurement::double_bit_binary_input(source.double_bit(element)?, flags, time)
        },
        PointType::Counter => Measurement::counter(source.counter(element)?, flags, time),
        PointType::FrozenCounter => {
            Measurement::frozen_counter(source.counter(element)?, flags, time)
        },
        PointType::AnalogInput => Measurement::analog_input(source.analog(element)?, flags, time),
        PointType::AnalogOutputStatus => {
            Measurement::analog_output_status(source.analog(element)?, flags, time)
        },
    };
    Some(m)
}

/// One master connection: configuration, database and command handler
#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    database: Database,
    handler: DatabaseCommandHandler,
    /// Output values commanded since the source last accepted them
    commanded: BTreeMap<(PointType, u16), PointValue>,
}

impl Session {
    pub fn new(config: SessionConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let database = config.build_database()?;
        let handler = DatabaseCommandHandler::new(config.allow_direct_operate, clock);
        Ok(Self {
            config,
            database,
            handler,
            commanded: BTreeMap::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn allows_unsolicited(&self) -> bool {
        self.config.allow_unsolicited
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn database_mut(&mut self) -> &mut Database {
        &mut self.database
    }

    pub fn command_handler(&self) -> &DatabaseCommandHandler {
        &self.handler
    }

    pub fn select_crob(&mut self, crob: &Crob, index: u16) -> CommandStatus {
        self.handler.select_crob(&self.database, crob, index)
    }

    pub fn operate_crob(&mut self, crob: &Crob, index: u16, op_type: OperateType) -> CommandStatus {
        let status = self
            .handler
            .operate_crob(&mut self.database, crob, index, op_type);
        if status.is_success() {
            self.record_output(PointType::BinaryOutputStatus, index);
        }
        status
    }

    pub fn select_analog(&mut self, value: AnalogOutput, index: u16) -> CommandStatus {
        self.handler.select_analog(&self.database, value, index)
    }

    pub fn operate_analog(
        &mut self,
        value: AnalogOutput,
        index: u16,
        op_type: OperateType,
    ) -> CommandStatus {
        let status = self
            .handler
            .operate_analog(&mut self.database, value, index, op_type);
        if status.is_success() {
            self.record_output(PointType::AnalogOutputStatus, index);
        }
        status
    }

    /// Revert pulses that are due at `now`
    pub fn expire_pulses(&mut self, now: Timestamp) -> usize {
        let restored = self.handler.restore_due_pulses(&mut self.database, now);
        for (index, state) in &restored {
            self.commanded
                .insert((PointType::BinaryOutputStatus, *index), PointValue::Binary(*state));
        }
        restored.len()
    }

    /// Commanded output values not yet accepted by a source
    pub fn pending_outputs(&self) -> usize {
        self.commanded.len()
    }

    fn record_output(&mut self, point_type: PointType, index: u16) {
        if let Some(m) = self.database.get(point_type, index) {
            self.commanded.insert((point_type, index), m.value());
        }
    }

    /// Hand pending commanded values to `source`, keeping the rejected ones
    fn write_back(&mut self, source: &mut dyn ValueSource) {
        let config = &self.config;
        self.commanded.retain(|&(point_type, index), value| {
            let Some(element) = config.element(point_type, index) else {
                return false;
            };
            let accepted = match *value {
                PointValue::Binary(state) => source.write_binary(element, state),
                PointValue::Analog(v) => source.write_analog(element, v),
                _ => true,
            };
            if !accepted {
                debug!(
                    session = %config.name,
                    "Element '{}' did not accept commanded {}", element, value
                );
            }
            !accepted
        });
    }

    /// Write back commanded outputs, then read every configured point from
    /// `source` into one batch and apply it
    pub fn refresh(&mut self, source: &mut dyn ValueSource, time: Timestamp) -> ApplyReport {
        self.write_back(source);

        let flags = Flags::online();
        let mut builder = UpdateBuilder::new();
        for (point_type, entry) in self.config.points() {
            if self.commanded.contains_key(&(point_type, entry.index)) {
                continue;
            }
            match resolve(&*source, point_type, &entry.element, flags, time) {
                Some(m) => {
                    builder.update(m, entry.index);
                },
                None => debug!(
                    session = %self.config.name,
                    "Element '{}' unresolved for {}:{}",
                    entry.element,
                    point_type,
                    entry.index
                ),
            }
        }
        self.database.apply(&builder.build())
    }
}

/// DNP3 outstation with one session per configured master
pub struct Outstation {
    name: String,
    clock: Arc<dyn Clock>,
    sessions: Vec<Session>,
    enabled: bool,
}

impl std::fmt::Debug for Outstation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outstation")
            .field("name", &self.name)
            .field("sessions", &self.sessions)
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl Outstation {
    /// Validate `config` and build every session; starts disabled
    pub fn new(config: OutstationConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let sessions = config
            .sessions
            .into_iter()
            .map(|s| Session::new(s, Arc::clone(&clock)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            name: config.name,
            clock,
            sessions,
            enabled: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn enable(&mut self) {
        if !self.enabled {
            info!("Outstation '{}' enabled ({} sessions)", self.name, self.sessions.len());
        }
        self.enabled = true;
    }

    pub fn disable(&mut self) {
        if self.enabled {
            info!("Outstation '{}' disabled", self.name);
        }
        self.enabled = false;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Push current application values into every session
    ///
    /// Sessions write back their commanded outputs first, in configuration
    /// order, and all share one timestamp. Returns one report per session in
    /// configuration order, or nothing while disabled.
    pub fn refresh(&mut self, source: &mut dyn ValueSource) -> Vec<ApplyReport> {
        if !self.enabled {
            return Vec::new();
        }
        let now = self.clock.now();
        self.sessions
            .iter_mut()
            .map(|session| session.refresh(&mut *source, now))
            .collect()
    }

    /// Revert due pulses in every session at the clock's current time
    pub fn expire_pulses(&mut self) -> usize {
        let now = self.clock.now();
        self.sessions
            .iter_mut()
            .map(|session| session.expire_pulses(now))
            .sum()
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    pub fn session(&self, name: &str) -> Option<&Session> {
        self.sessions.iter().find(|s| s.name() == name)
    }

    pub fn session_mut(&mut self, name: &str) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|s| s.name() == name)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::config::{Dnp3Address, PointEntry};
    use crate::time::FixedClock;

    fn config() -> OutstationConfig {
        let client = Dnp3Address {
            ip: "127.0.0.1".to_string(),
            port: 20000,
            dnp: 1,
        };
        let mut session = SessionConfig::new("scada", client.clone());
        session.counters.push(PointEntry::new(0, "energy"));
        session.double_bit_inputs.push(PointEntry::new(0, "isolator"));
        OutstationConfig {
            name: "rtu".to_string(),
            outstation: Dnp3Address { dnp: 10, ..client },
            sessions: vec![session],
        }
    }

    #[test]
    fn test_map_source_resolves_by_kind() {
        let mut source: HashMap<String, PointValue> = HashMap::new();
        source.insert("energy".to_string(), PointValue::Count(12));
        source.insert("isolator".to_string(), PointValue::DoubleBit(DoubleBit::On));
        assert_eq!(source.counter("energy"), Some(12));
        assert_eq!(source.analog("energy"), None);
        assert_eq!(source.double_bit("isolator"), Some(DoubleBit::On));
    }

    #[test]
    fn test_refresh_counters_and_double_bits() {
        let clock = Arc::new(FixedClock::at_millis(5_000));
        let mut outstation = Outstation::new(config(), clock).unwrap();
        outstation.enable();

        let mut source: HashMap<String, PointValue> = HashMap::new();
        source.insert("energy".to_string(), PointValue::Count(12));
        source.insert("isolator".to_string(), PointValue::DoubleBit(DoubleBit::Off));

        let reports = outstation.refresh(&mut source);
        assert_eq!(reports[0].applied, 2);

        let db = outstation.session("scada").unwrap().database();
        assert_eq!(
            db.get(PointType::DoubleBitBinaryInput, 0).unwrap().to_string(),
            "DoubleBitBinaryInput(OFF, 0x1, 5000)"
        );
    }

    #[test]
    fn test_map_source_accepts_commanded_outputs() {
        let mut source: HashMap<String, PointValue> = HashMap::new();
        assert!(source.write_binary("breaker", true));
        assert!(source.write_analog("setpoint", 2.5));
        assert_eq!(source.binary("breaker"), Some(true));
        assert_eq!(source.analog("setpoint"), Some(2.5));
    }

    #[test]
    fn test_allows_unsolicited_follows_config() {
        let mut config = config();
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::at_millis(0));
        let session = Session::new(config.sessions[0].clone(), Arc::clone(&clock)).unwrap();
        assert!(!session.allows_unsolicited());

        config.sessions[0].allow_unsolicited = true;
        let session = Session::new(config.sessions[0].clone(), clock).unwrap();
        assert!(session.allows_unsolicited());
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut bad = config();
        bad.sessions[0].event_buffer_length = 0;
        assert!(Outstation::new(bad, Arc::new(FixedClock::at_millis(0))).is_err());
    }
}
