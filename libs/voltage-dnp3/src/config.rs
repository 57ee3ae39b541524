//! Outstation configuration
//!
//! ```yaml
//! name: feeder-rtu
//! outstation: { ip: 0.0.0.0, port: 20000, dnp: 10 }
//! sessions:
//!   - name: scada
//!     client: { ip: 10.0.0.5, port: 20000, dnp: 1 }
//!     allow_direct_operate: true
//!     analog_inputs:
//!       - { index: 0, element: feeder.voltage, class: Class1, deadband: 0.5 }
//!     binary_outputs:
//!       - { index: 0, element: breaker.close }
//! ```
//!
//! Point entries refer to application elements by name; the outstation
//! resolves them through a [`crate::outstation::ValueSource`].

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

use crate::database::{default_variations, Database, EventClass, PointConfig};
use crate::error::{Dnp3Error, Result};
use crate::measurement::PointType;

/// First address of the reserved DNP3 link address range
pub const RESERVED_ADDRESS_START: u16 = 0xFFF0;

/// Largest accepted per-session event buffer
pub const MAX_EVENT_BUFFER_LENGTH: usize = u16::MAX as usize;

fn default_event_buffer_length() -> usize {
    100
}

/// Network endpoint plus DNP3 link address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dnp3Address {
    pub ip: String,
    pub port: u16,
    pub dnp: u16,
}

/// One configured point, bound to an application element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointEntry {
    pub index: u16,
    pub element: String,
    #[serde(default)]
    pub class: EventClass,
    /// Static variation; the point type's default when absent
    #[serde(default)]
    pub static_variation: Option<u8>,
    /// Event variation; the point type's default when absent
    #[serde(default)]
    pub event_variation: Option<u8>,
    #[serde(default)]
    pub deadband: f64,
}

impl PointEntry {
    pub fn new(index: u16, element: impl Into<String>) -> Self {
        Self {
            index,
            element: element.into(),
            class: EventClass::default(),
            static_variation: None,
            event_variation: None,
            deadband: 0.0,
        }
    }

    /// Database configuration for this entry as a point of `point_type`
    pub fn point_config(&self, point_type: PointType) -> PointConfig {
        let (static_default, event_default) = default_variations(point_type);
        PointConfig {
            class: self.class,
            static_variation: self.static_variation.unwrap_or(static_default),
            event_variation: self.event_variation.unwrap_or(event_default),
            deadband: self.deadband,
        }
    }
}

/// One master connection and the points it sees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub name: String,
    pub client: Dnp3Address,
    #[serde(default = "default_event_buffer_length")]
    pub event_buffer_length: usize,
    #[serde(default)]
    pub allow_unsolicited: bool,
    #[serde(default)]
    pub allow_direct_operate: bool,
    #[serde(default)]
    pub binary_inputs: Vec<PointEntry>,
    #[serde(default)]
    pub binary_outputs: Vec<PointEntry>,
    #[serde(default)]
    pub analog_inputs: Vec<PointEntry>,
    #[serde(default)]
    pub analog_outputs: Vec<PointEntry>,
    #[serde(default)]
    pub counters: Vec<PointEntry>,
    #[serde(default)]
    pub double_bit_inputs: Vec<PointEntry>,
}

impl SessionConfig {
    pub fn new(name: impl Into<String>, client: Dnp3Address) -> Self {
        Self {
            name: name.into(),
            client,
            event_buffer_length: default_event_buffer_length(),
            allow_unsolicited: false,
            allow_direct_operate: false,
            binary_inputs: Vec::new(),
            binary_outputs: Vec::new(),
            analog_inputs: Vec::new(),
            analog_outputs: Vec::new(),
            counters: Vec::new(),
            double_bit_inputs: Vec::new(),
        }
    }

    /// Every configured point with the type its list implies
    pub fn points(&self) -> impl Iterator<Item = (PointType, &PointEntry)> {
        let lists: [(PointType, &Vec<PointEntry>); 6] = [
            (PointType::BinaryInput, &self.binary_inputs),
            (PointType::BinaryOutputStatus, &self.binary_outputs),
            (PointType::AnalogInput, &self.analog_inputs),
            (PointType::AnalogOutputStatus, &self.analog_outputs),
            (PointType::Counter, &self.counters),
            (PointType::DoubleBitBinaryInput, &self.double_bit_inputs),
        ];
        lists
            .into_iter()
            .flat_map(|(point_type, entries)| entries.iter().map(move |e| (point_type, e)))
    }

    pub fn point_count(&self) -> usize {
        self.points().count()
    }

    /// Element bound to (point_type, index), if configured
    pub fn element(&self, point_type: PointType, index: u16) -> Option<&str> {
        self.points()
            .find(|(t, entry)| *t == point_type && entry.index == index)
            .map(|(_, entry)| entry.element.as_str())
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Dnp3Error::invalid_config("sessions.name", "must not be empty"));
        }
        let field = |f: &str| format!("sessions[{}].{}", self.name, f);

        if self.event_buffer_length == 0 {
            return Err(Dnp3Error::invalid_config(
                field("event_buffer_length"),
                "must be greater than 0",
            ));
        }
        if self.event_buffer_length > MAX_EVENT_BUFFER_LENGTH {
            return Err(Dnp3Error::invalid_config(
                field("event_buffer_length"),
                format!("must not exceed {}", MAX_EVENT_BUFFER_LENGTH),
            ));
        }
        validate_address(&self.client, &field("client"))?;

        let mut seen = HashSet::new();
        for (point_type, entry) in self.points() {
            if !seen.insert((point_type, entry.index)) {
                return Err(Dnp3Error::invalid_config(
                    field("points"),
                    format!("duplicate {} index {}", point_type, entry.index),
                ));
            }
            if entry.element.trim().is_empty() {
                return Err(Dnp3Error::invalid_config(
                    field("points"),
                    format!("{} index {} has no element", point_type, entry.index),
                ));
            }
            if entry.deadband.is_nan() || entry.deadband < 0.0 {
                return Err(Dnp3Error::invalid_config(
                    field("points"),
                    format!("{} index {} has a negative deadband", point_type, entry.index),
                ));
            }
        }
        Ok(())
    }

    /// Fresh point database holding every configured point
    pub fn build_database(&self) -> Result<Database> {
        let mut db = Database::new(self.event_buffer_length);
        for (point_type, entry) in self.points() {
            db.add_point(point_type, entry.index, entry.point_config(point_type))?;
        }
        Ok(db)
    }
}

/// Outstation endpoint and its sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutstationConfig {
    pub name: String,
    pub outstation: Dnp3Address,
    #[serde(default)]
    pub sessions: Vec<SessionConfig>,
}

impl OutstationConfig {
    /// Load and validate a yaml, yml, toml or json file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config: Self = common::load_config_from_file(path.as_ref())?;
        config.validate()?;
        info!(
            "Loaded outstation '{}' with {} sessions from {}",
            config.name,
            config.sessions.len(),
            path.as_ref().display()
        );
        Ok(config)
    }

    /// Load a file, then apply `<PREFIX>_` environment overrides, then validate
    ///
    /// Nested keys use `__`: `DNP3_OUTSTATION__PORT=20001`.
    pub fn load<P: AsRef<Path>>(path: P, env_prefix: &str) -> Result<Self> {
        let config: Self = common::load_layered_config(path.as_ref(), env_prefix)?;
        config.validate()?;
        info!(
            "Loaded outstation '{}' with {} sessions from {} (env prefix {})",
            config.name,
            config.sessions.len(),
            path.as_ref().display(),
            env_prefix
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Dnp3Error::invalid_config("name", "must not be empty"));
        }
        validate_address(&self.outstation, "outstation")?;

        let mut names = HashSet::new();
        for session in &self.sessions {
            session.validate()?;
            if !names.insert(session.name.as_str()) {
                return Err(Dnp3Error::invalid_config(
                    "sessions",
                    format!("duplicate session name '{}'", session.name),
                ));
            }
        }
        Ok(())
    }

    pub fn session(&self, name: &str) -> Option<&SessionConfig> {
        self.sessions.iter().find(|s| s.name == name)
    }
}

fn validate_address(address: &Dnp3Address, field: &str) -> Result<()> {
    if address.ip.trim().is_empty() {
        return Err(Dnp3Error::invalid_config(format!("{}.ip", field), "must not be empty"));
    }
    if address.port == 0 {
        return Err(Dnp3Error::invalid_config(format!("{}.port", field), "must not be 0"));
    }
    if address.dnp >= RESERVED_ADDRESS_START {
        return Err(Dnp3Error::invalid_config(
            format!("{}.dnp", field),
            format!("{:#06x} is a reserved link address", address.dnp),
        ));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    fn addr(port: u16, dnp: u16) -> Dnp3Address {
        Dnp3Address {
            ip: "127.0.0.1".to_string(),
            port,
            dnp,
        }
    }

    fn sample() -> OutstationConfig {
        let mut session = SessionConfig::new("scada", addr(20000, 1));
        session.analog_inputs.push(PointEntry::new(0, "feeder.voltage"));
        session.binary_outputs.push(PointEntry::new(0, "breaker.close"));
        OutstationConfig {
            name: "rtu".to_string(),
            outstation: addr(20000, 10),
            sessions: vec![session],
        }
    }

    #[test]
    fn test_valid_sample() {
        let config = sample();
        config.validate().unwrap();
        assert_eq!(config.sessions[0].event_buffer_length, 100);
        assert_eq!(config.sessions[0].point_count(), 2);
    }

    #[test]
    fn test_default_variations_per_list() {
        let entry = PointEntry::new(0, "x");
        let cfg = entry.point_config(PointType::BinaryInput);
        assert_eq!((cfg.static_variation, cfg.event_variation), (2, 1));
        assert_eq!(cfg.class, EventClass::Class2);
        let cfg = entry.point_config(PointType::AnalogOutputStatus);
        assert_eq!((cfg.static_variation, cfg.event_variation), (1, 1));

        let mut custom = PointEntry::new(0, "x");
        custom.static_variation = Some(5);
        assert_eq!(custom.point_config(PointType::AnalogInput).static_variation, 5);
    }

    #[test]
    fn test_rejects_duplicate_index_within_type() {
        let mut config = sample();
        config.sessions[0].analog_inputs.push(PointEntry::new(0, "other"));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate AnalogInput index 0"));

        // same index in another list is allowed
        let mut config = sample();
        config.sessions[0].counters.push(PointEntry::new(0, "energy"));
        config.validate().unwrap();
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut config = sample();
        config.name = " ".to_string();
        assert!(config.validate().is_err());

        let mut config = sample();
        config.outstation.port = 0;
        assert!(matches!(
            config.validate(),
            Err(Dnp3Error::InvalidConfig { ref field, .. }) if field == "outstation.port"
        ));

        let mut config = sample();
        config.sessions[0].event_buffer_length = 0;
        assert!(config.validate().is_err());

        let mut config = sample();
        config.sessions[0].event_buffer_length = MAX_EVENT_BUFFER_LENGTH;
        config.validate().unwrap();
        config.sessions[0].event_buffer_length = usize::MAX;
        assert!(matches!(
            config.validate(),
            Err(Dnp3Error::InvalidConfig { ref field, .. })
                if field == "sessions[scada].event_buffer_length"
        ));

        let mut config = sample();
        config.sessions.push(config.sessions[0].clone());
        assert!(config.validate().unwrap_err().to_string().contains("duplicate session"));

        let mut config = sample();
        config.outstation.dnp = 0xFFFD;
        assert!(config.validate().is_err());

        let mut config = sample();
        config.sessions[0].analog_inputs[0].deadband = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_build_database() {
        let db = sample().sessions[0].build_database().unwrap();
        assert_eq!(db.len(), 2);
        assert!(db.contains(PointType::AnalogInput, 0));
        assert!(db.contains(PointType::BinaryOutputStatus, 0));
        assert_eq!(db.events().capacity(), 100);
    }

    #[test]
    fn test_element_lookup_by_type_and_index() {
        let session = &sample().sessions[0];
        assert_eq!(session.element(PointType::BinaryOutputStatus, 0), Some("breaker.close"));
        assert_eq!(session.element(PointType::BinaryInput, 0), None);
        assert_eq!(session.element(PointType::AnalogInput, 1), None);
    }
}
