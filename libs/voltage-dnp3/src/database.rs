//! Outstation point database
//!
//! One [`Database`] per session. Points are keyed by (point type, index)
//! and must be added before they can be updated. Each update is compared
//! against the last reported value of the point; a change in flags or value
//! (beyond the deadband for analogs) produces an [`Event`] in the session's
//! bounded [`EventBuffer`].

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use tracing::{debug, warn};

use crate::error::{Dnp3Error, Result};
use crate::measurement::{Measurement, PointType, PointValue};
use crate::sink::EventSink;

// ============================================================================
// Point configuration
// ============================================================================

/// Event reporting class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EventClass {
    /// Static only, never produces events
    #[serde(alias = "none")]
    None,
    #[serde(alias = "class1")]
    Class1,
    #[default]
    #[serde(alias = "class2")]
    Class2,
    #[serde(alias = "class3")]
    Class3,
}

impl EventClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventClass::None => "None",
            EventClass::Class1 => "Class1",
            EventClass::Class2 => "Class2",
            EventClass::Class3 => "Class3",
        }
    }
}

impl fmt::Display for EventClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Default (static, event) variations per point type
pub fn default_variations(point_type: PointType) -> (u8, u8) {
    match point_type {
        // g1v2/g2v1, g3v2/g4v1, g10v2/g11v1
        PointType::BinaryInput
        | PointType::DoubleBitBinaryInput
        | PointType::BinaryOutputStatus => (2, 1),
        // g20v1/g22v1, g21v1/g23v1, g30v1/g32v1, g40v1/g42v1
        PointType::Counter
        | PointType::FrozenCounter
        | PointType::AnalogInput
        | PointType::AnalogOutputStatus => (1, 1),
    }
}

/// Per-point configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointConfig {
    pub class: EventClass,
    pub static_variation: u8,
    pub event_variation: u8,
    /// Analog change threshold; ignored for other point types
    pub deadband: f64,
}

impl PointConfig {
    /// Default variations for `point_type`, given class, no deadband
    pub fn for_type(point_type: PointType, class: EventClass) -> Self {
        let (static_variation, event_variation) = default_variations(point_type);
        Self {
            class,
            static_variation,
            event_variation,
            deadband: 0.0,
        }
    }

    #[must_use]
    pub fn with_deadband(mut self, deadband: f64) -> Self {
        self.deadband = deadband;
        self
    }
}

// ============================================================================
// Events
// ============================================================================

/// Events reserved up front; the buffer grows on demand up to its capacity
const INITIAL_EVENT_SLOTS: usize = 64;

/// A buffered change event
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Event {
    pub index: u16,
    pub class: EventClass,
    pub variation: u8,
    pub measurement: Measurement,
}

impl Event {
    pub fn point_type(&self) -> PointType {
        self.measurement.point_type()
    }
}

/// Bounded FIFO of change events
///
/// When full, the oldest event is discarded and the overflow latch is set
/// until the next [`EventBuffer::drain`].
#[derive(Debug, Clone)]
pub struct EventBuffer {
    capacity: usize,
    events: VecDeque<Event>,
    overflowed: bool,
}

impl EventBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            events: VecDeque::with_capacity(capacity.min(INITIAL_EVENT_SLOTS)),
            overflowed: false,
        }
    }

    /// Append an event; returns false if an older event had to be dropped
    pub fn push(&mut self, event: Event) -> bool {
        if self.capacity == 0 {
            self.overflowed = true;
            return false;
        }
        let mut kept_all = true;
        if self.events.len() >= self.capacity {
            self.events.pop_front();
            if !self.overflowed {
                warn!(capacity = self.capacity, "Event buffer overflow, dropping oldest");
            }
            self.overflowed = true;
            kept_all = false;
        }
        self.events.push_back(event);
        kept_all
    }

    /// Take every buffered event in arrival order and clear the overflow latch
    pub fn drain(&mut self) -> Vec<Event> {
        self.overflowed = false;
        self.events.drain(..).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    /// Buffered events of one class
    pub fn count(&self, class: EventClass) -> usize {
        self.events.iter().filter(|e| e.class == class).count()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn overflowed(&self) -> bool {
        self.overflowed
    }
}

// ============================================================================
// Database
// ============================================================================

#[derive(Debug, Clone)]
struct PointState {
    config: PointConfig,
    current: Option<Measurement>,
    last_event: Option<Measurement>,
}

fn is_change(config: &PointConfig, previous: Option<&Measurement>, next: &Measurement) -> bool {
    let Some(previous) = previous else {
        return true;
    };
    if previous.flags() != next.flags() {
        return true;
    }
    match (previous.value(), next.value()) {
        (PointValue::Analog(old), PointValue::Analog(new)) => {
            if old.is_nan() || new.is_nan() {
                return !previous.value().same_as(&next.value());
            }
            (new - old).abs() > config.deadband
        },
        (old, new) => old != new,
    }
}

/// Result of [`Database::apply`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub applied: usize,
    pub rejected: usize,
    pub events: usize,
}

/// Point database of one session
#[derive(Debug, Clone)]
pub struct Database {
    points: BTreeMap<(PointType, u16), PointState>,
    events: EventBuffer,
}

impl Database {
    pub fn new(event_buffer_length: usize) -> Self {
        Self {
            points: BTreeMap::new(),
            events: EventBuffer::new(event_buffer_length),
        }
    }

    /// Register a point
    ///
    /// # Errors
    /// [`Dnp3Error::DuplicatePoint`] if (point_type, index) already exists.
    pub fn add_point(
        &mut self,
        point_type: PointType,
        index: u16,
        config: PointConfig,
    ) -> Result<()> {
        let key = (point_type, index);
        if self.points.contains_key(&key) {
            return Err(Dnp3Error::DuplicatePoint { point_type, index });
        }
        self.points.insert(
            key,
            PointState {
                config,
                current: None,
                last_event: None,
            },
        );
        Ok(())
    }

    /// Remove a point and its current value
    pub fn remove_point(&mut self, point_type: PointType, index: u16) -> Result<PointConfig> {
        self.points
            .remove(&(point_type, index))
            .map(|state| state.config)
            .ok_or(Dnp3Error::PointNotFound { point_type, index })
    }

    /// Store a new value for the point matching the measurement's type
    ///
    /// Returns whether a change event was raised.
    ///
    /// # Errors
    /// [`Dnp3Error::PointNotFound`] if the point was never added.
    pub fn update(&mut self, index: u16, measurement: Measurement) -> Result<bool> {
        self.update_point(measurement.point_type(), index, measurement)
    }

    /// Like [`Database::update`], but checks the measurement is of `point_type`
    ///
    /// # Errors
    /// - [`Dnp3Error::TypeMismatch`] if the measurement is of another type
    /// - [`Dnp3Error::PointNotFound`] if the point was never added
    pub fn update_point(
        &mut self,
        point_type: PointType,
        index: u16,
        measurement: Measurement,
    ) -> Result<bool> {
        if measurement.point_type() != point_type {
            return Err(Dnp3Error::TypeMismatch {
                expected: point_type,
                actual: measurement.point_type(),
            });
        }
        let state = self
            .points
            .get_mut(&(point_type, index))
            .ok_or(Dnp3Error::PointNotFound { point_type, index })?;

        state.current = Some(measurement);
        if state.config.class == EventClass::None {
            return Ok(false);
        }
        if !is_change(&state.config, state.last_event.as_ref(), &measurement) {
            return Ok(false);
        }

        state.last_event = Some(measurement);
        let event = Event {
            index,
            class: state.config.class,
            variation: state.config.event_variation,
            measurement,
        };
        debug!(class = %event.class, "Event {}:{} {}", point_type, index, measurement);
        self.events.push(event);
        Ok(true)
    }

    /// Apply a prepared batch, continuing past rejected entries
    pub fn apply(&mut self, updates: &Updates) -> ApplyReport {
        let mut report = ApplyReport::default();
        for (index, measurement) in updates.iter() {
            match self.update(*index, *measurement) {
                Ok(raised) => {
                    report.applied += 1;
                    if raised {
                        report.events += 1;
                    }
                },
                Err(e) => {
                    warn!("Rejected update: {}", e);
                    report.rejected += 1;
                },
            }
        }
        report
    }

    /// Current value of a point, `None` if unknown or never updated
    pub fn get(&self, point_type: PointType, index: u16) -> Option<&Measurement> {
        self.points
            .get(&(point_type, index))
            .and_then(|state| state.current.as_ref())
    }

    pub fn config(&self, point_type: PointType, index: u16) -> Option<&PointConfig> {
        self.points.get(&(point_type, index)).map(|state| &state.config)
    }

    pub fn contains(&self, point_type: PointType, index: u16) -> bool {
        self.points.contains_key(&(point_type, index))
    }

    /// Configured indexes of `point_type`, ascending
    pub fn points(&self, point_type: PointType) -> Vec<u16> {
        self.points
            .keys()
            .filter(|(pt, _)| *pt == point_type)
            .map(|(_, index)| *index)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn events(&self) -> &EventBuffer {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<Event> {
        self.events.drain()
    }
}

impl EventSink for Database {
    fn on_update(&mut self, index: u16, measurement: &Measurement) {
        if let Err(e) = self.update(index, *measurement) {
            warn!("Rejected update: {}", e);
        }
    }
}

// ============================================================================
// Update batches
// ============================================================================

/// Collects measurements to apply to a database in one pass
#[derive(Debug, Default, Clone)]
pub struct UpdateBuilder {
    updates: Vec<(u16, Measurement)>,
}

impl UpdateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, measurement: Measurement, index: u16) -> &mut Self {
        self.updates.push((index, measurement));
        self
    }

    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    pub fn build(self) -> Updates {
        Updates {
            updates: self.updates,
        }
    }
}

/// Finished update batch
#[derive(Debug, Default, Clone)]
pub struct Updates {
    updates: Vec<(u16, Measurement)>,
}

impl Updates {
    pub fn iter(&self) -> impl Iterator<Item = &(u16, Measurement)> {
        self.updates.iter()
    }

    pub fn as_slice(&self) -> &[(u16, Measurement)] {
        &self.updates
    }

    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }
}
