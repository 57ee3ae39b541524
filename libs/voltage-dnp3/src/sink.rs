//! Event sinks
//!
//! The decoding layer hands every decoded measurement to an [`EventSink`].
//! Sinks run synchronously on the channel's decoding path and must not block.

use std::collections::HashMap;
use tracing::debug;

use crate::measurement::{Measurement, PointType, PointValue};

/// Receiver of decoded measurements
pub trait EventSink {
    /// Start of a response fragment
    fn begin_fragment(&mut self) {}

    /// One decoded measurement for `index`
    fn on_update(&mut self, index: u16, measurement: &Measurement);

    /// Several measurements, delivered in order
    fn on_batch(&mut self, updates: &[(u16, Measurement)]) {
        for (index, measurement) in updates {
            self.on_update(*index, measurement);
        }
    }

    /// End of a response fragment
    fn end_fragment(&mut self) {}
}

impl<S: EventSink + ?Sized> EventSink for &mut S {
    fn begin_fragment(&mut self) {
        (**self).begin_fragment();
    }

    fn on_update(&mut self, index: u16, measurement: &Measurement) {
        (**self).on_update(index, measurement);
    }

    fn on_batch(&mut self, updates: &[(u16, Measurement)]) {
        (**self).on_batch(updates);
    }

    fn end_fragment(&mut self) {
        (**self).end_fragment();
    }
}

impl<S: EventSink + ?Sized> EventSink for Box<S> {
    fn begin_fragment(&mut self) {
        (**self).begin_fragment();
    }

    fn on_update(&mut self, index: u16, measurement: &Measurement) {
        (**self).on_update(index, measurement);
    }

    fn on_batch(&mut self, updates: &[(u16, Measurement)]) {
        (**self).on_batch(updates);
    }

    fn end_fragment(&mut self) {
        (**self).end_fragment();
    }
}

// ============================================================================
// PointCache
// ============================================================================

/// Latest measurement per (point type, index), as seen by a master channel
#[derive(Debug, Default, Clone)]
pub struct PointCache {
    points: HashMap<(PointType, u16), Measurement>,
    fragments: u64,
}

impl PointCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, point_type: PointType, index: u16) -> Option<&Measurement> {
        self.points.get(&(point_type, index))
    }

    pub fn value(&self, point_type: PointType, index: u16) -> Option<PointValue> {
        self.get(point_type, index).map(Measurement::value)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Completed fragments seen so far
    pub fn fragments(&self) -> u64 {
        self.fragments
    }

    /// Indexes cached for `point_type`, ascending
    pub fn indexes(&self, point_type: PointType) -> Vec<u16> {
        let mut out: Vec<u16> = self
            .points
            .keys()
            .filter(|(pt, _)| *pt == point_type)
            .map(|(_, index)| *index)
            .collect();
        out.sort_unstable();
        out
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }
}

impl EventSink for PointCache {
    fn on_update(&mut self, index: u16, measurement: &Measurement) {
        self.points
            .insert((measurement.point_type(), index), *measurement);
    }

    fn end_fragment(&mut self) {
        self.fragments += 1;
    }
}

// ============================================================================
// Router
// ============================================================================

/// Handler invoked by [`Router`]
pub type UpdateHandler = Box<dyn FnMut(u16, &Measurement) + Send>;

/// Dispatches updates to per-point handlers
///
/// Lookup order: exact (point type, index) handler, then the point type's
/// fallback. Updates matching neither are counted and discarded.
#[derive(Default)]
pub struct Router {
    routes: HashMap<(PointType, u16), UpdateHandler>,
    fallbacks: HashMap<PointType, UpdateHandler>,
    unrouted: u64,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one point, replacing any previous one
    pub fn route<F>(&mut self, point_type: PointType, index: u16, handler: F) -> &mut Self
    where
        F: FnMut(u16, &Measurement) + Send + 'static,
    {
        self.routes.insert((point_type, index), Box::new(handler));
        self
    }

    /// Register a handler for every otherwise unrouted point of `point_type`
    pub fn fallback<F>(&mut self, point_type: PointType, handler: F) -> &mut Self
    where
        F: FnMut(u16, &Measurement) + Send + 'static,
    {
        self.fallbacks.insert(point_type, Box::new(handler));
        self
    }

    pub fn unrouted(&self) -> u64 {
        self.unrouted
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.routes.len())
            .field("fallbacks", &self.fallbacks.len())
            .field("unrouted", &self.unrouted)
            .finish()
    }
}

impl EventSink for Router {
    fn on_update(&mut self, index: u16, measurement: &Measurement) {
        let point_type = measurement.point_type();
        if let Some(handler) = self.routes.get_mut(&(point_type, index)) {
            handler(index, measurement);
        } else if let Some(handler) = self.fallbacks.get_mut(&point_type) {
            handler(index, measurement);
        } else {
            self.unrouted += 1;
        }
    }
}

// ============================================================================
// TracingSink
// ============================================================================

/// Logs every update in the diagnostic format at DEBUG
#[derive(Debug, Clone)]
pub struct TracingSink {
    channel: String,
}

impl TracingSink {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
        }
    }
}

impl EventSink for TracingSink {
    fn begin_fragment(&mut self) {
        debug!(channel = %self.channel, "fragment begin");
    }

    fn on_update(&mut self, index: u16, measurement: &Measurement) {
        debug!(channel = %self.channel, index, "{}", measurement);
    }

    fn end_fragment(&mut self) {
        debug!(channel = %self.channel, "fragment end");
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::flags::Flags;
    use crate::time::Timestamp;
    use std::sync::{Arc, Mutex};

    fn analog(v: f64) -> Measurement {
        Measurement::analog_input(v, Flags::online(), Timestamp::synchronized(1).unwrap())
    }

    #[test]
    fn test_cache_last_write_wins() {
        let mut cache = PointCache::new();
        cache.on_update(3, &analog(1.0));
        cache.on_update(3, &analog(2.0));
        cache.on_update(3, &analog(2.0));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.value(PointType::AnalogInput, 3), Some(PointValue::Analog(2.0)));
        assert!(cache.get(PointType::AnalogOutputStatus, 3).is_none());
    }

    #[test]
    fn test_cache_keys_by_type_and_index() {
        let mut cache = PointCache::new();
        let t = Timestamp::synchronized(1).unwrap();
        cache.on_batch(&[
            (0, Measurement::counter(1, Flags::online(), t)),
            (0, Measurement::frozen_counter(2, Flags::online(), t)),
            (5, Measurement::counter(3, Flags::online(), t)),
        ]);
        cache.end_fragment();
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.indexes(PointType::Counter), vec![0, 5]);
        assert_eq!(cache.fragments(), 1);
    }

    #[test]
    fn test_router_prefers_exact_route() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut router = Router::new();
        let exact = Arc::clone(&seen);
        let fallback = Arc::clone(&seen);
        router
            .route(PointType::AnalogInput, 1, move |i, _| {
                exact.lock().unwrap().push(("exact", i))
            })
            .fallback(PointType::AnalogInput, move |i, _| {
                fallback.lock().unwrap().push(("fallback", i))
            });

        router.on_update(1, &analog(1.0));
        router.on_update(2, &analog(1.0));
        router.on_update(
            1,
            &Measurement::counter(1, Flags::online(), Timestamp::invalid()),
        );

        assert_eq!(*seen.lock().unwrap(), vec![("exact", 1), ("fallback", 2)]);
        assert_eq!(router.unrouted(), 1);
    }

    #[test]
    fn test_sink_through_mut_reference() {
        fn feed(mut sink: impl EventSink) {
            sink.on_update(9, &analog(4.0));
        }
        let mut cache = PointCache::new();
        feed(&mut cache);
        assert_eq!(cache.len(), 1);
    }
}
