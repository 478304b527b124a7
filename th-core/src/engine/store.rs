//! Per-sensor state store
//!
//! The only place sensor state is mutated. Workers push [`SensorEvent`]s
//! through [`SensorStateStore::update`]; consumers read immutable copies.
//! One write lock covers each update, so no reader ever sees a reading
//! counted but not stored.

use parking_lot::RwLock;
use std::collections::BTreeSet;
use tracing::{debug, trace, warn};

use crate::data::{now_millis, ParsedReading, SensorDevice, SensorId, SensorSnapshot, SensorState, SensorStatus};

/// What a worker observed on one sensor
#[derive(Debug, Clone, PartialEq)]
pub enum SensorEvent {
    /// A validated sample
    Reading(ParsedReading),
    /// Proof of life without a sample (identification banner)
    Activity,
    /// The device failed; the reason is kept as diagnostic
    Error(String),
}

/// Concurrency-safe table of sensor state
#[derive(Debug, Default)]
pub struct SensorStateStore {
    states: RwLock<SensorSnapshot>,
}

impl SensorStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconcile the table with the sensors discovered for a new cycle
    ///
    /// New sensors start `off`. Sensors no longer present are dropped.
    /// Surviving sensors go back to `off` and lose their diagnostic but keep
    /// their reading count and latest reading.
    pub fn begin_cycle(&self, devices: &[SensorDevice]) {
        let present: BTreeSet<&SensorId> = devices.iter().map(|d| &d.id).collect();
        let mut states = self.states.write();

        states.retain(|id, _| {
            let keep = present.contains(id);
            if !keep {
                debug!(sensor = %id, "Dropping sensor no longer present");
            }
            keep
        });

        for device in devices {
            let state = states
                .entry(device.id.clone())
                .or_insert_with(|| SensorState::new(device.name.clone()));
            state.name = device.name.clone();
            state.status = SensorStatus::Off;
            state.diagnostic = None;
        }
    }

    /// Apply one event; returns false for sensors not in the table
    pub fn update(&self, id: &SensorId, event: SensorEvent) -> bool {
        let mut states = self.states.write();
        let Some(state) = states.get_mut(id) else {
            warn!(sensor = %id, "Ignoring update for unknown sensor");
            return false;
        };

        match event {
            SensorEvent::Reading(reading) => {
                state.status = SensorStatus::On;
                state.readings_count += 1;
                state.last_activity = Some(reading.timestamp());
                trace!(
                    sensor = %id,
                    temperature = reading.temperature(),
                    humidity = reading.humidity(),
                    count = state.readings_count,
                    "Stored reading"
                );
                state.current_reading = Some(reading);
            }
            SensorEvent::Activity => {
                state.status = SensorStatus::On;
                state.last_activity = Some(now_millis());
            }
            SensorEvent::Error(reason) => {
                state.status = SensorStatus::Error;
                state.diagnostic = Some(reason);
            }
        }
        true
    }

    /// Attach diagnostic text without touching status
    pub fn record_diagnostic(&self, id: &SensorId, text: impl Into<String>) -> bool {
        let mut states = self.states.write();
        match states.get_mut(id) {
            Some(state) => {
                state.diagnostic = Some(text.into());
                true
            }
            None => {
                warn!(sensor = %id, "Ignoring diagnostic for unknown sensor");
                false
            }
        }
    }

    pub fn snapshot(&self, id: &SensorId) -> Option<SensorState> {
        self.states.read().get(id).cloned()
    }

    pub fn snapshot_all(&self) -> SensorSnapshot {
        self.states.read().clone()
    }

    pub fn len(&self) -> usize {
        self.states.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Capability;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::thread;

    fn device(id: &str) -> SensorDevice {
        SensorDevice {
            id: SensorId::new(id),
            name: format!("TEMPerHUM {}", id),
            node: PathBuf::from(format!("/dev/input/{}", id)),
            phys: String::new(),
            capability: Capability::Text,
            vendor_id: None,
            product_id: None,
        }
    }

    fn reading(t: f64) -> ParsedReading {
        ParsedReading::new(t, 40.0, Some(1), format!("{}[C]40[%RH]1S", t), 1_000).unwrap()
    }

    #[test]
    fn test_reading_sets_on_and_counts() {
        let store = SensorStateStore::new();
        store.begin_cycle(&[device("a")]);
        let id = SensorId::new("a");

        assert!(store.update(&id, SensorEvent::Reading(reading(21.5))));
        assert!(store.update(&id, SensorEvent::Reading(reading(22.0))));

        let state = store.snapshot(&id).unwrap();
        assert_eq!(state.status, SensorStatus::On);
        assert_eq!(state.readings_count, 2);
        assert_eq!(state.current_reading.unwrap().temperature(), 22.0);
        assert_eq!(state.last_activity, Some(1_000));
    }

    #[test]
    fn test_activity_keeps_latest_reading() {
        let store = SensorStateStore::new();
        store.begin_cycle(&[device("a")]);
        let id = SensorId::new("a");
        store.update(&id, SensorEvent::Reading(reading(21.5)));
        store.update(&id, SensorEvent::Activity);

        let state = store.snapshot(&id).unwrap();
        assert_eq!(state.readings_count, 1);
        assert_eq!(state.current_reading.unwrap().temperature(), 21.5);
        assert!(state.last_activity.unwrap() > 1_000);
    }

    #[test]
    fn test_error_keeps_reading_and_records_reason() {
        let store = SensorStateStore::new();
        store.begin_cycle(&[device("a")]);
        let id = SensorId::new("a");
        store.update(&id, SensorEvent::Reading(reading(21.5)));
        store.update(&id, SensorEvent::Error("unplugged".to_string()));

        let state = store.snapshot(&id).unwrap();
        assert_eq!(state.status, SensorStatus::Error);
        assert_eq!(state.diagnostic.as_deref(), Some("unplugged"));
        assert!(state.current_reading.is_some());
    }

    #[test]
    fn test_begin_cycle_reconciles() {
        let store = SensorStateStore::new();
        store.begin_cycle(&[device("a"), device("b")]);
        store.update(&SensorId::new("a"), SensorEvent::Reading(reading(21.5)));
        store.update(&SensorId::new("b"), SensorEvent::Error("gone".to_string()));

        store.begin_cycle(&[device("a"), device("c")]);
        let all = store.snapshot_all();
        assert_eq!(all.len(), 2);
        assert!(!all.contains_key(&SensorId::new("b")));

        let a = &all[&SensorId::new("a")];
        assert_eq!(a.status, SensorStatus::Off);
        assert_eq!(a.readings_count, 1);
        assert!(a.current_reading.is_some());
        assert_eq!(all[&SensorId::new("c")], SensorState::new("TEMPerHUM c"));
    }

    #[test]
    fn test_unknown_sensor_is_ignored() {
        let store = SensorStateStore::new();
        assert!(!store.update(&SensorId::new("ghost"), SensorEvent::Activity));
        assert!(!store.record_diagnostic(&SensorId::new("ghost"), "x"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_concurrent_updates_are_serialized() {
        let store = Arc::new(SensorStateStore::new());
        let devices: Vec<_> = (0..4).map(|i| device(&format!("s{}", i))).collect();
        store.begin_cycle(&devices);

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let id = SensorId::new(format!("s{}", i));
                    for _ in 0..250 {
                        store.update(&id, SensorEvent::Reading(reading(20.0)));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let all = store.snapshot_all();
        assert!(all.values().all(|s| s.readings_count == 250));
    }
}
