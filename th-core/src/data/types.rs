//! Core data types for temperhum
//!
//! Defines the devices, readings and per-sensor state passed between the
//! acquisition components and handed to the output sink.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::data::validation::{check_interval, check_plausible, PlausibilityViolation};

/// Milliseconds since Unix epoch
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Stable identifier of one sensor interface
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SensorId(String);

impl SensorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a sensor interface delivers its samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    /// Keystroke emulation: types one human-readable line per sample
    Text,
    /// Fixed-size raw reports
    Binary,
}

/// A device node as reported by the OS, before matching
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceCandidate {
    /// Declared device name
    pub name: String,
    /// Device node used for I/O (e.g. /dev/input/event5)
    pub node: PathBuf,
    /// Physical path, for diagnostics and stable ids
    pub phys: String,
    /// Interface kind of the node
    pub capability: Capability,
    pub vendor_id: Option<u16>,
    pub product_id: Option<u16>,
}

/// A matched sensor interface, immutable for one scheduling cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorDevice {
    pub id: SensorId,
    pub name: String,
    pub node: PathBuf,
    pub phys: String,
    pub capability: Capability,
    pub vendor_id: Option<u16>,
    pub product_id: Option<u16>,
}

/// A validated temperature/humidity sample
///
/// Only constructible through [`ParsedReading::new`], which enforces the
/// plausibility bounds, so every instance in the system is in range.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedReading {
    temperature: f64,
    humidity: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    interval: Option<u32>,
    raw_source: String,
    timestamp: u64,
}

impl ParsedReading {
    /// Build a reading, rejecting values outside the plausibility bounds
    pub fn new(
        temperature: f64,
        humidity: f64,
        interval: Option<u32>,
        raw_source: impl Into<String>,
        timestamp: u64,
    ) -> Result<Self, PlausibilityViolation> {
        check_plausible(temperature, humidity)?;
        if let Some(secs) = interval {
            check_interval(secs)?;
        }
        Ok(Self {
            temperature,
            humidity,
            interval,
            raw_source: raw_source.into(),
            timestamp,
        })
    }

    /// Temperature in °C
    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// Relative humidity in %RH
    pub fn humidity(&self) -> f64 {
        self.humidity
    }

    /// Sample interval in seconds, when the device reported one
    pub fn interval(&self) -> Option<u32> {
        self.interval
    }

    /// Original line or hex dump the reading was decoded from
    pub fn raw_source(&self) -> &str {
        &self.raw_source
    }

    /// Capture time in milliseconds since Unix epoch
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Compare all fields except the capture timestamp
    pub fn same_values(&self, other: &ParsedReading) -> bool {
        self.temperature == other.temperature
            && self.humidity == other.humidity
            && self.interval == other.interval
            && self.raw_source == other.raw_source
    }
}

/// One fixed-size report read from a binary-capable device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawReport {
    bytes: Vec<u8>,
    captured_at: u64,
}

impl RawReport {
    pub fn new(bytes: impl Into<Vec<u8>>, captured_at: u64) -> Self {
        Self {
            bytes: bytes.into(),
            captured_at,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn captured_at(&self) -> u64 {
        self.captured_at
    }

    /// Fixed-width hex dump, two uppercase digits per byte
    pub fn hex(&self) -> String {
        self.bytes
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Sensor status as exposed to consumers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorStatus {
    #[default]
    Off,
    On,
    Error,
}

/// Per-sensor state, owned by the state store
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorState {
    pub name: String,
    pub status: SensorStatus,
    pub readings_count: u64,
    pub current_reading: Option<ParsedReading>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<u64>,
    /// Raw data kept for diagnosing the last failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

impl SensorState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: SensorStatus::Off,
            readings_count: 0,
            current_reading: None,
            last_activity: None,
            diagnostic: None,
        }
    }
}

/// Snapshot of every known sensor, keyed by id
pub type SensorSnapshot = BTreeMap<SensorId, SensorState>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reading_rejects_out_of_range() {
        assert!(ParsedReading::new(21.0, 40.0, Some(1), "x", 0).is_ok());
        assert!(ParsedReading::new(120.0, 40.0, None, "x", 0).is_err());
        assert!(ParsedReading::new(21.0, 150.0, None, "x", 0).is_err());
        assert!(ParsedReading::new(21.0, 40.0, Some(0), "x", 0).is_err());
        assert!(ParsedReading::new(f64::NAN, 40.0, None, "x", 0).is_err());
    }

    #[test]
    fn test_raw_report_hex_is_fixed_width() {
        let report = RawReport::new(vec![0x01, 0x80, 0x0a, 0xff], 0);
        assert_eq!(report.hex(), "01 80 0A FF");
        assert_eq!(report.len(), 4);
    }

    #[test]
    fn test_state_serializes_to_output_schema() {
        let mut state = SensorState::new("TEMPerHUM");
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["status"], "off");
        assert_eq!(json["readings_count"], 0);
        assert!(json["current_reading"].is_null());
        assert!(json.get("diagnostic").is_none());

        state.status = SensorStatus::On;
        state.current_reading =
            Some(ParsedReading::new(29.54, 39.58, Some(1), "29.54[C]39.58[%RH]1S", 7).unwrap());
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["status"], "on");
        assert_eq!(json["current_reading"]["temperature"], 29.54);
        assert_eq!(json["current_reading"]["interval"], 1);
        assert_eq!(json["current_reading"]["timestamp"], 7);
    }
}
