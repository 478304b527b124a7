//! Data types, configuration, and validation modules
//!
//! Contains the core data structures shared by every acquisition component.

mod config;
mod types;
pub mod validation;

pub use config::{AcquisitionConfig, UsbSignature};
pub use types::{
    now_millis, Capability, DeviceCandidate, ParsedReading, RawReport, SensorDevice, SensorId,
    SensorSnapshot, SensorState, SensorStatus,
};
pub use validation::{check_interval, check_plausible, is_plausible, PlausibilityViolation};
