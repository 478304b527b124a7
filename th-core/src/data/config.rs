//! Acquisition configuration
//!
//! The engine consumes configuration, it never loads it: whoever owns the
//! process builds an [`AcquisitionConfig`] (or deserializes one) and hands
//! it to the scheduler. Durations are expressed in milliseconds on the wire.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::{identity, input, report, timing};
use crate::decode::{default_candidates, CandidateDecoding};
use crate::error::{AcquisitionError, Result};

/// USB vendor/product pair identifying a sensor model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UsbSignature {
    pub vendor_id: u16,
    pub product_id: u16,
}

/// Parameters of one acquisition cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Global deadline shared by every worker of a cycle
    #[serde(with = "duration_ms")]
    pub cycle_deadline: Duration,
    /// How long the activation key is held down
    #[serde(with = "duration_ms")]
    pub activation_hold: Duration,
    /// Key injected to switch a sensor into streaming mode
    pub activation_key: u16,
    /// Whether text-capable devices get the activation gesture
    pub activate_text_devices: bool,
    /// Bound of one blocking read
    #[serde(with = "duration_ms")]
    pub read_poll_interval: Duration,
    /// Case-insensitive substrings of device names
    pub name_patterns: Vec<String>,
    /// Vendor/product pairs matched regardless of name
    pub usb_signatures: Vec<UsbSignature>,
    /// Case-insensitive substrings of identification lines
    pub banner_patterns: Vec<String>,
    /// Size of one binary report
    pub report_size: usize,
    /// Command written to binary devices before reading, if any
    pub report_query: Option<Vec<u8>>,
    /// Ranked binary decodings, most common convention first
    pub candidates: Vec<CandidateDecoding>,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            cycle_deadline: timing::CYCLE_DEADLINE,
            activation_hold: timing::ACTIVATION_HOLD,
            activation_key: input::ACTIVATION_KEY,
            activate_text_devices: true,
            read_poll_interval: timing::READ_POLL_INTERVAL,
            name_patterns: identity::NAME_PATTERNS.iter().map(|s| s.to_string()).collect(),
            usb_signatures: identity::USB_SIGNATURES
                .iter()
                .map(|&(vendor_id, product_id)| UsbSignature {
                    vendor_id,
                    product_id,
                })
                .collect(),
            banner_patterns: identity::BANNER_PATTERNS.iter().map(|s| s.to_string()).collect(),
            report_size: report::DEFAULT_SIZE,
            report_query: Some(report::DEFAULT_QUERY.to_vec()),
            candidates: default_candidates(),
        }
    }
}

impl AcquisitionConfig {
    /// Set the cycle deadline
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.cycle_deadline = deadline;
        self
    }

    /// Set the activation hold duration
    pub fn with_activation_hold(mut self, hold: Duration) -> Self {
        self.activation_hold = hold;
        self
    }

    /// Set the per-read poll bound
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.read_poll_interval = interval;
        self
    }

    /// Replace the binary candidate list
    pub fn with_candidates(mut self, candidates: Vec<CandidateDecoding>) -> Self {
        self.candidates = candidates;
        self
    }

    /// Reject caller configuration errors before a cycle starts
    pub fn validate(&self) -> Result<()> {
        if self.cycle_deadline.is_zero() {
            return Err(AcquisitionError::config("cycle_deadline", "must be greater than zero"));
        }
        if self.read_poll_interval.is_zero() || self.read_poll_interval > self.cycle_deadline {
            return Err(AcquisitionError::config(
                "read_poll_interval",
                "must be non-zero and not longer than the cycle deadline",
            ));
        }
        if self.activate_text_devices && self.activation_hold >= self.cycle_deadline {
            return Err(AcquisitionError::config(
                "activation_hold",
                "must be shorter than the cycle deadline",
            ));
        }
        if self.name_patterns.iter().all(|p| p.trim().is_empty()) && self.usb_signatures.is_empty() {
            return Err(AcquisitionError::config(
                "name_patterns",
                "at least one name pattern or USB signature is required",
            ));
        }
        if !(1..=report::MAX_SIZE).contains(&self.report_size) {
            return Err(AcquisitionError::config(
                "report_size",
                format!("must be within 1..={}", report::MAX_SIZE),
            ));
        }
        if let Some(query) = &self.report_query {
            if query.is_empty() || query.len() > report::MAX_SIZE {
                return Err(AcquisitionError::config(
                    "report_query",
                    format!("must hold 1..={} bytes", report::MAX_SIZE),
                ));
            }
        }
        if self.candidates.is_empty() {
            return Err(AcquisitionError::config("candidates", "list cannot be empty"));
        }
        for candidate in &self.candidates {
            if candidate.required_len().map_or(true, |len| len > self.report_size) {
                return Err(AcquisitionError::config(
                    "candidates",
                    format!(
                        "candidate '{}' reads past the {}-byte report",
                        candidate.name, self.report_size
                    ),
                ));
            }
        }
        Ok(())
    }
}

/// Serialize a [`Duration`] as whole milliseconds
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
