//! Sensor discovery
//!
//! Filters the OS device list down to the sensors of this family. A device
//! matches when its declared name contains one of the configured substrings
//! (case-insensitive) or when its USB vendor/product pair is a known
//! signature. Finding nothing is a normal result.

use sha2::{Digest, Sha256};
use std::collections::HashSet;
use tracing::{debug, info, trace};

use crate::constants::identity;
use crate::data::{AcquisitionConfig, Capability, DeviceCandidate, SensorDevice, SensorId, UsbSignature};
use crate::error::{AcquisitionError, Result};
use crate::hw::DeviceIo;

/// Matches OS devices against the sensor family
#[derive(Debug, Clone)]
pub struct DeviceLocator {
    name_patterns: Vec<String>,
    signatures: Vec<UsbSignature>,
}

impl DeviceLocator {
    pub fn new<S: AsRef<str>>(name_patterns: &[S], signatures: &[UsbSignature]) -> Self {
        Self {
            name_patterns: name_patterns
                .iter()
                .map(|p| p.as_ref().trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
            signatures: signatures.to_vec(),
        }
    }

    pub fn from_config(config: &AcquisitionConfig) -> Self {
        Self::new(&config.name_patterns, &config.usb_signatures)
    }

    /// Whether a candidate belongs to the sensor family
    pub fn matches(&self, candidate: &DeviceCandidate) -> bool {
        let name = candidate.name.to_lowercase();
        if self.name_patterns.iter().any(|p| name.contains(p.as_str())) {
            return true;
        }
        match (candidate.vendor_id, candidate.product_id) {
            (Some(vendor_id), Some(product_id)) => self
                .signatures
                .iter()
                .any(|s| s.vendor_id == vendor_id && s.product_id == product_id),
            _ => false,
        }
    }

    /// Enumerate and classify sensors, ordered by device node
    pub fn locate(&self, io: &dyn DeviceIo) -> Result<Vec<SensorDevice>> {
        // A backend that cannot list devices fails the whole cycle
        let candidates = io.enumerate().map_err(|e| {
            if e.is_per_device() {
                AcquisitionError::generic(format!("Device enumeration failed: {}", e))
            } else {
                e
            }
        })?;
        debug!(candidates = candidates.len(), "Enumerated device candidates");

        let mut seen = HashSet::new();
        let mut devices: Vec<SensorDevice> = candidates
            .into_iter()
            .filter(|c| {
                let matched = self.matches(c);
                trace!(name = %c.name, node = ?c.node, matched, "Checked candidate");
                matched
            })
            .filter(|c| seen.insert(c.node.clone()))
            .map(|c| SensorDevice {
                id: sensor_id_for(&c),
                name: c.name,
                node: c.node,
                phys: c.phys,
                capability: c.capability,
                vendor_id: c.vendor_id,
                product_id: c.product_id,
            })
            .collect();

        devices.sort_by(|a, b| a.node.cmp(&b.node));

        for device in &devices {
            info!(
                sensor = %device.id,
                name = %device.name,
                node = ?device.node,
                capability = ?device.capability,
                "Found sensor"
            );
        }
        info!("Total sensors found: {}", devices.len());
        Ok(devices)
    }
}

/// Stable id derived from interface kind and physical location
///
/// Falls back to the node path when the device reports no physical path.
pub fn sensor_id_for(candidate: &DeviceCandidate) -> SensorId {
    let mut hasher = Sha256::new();
    hasher.update(match candidate.capability {
        Capability::Text => b"text".as_slice(),
        Capability::Binary => b"binary".as_slice(),
    });
    hasher.update([0u8]);
    if candidate.phys.trim().is_empty() {
        hasher.update(candidate.node.to_string_lossy().as_bytes());
    } else {
        hasher.update(candidate.phys.trim().as_bytes());
    }
    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    SensorId::new(format!("th-{}", &hex[..identity::SENSOR_ID_HEX_LEN]))
}
