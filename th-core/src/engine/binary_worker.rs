//! Raw report worker
//!
//! One bounded read per binary-capable sensor per cycle: optionally write
//! the query command, wait for one report, decode it with the ranked
//! candidates. Timeouts and implausible reports leave the status alone and
//! only record a diagnostic.

use std::time::Duration;
use tracing::{debug, info, warn};

use crate::data::{now_millis, RawReport, SensorDevice, SensorId};
use crate::decode::BinaryDecoder;
use crate::engine::{CancelToken, Deadline, SensorEvent, SensorStateStore};
use crate::error::AcquisitionError;
use crate::hw::DeviceIo;

/// How a binary read ended
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    Decoded {
        candidate: String,
        rank: usize,
    },
    /// A report arrived but no candidate was plausible
    Implausible(String),
    /// No report before the deadline
    Timeout,
    Cancelled,
    Failed(String),
}

/// What one binary worker did
#[derive(Debug, Clone, PartialEq)]
pub struct ReadSummary {
    pub sensor: SensorId,
    pub outcome: ReadOutcome,
}

/// Bounded read worker for one raw report interface
pub struct BinaryReadWorker<'a> {
    device: &'a SensorDevice,
    decoder: &'a BinaryDecoder,
    store: &'a SensorStateStore,
    report_size: usize,
    query: Option<&'a [u8]>,
    poll_interval: Duration,
}

impl<'a> BinaryReadWorker<'a> {
    pub fn new(
        device: &'a SensorDevice,
        decoder: &'a BinaryDecoder,
        store: &'a SensorStateStore,
        report_size: usize,
    ) -> Self {
        Self {
            device,
            decoder,
            store,
            report_size,
            query: None,
            poll_interval: crate::constants::timing::READ_POLL_INTERVAL,
        }
    }

    /// Write `query` before waiting for the report
    pub fn with_query(mut self, query: Option<&'a [u8]>) -> Self {
        self.query = query;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn run(self, io: &dyn DeviceIo, deadline: Deadline, cancel: &CancelToken) -> ReadSummary {
        let outcome = self.read(io, deadline, cancel);
        info!(sensor = %self.device.id, outcome = ?outcome, "Binary read finished");
        ReadSummary {
            sensor: self.device.id.clone(),
            outcome,
        }
    }

    fn read(&self, io: &dyn DeviceIo, deadline: Deadline, cancel: &CancelToken) -> ReadOutcome {
        let id = &self.device.id;
        let node = &self.device.node;

        let mut channel = match io.open_report(self.device) {
            Ok(channel) => channel,
            Err(e) => return self.fail(e),
        };

        if let Some(query) = self.query {
            if let Err(e) = channel.write_report(query) {
                return self.fail(e);
            }
            debug!(sensor = %id, len = query.len(), "Sent report query");
        }

        let mut buf = vec![0u8; self.report_size];
        loop {
            if cancel.is_cancelled() {
                return ReadOutcome::Cancelled;
            }
            if deadline.is_expired() {
                let timeout = AcquisitionError::CaptureTimeout { path: node.clone() };
                debug!(sensor = %id, "{}", timeout);
                self.store.record_diagnostic(id, timeout.to_string());
                return ReadOutcome::Timeout;
            }

            match channel.read_report(&mut buf, deadline.bounded(self.poll_interval)) {
                Ok(Some(n)) => {
                    let report = RawReport::new(&buf[..n], now_millis());
                    return self.decode(&report);
                }
                Ok(None) => {}
                Err(e) if e.is_timeout() => {}
                Err(e) => return self.fail(e),
            }
        }
    }

    fn decode(&self, report: &RawReport) -> ReadOutcome {
        let id = &self.device.id;
        match self.decoder.decode(report) {
            Ok(decoded) => {
                if decoded.is_fallback() {
                    info!(
                        sensor = %id,
                        candidate = %decoded.candidate,
                        rank = decoded.rank,
                        raw = %report.hex(),
                        "Report decoded by fallback candidate"
                    );
                }
                self.store.update(id, SensorEvent::Reading(decoded.reading));
                ReadOutcome::Decoded {
                    candidate: decoded.candidate,
                    rank: decoded.rank,
                }
            }
            Err(failure) => {
                let text = failure.to_string();
                warn!(sensor = %id, "{}", text);
                self.store.record_diagnostic(id, text.clone());
                ReadOutcome::Implausible(text)
            }
        }
    }

    fn fail(&self, err: AcquisitionError) -> ReadOutcome {
        warn!(sensor = %self.device.id, node = ?self.device.node, error = %err, "Binary read failed");
        let reason = err.to_string();
        self.store.update(&self.device.id, SensorEvent::Error(reason.clone()));
        ReadOutcome::Failed(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::report::DEFAULT_QUERY;
    use crate::data::{Capability, SensorStatus};
    use crate::hw::{ScriptedDevice, ScriptedDevices};
    use std::path::PathBuf;

    const NODE: &str = "/dev/hidraw2";

    fn device() -> SensorDevice {
        SensorDevice {
            id: SensorId::new("th-bin"),
            name: "TEMPerHUM".to_string(),
            node: PathBuf::from(NODE),
            phys: String::new(),
            capability: Capability::Binary,
            vendor_id: Some(0x0c45),
            product_id: Some(0x7401),
        }
    }

    fn run(io: &ScriptedDevices, store: &SensorStateStore) -> ReadSummary {
        let device = device();
        let decoder = BinaryDecoder::default();
        store.begin_cycle(std::slice::from_ref(&device));
        BinaryReadWorker::new(&device, &decoder, store, 8)
            .with_query(Some(&DEFAULT_QUERY))
            .with_poll_interval(Duration::from_millis(5))
            .run(io, Deadline::after(Duration::from_millis(40)), &CancelToken::new())
    }

    #[test]
    fn test_plausible_report_is_stored() {
        let io = ScriptedDevices::new().with_device(
            ScriptedDevice::binary("TEMPerHUM", NODE).report(&[0x80, 0x80, 0x0B, 0x8A, 0x0F, 0x76, 0x00, 0x00]),
        );
        let store = SensorStateStore::new();
        let summary = run(&io, &store);

        assert_eq!(
            summary.outcome,
            ReadOutcome::Decoded {
                candidate: "be16_centi".to_string(),
                rank: 0
            }
        );
        let state = store.snapshot(&SensorId::new("th-bin")).unwrap();
        assert_eq!(state.status, SensorStatus::On);
        assert_eq!(state.current_reading.unwrap().raw_source(), "80 80 0B 8A 0F 76 00 00");
        assert_eq!(io.probe(NODE).unwrap().writes, vec![DEFAULT_QUERY.to_vec()]);
    }

    #[test]
    fn test_implausible_report_keeps_status() {
        let io = ScriptedDevices::new().with_device(ScriptedDevice::binary("TEMPerHUM", NODE).report(&[0xFF; 8]));
        let store = SensorStateStore::new();
        let summary = run(&io, &store);

        assert!(matches!(summary.outcome, ReadOutcome::Implausible(_)));
        let state = store.snapshot(&SensorId::new("th-bin")).unwrap();
        assert_eq!(state.status, SensorStatus::Off);
        assert!(state.diagnostic.unwrap().contains("FF FF FF FF FF FF FF FF"));
    }

    #[test]
    fn test_silence_is_timeout() {
        let io = ScriptedDevices::new().with_device(ScriptedDevice::binary("TEMPerHUM", NODE));
        let store = SensorStateStore::new();
        let summary = run(&io, &store);

        assert_eq!(summary.outcome, ReadOutcome::Timeout);
        let state = store.snapshot(&SensorId::new("th-bin")).unwrap();
        assert_eq!(state.status, SensorStatus::Off);
        assert!(state.diagnostic.is_some());
    }

    #[test]
    fn test_access_denied_marks_error() {
        let io = ScriptedDevices::new().with_device(ScriptedDevice::binary("TEMPerHUM", NODE).deny_access());
        let store = SensorStateStore::new();
        let summary = run(&io, &store);

        assert!(matches!(summary.outcome, ReadOutcome::Failed(_)));
        let state = store.snapshot(&SensorId::new("th-bin")).unwrap();
        assert_eq!(state.status, SensorStatus::Error);
    }
}
