//! Keystroke capture worker
//!
//! One worker per keyboard-mode sensor. It moves through
//! `Idle → Capturing → Draining → Stopped`:
//!
//! - **Idle**: the channel is open; the activation gesture is sent here,
//!   before the grab, so the host keyboard handler still sees the key
//! - **Capturing**: exclusive access is held, key events are translated and
//!   completed lines parsed
//! - **Draining**: the deadline passed, the device failed or the cycle was
//!   cancelled; a partial line is discarded
//! - **Stopped**: exclusive access has been released
//!
//! Exclusive access lives in a [`GrabGuard`], so it is released on every
//! exit path including unwinding.

use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::data::{SensorDevice, SensorId};
use crate::decode::{KeyOutput, KeyTranslator, LineEvent, LineParser};
use crate::engine::{CancelToken, Deadline, SensorEvent, SensorStateStore};
use crate::error::Result;
use crate::hw::{Activator, DeviceIo, TextChannel};

/// Lifecycle state of a capture worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Capturing,
    Draining,
    Stopped,
}

/// Why a worker stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureExit {
    /// The cycle deadline passed (normal end)
    Deadline,
    Cancelled,
    /// The device could not be opened or failed mid-capture
    Failed(String),
}

/// Characters typed since the last line terminator
#[derive(Debug, Default)]
pub struct CaptureBuffer {
    chars: String,
}

impl CaptureBuffer {
    pub fn push(&mut self, ch: char) {
        self.chars.push(ch);
    }

    /// Take the trimmed content, leaving the buffer empty
    pub fn take_line(&mut self) -> String {
        let line = self.chars.trim().to_string();
        self.chars.clear();
        line
    }

    pub fn clear(&mut self) {
        self.chars.clear();
    }

    pub fn as_str(&self) -> &str {
        &self.chars
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }
}

/// What one capture worker did
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSummary {
    pub sensor: SensorId,
    pub state: CaptureState,
    pub exit: CaptureExit,
    /// Completed lines, including empty and rejected ones
    pub lines: usize,
    pub readings: usize,
    pub banners: usize,
    pub rejected: usize,
    /// Activation failure, when the gesture could not be sent
    pub activation_error: Option<String>,
}

impl CaptureSummary {
    fn new(sensor: SensorId) -> Self {
        Self {
            sensor,
            state: CaptureState::Idle,
            exit: CaptureExit::Deadline,
            lines: 0,
            readings: 0,
            banners: 0,
            rejected: 0,
            activation_error: None,
        }
    }
}

/// Holds exclusive access for as long as it lives
pub struct GrabGuard<'c> {
    channel: &'c mut dyn TextChannel,
    node: &'c Path,
}

impl<'c> GrabGuard<'c> {
    pub fn acquire(channel: &'c mut dyn TextChannel, node: &'c Path) -> Result<Self> {
        channel.grab()?;
        debug!(node = ?node, "Grabbed input device");
        Ok(Self { channel, node })
    }

    pub fn channel(&mut self) -> &mut dyn TextChannel {
        &mut *self.channel
    }
}

impl Drop for GrabGuard<'_> {
    fn drop(&mut self) {
        match self.channel.release() {
            Ok(()) => debug!(node = ?self.node, "Released input device"),
            Err(e) => warn!(node = ?self.node, error = %e, "Failed to release input device"),
        }
    }
}

/// Capture worker for one keyboard-mode sensor
pub struct TextCaptureWorker<'a> {
    device: &'a SensorDevice,
    parser: &'a LineParser,
    store: &'a SensorStateStore,
    activation: Option<(Activator, Duration)>,
    poll_interval: Duration,
    state: CaptureState,
    buffer: CaptureBuffer,
    translator: KeyTranslator,
    summary: CaptureSummary,
}

impl<'a> TextCaptureWorker<'a> {
    pub fn new(device: &'a SensorDevice, parser: &'a LineParser, store: &'a SensorStateStore) -> Self {
        Self {
            device,
            parser,
            store,
            activation: None,
            poll_interval: crate::constants::timing::READ_POLL_INTERVAL,
            state: CaptureState::Idle,
            buffer: CaptureBuffer::default(),
            translator: KeyTranslator::new(),
            summary: CaptureSummary::new(device.id.clone()),
        }
    }

    /// Send the activation gesture before grabbing the device
    pub fn with_activation(mut self, activator: Activator, hold: Duration) -> Self {
        self.activation = Some((activator, hold));
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// Capture until the deadline, cancellation or a device failure
    pub fn run(mut self, io: &dyn DeviceIo, deadline: Deadline, cancel: &CancelToken) -> CaptureSummary {
        let device = self.device;
        let node = device.node.as_path();
        debug!(sensor = %device.id, node = ?node, "Starting text capture");

        let mut channel = match io.open_text(device) {
            Ok(channel) => channel,
            Err(e) => {
                self.fail(e.to_string());
                return self.finish();
            }
        };

        self.activate(channel.as_mut(), deadline, cancel);

        match GrabGuard::acquire(channel.as_mut(), node) {
            Ok(mut guard) => {
                self.state = CaptureState::Capturing;
                self.capture(&mut guard, deadline, cancel);
                self.state = CaptureState::Draining;
                self.drain();
            }
            Err(e) => self.fail(e.to_string()),
        }

        self.finish()
    }

    fn activate(&mut self, channel: &mut dyn TextChannel, deadline: Deadline, cancel: &CancelToken) {
        let Some((activator, hold)) = self.activation else {
            return;
        };
        let hold = deadline.bounded(hold);
        if let Err(e) = activator.activate(channel, &self.device.node, hold, cancel) {
            warn!(sensor = %self.device.id, error = %e, "Activation failed, capturing anyway");
            self.store.record_diagnostic(&self.device.id, e.to_string());
            self.summary.activation_error = Some(e.to_string());
        }
    }

    fn capture(&mut self, guard: &mut GrabGuard<'_>, deadline: Deadline, cancel: &CancelToken) {
        loop {
            if cancel.is_cancelled() {
                self.summary.exit = CaptureExit::Cancelled;
                return;
            }
            if deadline.is_expired() {
                self.summary.exit = CaptureExit::Deadline;
                return;
            }

            match guard.channel().next_key(deadline.bounded(self.poll_interval)) {
                Ok(Some(event)) => match self.translator.feed(event) {
                    Some(KeyOutput::Char(ch)) => self.buffer.push(ch),
                    Some(KeyOutput::Terminator) => {
                        let line = self.buffer.take_line();
                        self.handle_line(&line);
                    }
                    None => {}
                },
                Ok(None) => {}
                Err(e) if e.is_timeout() => {}
                Err(e) => {
                    self.fail(e.to_string());
                    return;
                }
            }
        }
    }

    fn handle_line(&mut self, line: &str) {
        self.summary.lines += 1;
        let id = &self.device.id;

        match self.parser.classify(line) {
            LineEvent::Reading(reading) => {
                debug!(
                    sensor = %id,
                    temperature = reading.temperature(),
                    humidity = reading.humidity(),
                    "Captured reading"
                );
                self.store.update(id, SensorEvent::Reading(reading));
                self.summary.readings += 1;
            }
            LineEvent::Banner(_) => {
                self.store.update(id, SensorEvent::Activity);
                self.summary.banners += 1;
            }
            LineEvent::Empty => {}
            LineEvent::Implausible { line, violation } => {
                self.store
                    .record_diagnostic(id, format!("{}: {}", violation, line));
                self.summary.rejected += 1;
            }
            rejected @ LineEvent::Unclassified(_) => {
                if let Some(e) = rejected.rejection() {
                    debug!(sensor = %id, error = %e, "Discarded line");
                }
                self.summary.rejected += 1;
            }
        }
    }

    fn drain(&mut self) {
        if !self.buffer.is_empty() {
            debug!(
                sensor = %self.device.id,
                partial = self.buffer.as_str(),
                "Discarding unterminated line"
            );
            self.buffer.clear();
        }
        self.translator.reset();
    }

    fn fail(&mut self, reason: String) {
        warn!(sensor = %self.device.id, node = ?self.device.node, %reason, "Text capture failed");
        self.store.update(&self.device.id, SensorEvent::Error(reason.clone()));
        self.summary.exit = CaptureExit::Failed(reason);
    }

    fn finish(mut self) -> CaptureSummary {
        self.state = CaptureState::Stopped;
        self.summary.state = self.state;
        info!(
            sensor = %self.device.id,
            lines = self.summary.lines,
            readings = self.summary.readings,
            exit = ?self.summary.exit,
            "Text capture finished"
        );
        self.summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::identity::BANNER_PATTERNS;
    use crate::constants::input::KEY_NUMLOCK;
    use crate::data::{Capability, SensorStatus};
    use crate::hw::{ScriptedDevice, ScriptedDevices};
    use std::path::PathBuf;

    const NODE: &str = "/dev/input/event3";

    fn device() -> SensorDevice {
        SensorDevice {
            id: SensorId::new("th-text"),
            name: "PCsensor TEMPerHUM".to_string(),
            node: PathBuf::from(NODE),
            phys: String::new(),
            capability: Capability::Text,
            vendor_id: None,
            product_id: None,
        }
    }

    fn run(io: &ScriptedDevices, store: &SensorStateStore, activate: bool) -> CaptureSummary {
        let device = device();
        let parser = LineParser::new(BANNER_PATTERNS).unwrap();
        store.begin_cycle(std::slice::from_ref(&device));
        let mut worker = TextCaptureWorker::new(&device, &parser, store)
            .with_poll_interval(Duration::from_millis(5));
        if activate {
            worker = worker.with_activation(Activator::new(KEY_NUMLOCK), Duration::from_millis(1));
        }
        worker.run(io, Deadline::after(Duration::from_millis(60)), &CancelToken::new())
    }

    #[test]
    fn test_capture_buffer_trims_and_clears() {
        let mut buffer = CaptureBuffer::default();
        for ch in "  21.5[C] ".chars() {
            buffer.push(ch);
        }
        assert_eq!(buffer.take_line(), "21.5[C]");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_lines_become_readings() {
        let io = ScriptedDevices::new().with_device(
            ScriptedDevice::text("PCsensor TEMPerHUM", NODE)
                .typing("WWW.PCSENSOR.COM\n")
                .typing("29.54[C]39.58[%RH]1S\n")
                .typing("29.60[C]39.50[%RH]1S\n"),
        );
        let store = SensorStateStore::new();
        let summary = run(&io, &store, true);

        assert_eq!(summary.exit, CaptureExit::Deadline);
        assert_eq!(summary.state, CaptureState::Stopped);
        assert_eq!((summary.lines, summary.readings, summary.banners), (3, 2, 1));

        let state = store.snapshot(&SensorId::new("th-text")).unwrap();
        assert_eq!(state.status, SensorStatus::On);
        assert_eq!(state.readings_count, 2);
        assert_eq!(state.current_reading.unwrap().temperature(), 29.60);

        let probe = io.probe(NODE).unwrap();
        assert!(!probe.grabbed);
        assert_eq!(probe.injected.len(), 4);
        assert_eq!(probe.injected_under_grab, 0);
        assert_eq!(probe.grabs, 1);
    }

    #[test]
    fn test_partial_line_is_discarded() {
        let io = ScriptedDevices::new()
            .with_device(ScriptedDevice::text("PCsensor TEMPerHUM", NODE).typing("29.54[C]39.5"));
        let store = SensorStateStore::new();
        let summary = run(&io, &store, false);

        assert_eq!(summary.lines, 0);
        let state = store.snapshot(&SensorId::new("th-text")).unwrap();
        assert_eq!(state.status, SensorStatus::Off);
        assert!(state.current_reading.is_none());
    }

    #[test]
    fn test_implausible_line_leaves_diagnostic_only() {
        let io = ScriptedDevices::new()
            .with_device(ScriptedDevice::text("PCsensor TEMPerHUM", NODE).typing("29.54[C]150.00[%RH]1S\n"));
        let store = SensorStateStore::new();
        let summary = run(&io, &store, false);

        assert_eq!(summary.rejected, 1);
        let state = store.snapshot(&SensorId::new("th-text")).unwrap();
        assert_eq!(state.readings_count, 0);
        assert!(state.diagnostic.unwrap().contains("150.00"));
    }

    #[test]
    fn test_disconnect_marks_error_and_releases() {
        let io = ScriptedDevices::new().with_device(
            ScriptedDevice::text("PCsensor TEMPerHUM", NODE)
                .typing("29.54[C]39.58[%RH]1S\n")
                .then_disconnect(),
        );
        let store = SensorStateStore::new();
        let summary = run(&io, &store, false);

        assert!(matches!(summary.exit, CaptureExit::Failed(_)));
        let state = store.snapshot(&SensorId::new("th-text")).unwrap();
        assert_eq!(state.status, SensorStatus::Error);
        assert_eq!(state.readings_count, 1);

        let probe = io.probe(NODE).unwrap();
        assert_eq!((probe.grabs, probe.releases), (1, 1));
        assert!(!probe.grabbed);
    }

    #[test]
    fn test_activation_failure_is_not_fatal() {
        let io = ScriptedDevices::new().with_device(
            ScriptedDevice::text("PCsensor TEMPerHUM", NODE)
                .reject_injection()
                .typing("29.54[C]39.58[%RH]1S\n"),
        );
        let store = SensorStateStore::new();
        let summary = run(&io, &store, true);

        assert!(summary.activation_error.is_some());
        assert_eq!(summary.readings, 1);
        let state = store.snapshot(&SensorId::new("th-text")).unwrap();
        assert_eq!(state.status, SensorStatus::On);
        assert!(state.diagnostic.is_some());
    }

    #[test]
    fn test_grab_refused_marks_error() {
        let io = ScriptedDevices::new()
            .with_device(ScriptedDevice::text("PCsensor TEMPerHUM", NODE).reject_grab());
        let store = SensorStateStore::new();
        let summary = run(&io, &store, true);

        assert!(matches!(summary.exit, CaptureExit::Failed(_)));
        let probe = io.probe(NODE).unwrap();
        assert_eq!(probe.grabs, 0);
        assert_eq!(probe.injected_under_grab, 0);
        assert_eq!(summary.state, CaptureState::Stopped);
    }

    #[test]
    fn test_cancel_stops_capture() {
        let io = ScriptedDevices::new()
            .with_device(ScriptedDevice::text("PCsensor TEMPerHUM", NODE).stall(Duration::from_secs(5)));
        let store = SensorStateStore::new();
        let device = device();
        store.begin_cycle(std::slice::from_ref(&device));
        let parser = LineParser::new(BANNER_PATTERNS).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();

        let summary = TextCaptureWorker::new(&device, &parser, &store)
            .run(&io, Deadline::after(Duration::from_secs(5)), &cancel);
        assert_eq!(summary.exit, CaptureExit::Cancelled);
        assert!(!io.probe(NODE).unwrap().grabbed);
    }
}
