//! Device I/O capability
//!
//! The engine never talks to the OS directly. Everything it needs from a
//! device is behind these traits, so the same workers run against
//! `/dev/input` + `/dev/hidraw` on Linux and against scripted devices in
//! tests. Dropping a channel closes it.

use std::time::Duration;

use crate::constants::input::{EV_KEY, EV_SYN, KEY_PRESSED, KEY_RELEASED, SYN_REPORT};
use crate::data::{DeviceCandidate, SensorDevice};
use crate::error::Result;

/// One input event, as delivered by the kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    /// Event type (EV_KEY, EV_SYN, ...)
    pub kind: u16,
    pub code: u16,
    pub value: i32,
}

impl KeyEvent {
    pub const fn press(code: u16) -> Self {
        Self {
            kind: EV_KEY,
            code,
            value: KEY_PRESSED,
        }
    }

    pub const fn release(code: u16) -> Self {
        Self {
            kind: EV_KEY,
            code,
            value: KEY_RELEASED,
        }
    }

    pub const fn sync() -> Self {
        Self {
            kind: EV_SYN,
            code: SYN_REPORT,
            value: 0,
        }
    }
}

/// Keystroke-emulation interface of a sensor
#[cfg_attr(test, mockall::automock)]
pub trait TextChannel: Send {
    /// Take exclusive access so events are not delivered elsewhere
    fn grab(&mut self) -> Result<()>;

    /// Give exclusive access back; a no-op when not grabbed
    fn release(&mut self) -> Result<()>;

    /// Wait at most `timeout` for the next event
    fn next_key(&mut self, timeout: Duration) -> Result<Option<KeyEvent>>;

    /// Write an event into the device's input channel
    fn inject_key(&mut self, event: KeyEvent) -> Result<()>;
}

/// Raw fixed-size report interface of a sensor
pub trait ReportChannel: Send {
    fn write_report(&mut self, bytes: &[u8]) -> Result<()>;

    /// Wait at most `timeout` for one report; returns the byte count
    fn read_report(&mut self, buf: &mut [u8], timeout: Duration) -> Result<Option<usize>>;
}

/// OS device access used by the engine
pub trait DeviceIo: Send + Sync {
    /// List every device node that could be a sensor
    fn enumerate(&self) -> Result<Vec<DeviceCandidate>>;

    fn open_text(&self, device: &SensorDevice) -> Result<Box<dyn TextChannel>>;

    fn open_report(&self, device: &SensorDevice) -> Result<Box<dyn ReportChannel>>;
}
