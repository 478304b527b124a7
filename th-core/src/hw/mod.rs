//! Hardware access modules
//!
//! - `io` defines the device I/O seam the engine is written against
//! - `linux` implements it over sysfs, evdev and hidraw
//! - `scripted` implements it in memory for tests
//! - `locator` and `activation` drive discovery and the activation gesture

mod activation;
mod io;
mod linux;
mod locator;
mod scripted;

pub use activation::Activator;
pub use io::{DeviceIo, KeyEvent, ReportChannel, TextChannel};
#[cfg(test)]
pub use io::MockTextChannel;
pub use linux::{EventDevice, HidrawDevice, LinuxDevices};
pub use locator::{sensor_id_for, DeviceLocator};
pub use scripted::{ScriptProbe, ScriptStep, ScriptedDevice, ScriptedDevices};
