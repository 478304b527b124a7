//! In-memory device backend
//!
//! Replays scripted device behavior (typed lines, raw reports, stalls,
//! disconnects, refused access) through the same [`DeviceIo`] seam the Linux
//! backend implements. Scripts are consumed across opens, so a second cycle
//! sees whatever the first one left unread.
//!
//! Every device has a [`ScriptProbe`] recording what the engine did to it
//! (grabs, releases, injected keys, written queries).

use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::data::{Capability, DeviceCandidate, SensorDevice};
use crate::decode::keymap::key_events_for;
use crate::error::{AcquisitionError, Result};
use crate::hw::{DeviceIo, KeyEvent, ReportChannel, TextChannel};

/// One step of a device script
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptStep {
    Key(KeyEvent),
    Report(Vec<u8>),
    /// Device stays silent for this long
    Stall(Duration),
    /// Every following I/O fails as a disconnect
    Disconnect,
    /// The worker reading this step panics
    Panic,
}

/// What the engine did to a scripted device
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptProbe {
    pub opens: u32,
    pub grabs: u32,
    pub releases: u32,
    /// Whether exclusive access is currently held
    pub grabbed: bool,
    pub injected: Vec<KeyEvent>,
    /// Injected events sent while exclusive access was held
    pub injected_under_grab: usize,
    pub writes: Vec<Vec<u8>>,
}

/// Builder for one scripted device
#[derive(Debug, Clone)]
pub struct ScriptedDevice {
    candidate: DeviceCandidate,
    steps: Vec<ScriptStep>,
    deny_open: bool,
    reject_grab: bool,
    reject_injection: bool,
}

impl ScriptedDevice {
    fn new(name: &str, node: &str, capability: Capability) -> Self {
        Self {
            candidate: DeviceCandidate {
                name: name.to_string(),
                node: PathBuf::from(node),
                phys: format!("usb-scripted{}/input0", node.replace('/', "-")),
                capability,
                vendor_id: None,
                product_id: None,
            },
            steps: Vec::new(),
            deny_open: false,
            reject_grab: false,
            reject_injection: false,
        }
    }

    /// A keystroke-emulation interface
    pub fn text(name: &str, node: &str) -> Self {
        Self::new(name, node, Capability::Text)
    }

    /// A raw report interface
    pub fn binary(name: &str, node: &str) -> Self {
        Self::new(name, node, Capability::Binary)
    }

    pub fn with_ids(mut self, vendor_id: u16, product_id: u16) -> Self {
        self.candidate.vendor_id = Some(vendor_id);
        self.candidate.product_id = Some(product_id);
        self
    }

    pub fn with_phys(mut self, phys: &str) -> Self {
        self.candidate.phys = phys.to_string();
        self
    }

    /// Type `text` on a US layout; `\n` presses Enter
    pub fn typing(mut self, text: &str) -> Self {
        self.steps
            .extend(key_events_for(text).into_iter().map(ScriptStep::Key));
        self
    }

    pub fn key(mut self, event: KeyEvent) -> Self {
        self.steps.push(ScriptStep::Key(event));
        self
    }

    pub fn report(mut self, bytes: &[u8]) -> Self {
        self.steps.push(ScriptStep::Report(bytes.to_vec()));
        self
    }

    pub fn stall(mut self, duration: Duration) -> Self {
        self.steps.push(ScriptStep::Stall(duration));
        self
    }

    pub fn then_disconnect(mut self) -> Self {
        self.steps.push(ScriptStep::Disconnect);
        self
    }

    pub fn then_panic(mut self) -> Self {
        self.steps.push(ScriptStep::Panic);
        self
    }

    /// Opening the node fails with a permission error
    pub fn deny_access(mut self) -> Self {
        self.deny_open = true;
        self
    }

    /// Exclusive access is refused (device busy)
    pub fn reject_grab(mut self) -> Self {
        self.reject_grab = true;
        self
    }

    /// Writing into the input channel fails
    pub fn reject_injection(mut self) -> Self {
        self.reject_injection = true;
        self
    }
}

struct Entry {
    candidate: DeviceCandidate,
    steps: Arc<Mutex<VecDeque<ScriptStep>>>,
    probe: Arc<Mutex<ScriptProbe>>,
    deny_open: bool,
    reject_grab: bool,
    reject_injection: bool,
}

impl Entry {
    fn from_device(device: ScriptedDevice) -> Self {
        Self {
            candidate: device.candidate,
            steps: Arc::new(Mutex::new(device.steps.into())),
            probe: Arc::new(Mutex::new(ScriptProbe::default())),
            deny_open: device.deny_open,
            reject_grab: device.reject_grab,
            reject_injection: device.reject_injection,
        }
    }
}

/// Scripted [`DeviceIo`] backend
#[derive(Default)]
pub struct ScriptedDevices {
    entries: RwLock<Vec<Entry>>,
}

impl ScriptedDevices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(self, device: ScriptedDevice) -> Self {
        self.plug(device);
        self
    }

    /// Attach a device, replacing any device on the same node
    pub fn plug(&self, device: ScriptedDevice) {
        let mut entries = self.entries.write();
        entries.retain(|e| e.candidate.node != device.candidate.node);
        entries.push(Entry::from_device(device));
    }

    /// Detach the device on `node`; returns whether one was attached
    pub fn unplug(&self, node: impl AsRef<Path>) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|e| e.candidate.node != node.as_ref());
        entries.len() != before
    }

    /// Append steps to an attached device's script
    pub fn extend_script(&self, node: impl AsRef<Path>, steps: impl IntoIterator<Item = ScriptStep>) {
        if let Some(entry) = self.entries.read().iter().find(|e| e.candidate.node == node.as_ref()) {
            entry.steps.lock().extend(steps);
        }
    }

    /// Copy of what the engine did to the device on `node`
    pub fn probe(&self, node: impl AsRef<Path>) -> Option<ScriptProbe> {
        self.entries
            .read()
            .iter()
            .find(|e| e.candidate.node == node.as_ref())
            .map(|e| e.probe.lock().clone())
    }

    fn open<T>(&self, device: &SensorDevice, build: impl FnOnce(&Entry) -> T) -> Result<T> {
        let entries = self.entries.read();
        let entry = entries
            .iter()
            .find(|e| e.candidate.node == device.node)
            .ok_or_else(|| {
                AcquisitionError::from_io(&device.node, io::Error::from_raw_os_error(libc::ENOENT))
            })?;
        if entry.deny_open {
            return Err(AcquisitionError::from_io(
                &device.node,
                io::Error::from_raw_os_error(libc::EACCES),
            ));
        }
        entry.probe.lock().opens += 1;
        Ok(build(entry))
    }
}

impl DeviceIo for ScriptedDevices {
    fn enumerate(&self) -> Result<Vec<DeviceCandidate>> {
        Ok(self.entries.read().iter().map(|e| e.candidate.clone()).collect())
    }

    fn open_text(&self, device: &SensorDevice) -> Result<Box<dyn TextChannel>> {
        self.open(device, |entry| {
            Box::new(ScriptedChannel::new(device.node.clone(), entry)) as Box<dyn TextChannel>
        })
    }

    fn open_report(&self, device: &SensorDevice) -> Result<Box<dyn ReportChannel>> {
        self.open(device, |entry| {
            Box::new(ScriptedChannel::new(device.node.clone(), entry)) as Box<dyn ReportChannel>
        })
    }
}

/// Outcome of advancing a script
enum Next<T> {
    Item(T),
    Idle,
}

/// Open handle on a scripted device
///
/// Dropping it does not release a held grab, so a missing release shows up
/// in the probe.
struct ScriptedChannel {
    node: PathBuf,
    steps: Arc<Mutex<VecDeque<ScriptStep>>>,
    probe: Arc<Mutex<ScriptProbe>>,
    reject_grab: bool,
    reject_injection: bool,
}

impl ScriptedChannel {
    fn new(node: PathBuf, entry: &Entry) -> Self {
        Self {
            node,
            steps: Arc::clone(&entry.steps),
            probe: Arc::clone(&entry.probe),
            reject_grab: entry.reject_grab,
            reject_injection: entry.reject_injection,
        }
    }

    fn disconnected(&self) -> AcquisitionError {
        AcquisitionError::from_io(&self.node, io::Error::from_raw_os_error(libc::ENODEV))
    }

    fn is_disconnected(&self) -> bool {
        matches!(self.steps.lock().front(), Some(ScriptStep::Disconnect))
    }

    /// Advance the script until `pick` accepts a step or `timeout` is spent
    fn advance<T>(
        &self,
        timeout: Duration,
        mut pick: impl FnMut(ScriptStep) -> Option<T>,
    ) -> Result<Next<T>> {
        let mut budget = timeout;
        loop {
            let step = {
                let mut steps = self.steps.lock();
                match steps.front() {
                    Some(ScriptStep::Disconnect) => return Err(self.disconnected()),
                    None => None,
                    Some(_) => steps.pop_front(),
                }
            };

            match step {
                None => {
                    thread::sleep(budget);
                    return Ok(Next::Idle);
                }
                Some(ScriptStep::Stall(duration)) if duration > budget => {
                    thread::sleep(budget);
                    self.steps.lock().push_front(ScriptStep::Stall(duration - budget));
                    return Ok(Next::Idle);
                }
                Some(ScriptStep::Stall(duration)) => {
                    thread::sleep(duration);
                    budget -= duration;
                }
                Some(ScriptStep::Panic) => panic!("scripted fault on {}", self.node.display()),
                Some(step) => {
                    if let Some(item) = pick(step) {
                        return Ok(Next::Item(item));
                    }
                }
            }
        }
    }
}

impl TextChannel for ScriptedChannel {
    fn grab(&mut self) -> Result<()> {
        if self.is_disconnected() {
            return Err(self.disconnected());
        }
        if self.reject_grab {
            return Err(AcquisitionError::from_io(
                &self.node,
                io::Error::from_raw_os_error(libc::EBUSY),
            ));
        }
        let mut probe = self.probe.lock();
        probe.grabs += 1;
        probe.grabbed = true;
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        let mut probe = self.probe.lock();
        if probe.grabbed {
            probe.releases += 1;
            probe.grabbed = false;
        }
        Ok(())
    }

    fn next_key(&mut self, timeout: Duration) -> Result<Option<KeyEvent>> {
        let next = self.advance(timeout, |step| match step {
            ScriptStep::Key(event) => Some(event),
            _ => None,
        })?;
        Ok(match next {
            Next::Item(event) => Some(event),
            Next::Idle => None,
        })
    }

    fn inject_key(&mut self, event: KeyEvent) -> Result<()> {
        if self.is_disconnected() {
            return Err(self.disconnected());
        }
        if self.reject_injection {
            return Err(AcquisitionError::from_io(
                &self.node,
                io::Error::from_raw_os_error(libc::EPERM),
            ));
        }
        let mut probe = self.probe.lock();
        if probe.grabbed {
            probe.injected_under_grab += 1;
        }
        probe.injected.push(event);
        Ok(())
    }
}

impl ReportChannel for ScriptedChannel {
    fn write_report(&mut self, bytes: &[u8]) -> Result<()> {
        if self.is_disconnected() {
            return Err(self.disconnected());
        }
        self.probe.lock().writes.push(bytes.to_vec());
        Ok(())
    }

    fn read_report(&mut self, buf: &mut [u8], timeout: Duration) -> Result<Option<usize>> {
        let next = self.advance(timeout, |step| match step {
            ScriptStep::Report(bytes) => Some(bytes),
            _ => None,
        })?;
        Ok(match next {
            Next::Item(bytes) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                Some(n)
            }
            Next::Idle => None,
        })
    }
}
