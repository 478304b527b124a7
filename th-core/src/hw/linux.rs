//! Linux device backend
//!
//! - **Enumeration**: `/sys/class/input/event*` for keystroke interfaces and
//!   `/sys/class/hidraw/hidraw*` for raw report interfaces
//! - **Text I/O**: `/dev/input/eventN` (poll, read, write, `EVIOCGRAB`)
//! - **Report I/O**: `/dev/hidrawN` (poll, read, write)
//!
//! Both roots are configurable so enumeration can run against a fake tree.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::mem;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, trace, warn};

use crate::constants::{input, paths};
use crate::data::{Capability, DeviceCandidate, SensorDevice};
use crate::error::{AcquisitionError, Result};
use crate::hw::{DeviceIo, KeyEvent, ReportChannel, TextChannel};

/// Device access through sysfs and `/dev`
#[derive(Debug, Clone)]
pub struct LinuxDevices {
    sys_root: PathBuf,
    dev_root: PathBuf,
}

impl Default for LinuxDevices {
    fn default() -> Self {
        Self::new()
    }
}

impl LinuxDevices {
    pub fn new() -> Self {
        Self::with_roots(paths::SYSFS_ROOT, paths::DEV_ROOT)
    }

    pub fn with_roots(sys_root: impl Into<PathBuf>, dev_root: impl Into<PathBuf>) -> Self {
        Self {
            sys_root: sys_root.into(),
            dev_root: dev_root.into(),
        }
    }

    fn enumerate_input(&self) -> Result<Vec<DeviceCandidate>> {
        let class = self.sys_root.join(paths::INPUT_CLASS);
        let mut found = Vec::new();

        for entry in class_entries(&class, "event")? {
            let device = entry.join("device");
            let Some(name) = read_attr(&device.join("name")) else {
                trace!("Skipped {:?} (no name)", entry);
                continue;
            };
            let Some(node_name) = entry.file_name() else {
                continue;
            };

            found.push(DeviceCandidate {
                name,
                node: self.dev_root.join(paths::INPUT_DEV_DIR).join(node_name),
                phys: read_attr(&device.join("phys")).unwrap_or_default(),
                capability: Capability::Text,
                vendor_id: read_attr(&device.join("id/vendor")).and_then(|v| parse_hex_u16(&v)),
                product_id: read_attr(&device.join("id/product")).and_then(|v| parse_hex_u16(&v)),
            });
        }
        Ok(found)
    }

    fn enumerate_hidraw(&self) -> Result<Vec<DeviceCandidate>> {
        let class = self.sys_root.join(paths::HIDRAW_CLASS);
        let mut found = Vec::new();

        for entry in class_entries(&class, "hidraw")? {
            let Some(uevent) = read_attr(&entry.join("device/uevent")) else {
                trace!("Skipped {:?} (no uevent)", entry);
                continue;
            };
            if has_input_child(&entry.join("device")) {
                trace!("Skipped {:?} (keyboard interface)", entry);
                continue;
            }
            let Some(node_name) = entry.file_name() else {
                continue;
            };

            let mut name = String::new();
            let mut phys = String::new();
            let mut ids = None;
            for line in uevent.lines() {
                match line.split_once('=') {
                    Some(("HID_NAME", value)) => name = value.trim().to_string(),
                    Some(("HID_PHYS", value)) => phys = value.trim().to_string(),
                    Some(("HID_ID", value)) => ids = parse_hid_id(value.trim()),
                    _ => {}
                }
            }

            found.push(DeviceCandidate {
                name,
                node: self.dev_root.join(node_name),
                phys,
                capability: Capability::Binary,
                vendor_id: ids.map(|(v, _)| v),
                product_id: ids.map(|(_, p)| p),
            });
        }
        Ok(found)
    }
}

impl DeviceIo for LinuxDevices {
    fn enumerate(&self) -> Result<Vec<DeviceCandidate>> {
        let mut candidates = self.enumerate_input()?;
        candidates.extend(self.enumerate_hidraw()?);
        debug!(
            sys_root = ?self.sys_root,
            candidates = candidates.len(),
            "Scanned input and hidraw classes"
        );
        Ok(candidates)
    }

    fn open_text(&self, device: &SensorDevice) -> Result<Box<dyn TextChannel>> {
        Ok(Box::new(EventDevice::open(&device.node)?))
    }

    fn open_report(&self, device: &SensorDevice) -> Result<Box<dyn ReportChannel>> {
        Ok(Box::new(HidrawDevice::open(&device.node)?))
    }
}

/// Entries of a sysfs class directory whose name starts with `prefix`
///
/// A missing class directory means the subsystem is absent, not an error.
fn class_entries(class: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(class) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!("Device class {:?} not present", class);
            return Ok(Vec::new());
        }
        Err(e) => return Err(AcquisitionError::enumeration(class, e)),
    };

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with(prefix))
                .unwrap_or(false)
        })
        .collect();
    paths.sort();
    Ok(paths)
}

/// Whether a HID device is bound to the input layer
///
/// Such an interface already delivers keystrokes through an event node.
/// Its raw reports are keyboard reports, not measurements.
fn has_input_child(hid_device: &Path) -> bool {
    fs::read_dir(hid_device.join("input"))
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .any(|e| e.file_name().to_string_lossy().starts_with("input"))
        })
        .unwrap_or(false)
}

fn read_attr(path: &Path) -> Option<String> {
    fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn parse_hex_u16(value: &str) -> Option<u16> {
    u16::from_str_radix(value.trim().trim_start_matches("0x"), 16).ok()
}

/// Parse `HID_ID` (`bus:vendor:product`, e.g. `0003:00000C45:00007401`)
fn parse_hid_id(value: &str) -> Option<(u16, u16)> {
    let mut parts = value.split(':');
    let _bus = parts.next()?;
    let vendor = u32::from_str_radix(parts.next()?, 16).ok()?;
    let product = u32::from_str_radix(parts.next()?, 16).ok()?;
    Some((u16::try_from(vendor).ok()?, u16::try_from(product).ok()?))
}

/// Open read-write, falling back to read-only when writing is refused
fn open_node(node: &Path) -> Result<File> {
    let open = |write: bool| {
        OpenOptions::new()
            .read(true)
            .write(write)
            .custom_flags(libc::O_NONBLOCK | libc::O_CLOEXEC)
            .open(node)
    };
    match open(true) {
        Ok(file) => Ok(file),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            debug!("Opening {:?} read-only: {}", node, e);
            open(false).map_err(|e| AcquisitionError::from_io(node, e))
        }
        Err(e) => Err(AcquisitionError::from_io(node, e)),
    }
}

/// Wait until `file` is readable; `false` on timeout
fn wait_readable(file: &File, node: &Path, timeout: Duration) -> Result<bool> {
    let mut pfd = libc::pollfd {
        fd: file.as_raw_fd(),
        events: libc::POLLIN,
        revents: 0,
    };
    let timeout_ms = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;

    // SAFETY: poll is safe when:
    // 1. pfd points to one valid, initialized pollfd - it lives on this stack frame
    // 2. nfds matches the number of entries (1)
    // 3. the fd stays open for the duration of the call - borrowed from `file`
    let ready = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };

    if ready < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(false);
        }
        return Err(AcquisitionError::from_io(node, err));
    }
    if ready == 0 {
        return Ok(false);
    }
    if pfd.revents & (libc::POLLHUP | libc::POLLERR | libc::POLLNVAL) != 0 && pfd.revents & libc::POLLIN == 0 {
        return Err(AcquisitionError::disconnected(node, "device hung up"));
    }
    Ok(true)
}

const EVENT_SIZE: usize = mem::size_of::<libc::input_event>();

/// Decode the type/code/value tail of a kernel `input_event`
fn decode_event(buf: &[u8; EVENT_SIZE]) -> KeyEvent {
    let tail = &buf[EVENT_SIZE - 8..];
    KeyEvent {
        kind: u16::from_ne_bytes([tail[0], tail[1]]),
        code: u16::from_ne_bytes([tail[2], tail[3]]),
        value: i32::from_ne_bytes([tail[4], tail[5], tail[6], tail[7]]),
    }
}

/// Encode an event with a zero timestamp (the kernel stamps injected events)
fn encode_event(event: KeyEvent) -> [u8; EVENT_SIZE] {
    let mut buf = [0u8; EVENT_SIZE];
    let tail = &mut buf[EVENT_SIZE - 8..];
    tail[0..2].copy_from_slice(&event.kind.to_ne_bytes());
    tail[2..4].copy_from_slice(&event.code.to_ne_bytes());
    tail[4..8].copy_from_slice(&event.value.to_ne_bytes());
    buf
}

/// An open `/dev/input/eventN` node
pub struct EventDevice {
    file: File,
    node: PathBuf,
    grabbed: bool,
}

impl EventDevice {
    pub fn open(node: &Path) -> Result<Self> {
        let file = open_node(node)?;
        debug!("Opened input device {:?}", node);
        Ok(Self {
            file,
            node: node.to_path_buf(),
            grabbed: false,
        })
    }

    fn set_grab(&mut self, grab: bool) -> Result<()> {
        // SAFETY: ioctl(EVIOCGRAB) is safe when:
        // 1. the fd is a valid evdev descriptor - owned by `self.file`
        // 2. the argument is passed by value as an int, as the request expects
        // It only toggles exclusive delivery of this device's events.
        let rc = unsafe {
            libc::ioctl(
                self.file.as_raw_fd(),
                input::EVIOCGRAB as _,
                libc::c_int::from(grab),
            )
        };
        if rc < 0 {
            return Err(AcquisitionError::from_io(&self.node, io::Error::last_os_error()));
        }
        self.grabbed = grab;
        Ok(())
    }
}

impl TextChannel for EventDevice {
    fn grab(&mut self) -> Result<()> {
        self.set_grab(true)
    }

    fn release(&mut self) -> Result<()> {
        if !self.grabbed {
            return Ok(());
        }
        self.set_grab(false)
    }

    fn next_key(&mut self, timeout: Duration) -> Result<Option<KeyEvent>> {
        if !wait_readable(&self.file, &self.node, timeout)? {
            return Ok(None);
        }

        let mut buf = [0u8; EVENT_SIZE];
        match self.file.read(&mut buf) {
            Ok(n) if n == EVENT_SIZE => Ok(Some(decode_event(&buf))),
            Ok(0) => Err(AcquisitionError::disconnected(&self.node, "end of event stream")),
            Ok(n) => Err(AcquisitionError::disconnected(
                &self.node,
                format!("short event read ({} bytes)", n),
            )),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(None),
            Err(e) => Err(AcquisitionError::from_io(&self.node, e)),
        }
    }

    fn inject_key(&mut self, event: KeyEvent) -> Result<()> {
        self.file
            .write_all(&encode_event(event))
            .map_err(|e| AcquisitionError::from_io(&self.node, e))
    }
}

impl Drop for EventDevice {
    fn drop(&mut self) {
        if self.grabbed {
            if let Err(e) = self.set_grab(false) {
                warn!("Failed to release {:?} on close: {}", self.node, e);
            }
        }
    }
}

/// An open `/dev/hidrawN` node
pub struct HidrawDevice {
    file: File,
    node: PathBuf,
}

impl HidrawDevice {
    pub fn open(node: &Path) -> Result<Self> {
        let file = open_node(node)?;
        debug!("Opened hidraw device {:?}", node);
        Ok(Self {
            file,
            node: node.to_path_buf(),
        })
    }
}

impl ReportChannel for HidrawDevice {
    fn write_report(&mut self, bytes: &[u8]) -> Result<()> {
        self.file
            .write_all(bytes)
            .map_err(|e| AcquisitionError::from_io(&self.node, e))
    }

    fn read_report(&mut self, buf: &mut [u8], timeout: Duration) -> Result<Option<usize>> {
        if !wait_readable(&self.file, &self.node, timeout)? {
            return Ok(None);
        }
        match self.file.read(buf) {
            Ok(0) => Err(AcquisitionError::disconnected(&self.node, "end of report stream")),
            Ok(n) => Ok(Some(n)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(None),
            Err(e) => Err(AcquisitionError::from_io(&self.node, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn fake_sysfs() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "class/input/event3/device/name", "PCsensor TEMPerHUM\n");
        write(root, "class/input/event3/device/phys", "usb-0000:00:14.0-2/input0\n");
        write(root, "class/input/event3/device/id/vendor", "413d\n");
        write(root, "class/input/event3/device/id/product", "2107\n");
        write(root, "class/input/input7/name", "not an event node\n");
        write(root, "class/input/mouse0/device/name", "Mouse\n");
        write(
            root,
            "class/hidraw/hidraw1/device/uevent",
            "DRIVER=hid-generic\nHID_ID=0003:00000C45:00007401\nHID_NAME=RDing TEMPerV1.4\nHID_PHYS=usb-0000:00:14.0-3/input1\n",
        );
        // Keyboard interface of the same sensor; its reports are keystrokes
        write(
            root,
            "class/hidraw/hidraw0/device/uevent",
            "DRIVER=hid-generic\nHID_ID=0003:0000413D:00002107\nHID_NAME=PCsensor TEMPerHUM\nHID_PHYS=usb-0000:00:14.0-2/input0\n",
        );
        write(root, "class/hidraw/hidraw0/device/input/input5/name", "PCsensor TEMPerHUM\n");
        dir
    }

    #[test]
    fn test_enumerate_fake_sysfs() {
        let sys = fake_sysfs();
        let io = LinuxDevices::with_roots(sys.path(), "/dev");
        let candidates = io.enumerate().unwrap();

        assert_eq!(candidates.len(), 2);
        let event = &candidates[0];
        assert_eq!(event.name, "PCsensor TEMPerHUM");
        assert_eq!(event.node, PathBuf::from("/dev/input/event3"));
        assert_eq!(event.capability, Capability::Text);
        assert_eq!((event.vendor_id, event.product_id), (Some(0x413d), Some(0x2107)));

        let hidraw = &candidates[1];
        assert_eq!(hidraw.name, "RDing TEMPerV1.4");
        assert_eq!(hidraw.node, PathBuf::from("/dev/hidraw1"));
        assert_eq!(hidraw.phys, "usb-0000:00:14.0-3/input1");
        assert_eq!(hidraw.capability, Capability::Binary);
        assert_eq!((hidraw.vendor_id, hidraw.product_id), (Some(0x0c45), Some(0x7401)));
        assert!(!candidates.iter().any(|c| c.node == Path::new("/dev/hidraw0")));
    }

    #[test]
    fn test_unreadable_class_is_cycle_level() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "class/input", "not a directory\n");
        let io = LinuxDevices::with_roots(dir.path(), "/dev");

        let err = io.enumerate().unwrap_err();
        assert!(matches!(err, AcquisitionError::EnumerationFailed { .. }));
        assert!(!err.is_per_device());
    }

    #[test]
    fn test_missing_classes_yield_empty_list() {
        let dir = TempDir::new().unwrap();
        let io = LinuxDevices::with_roots(dir.path(), "/dev");
        assert!(io.enumerate().unwrap().is_empty());
    }

    #[test]
    fn test_parse_hid_id() {
        assert_eq!(parse_hid_id("0003:00000C45:00007401"), Some((0x0c45, 0x7401)));
        assert_eq!(parse_hid_id("0003:00000C45"), None);
        assert_eq!(parse_hid_id("0003:FFFFFFFF:00000001"), None);
    }

    #[test]
    fn test_event_layout() {
        let event = KeyEvent::press(input::KEY_NUMLOCK);
        let buf = encode_event(event);
        assert!(buf[..EVENT_SIZE - 8].iter().all(|&b| b == 0));
        assert_eq!(decode_event(&buf), event);
    }

    #[test]
    fn test_open_missing_node_is_disconnected() {
        let dir = TempDir::new().unwrap();
        let err = EventDevice::open(&dir.path().join("event99")).err().unwrap();
        assert!(matches!(err, AcquisitionError::DeviceDisconnected { .. }));
    }

    #[test]
    fn test_hidraw_reads_regular_file() {
        let dir = TempDir::new().unwrap();
        let node = dir.path().join("hidraw0");
        fs::write(&node, [0x80, 0x80, 0x0B, 0x8A, 0x0F, 0x76, 0x00, 0x00]).unwrap();

        let mut device = HidrawDevice::open(&node).unwrap();
        let mut buf = [0u8; 8];
        let n = device.read_report(&mut buf, Duration::from_millis(10)).unwrap();
        assert_eq!(n, Some(8));
        assert_eq!(buf[3], 0x8A);
    }
}
