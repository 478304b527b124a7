//! Constants and default values for temperhum
//!
//! Centralizes the magic numbers of the acquisition engine: timing defaults,
//! plausibility bounds, Linux input-event codes and the identification
//! strings of the sensor family. Other modules refer to these by name.

use std::time::Duration;

/// System paths used by the Linux backend
pub mod paths {
    /// Root of sysfs
    pub const SYSFS_ROOT: &str = "/sys";

    /// Root of device nodes
    pub const DEV_ROOT: &str = "/dev";

    /// Input class directory, relative to the sysfs root
    pub const INPUT_CLASS: &str = "class/input";

    /// Hidraw class directory, relative to the sysfs root
    pub const HIDRAW_CLASS: &str = "class/hidraw";

    /// Input device node directory, relative to the dev root
    pub const INPUT_DEV_DIR: &str = "input";
}

/// Timing defaults for one acquisition cycle
pub mod timing {
    use super::*;

    /// Default wall-clock budget of a whole acquisition cycle
    pub const CYCLE_DEADLINE: Duration = Duration::from_secs(10);

    /// Observed working hold time for the activation key
    pub const ACTIVATION_HOLD: Duration = Duration::from_millis(1500);

    /// Granularity of the activation hold; cancellation is checked between slices
    pub const ACTIVATION_HOLD_SLICE: Duration = Duration::from_millis(20);

    /// Upper bound of a single blocking read; cancellation is checked between reads
    pub const READ_POLL_INTERVAL: Duration = Duration::from_millis(200);

    /// How often the scheduler looks at its workers while waiting
    pub const SCHEDULER_TICK: Duration = Duration::from_millis(20);
}

/// Plausibility bounds for accepted readings
pub mod plausibility {
    /// Lowest accepted temperature (°C)
    pub const TEMPERATURE_MIN: f64 = -50.0;

    /// Highest accepted temperature (°C)
    pub const TEMPERATURE_MAX: f64 = 100.0;

    /// Lowest accepted relative humidity (%RH)
    pub const HUMIDITY_MIN: f64 = 0.0;

    /// Highest accepted relative humidity (%RH)
    pub const HUMIDITY_MAX: f64 = 100.0;

    /// Shortest accepted sample interval (seconds)
    pub const INTERVAL_MIN_SECS: u32 = 1;

    /// Longest accepted sample interval (seconds)
    pub const INTERVAL_MAX_SECS: u32 = 86_400;
}

/// Binary report defaults
pub mod report {
    /// Default size of one raw report
    pub const DEFAULT_SIZE: usize = 8;

    /// Largest report size the engine accepts
    pub const MAX_SIZE: usize = 64;

    /// Query command understood by most TEMPer-family firmwares
    pub const DEFAULT_QUERY: [u8; 8] = [0x01, 0x80, 0x33, 0x01, 0x00, 0x00, 0x00, 0x00];
}

/// Device identification defaults
pub mod identity {
    /// Case-insensitive substrings of the declared device name
    pub const NAME_PATTERNS: &[&str] = &["temperhum", "pcsensor", "temper"];

    /// USB vendor/product pairs of the sensor family
    pub const USB_SIGNATURES: &[(u16, u16)] = &[
        (0x0c45, 0x7401), // TEMPer / TEMPer2
        (0x0c45, 0x7402), // TEMPerHUM (older firmware)
        (0x413d, 0x2107), // TEMPerX / TEMPerHUM V4
        (0x1a86, 0xe025), // TEMPerGold / TEMPerHUM V3
        (0x3553, 0xa001), // TEMPerHUM (2023 revision)
    ];

    /// Case-insensitive substrings of banner/identification lines
    pub const BANNER_PATTERNS: &[&str] = &["pcsensor", "temperhum", "www.", "caps lock", "num lock"];

    /// Length of the hex digest used as sensor id
    pub const SENSOR_ID_HEX_LEN: usize = 16;
}

/// Linux input-event codes (linux/input-event-codes.h)
pub mod input {
    pub const EV_SYN: u16 = 0x00;
    pub const EV_KEY: u16 = 0x01;
    pub const SYN_REPORT: u16 = 0;

    /// Key value: released
    pub const KEY_RELEASED: i32 = 0;
    /// Key value: pressed
    pub const KEY_PRESSED: i32 = 1;
    /// Key value: autorepeat
    pub const KEY_REPEAT: i32 = 2;

    pub const KEY_1: u16 = 2;
    pub const KEY_0: u16 = 11;
    pub const KEY_MINUS: u16 = 12;
    pub const KEY_EQUAL: u16 = 13;
    pub const KEY_TAB: u16 = 15;
    pub const KEY_Q: u16 = 16;
    pub const KEY_W: u16 = 17;
    pub const KEY_E: u16 = 18;
    pub const KEY_R: u16 = 19;
    pub const KEY_T: u16 = 20;
    pub const KEY_Y: u16 = 21;
    pub const KEY_U: u16 = 22;
    pub const KEY_I: u16 = 23;
    pub const KEY_O: u16 = 24;
    pub const KEY_P: u16 = 25;
    pub const KEY_LEFTBRACE: u16 = 26;
    pub const KEY_RIGHTBRACE: u16 = 27;
    pub const KEY_ENTER: u16 = 28;
    pub const KEY_A: u16 = 30;
    pub const KEY_S: u16 = 31;
    pub const KEY_D: u16 = 32;
    pub const KEY_F: u16 = 33;
    pub const KEY_G: u16 = 34;
    pub const KEY_H: u16 = 35;
    pub const KEY_J: u16 = 36;
    pub const KEY_K: u16 = 37;
    pub const KEY_L: u16 = 38;
    pub const KEY_SEMICOLON: u16 = 39;
    pub const KEY_APOSTROPHE: u16 = 40;
    pub const KEY_LEFTSHIFT: u16 = 42;
    pub const KEY_BACKSLASH: u16 = 43;
    pub const KEY_Z: u16 = 44;
    pub const KEY_X: u16 = 45;
    pub const KEY_C: u16 = 46;
    pub const KEY_V: u16 = 47;
    pub const KEY_B: u16 = 48;
    pub const KEY_N: u16 = 49;
    pub const KEY_M: u16 = 50;
    pub const KEY_COMMA: u16 = 51;
    pub const KEY_DOT: u16 = 52;
    pub const KEY_SLASH: u16 = 53;
    pub const KEY_RIGHTSHIFT: u16 = 54;
    pub const KEY_KPASTERISK: u16 = 55;
    pub const KEY_SPACE: u16 = 57;
    pub const KEY_CAPSLOCK: u16 = 58;
    pub const KEY_NUMLOCK: u16 = 69;
    pub const KEY_KP7: u16 = 71;
    pub const KEY_KP8: u16 = 72;
    pub const KEY_KP9: u16 = 73;
    pub const KEY_KPMINUS: u16 = 74;
    pub const KEY_KP4: u16 = 75;
    pub const KEY_KP5: u16 = 76;
    pub const KEY_KP6: u16 = 77;
    pub const KEY_KPPLUS: u16 = 78;
    pub const KEY_KP1: u16 = 79;
    pub const KEY_KP2: u16 = 80;
    pub const KEY_KP3: u16 = 81;
    pub const KEY_KP0: u16 = 82;
    pub const KEY_KPDOT: u16 = 83;
    pub const KEY_KPENTER: u16 = 96;
    pub const KEY_KPSLASH: u16 = 98;

    /// Default activation key
    pub const ACTIVATION_KEY: u16 = KEY_NUMLOCK;

    /// EVIOCGRAB = _IOW('E', 0x90, int)
    pub const EVIOCGRAB: u64 = 0x4004_4590;
}
