//! Temperhum Core Library
//!
//! Acquisition and decoding engine for TEMPerHUM-style USB temperature and
//! humidity sensors.
//!
//! # Features
//!
//! - **Discovery**: Matches input and hidraw nodes by name or USB signature
//! - **Activation**: Sends the key gesture that starts keyboard-mode output
//! - **Bounded Capture**: One worker per sensor, one shared deadline, exclusive
//!   access always released
//! - **Decoding**: Typed lines via a structured pattern, raw reports via a
//!   ranked list of candidate layouts filtered by plausibility
//! - **State**: A single store of per-sensor status and latest reading
//!
//! # Module Structure
//!
//! - `hw/` - Device I/O seam, Linux and scripted backends, discovery, activation
//! - `decode/` - Key translation, line parsing, binary decoding
//! - `data/` - Data types, configuration, validation
//! - `engine/` - State store, workers, scheduler
//!
//! # Example
//!
//! ```no_run
//! use th_core::{AcquisitionConfig, AcquisitionScheduler, JsonLineSink, LinuxDevices};
//!
//! th_core::logging::init("info");
//! let mut scheduler = AcquisitionScheduler::new(LinuxDevices::new(), AcquisitionConfig::default())
//!     .unwrap()
//!     .with_sink(JsonLineSink::new(std::io::stdout()));
//! let report = scheduler.run_cycle();
//! ```

// Grouped modules
pub mod data;
pub mod decode;
pub mod engine;
pub mod hw;

// Standalone modules
pub mod constants;
pub mod error;
pub mod logging;
pub mod sink;

// Re-export primary types from data/
pub use data::{
    now_millis, AcquisitionConfig, Capability, DeviceCandidate, ParsedReading, RawReport,
    SensorDevice, SensorId, SensorSnapshot, SensorState, SensorStatus, UsbSignature,
};

// Re-export validation functions from data/
pub use data::{check_interval, check_plausible, is_plausible, PlausibilityViolation};

// Re-export error types
pub use error::{AcquisitionError, Result};

// Re-export decoding types
pub use decode::{
    default_candidates, BinaryDecoder, CandidateAttempt, CandidateDecoding, DecodeFailure,
    DecodedReport, FieldEncoding, FieldSpec, KeyOutput, KeyTranslator, LineEvent, LineParser,
};

// Re-export engine types
pub use engine::{
    AcquisitionScheduler, BinaryReadWorker, CancelToken, CaptureBuffer, CaptureExit,
    CaptureState, CaptureSummary, CycleReport, Deadline, ReadOutcome, ReadSummary, SensorEvent,
    SensorStateStore, TextCaptureWorker, WorkerSummary,
};

// Re-export hardware types from hw/
pub use hw::{
    sensor_id_for, Activator, DeviceIo, DeviceLocator, KeyEvent, LinuxDevices, ReportChannel,
    ScriptProbe, ScriptStep, ScriptedDevice, ScriptedDevices, TextChannel,
};

// Re-export sink types
pub use sink::{snapshot_to_json, snapshot_to_json_compact, JsonLineSink, ReadingSink};
