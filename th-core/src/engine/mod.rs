//! Acquisition engine modules
//!
//! Contains the state store, the two worker kinds, and the cycle scheduler.

mod binary_worker;
mod deadline;
mod scheduler;
mod store;
mod text_worker;

pub use binary_worker::{BinaryReadWorker, ReadOutcome, ReadSummary};
pub use deadline::{CancelToken, Deadline};
pub use scheduler::{AcquisitionScheduler, CycleReport, WorkerSummary};
pub use store::{SensorEvent, SensorStateStore};
pub use text_worker::{
    CaptureBuffer, CaptureExit, CaptureState, CaptureSummary, GrabGuard, TextCaptureWorker,
};
