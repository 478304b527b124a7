//! Error types, re-exported from `th-error`

pub use th_error::{AcquisitionError, Result};
