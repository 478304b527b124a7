//! Unified error handling for temperhum
//!
//! This crate provides the single error type used by the acquisition engine.
//! Most variants describe a failure of one device; only a few are meant to
//! stop a whole acquisition cycle (see [`AcquisitionError::is_per_device`]).

use std::io;
use std::path::{Path, PathBuf};

/// Result type alias using AcquisitionError
pub type Result<T> = std::result::Result<T, AcquisitionError>;

/// Unified error type for all acquisition operations
#[derive(thiserror::Error, Debug)]
pub enum AcquisitionError {
    // ============================================================================
    // Discovery Errors
    // ============================================================================
    #[error("No matching sensor devices found")]
    DeviceNotFound,

    #[error("Failed to enumerate {path}: {source}")]
    EnumerationFailed {
        path: PathBuf,
        source: io::Error,
    },

    #[error("Access denied to {path}: {source}")]
    AccessDenied {
        path: PathBuf,
        source: io::Error,
    },

    // ============================================================================
    // Per-Device Runtime Errors
    // ============================================================================
    #[error("Activation of {path} failed: {reason}")]
    ActivationFailed {
        path: PathBuf,
        reason: String,
    },

    #[error("Capture on {path} timed out")]
    CaptureTimeout {
        path: PathBuf,
    },

    #[error("Device {path} disconnected: {reason}")]
    DeviceDisconnected {
        path: PathBuf,
        reason: String,
    },

    #[error("Worker for {0} panicked")]
    WorkerPanicked(String),

    // ============================================================================
    // Decoding Errors (logged, never surfaced to callers of a cycle)
    // ============================================================================
    #[error("Malformed line: {0:?}")]
    MalformedLine(String),

    #[error("No plausible decoding for report [{raw_hex}]")]
    ImplausibleDecoding {
        raw_hex: String,
    },

    // ============================================================================
    // I/O, Configuration and Output Errors
    // ============================================================================
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidConfig {
        field: String,
        reason: String,
    },

    #[error("Failed to serialize JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Sink error: {0}")]
    Sink(String),

    #[error("{0}")]
    Generic(String),
}

impl AcquisitionError {
    /// Create a generic error from a string
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic(msg.into())
    }

    /// Create an invalid configuration error
    pub fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an activation failure
    pub fn activation(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::ActivationFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a disconnect error
    pub fn disconnected(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::DeviceDisconnected {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an enumeration failure; always cycle-level
    pub fn enumeration(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::EnumerationFailed {
            path: path.into(),
            source,
        }
    }

    /// Classify an OS error raised while talking to the device at `path`
    pub fn from_io(path: &Path, err: io::Error) -> Self {
        match err.raw_os_error() {
            Some(libc::EACCES) | Some(libc::EPERM) => Self::AccessDenied {
                path: path.to_path_buf(),
                source: err,
            },
            Some(libc::ENODEV) | Some(libc::ENXIO) | Some(libc::EIO) | Some(libc::ESHUTDOWN)
            | Some(libc::ENOENT) => Self::DeviceDisconnected {
                path: path.to_path_buf(),
                reason: err.to_string(),
            },
            Some(libc::ETIMEDOUT) => Self::CaptureTimeout {
                path: path.to_path_buf(),
            },
            _ => match err.kind() {
                io::ErrorKind::PermissionDenied => Self::AccessDenied {
                    path: path.to_path_buf(),
                    source: err,
                },
                io::ErrorKind::NotFound
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::UnexpectedEof => Self::DeviceDisconnected {
                    path: path.to_path_buf(),
                    reason: err.to_string(),
                },
                io::ErrorKind::TimedOut => Self::CaptureTimeout {
                    path: path.to_path_buf(),
                },
                _ => Self::Io(err),
            },
        }
    }

    /// Whether this error concerns a single device
    ///
    /// Per-device errors degrade that device only; everything else is a
    /// cycle-level failure reported to the caller.
    pub fn is_per_device(&self) -> bool {
        !matches!(
            self,
            Self::DeviceNotFound
                | Self::EnumerationFailed { .. }
                | Self::InvalidConfig { .. }
                | Self::Generic(_)
        )
    }

    /// Whether this error is the normal end of a bounded capture
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::CaptureTimeout { .. })
    }
}

// Allow converting from String to AcquisitionError
impl From<String> for AcquisitionError {
    fn from(s: String) -> Self {
        Self::Generic(s)
    }
}

// Allow converting from &str to AcquisitionError
impl From<&str> for AcquisitionError {
    fn from(s: &str) -> Self {
        Self::Generic(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_io_permission() {
        let err = AcquisitionError::from_io(
            Path::new("/dev/input/event3"),
            io::Error::from_raw_os_error(libc::EACCES),
        );
        assert!(matches!(err, AcquisitionError::AccessDenied { .. }));
        assert!(err.is_per_device());
    }

    #[test]
    fn test_from_io_disconnect() {
        let err = AcquisitionError::from_io(
            Path::new("/dev/hidraw1"),
            io::Error::from_raw_os_error(libc::ENODEV),
        );
        assert!(matches!(err, AcquisitionError::DeviceDisconnected { .. }));
    }

    #[test]
    fn test_from_io_kind_fallback() {
        let err = AcquisitionError::from_io(
            Path::new("/dev/hidraw1"),
            io::Error::new(io::ErrorKind::UnexpectedEof, "short read"),
        );
        assert!(matches!(err, AcquisitionError::DeviceDisconnected { .. }));

        let err = AcquisitionError::from_io(
            Path::new("/dev/hidraw1"),
            io::Error::new(io::ErrorKind::Other, "odd"),
        );
        assert!(matches!(err, AcquisitionError::Io(_)));
    }

    #[test]
    fn test_cycle_level_errors() {
        assert!(!AcquisitionError::DeviceNotFound.is_per_device());
        assert!(!AcquisitionError::config("cycle_deadline", "zero").is_per_device());
        let err = AcquisitionError::enumeration(
            "/sys/class/hidraw",
            io::Error::from_raw_os_error(libc::EACCES),
        );
        assert!(!err.is_per_device());
        assert!(AcquisitionError::disconnected("/dev/x", "gone").is_per_device());
        assert!(AcquisitionError::CaptureTimeout { path: "/dev/x".into() }.is_timeout());
    }
}
