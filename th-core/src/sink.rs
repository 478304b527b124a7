//! Output of sensor snapshots
//!
//! The engine pushes the aggregated snapshot to a [`ReadingSink`] after
//! every cycle. Message buses and home-automation bridges live outside this
//! crate and implement the trait; [`JsonLineSink`] covers the simple case of
//! one JSON document per line on any writer.

use std::io::Write;

use crate::data::SensorSnapshot;
use crate::error::{AcquisitionError, Result};

/// Consumer of per-cycle snapshots
pub trait ReadingSink {
    fn publish(&mut self, snapshot: &SensorSnapshot) -> Result<()>;
}

/// Writes each snapshot as one compact JSON line
pub struct JsonLineSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLineSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ReadingSink for JsonLineSink<W> {
    fn publish(&mut self, snapshot: &SensorSnapshot) -> Result<()> {
        let line = snapshot_to_json_compact(snapshot)?;
        writeln!(self.writer, "{}", line)
            .and_then(|_| self.writer.flush())
            .map_err(|e| AcquisitionError::Sink(e.to_string()))
    }
}

/// Export snapshot as JSON string
pub fn snapshot_to_json(snapshot: &SensorSnapshot) -> Result<String> {
    Ok(serde_json::to_string_pretty(snapshot)?)
}

/// Export snapshot as compact JSON string
pub fn snapshot_to_json_compact(snapshot: &SensorSnapshot) -> Result<String> {
    Ok(serde_json::to_string(snapshot)?)
}
