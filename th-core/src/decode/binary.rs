//! Multi-hypothesis decoding of raw binary reports
//!
//! The byte layout and scaling of the 8-byte report differ between firmware
//! revisions and nobody has a reliable description of all of them. Instead
//! of guessing one protocol, the decoder holds a ranked list of candidate
//! decodings and accepts the first whose output is physically plausible.
//!
//! # Candidates are data
//!
//! A [`CandidateDecoding`] is a pair of [`FieldSpec`]s (offset, integer
//! encoding, scale, bias). Evaluating one is a pure function of the report.
//! Reordering, adding or correcting candidates is a configuration change;
//! callers of [`BinaryDecoder::decode`] never see it.
//!
//! # Failure
//!
//! When no candidate is plausible the decoder returns a [`DecodeFailure`]
//! holding the hex dump and every candidate's attempted output, so the
//! report can be diagnosed without reading the device again.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, trace};

use crate::data::{is_plausible, ParsedReading, RawReport};
use crate::error::AcquisitionError;

/// Integer encoding of one report field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldEncoding {
    I16Le,
    I16Be,
    U16Le,
    U16Be,
    U8,
}

impl FieldEncoding {
    /// Bytes occupied by the field
    pub fn width(self) -> usize {
        match self {
            Self::U8 => 1,
            _ => 2,
        }
    }
}

/// Location and scaling of one value inside a report
///
/// The decoded value is `raw * scale + bias`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub offset: usize,
    pub encoding: FieldEncoding,
    pub scale: f64,
    #[serde(default)]
    pub bias: f64,
}

impl FieldSpec {
    pub const fn new(offset: usize, encoding: FieldEncoding, scale: f64, bias: f64) -> Self {
        Self {
            offset,
            encoding,
            scale,
            bias,
        }
    }

    /// First byte index past the field, `None` if it overflows
    pub fn end(&self) -> Option<usize> {
        self.offset.checked_add(self.encoding.width())
    }

    /// Decode the field, or `None` when the report is too short
    pub fn extract(&self, bytes: &[u8]) -> Option<f64> {
        let field = bytes.get(self.offset..self.end()?)?;
        let raw = match self.encoding {
            FieldEncoding::I16Le => i16::from_le_bytes([field[0], field[1]]) as f64,
            FieldEncoding::I16Be => i16::from_be_bytes([field[0], field[1]]) as f64,
            FieldEncoding::U16Le => u16::from_le_bytes([field[0], field[1]]) as f64,
            FieldEncoding::U16Be => u16::from_be_bytes([field[0], field[1]]) as f64,
            FieldEncoding::U8 => field[0] as f64,
        };
        Some(raw * self.scale + self.bias)
    }
}

/// One byte-layout/scaling hypothesis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateDecoding {
    pub name: String,
    pub temperature: FieldSpec,
    pub humidity: FieldSpec,
}

impl CandidateDecoding {
    pub fn new(name: impl Into<String>, temperature: FieldSpec, humidity: FieldSpec) -> Self {
        Self {
            name: name.into(),
            temperature,
            humidity,
        }
    }

    /// Smallest report this candidate can decode, `None` if no report can
    pub fn required_len(&self) -> Option<usize> {
        Some(self.temperature.end()?.max(self.humidity.end()?))
    }

    /// Decode `(temperature, humidity)` without any plausibility check
    pub fn evaluate(&self, report: &RawReport) -> Option<(f64, f64)> {
        let bytes = report.bytes();
        Some((self.temperature.extract(bytes)?, self.humidity.extract(bytes)?))
    }
}

const CENTI: f64 = 1.0 / 100.0;
const DIV256: f64 = 1.0 / 256.0;

/// Ranked default candidates, most common convention first
///
/// Temperature sits at byte 2, humidity at byte 4 in every known variant;
/// what differs is byte order and scaling.
pub fn default_candidates() -> Vec<CandidateDecoding> {
    use FieldEncoding::*;

    vec![
        CandidateDecoding::new(
            "be16_centi",
            FieldSpec::new(2, I16Be, CENTI, 0.0),
            FieldSpec::new(4, U16Be, CENTI, 0.0),
        ),
        CandidateDecoding::new(
            "le16_centi",
            FieldSpec::new(2, I16Le, CENTI, 0.0),
            FieldSpec::new(4, U16Le, CENTI, 0.0),
        ),
        CandidateDecoding::new(
            "be16_div256",
            FieldSpec::new(2, I16Be, DIV256, 0.0),
            FieldSpec::new(4, U16Be, DIV256, 0.0),
        ),
        CandidateDecoding::new(
            "le16_div256",
            FieldSpec::new(2, I16Le, DIV256, 0.0),
            FieldSpec::new(4, U16Le, DIV256, 0.0),
        ),
        CandidateDecoding::new(
            "be16_div256_minus40",
            FieldSpec::new(2, I16Be, DIV256, -40.0),
            FieldSpec::new(4, U16Be, DIV256, 0.0),
        ),
        CandidateDecoding::new(
            "le16_div256_minus40",
            FieldSpec::new(2, I16Le, DIV256, -40.0),
            FieldSpec::new(4, U16Le, DIV256, 0.0),
        ),
        CandidateDecoding::new(
            "byte_minus40",
            FieldSpec::new(2, U8, 1.0, -40.0),
            FieldSpec::new(4, U8, 1.0, 0.0),
        ),
    ]
}

/// Output of one candidate on one report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateAttempt {
    pub candidate: String,
    pub rank: usize,
    /// `None` when the report was too short for the candidate
    pub values: Option<(f64, f64)>,
}

/// A report accepted under one of the candidates
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedReport {
    pub reading: ParsedReading,
    pub candidate: String,
    /// Position of the accepted candidate in the ranked list
    pub rank: usize,
}

impl DecodedReport {
    /// True when a lower-priority candidate had to be used
    pub fn is_fallback(&self) -> bool {
        self.rank > 0
    }
}

/// No candidate produced a plausible reading
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodeFailure {
    pub raw_hex: String,
    pub attempts: Vec<CandidateAttempt>,
}

impl fmt::Display for DecodeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no plausible decoding for [{}]:", self.raw_hex)?;
        for attempt in &self.attempts {
            match attempt.values {
                Some((t, h)) => write!(f, " {}={:.2}°C/{:.2}%", attempt.candidate, t, h)?,
                None => write!(f, " {}=short", attempt.candidate)?,
            }
        }
        Ok(())
    }
}

impl From<DecodeFailure> for AcquisitionError {
    fn from(failure: DecodeFailure) -> Self {
        AcquisitionError::ImplausibleDecoding {
            raw_hex: failure.raw_hex,
        }
    }
}

/// Decoder trying ranked candidates against each report
#[derive(Debug, Clone)]
pub struct BinaryDecoder {
    candidates: Vec<CandidateDecoding>,
}

impl Default for BinaryDecoder {
    fn default() -> Self {
        Self::new(default_candidates())
    }
}

impl BinaryDecoder {
    pub fn new(candidates: Vec<CandidateDecoding>) -> Self {
        Self { candidates }
    }

    pub fn candidates(&self) -> &[CandidateDecoding] {
        &self.candidates
    }

    /// Decode a report with the first plausible candidate
    pub fn decode(&self, report: &RawReport) -> Result<DecodedReport, DecodeFailure> {
        let raw_hex = report.hex();
        let mut attempts = Vec::with_capacity(self.candidates.len());

        for (rank, candidate) in self.candidates.iter().enumerate() {
            let values = candidate.evaluate(report);
            trace!(candidate = %candidate.name, rank, ?values, "Evaluated candidate");

            if let Some((temperature, humidity)) = values {
                if is_plausible(temperature, humidity) {
                    // Bounds were just checked, so construction cannot fail
                    if let Ok(reading) = ParsedReading::new(
                        temperature,
                        humidity,
                        None,
                        raw_hex.clone(),
                        report.captured_at(),
                    ) {
                        debug!(
                            candidate = %candidate.name,
                            rank,
                            temperature,
                            humidity,
                            "Decoded binary report"
                        );
                        return Ok(DecodedReport {
                            reading,
                            candidate: candidate.name.clone(),
                            rank,
                        });
                    }
                }
            }

            attempts.push(CandidateAttempt {
                candidate: candidate.name.clone(),
                rank,
                values,
            });
        }

        Err(DecodeFailure { raw_hex, attempts })
    }
}
