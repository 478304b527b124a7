//! Text line parsing
//!
//! A sensor in keyboard mode types lines such as `29.54[C]39.58[%RH]1S`.
//! [`LineParser`] separates three outcomes that callers treat differently:
//!
//! - a structurally valid, plausible line becomes a reading;
//! - a structurally valid line with implausible values is rejected (never clamped);
//! - a line carrying a known banner (`WWW.PCSENSOR.COM`) is an identification event.
//!
//! Anything else is unclassified and only logged.

use regex::Regex;
use tracing::{debug, trace};

use crate::data::{now_millis, ParsedReading, PlausibilityViolation};
use crate::error::{AcquisitionError, Result};

/// Temperature, unit, humidity, unit, optional interval; whitespace and case tolerant
const READING_PATTERN: &str = r"(?i)^\s*([-+]?[0-9]+(?:\.[0-9]+)?)\s*\[\s*°?\s*C\s*\]\s*([-+]?[0-9]+(?:\.[0-9]+)?)\s*\[\s*%\s*RH\s*\]\s*(?:([0-9]+)\s*S)?\s*$";

/// Classification of one completed line
#[derive(Debug, Clone, PartialEq)]
pub enum LineEvent {
    Reading(ParsedReading),
    /// Structure matched but a value is out of range
    Implausible {
        line: String,
        violation: PlausibilityViolation,
    },
    /// Device or vendor identification text
    Banner(String),
    Unclassified(String),
    Empty,
}

impl LineEvent {
    pub fn into_reading(self) -> Option<ParsedReading> {
        match self {
            Self::Reading(reading) => Some(reading),
            _ => None,
        }
    }

    pub fn is_banner(&self) -> bool {
        matches!(self, Self::Banner(_))
    }

    /// The error a rejected line corresponds to, for diagnostics
    pub fn rejection(&self) -> Option<AcquisitionError> {
        match self {
            Self::Implausible { line, .. } | Self::Unclassified(line) => {
                Some(AcquisitionError::MalformedLine(line.clone()))
            }
            _ => None,
        }
    }
}

/// Parser for the keyboard-mode line format
#[derive(Debug, Clone)]
pub struct LineParser {
    pattern: Regex,
    banners: Vec<String>,
}

impl LineParser {
    /// Create a parser recognising the given banner substrings
    pub fn new<S: AsRef<str>>(banner_patterns: &[S]) -> Result<Self> {
        let pattern = Regex::new(READING_PATTERN)
            .map_err(|e| AcquisitionError::generic(format!("invalid reading pattern: {}", e)))?;
        let banners = banner_patterns
            .iter()
            .map(|p| p.as_ref().trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        Ok(Self { pattern, banners })
    }

    /// Parse a line into a reading, or `None` for anything else
    pub fn parse(&self, line: &str) -> Option<ParsedReading> {
        self.classify(line).into_reading()
    }

    /// Classify a line, stamping readings with the current time
    pub fn classify(&self, line: &str) -> LineEvent {
        self.classify_at(line, now_millis())
    }

    /// Classify a line, stamping readings with `timestamp`
    pub fn classify_at(&self, line: &str, timestamp: u64) -> LineEvent {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return LineEvent::Empty;
        }

        if let Some(caps) = self.pattern.captures(trimmed) {
            let temperature = caps.get(1).and_then(|m| m.as_str().parse::<f64>().ok());
            let humidity = caps.get(2).and_then(|m| m.as_str().parse::<f64>().ok());
            // An interval too large for u32 is implausible, not malformed
            let interval = caps
                .get(3)
                .map(|m| m.as_str().parse::<u32>().unwrap_or(u32::MAX));

            if let (Some(temperature), Some(humidity)) = (temperature, humidity) {
                return match ParsedReading::new(temperature, humidity, interval, trimmed, timestamp) {
                    Ok(reading) => {
                        trace!(temperature, humidity, ?interval, "Parsed reading line");
                        LineEvent::Reading(reading)
                    }
                    Err(violation) => {
                        debug!(line = trimmed, %violation, "Rejected implausible line");
                        LineEvent::Implausible {
                            line: trimmed.to_string(),
                            violation,
                        }
                    }
                };
            }
        }

        let lowered = trimmed.to_lowercase();
        if self.banners.iter().any(|b| lowered.contains(b.as_str())) {
            debug!(line = trimmed, "Identification line");
            return LineEvent::Banner(trimmed.to_string());
        }

        debug!(line = trimmed, "Unclassified line");
        LineEvent::Unclassified(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::identity::BANNER_PATTERNS;

    fn parser() -> LineParser {
        LineParser::new(BANNER_PATTERNS).unwrap()
    }

    #[test]
    fn test_parse_device_line() {
        let reading = parser().parse("29.54[C]39.58[%RH]1S").unwrap();
        assert_eq!(reading.temperature(), 29.54);
        assert_eq!(reading.humidity(), 39.58);
        assert_eq!(reading.interval(), Some(1));
        assert_eq!(reading.raw_source(), "29.54[C]39.58[%RH]1S");
    }

    #[test]
    fn test_flexible_whitespace_and_case() {
        let reading = parser().parse("  -3.5 [c]  81 [ %rh ] 10 s \r").unwrap();
        assert_eq!(reading.temperature(), -3.5);
        assert_eq!(reading.humidity(), 81.0);
        assert_eq!(reading.interval(), Some(10));
    }

    #[test]
    fn test_interval_is_optional() {
        let reading = parser().parse("22.10[C]45.00[%RH]").unwrap();
        assert_eq!(reading.interval(), None);
    }

    #[test]
    fn test_out_of_range_is_rejected_not_clamped() {
        let p = parser();
        assert!(p.parse("25.00[C]150.00[%RH]1S").is_none());
        assert!(matches!(
            p.classify("25.00[C]150.00[%RH]1S"),
            LineEvent::Implausible { violation: PlausibilityViolation::Humidity(_), .. }
        ));
        assert!(p.parse("180.0[C]40.0[%RH]1S").is_none());
        assert!(p.parse("20.0[C]40.0[%RH]0S").is_none());
    }

    #[test]
    fn test_banner_line() {
        let p = parser();
        assert!(p.parse("WWW.PCSENSOR.COM").is_none());
        assert!(p.classify("WWW.PCSENSOR.COM").is_banner());
        assert!(p.classify("TEMPerHUM V4.1").is_banner());
    }

    #[test]
    fn test_unclassified_and_empty() {
        let p = parser();
        assert_eq!(p.classify("hello"), LineEvent::Unclassified("hello".to_string()));
        assert!(p.classify("hello").rejection().is_some());
        assert_eq!(p.classify("   "), LineEvent::Empty);
        assert!(p.parse("29.54[C]").is_none());
    }

    #[test]
    fn test_non_ascii_digits_are_unclassified() {
        let line = "\u{0662}\u{0669}.54[C]39.58[%RH]\u{0661}S";
        assert_eq!(parser().classify(line), LineEvent::Unclassified(line.to_string()));
    }

    #[test]
    fn test_same_line_twice_gives_same_values() {
        let p = parser();
        let a = p.classify_at("29.54[C]39.58[%RH]1S", 1).into_reading().unwrap();
        let b = p.classify_at("29.54[C]39.58[%RH]1S", 2).into_reading().unwrap();
        assert!(a.same_values(&b));
        assert_ne!(a.timestamp(), b.timestamp());
    }
}
