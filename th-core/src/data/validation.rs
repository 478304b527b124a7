//! Plausibility validation for decoded readings
//!
//! Every reading, whether it came from a typed line or a binary report,
//! passes through [`check_plausible`] before it can exist as a
//! [`ParsedReading`](crate::data::ParsedReading). Values outside the bounds
//! are rejected, never clamped.

use std::fmt;

use crate::constants::plausibility;

/// Why a decoded value was rejected
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlausibilityViolation {
    NotFinite,
    Temperature(f64),
    Humidity(f64),
    Interval(u32),
}

impl fmt::Display for PlausibilityViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFinite => write!(f, "value is not a finite number"),
            Self::Temperature(t) => write!(
                f,
                "temperature {:.2}°C outside {}..{}",
                t,
                plausibility::TEMPERATURE_MIN,
                plausibility::TEMPERATURE_MAX
            ),
            Self::Humidity(h) => write!(
                f,
                "humidity {:.2}%RH outside {}..{}",
                h,
                plausibility::HUMIDITY_MIN,
                plausibility::HUMIDITY_MAX
            ),
            Self::Interval(s) => write!(
                f,
                "interval {}s outside {}..{}",
                s,
                plausibility::INTERVAL_MIN_SECS,
                plausibility::INTERVAL_MAX_SECS
            ),
        }
    }
}

/// Whether a temperature/humidity pair is physically plausible
pub fn is_plausible(temperature: f64, humidity: f64) -> bool {
    check_plausible(temperature, humidity).is_ok()
}

/// Validates a temperature (°C) / humidity (%RH) pair
pub fn check_plausible(temperature: f64, humidity: f64) -> Result<(), PlausibilityViolation> {
    if !temperature.is_finite() || !humidity.is_finite() {
        return Err(PlausibilityViolation::NotFinite);
    }
    if !(plausibility::TEMPERATURE_MIN..=plausibility::TEMPERATURE_MAX).contains(&temperature) {
        return Err(PlausibilityViolation::Temperature(temperature));
    }
    if !(plausibility::HUMIDITY_MIN..=plausibility::HUMIDITY_MAX).contains(&humidity) {
        return Err(PlausibilityViolation::Humidity(humidity));
    }
    Ok(())
}

/// Validates a device-reported sample interval (seconds)
pub fn check_interval(secs: u32) -> Result<(), PlausibilityViolation> {
    if !(plausibility::INTERVAL_MIN_SECS..=plausibility::INTERVAL_MAX_SECS).contains(&secs) {
        return Err(PlausibilityViolation::Interval(secs));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_are_inclusive() {
        assert!(is_plausible(-50.0, 0.0));
        assert!(is_plausible(100.0, 100.0));
        assert!(!is_plausible(-50.01, 50.0));
        assert!(!is_plausible(20.0, 100.5));
        assert!(!is_plausible(20.0, -0.1));
    }

    #[test]
    fn test_non_finite_rejected() {
        assert_eq!(
            check_plausible(f64::INFINITY, 10.0),
            Err(PlausibilityViolation::NotFinite)
        );
        assert_eq!(
            check_plausible(10.0, f64::NAN),
            Err(PlausibilityViolation::NotFinite)
        );
    }

    #[test]
    fn test_interval() {
        assert!(check_interval(1).is_ok());
        assert!(check_interval(0).is_err());
        assert!(check_interval(86_401).is_err());
    }
}
