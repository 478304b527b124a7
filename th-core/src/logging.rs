//! Log setup for processes embedding the engine
//!
//! The engine only emits `tracing` events. A host process that has no
//! subscriber of its own can call [`init`] once at startup.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter (e.g. `th_core=debug`)
pub const LOG_ENV: &str = "TEMPERHUM_LOG";

/// Filter directive from `TEMPERHUM_LOG`, or `default_level` when unset
pub fn filter_directive(default_level: &str) -> String {
    std::env::var(LOG_ENV)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default_level.to_string())
}

/// Install a stdout fmt subscriber; returns false if one was already set
pub fn init(default_level: &str) -> bool {
    let directive = filter_directive(default_level);
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|e| {
        eprintln!("Invalid {} filter {:?}: {}, using info", LOG_ENV, directive, e);
        EnvFilter::new("info")
    });

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(filter)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_filter_falls_back_to_default() {
        std::env::remove_var(LOG_ENV);
        assert_eq!(filter_directive("warn"), "warn");

        std::env::set_var(LOG_ENV, "  ");
        assert_eq!(filter_directive("warn"), "warn");
        std::env::remove_var(LOG_ENV);
    }

    #[test]
    #[serial]
    fn test_filter_reads_environment() {
        std::env::set_var(LOG_ENV, "th_core=trace");
        assert_eq!(filter_directive("info"), "th_core=trace");
        std::env::remove_var(LOG_ENV);
    }

    #[test]
    #[serial]
    fn test_second_init_is_harmless() {
        std::env::remove_var(LOG_ENV);
        init("info");
        assert!(!init("debug"));
    }
}
