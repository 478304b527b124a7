//! Deadlines and cooperative cancellation
//!
//! Workers are never interrupted. Every blocking call receives a timeout
//! derived from the cycle [`Deadline`], and every loop checks the shared
//! [`CancelToken`] between polls.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A fixed point in time shared by every worker of one cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    pub fn after(duration: Duration) -> Self {
        Self {
            at: Instant::now() + duration,
        }
    }

    pub fn at(&self) -> Instant {
        self.at
    }

    /// Time left, zero once expired
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }

    /// `limit`, cut short so it never reaches past the deadline
    pub fn bounded(&self, limit: Duration) -> Duration {
        limit.min(self.remaining())
    }
}

/// Shared stop flag, tripped by the scheduler or by the caller
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Clear the flag before the next cycle
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_deadline_bounds_wait() {
        let deadline = Deadline::after(Duration::from_millis(50));
        assert!(!deadline.is_expired());
        assert!(deadline.bounded(Duration::from_secs(5)) <= Duration::from_millis(50));
        assert_eq!(deadline.bounded(Duration::from_millis(1)), Duration::from_millis(1));
    }

    #[test]
    fn test_expired_deadline_has_no_time_left() {
        let deadline = Deadline::after(Duration::ZERO);
        thread::sleep(Duration::from_millis(1));
        assert!(deadline.is_expired());
        assert_eq!(deadline.remaining(), Duration::ZERO);
        assert_eq!(deadline.bounded(Duration::from_secs(1)), Duration::ZERO);
    }

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        thread::spawn(move || clone.cancel()).join().unwrap();
        assert!(token.is_cancelled());
        token.reset();
        assert!(!token.is_cancelled());
    }
}
