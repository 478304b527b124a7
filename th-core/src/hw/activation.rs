//! Sensor activation
//!
//! Keyboard-mode sensors start typing readings after a key is held on
//! their own input channel. Activation is best-effort: some units stream
//! already, some ignore the gesture, and a failure here never stops the
//! capture that follows. Nothing is retried automatically.
//!
//! The gesture must be sent before the channel is grabbed. Under a grab the
//! kernel hands injected keys back to the grabbing client only, so the
//! keyboard handler never toggles the lock LED the sensor listens to.

use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::constants::timing;
use crate::engine::CancelToken;
use crate::error::{AcquisitionError, Result};
use crate::hw::{KeyEvent, TextChannel};

/// Issues the activation gesture (press, hold, release)
#[derive(Debug, Clone, Copy)]
pub struct Activator {
    key: u16,
}

impl Activator {
    pub fn new(key: u16) -> Self {
        Self { key }
    }

    pub fn key(&self) -> u16 {
        self.key
    }

    /// Press the activation key, hold it for `hold`, release it
    ///
    /// Any injection failure is returned as `ActivationFailed`. The key-up
    /// is still attempted when the hold phase was reached. Cancellation cuts
    /// the hold short but the key is always released.
    pub fn activate(
        &self,
        channel: &mut dyn TextChannel,
        node: &Path,
        hold: Duration,
        cancel: &CancelToken,
    ) -> Result<()> {
        let fail = |e: AcquisitionError| AcquisitionError::activation(node, e.to_string());

        channel.inject_key(KeyEvent::press(self.key)).map_err(fail)?;
        if let Err(e) = channel.inject_key(KeyEvent::sync()) {
            let _ = channel.inject_key(KeyEvent::release(self.key));
            return Err(fail(e));
        }

        debug!(node = ?node, key = self.key, hold_ms = hold.as_millis() as u64, "Holding activation key");
        hold_until_cancelled(hold, cancel);

        let released = channel
            .inject_key(KeyEvent::release(self.key))
            .and_then(|_| channel.inject_key(KeyEvent::sync()));
        if let Err(e) = released {
            warn!(node = ?node, error = %e, "Activation key release failed");
            return Err(fail(e));
        }
        Ok(())
    }
}

fn hold_until_cancelled(hold: Duration, cancel: &CancelToken) {
    let until = Instant::now() + hold;
    loop {
        let remaining = until.saturating_duration_since(Instant::now());
        if remaining.is_zero() || cancel.is_cancelled() {
            return;
        }
        thread::sleep(remaining.min(timing::ACTIVATION_HOLD_SLICE));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::input::{EV_KEY, KEY_NUMLOCK};
    use crate::hw::MockTextChannel;
    use mockall::Sequence;

    #[test]
    fn test_activation_sends_press_sync_release_sync() {
        let mut mock = MockTextChannel::new();
        let mut seq = Sequence::new();
        for expected in [
            KeyEvent::press(KEY_NUMLOCK),
            KeyEvent::sync(),
            KeyEvent::release(KEY_NUMLOCK),
            KeyEvent::sync(),
        ] {
            mock.expect_inject_key()
                .withf(move |e| *e == expected)
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_| Ok(()));
        }

        let activator = Activator::new(KEY_NUMLOCK);
        assert!(activator
            .activate(
                &mut mock,
                Path::new("/dev/input/event3"),
                Duration::from_millis(1),
                &CancelToken::new(),
            )
            .is_ok());
    }

    #[test]
    fn test_press_failure_is_activation_failed() {
        let mut mock = MockTextChannel::new();
        mock.expect_inject_key().times(1).returning(|_| {
            Err(AcquisitionError::from_io(
                Path::new("/dev/input/event3"),
                std::io::Error::from_raw_os_error(libc::EBADF),
            ))
        });

        let err = Activator::new(KEY_NUMLOCK)
            .activate(
                &mut mock,
                Path::new("/dev/input/event3"),
                Duration::from_millis(1),
                &CancelToken::new(),
            )
            .unwrap_err();
        assert!(matches!(err, AcquisitionError::ActivationFailed { .. }));
    }

    #[test]
    fn test_sync_failure_still_releases_key() {
        let mut mock = MockTextChannel::new();
        mock.expect_inject_key()
            .withf(|e| e.kind == EV_KEY && e.value == 1)
            .times(1)
            .returning(|_| Ok(()));
        mock.expect_inject_key()
            .withf(|e| e.kind != EV_KEY)
            .times(1)
            .returning(|_| Err(AcquisitionError::generic("sync rejected")));
        mock.expect_inject_key()
            .withf(|e| e.kind == EV_KEY && e.value == 0)
            .times(1)
            .returning(|_| Ok(()));

        let result = Activator::new(KEY_NUMLOCK).activate(
            &mut mock,
            Path::new("/dev/input/event3"),
            Duration::from_millis(1),
            &CancelToken::new(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_cancel_cuts_hold_short_and_releases() {
        let mut mock = MockTextChannel::new();
        mock.expect_inject_key().times(4).returning(|_| Ok(()));
        let cancel = CancelToken::new();
        cancel.cancel();

        let start = Instant::now();
        let result = Activator::new(KEY_NUMLOCK).activate(
            &mut mock,
            Path::new("/dev/input/event3"),
            Duration::from_secs(5),
            &cancel,
        );
        assert!(result.is_ok());
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
