use std::time::Duration;

use log::debug;

/// A single-shot timer the owner should start; `epoch` identifies it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectTimer {
    pub epoch: u64,
    pub delay: Duration,
}

/// Reconnection policy with race-free cancellation.
///
/// Every arm or cancel bumps the epoch, so a timer that fires after being
/// replaced or cancelled carries a stale epoch and is ignored.
#[derive(Debug)]
pub struct ReconnectScheduler {
    interval: Duration,
    max_attempts: Option<usize>,
    epoch: u64,
    armed: bool,
    attempts: usize,
}

impl ReconnectScheduler {
    pub fn new(interval: Duration, max_attempts: Option<usize>) -> Self {
        Self {
            interval,
            max_attempts,
            epoch: 0,
            armed: false,
            attempts: 0,
        }
    }

    pub fn arm(&mut self) -> Option<ReconnectTimer> {
        if self.max_attempts.map_or(false, |max| self.attempts >= max) {
            debug!("Giving up reconnecting after {} attempts", self.attempts);
            self.cancel();
            return None;
        }
        self.epoch += 1;
        self.armed = true;
        Some(ReconnectTimer {
            epoch: self.epoch,
            delay: self.interval,
        })
    }

    /// Returns whether a timer was outstanding.
    pub fn cancel(&mut self) -> bool {
        let was_armed = self.armed;
        self.epoch += 1;
        self.armed = false;
        was_armed
    }

    /// Accepts a firing only if it belongs to the currently armed timer.
    pub fn fire(&mut self, epoch: u64) -> bool {
        if !self.armed || epoch != self.epoch {
            debug!("Ignoring stale reconnect timer {} (current {})", epoch, self.epoch);
            return false;
        }
        self.armed = false;
        self.attempts += 1;
        true
    }

    /// Called once a session is fully established.
    pub fn succeeded(&mut self) -> bool {
        self.attempts = 0;
        self.cancel()
    }

    /// Starts a fresh attempt budget without touching an armed timer.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }
}
