//! Liveness probe scheduling
//!
//! The unit drops into a low-power state when the link goes quiet, so the
//! engine sends a no-reply probe after every idle period. Any received byte
//! postpones the next probe; a busy link is never probed.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
pub struct KeepAlive {
    period: Duration,
    deadline: Option<Instant>,
}

impl KeepAlive {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            deadline: None,
        }
    }

    /// Arm (or re-arm) the probe one period from now.
    pub fn restart(&mut self) {
        self.deadline = Some(Instant::now() + self.period);
    }

    /// Disarm probing entirely (link closed).
    pub fn stop(&mut self) {
        self.deadline = None;
    }

    /// Next probe instant, if probing is armed.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}
