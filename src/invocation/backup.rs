//! Backup Ack Accounting
//!
//! The owner answers a primary with the number of backups it handed off. The
//! invoking side may only release the result once that many acks have come
//! in. Acks travel on a separate path from the response and can overtake it,
//! so acks received before the expected count is known are kept.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Default)]
pub struct BackupAckTracker {
    expected: Option<usize>,
    received: usize,
    deadline: Option<Instant>,
}

impl BackupAckTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the count declared by the primary response and starts the
    /// backup timeout.
    pub fn on_response(&mut self, backup_acks: usize, backup_timeout: Duration, now: Instant) {
        self.expected = Some(backup_acks);
        self.deadline = if backup_acks > 0 {
            now.checked_add(backup_timeout)
        } else {
            None
        };
    }

    /// Returns true once every expected ack is in.
    pub fn on_backup_ack(&mut self) -> bool {
        self.received += 1;
        self.is_satisfied()
    }

    pub fn is_satisfied(&self) -> bool {
        self.expected
            .is_some_and(|expected| self.received >= expected)
    }

    /// When the wait for outstanding acks gives up; `None` once satisfied or
    /// before the response arrived.
    pub fn deadline(&self) -> Option<Instant> {
        if self.is_satisfied() {
            None
        } else {
            self.deadline
        }
    }

    pub fn is_timed_out(&self, now: Instant) -> bool {
        self.deadline().is_some_and(|deadline| now >= deadline)
    }

    pub fn expected(&self) -> Option<usize> {
        self.expected
    }

    pub fn received(&self) -> usize {
        self.received
    }
}
