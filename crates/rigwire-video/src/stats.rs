use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::gate::Rejection;

/// Counters updated by the receive loop. Every counter only grows.
#[derive(Debug, Default)]
pub struct IngestStats {
    datagrams: AtomicU64,
    invalid: AtomicU64,
    overflowed: AtomicU64,
    completed: AtomicU64,
    admitted: AtomicU64,
    rejected_busy: AtomicU64,
    rejected_throttled: AtomicU64,
    dropped_paused: AtomicU64,
    decode_failures: AtomicU64,
}

/// Point-in-time copy of [`IngestStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestSnapshot {
    pub datagrams: u64,
    pub invalid: u64,
    pub overflowed: u64,
    pub completed: u64,
    pub admitted: u64,
    pub rejected_busy: u64,
    pub rejected_throttled: u64,
    pub dropped_paused: u64,
    pub decode_failures: u64,
}

impl IngestSnapshot {
    /// Completed frames that never reached the consumer.
    pub fn dropped(&self) -> u64 {
        self.rejected_busy + self.rejected_throttled + self.dropped_paused + self.decode_failures
    }
}

impl IngestStats {
    pub(crate) fn datagram(&self) {
        bump(&self.datagrams);
    }

    pub(crate) fn invalid(&self) {
        bump(&self.invalid);
    }

    pub(crate) fn overflowed(&self) {
        bump(&self.overflowed);
    }

    pub(crate) fn completed(&self) {
        bump(&self.completed);
    }

    pub(crate) fn admitted(&self) {
        bump(&self.admitted);
    }

    pub(crate) fn rejected(&self, reason: Rejection) {
        match reason {
            Rejection::Busy => bump(&self.rejected_busy),
            Rejection::Throttled => bump(&self.rejected_throttled),
        }
    }

    pub(crate) fn dropped_paused(&self) {
        bump(&self.dropped_paused);
    }

    pub(crate) fn decode_failure(&self) {
        bump(&self.decode_failures);
    }

    /// Read every counter.
    pub fn snapshot(&self) -> IngestSnapshot {
        IngestSnapshot {
            datagrams: self.datagrams.load(Ordering::Relaxed),
            invalid: self.invalid.load(Ordering::Relaxed),
            overflowed: self.overflowed.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            admitted: self.admitted.load(Ordering::Relaxed),
            rejected_busy: self.rejected_busy.load(Ordering::Relaxed),
            rejected_throttled: self.rejected_throttled.load(Ordering::Relaxed),
            dropped_paused: self.dropped_paused.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
        }
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}
