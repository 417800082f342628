use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::DEFAULT_MIN_FRAME_INTERVAL;

const NEVER_EMITTED: u64 = u64::MAX;

/// Result of an admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The caller now owns the single in-flight slot and must `release` it.
    Admitted,
    /// The frame should be dropped.
    Rejected(Rejection),
}

/// Why a frame was not admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// A previously admitted frame has not been released yet.
    Busy,
    /// The previous admission was less than `min_interval` ago.
    Throttled,
}

/// Single-slot, non-blocking admission control for rendering.
///
/// At most one frame is in flight between `Admitted` and `release()`, and
/// admissions are spaced at least `min_interval` apart. The busy flag is an
/// atomic compare-and-set, so `release` may run on a different thread from
/// the one that was admitted.
#[derive(Debug)]
pub struct AdmissionGate {
    busy: AtomicBool,
    /// Nanoseconds since `epoch` of the last admission, or `NEVER_EMITTED`.
    last_emit: AtomicU64,
    epoch: Instant,
    min_interval: Duration,
}

impl AdmissionGate {
    /// Create an idle gate.
    pub fn new(min_interval: Duration) -> Self {
        Self {
            busy: AtomicBool::new(false),
            last_emit: AtomicU64::new(NEVER_EMITTED),
            epoch: Instant::now(),
            min_interval,
        }
    }

    /// Try to claim the slot at time `now`.
    pub fn try_admit(&self, now: Instant) -> Admission {
        if self
            .busy
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return Admission::Rejected(Rejection::Busy);
        }

        // Only the claimant reaches this point, so `last_emit` has one writer.
        let now_nanos = self.nanos_since_epoch(now);
        let last = self.last_emit.load(Ordering::Relaxed);
        if last != NEVER_EMITTED {
            let elapsed = Duration::from_nanos(now_nanos.saturating_sub(last));
            if elapsed < self.min_interval {
                self.release();
                return Admission::Rejected(Rejection::Throttled);
            }
        }

        self.last_emit.store(now_nanos, Ordering::Relaxed);
        Admission::Admitted
    }

    /// Claim the slot and wrap it in a permit that releases on drop.
    pub fn try_acquire(
        self: &Arc<Self>,
        now: Instant,
    ) -> std::result::Result<AdmissionPermit, Rejection> {
        match self.try_admit(now) {
            Admission::Admitted => Ok(AdmissionPermit {
                gate: Some(Arc::clone(self)),
            }),
            Admission::Rejected(reason) => Err(reason),
        }
    }

    /// Return the slot. Call exactly once per `Admitted`, after the consumer
    /// is done with the frame, including when consuming it failed.
    pub fn release(&self) {
        self.busy.store(false, Ordering::Release);
    }

    /// True while an admitted frame has not been released.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Configured minimum spacing between admissions.
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    fn nanos_since_epoch(&self, now: Instant) -> u64 {
        let nanos = now.saturating_duration_since(self.epoch).as_nanos();
        u64::try_from(nanos).unwrap_or(NEVER_EMITTED - 1)
    }
}

impl Default for AdmissionGate {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_FRAME_INTERVAL)
    }
}

/// Proof of one admission. Releases the gate exactly once, either through
/// [`AdmissionPermit::release`] or when dropped, on whichever thread holds it.
#[derive(Debug)]
#[must_use = "dropping the permit immediately releases the gate"]
pub struct AdmissionPermit {
    gate: Option<Arc<AdmissionGate>>,
}

impl AdmissionPermit {
    /// Release the gate now.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if let Some(gate) = self.gate.take() {
            gate.release();
        }
    }
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.release_inner();
    }
}
