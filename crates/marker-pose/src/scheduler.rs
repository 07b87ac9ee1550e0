//! Single-flight admission of frames.
//!
//! At most one frame is in flight per scheduler. A frame offered while
//! another is being processed is dropped on the spot; nothing is queued.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Default)]
struct State {
    busy: bool,
    admitted: u64,
    dropped: u64,
}

/// Frame counters since the scheduler was created.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub admitted: u64,
    pub dropped: u64,
}

/// `IDLE -> PROCESSING -> IDLE` gate shared by producers and the worker.
///
/// Cloning yields another handle to the same gate.
#[derive(Clone, Debug, Default)]
pub struct FrameScheduler {
    state: Arc<Mutex<State>>,
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the gate. `None` means a pass is already running and the caller
    /// must discard its frame.
    ///
    /// The check and the transition happen under one lock, so two concurrent
    /// callers can never both be admitted.
    pub fn try_admit(&self) -> Option<AdmissionGuard> {
        let mut state = self.state.lock();
        if state.busy {
            state.dropped += 1;
            return None;
        }
        state.busy = true;
        state.admitted += 1;
        Some(AdmissionGuard {
            state: Arc::clone(&self.state),
        })
    }

    /// Whether a pass is currently in flight.
    pub fn is_busy(&self) -> bool {
        self.state.lock().busy
    }

    pub fn stats(&self) -> SchedulerStats {
        let state = self.state.lock();
        SchedulerStats {
            admitted: state.admitted,
            dropped: state.dropped,
        }
    }
}

/// Proof of admission. Dropping it returns the scheduler to idle, on every
/// exit path of the pass including unwinding.
#[derive(Debug)]
#[must_use = "the frame is only in flight while the guard is alive"]
pub struct AdmissionGuard {
    state: Arc<Mutex<State>>,
}

impl Drop for AdmissionGuard {
    fn drop(&mut self) {
        self.state.lock().busy = false;
    }
}
