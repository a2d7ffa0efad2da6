pub mod convergence;
pub mod export;

use portable_atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Shared stop flag for long sweeps. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Completed-run counter, readable while a sweep is in flight (lock-free).
#[derive(Debug, Clone, Default)]
pub struct SweepProgress {
    completed: Arc<AtomicU64>,
}

impl SweepProgress {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn record(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }
}
