//! Per-keystore operation counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Operation counts for one keystore, independent of the global recorder
#[derive(Debug, Default)]
pub struct OperationCounters {
    stored: AtomicU64,
    loaded: AtomicU64,
    deleted: AtomicU64,
    wiped: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of [`OperationCounters`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OperationsSnapshot {
    pub stored: u64,
    pub loaded: u64,
    pub deleted: u64,
    pub wiped: u64,
    pub failed: u64,
}

impl OperationCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_stored(&self) {
        self.stored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_loaded(&self) {
        self.loaded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_deleted(&self) {
        self.deleted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_wiped(&self) {
        self.wiped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of current counts
    pub fn snapshot(&self) -> OperationsSnapshot {
        OperationsSnapshot {
            stored: self.stored.load(Ordering::Relaxed),
            loaded: self.loaded.load(Ordering::Relaxed),
            deleted: self.deleted.load(Ordering::Relaxed),
            wiped: self.wiped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}
