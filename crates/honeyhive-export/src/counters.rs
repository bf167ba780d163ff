use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared export accounting. The `dropped` cell is handed to the span
/// processor as well, so queue-full and degraded-mode drops land in the
/// same place as retry-exhausted ones.
#[derive(Debug, Default)]
pub struct ExportCounters {
    pub enqueued: AtomicU64,
    pub exported: AtomicU64,
    pub dropped: Arc<AtomicU64>,
    pub retries: AtomicU64,
}

/// Point-in-time snapshot of the counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExportStats {
    pub enqueued: u64,
    pub exported: u64,
    pub dropped: u64,
    pub retries: u64,
}

impl ExportCounters {
    pub fn new(dropped: Arc<AtomicU64>) -> Self {
        Self {
            enqueued: AtomicU64::new(0),
            exported: AtomicU64::new(0),
            dropped,
            retries: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> ExportStats {
        ExportStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            exported: self.exported.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
        }
    }
}
