use std::time::Duration;

use crate::retry::RetryPolicy;

/// Export pipeline tuning. Field defaults match the documented
/// configuration keys.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub queue_capacity: usize,
    pub max_batch_size: usize,
    pub max_batch_delay: Duration,
    pub worker_count: usize,
    pub http_timeout: Duration,
    pub retry: RetryPolicy,
    /// Per-span flushing: batch size 1, no delay.
    pub disable_batch: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 2048,
            max_batch_size: 128,
            max_batch_delay: Duration::from_millis(500),
            worker_count: 2,
            http_timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
            disable_batch: false,
        }
    }
}

impl ExportConfig {
    pub(crate) fn effective_batch_size(&self) -> usize {
        if self.disable_batch {
            1
        } else {
            self.max_batch_size.max(1)
        }
    }

    pub(crate) fn effective_batch_delay(&self) -> Duration {
        if self.disable_batch {
            Duration::ZERO
        } else {
            self.max_batch_delay
        }
    }
}
