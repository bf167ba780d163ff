use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, Notify, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout};
use tracing::{debug, warn};

use honeyhive_engine::{ProcessedSpan, SinkError, SpanSink};

use crate::config::ExportConfig;
use crate::counters::{ExportCounters, ExportStats};
use crate::transport::Transport;

/// Result of a deadline-bound flush
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Spans exported during the flush window
    pub flushed: u64,
    /// Spans dropped during the flush window
    pub dropped: u64,
    /// Spans still queued or in flight when the deadline hit
    pub cancelled: u64,
}

struct Shared {
    receiver: Mutex<mpsc::Receiver<ProcessedSpan>>,
    transport: Box<dyn Transport>,
    config: ExportConfig,
    counters: ExportCounters,
    /// Spans sitting in the channel
    queued: AtomicUsize,
    /// Spans taken by a worker but not yet resolved
    in_flight: AtomicUsize,
    shutdown: AtomicBool,
    /// Bumped when a flush deadline expires; retries sleeping across the
    /// bump give up their batch.
    cancel_epoch: AtomicU64,
    /// Wakes retry sleeps on shutdown or retry cancellation
    wake: Notify,
}

/// Producer-side handle; this is the processor's sink.
pub struct ExportHandle {
    sender: mpsc::Sender<ProcessedSpan>,
    shared: Arc<Shared>,
}

impl SpanSink for ExportHandle {
    /// Bounded, non-blocking enqueue. The caller (span processor) counts
    /// the drop on `QueueFull`/`Shutdown`.
    fn submit(&self, span: ProcessedSpan) -> Result<(), SinkError> {
        if self.shared.shutdown.load(Ordering::Acquire) {
            return Err(SinkError::Shutdown);
        }
        match self.sender.try_send(span) {
            Ok(()) => {
                self.shared.queued.fetch_add(1, Ordering::Relaxed);
                self.shared.counters.enqueued.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => Err(SinkError::QueueFull),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SinkError::Shutdown),
        }
    }
}

/// One exporter: queue, worker pool, retries, flush/shutdown discipline.
/// The same pipeline backs both the OTLP and the event-API transports.
pub struct ExportPipeline {
    shared: Arc<Shared>,
    handle: Arc<ExportHandle>,
    workers: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl ExportPipeline {
    pub fn new(config: ExportConfig, transport: Box<dyn Transport>) -> Self {
        Self::with_counters(config, transport, ExportCounters::default())
    }

    /// Construct with externally shared counters (the span processor holds
    /// the same `dropped` cell).
    pub fn with_counters(
        config: ExportConfig,
        transport: Box<dyn Transport>,
        counters: ExportCounters,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let shared = Arc::new(Shared {
            receiver: Mutex::new(receiver),
            transport,
            config,
            counters,
            queued: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            shutdown: AtomicBool::new(false),
            cancel_epoch: AtomicU64::new(0),
            wake: Notify::new(),
        });
        let handle = Arc::new(ExportHandle {
            sender,
            shared: shared.clone(),
        });
        Self {
            shared,
            handle,
            workers: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn handle(&self) -> Arc<ExportHandle> {
        self.handle.clone()
    }

    pub fn stats(&self) -> ExportStats {
        self.shared.counters.snapshot()
    }

    /// Spawn the worker pool on the given runtime. Call once; the workers
    /// live until shutdown.
    pub fn start(&self, runtime: &tokio::runtime::Handle) {
        let mut workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
        if !workers.is_empty() {
            return;
        }
        for worker_id in 0..self.shared.config.worker_count.max(1) {
            let shared = self.shared.clone();
            workers.push(runtime.spawn(worker_loop(shared, worker_id)));
        }
        debug!(
            workers = workers.len(),
            destination = self.shared.transport.describe(),
            "export workers started"
        );
    }

    /// Drain until queue-empty or deadline. Returns within `deadline + ε`
    /// regardless of queue size.
    pub async fn flush(&self, deadline: Duration) -> FlushReport {
        let before = self.shared.counters.snapshot();
        let until = Instant::now() + deadline;

        loop {
            let pending = self.pending();
            if pending == 0 || Instant::now() >= until {
                break;
            }
            let nap = Duration::from_millis(10).min(until - Instant::now());
            tokio::time::sleep(nap).await;
        }

        let cancelled = self.pending() as u64;
        if cancelled > 0 {
            // Deadline hit with work outstanding: cut retry sleeps loose.
            self.shared.cancel_epoch.fetch_add(1, Ordering::AcqRel);
            self.shared.wake.notify_waiters();
        }

        let after = self.shared.counters.snapshot();
        FlushReport {
            flushed: after.exported - before.exported,
            dropped: after.dropped - before.dropped,
            cancelled,
        }
    }

    /// Flush, then stop workers and close clients. Idempotent; the second
    /// call is a no-op.
    pub async fn shutdown(&self, deadline: Duration) -> FlushReport {
        if self.shared.shutdown.swap(true, Ordering::AcqRel) {
            return FlushReport::default();
        }

        let report = self.flush(deadline).await;
        // Cut any retry sleeps loose, then collect the workers.
        self.shared.wake.notify_waiters();

        let workers: Vec<JoinHandle<()>> = {
            let mut guard = self.workers.lock().unwrap_or_else(|e| e.into_inner());
            guard.drain(..).collect()
        };
        for mut worker in workers {
            if timeout(Duration::from_secs(1), &mut worker).await.is_err() {
                worker.abort();
            }
        }
        report
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.shutdown.load(Ordering::Acquire)
    }

    fn pending(&self) -> usize {
        self.shared.queued.load(Ordering::Relaxed) + self.shared.in_flight.load(Ordering::Relaxed)
    }
}

async fn worker_loop(shared: Arc<Shared>, worker_id: usize) {
    loop {
        let batch = collect_batch(&shared).await;
        if batch.is_empty() {
            if shared.shutdown.load(Ordering::Acquire)
                && shared.queued.load(Ordering::Relaxed) == 0
            {
                break;
            }
            continue;
        }

        // `collect_batch` already moved these spans into the in-flight
        // count, so flush never observes them as "gone" before they send.
        send_with_retry(&shared, &batch, worker_id).await;
        shared.in_flight.fetch_sub(batch.len(), Ordering::Relaxed);
    }
    debug!(worker_id, "export worker stopped");
}

/// Pull up to `max_batch_size` spans, waiting at most `max_batch_delay`
/// after the first. Workers take turns holding the receiver; sending
/// happens outside the lock.
async fn collect_batch(shared: &Shared) -> Vec<ProcessedSpan> {
    let mut receiver = shared.receiver.lock().await;
    let size = shared.config.effective_batch_size();
    let mut batch = Vec::new();

    // Bounded first wait so workers notice shutdown promptly.
    match timeout(Duration::from_millis(50), receiver.recv()).await {
        Ok(Some(span)) => {
            take_one(shared);
            batch.push(span);
        }
        Ok(None) | Err(_) => return batch,
    }

    let deadline = Instant::now() + shared.config.effective_batch_delay();
    while batch.len() < size {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            match receiver.try_recv() {
                Ok(span) => {
                    take_one(shared);
                    batch.push(span);
                }
                Err(_) => break,
            }
            continue;
        }
        match timeout(remaining, receiver.recv()).await {
            Ok(Some(span)) => {
                take_one(shared);
                batch.push(span);
            }
            Ok(None) | Err(_) => break,
        }
    }
    batch
}

/// Move one span from the queued count to the in-flight count.
fn take_one(shared: &Shared) {
    shared.in_flight.fetch_add(1, Ordering::Relaxed);
    shared.queued.fetch_sub(1, Ordering::Relaxed);
}

async fn send_with_retry(shared: &Shared, batch: &[ProcessedSpan], worker_id: usize) {
    let policy = &shared.config.retry;
    let n = batch.len() as u64;

    for attempt in 1..=policy.max_attempts.max(1) {
        match shared.transport.send(batch).await {
            Ok(()) => {
                shared.counters.exported.fetch_add(n, Ordering::Relaxed);
                return;
            }
            Err(err) if !err.is_retryable() => {
                warn!(worker_id, %err, spans = n, "batch dropped (non-retryable)");
                shared.counters.dropped.fetch_add(n, Ordering::Relaxed);
                return;
            }
            Err(err) => {
                if attempt == policy.max_attempts.max(1) {
                    warn!(worker_id, %err, spans = n, "batch dropped (retries exhausted)");
                    shared.counters.dropped.fetch_add(n, Ordering::Relaxed);
                    return;
                }
                shared.counters.retries.fetch_add(1, Ordering::Relaxed);
                let delay = policy.delay(attempt, err.retry_after());
                debug!(worker_id, attempt, delay_ms = delay.as_millis() as u64, "retrying batch");
                let epoch = shared.cancel_epoch.load(Ordering::Acquire);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shared.wake.notified() => {
                        let cancelled = shared.shutdown.load(Ordering::Acquire)
                            || shared.cancel_epoch.load(Ordering::Acquire) != epoch;
                        if cancelled {
                            shared.counters.dropped.fetch_add(n, Ordering::Relaxed);
                            return;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use honeyhive_types::{CanonicalEvent, EventType, SpanKind};
    use std::sync::atomic::AtomicU64;

    use crate::error::ExportError;

    fn processed(name: &str) -> ProcessedSpan {
        let data = honeyhive_engine::SpanData::new(name, SpanKind::Internal, [0u8; 16]);
        let event = CanonicalEvent::new(
            "proj",
            "production",
            uuid::Uuid::new_v4(),
            name,
            EventType::Tool,
        );
        ProcessedSpan { data, event }
    }

    /// Transport that records batches; optionally fails the first N sends.
    struct FakeTransport {
        sent: Arc<AtomicU64>,
        fail_first: AtomicU64,
        permanent: bool,
    }

    impl FakeTransport {
        fn ok(sent: Arc<AtomicU64>) -> Self {
            Self {
                sent,
                fail_first: AtomicU64::new(0),
                permanent: false,
            }
        }

        fn failing(sent: Arc<AtomicU64>, failures: u64, permanent: bool) -> Self {
            Self {
                sent,
                fail_first: AtomicU64::new(failures),
                permanent,
            }
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn send(&self, batch: &[ProcessedSpan]) -> Result<(), ExportError> {
            let remaining = self.fail_first.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_first.store(remaining - 1, Ordering::SeqCst);
                return if self.permanent {
                    Err(ExportError::Permanent {
                        status: 400,
                        message: "bad".into(),
                    })
                } else {
                    Err(ExportError::Transient {
                        status: Some(503),
                        retry_after: None,
                        message: "unavailable".into(),
                    })
                };
            }
            self.sent.fetch_add(batch.len() as u64, Ordering::SeqCst);
            Ok(())
        }

        fn describe(&self) -> String {
            "fake".to_string()
        }
    }

    fn quick_config(queue: usize) -> ExportConfig {
        ExportConfig {
            queue_capacity: queue,
            max_batch_size: 4,
            max_batch_delay: Duration::from_millis(10),
            worker_count: 2,
            http_timeout: Duration::from_secs(1),
            retry: crate::retry::RetryPolicy {
                max_attempts: 3,
                base: Duration::from_millis(1),
                cap: Duration::from_millis(5),
            },
            disable_batch: false,
        }
    }

    #[tokio::test]
    async fn test_export_round_trip() {
        let sent = Arc::new(AtomicU64::new(0));
        let pipeline =
            ExportPipeline::new(quick_config(64), Box::new(FakeTransport::ok(sent.clone())));
        pipeline.start(&tokio::runtime::Handle::current());

        let handle = pipeline.handle();
        for i in 0..10 {
            handle.submit(processed(&format!("span-{}", i))).unwrap();
        }

        let report = pipeline.flush(Duration::from_secs(2)).await;
        assert_eq!(report.cancelled, 0);
        assert_eq!(pipeline.stats().exported, 10);
        assert_eq!(sent.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_queue_full_drops_without_blocking() {
        let sent = Arc::new(AtomicU64::new(0));
        // Workers intentionally not started: the exporter is stalled.
        let pipeline =
            ExportPipeline::new(quick_config(2), Box::new(FakeTransport::ok(sent.clone())));
        let handle = pipeline.handle();

        let mut rejected = 0;
        for i in 0..10 {
            if handle.submit(processed(&format!("span-{}", i))) == Err(SinkError::QueueFull) {
                rejected += 1;
            }
        }
        assert_eq!(rejected, 8);

        // Unstall: the two accepted spans make it out.
        pipeline.start(&tokio::runtime::Handle::current());
        let report = pipeline.flush(Duration::from_secs(2)).await;
        assert_eq!(report.cancelled, 0);
        assert_eq!(pipeline.stats().exported, 2);
        assert_eq!(sent.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let sent = Arc::new(AtomicU64::new(0));
        let transport = FakeTransport::failing(sent.clone(), 2, false);
        let pipeline = ExportPipeline::new(quick_config(16), Box::new(transport));
        pipeline.start(&tokio::runtime::Handle::current());

        pipeline.handle().submit(processed("retry-me")).unwrap();
        let report = pipeline.flush(Duration::from_secs(2)).await;

        assert_eq!(report.flushed, 1);
        assert!(pipeline.stats().retries >= 2);
    }

    #[tokio::test]
    async fn test_permanent_failure_drops_immediately() {
        let sent = Arc::new(AtomicU64::new(0));
        let transport = FakeTransport::failing(sent.clone(), 1, true);
        let pipeline = ExportPipeline::new(quick_config(16), Box::new(transport));
        pipeline.start(&tokio::runtime::Handle::current());

        pipeline.handle().submit(processed("doomed")).unwrap();
        let report = pipeline.flush(Duration::from_secs(2)).await;

        assert_eq!(report.dropped, 1);
        assert_eq!(report.flushed, 0);
        assert_eq!(pipeline.stats().retries, 0);
    }

    #[tokio::test]
    async fn test_flush_respects_deadline() {
        let sent = Arc::new(AtomicU64::new(0));
        // Stalled exporter (no workers): flush must still return on time.
        let pipeline =
            ExportPipeline::new(quick_config(64), Box::new(FakeTransport::ok(sent)));
        let handle = pipeline.handle();
        for i in 0..32 {
            handle.submit(processed(&format!("span-{}", i))).unwrap();
        }

        let started = std::time::Instant::now();
        let report = pipeline.flush(Duration::from_millis(100)).await;
        assert!(started.elapsed() < Duration::from_millis(500));
        assert_eq!(report.cancelled, 32);
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let sent = Arc::new(AtomicU64::new(0));
        let pipeline =
            ExportPipeline::new(quick_config(16), Box::new(FakeTransport::ok(sent.clone())));
        pipeline.start(&tokio::runtime::Handle::current());

        pipeline.handle().submit(processed("last")).unwrap();
        let first = pipeline.shutdown(Duration::from_secs(2)).await;
        assert_eq!(first.flushed, 1);

        let second = pipeline.shutdown(Duration::from_secs(2)).await;
        assert_eq!(second, FlushReport::default());

        // Post-shutdown submits are refused with the shutdown sentinel.
        assert_eq!(
            pipeline.handle().submit(processed("late")),
            Err(SinkError::Shutdown)
        );
    }
}
