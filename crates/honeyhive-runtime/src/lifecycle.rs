use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, RwLock};
use std::time::Duration;

use tracing::{debug, warn};
use uuid::Uuid;

use honeyhive_bundle::Bundle;
use honeyhive_engine::{
    Baggage, Enrichment, ProcessorIdentity, Span, SpanFactory, SpanOptions, SpanProcessor,
};
use honeyhive_export::{
    EventTransport, ExportCounters, ExportPipeline, ExportStats, FlushReport, OtlpTransport,
    Transport,
};
use honeyhive_types::{EventType, ExportMode, keys};
use honeyhive_ulde::{DetectionEngine, ExtractorEngine};

use crate::config::ResolvedConfig;
use crate::error::Result;
use crate::provider::{self, ProviderRole};
use crate::registry::TracerRegistry;
use crate::session::SessionClient;

const DEFAULT_FLUSH_DEADLINE: Duration = Duration::from_secs(10);
const DEFAULT_SHUTDOWN_DEADLINE: Duration = Duration::from_secs(5);
const DETECTION_CACHE_ENTRIES: usize = 1024;
const EXTRACTOR_CACHE_ENTRIES: usize = 64;
const CACHE_TTL: Duration = Duration::from_secs(600);

/// Shared core of one tracer instance (C10).
///
/// Owns the exporter pipeline and a small background runtime; the public
/// `Tracer` facade and the registry hold it behind `Arc`/`Weak`.
pub struct TracerShared {
    id: Uuid,
    config: ResolvedConfig,
    session_id: RwLock<Uuid>,
    session_started: AtomicBool,
    degraded: AtomicBool,
    role: OnceLock<ProviderRole>,
    /// `None` when tracing is disabled: every span is an inert no-op.
    factory: RwLock<Option<SpanFactory>>,
    processor: Option<Arc<SpanProcessor>>,
    pipeline: Option<ExportPipeline>,
    runtime: Mutex<Option<tokio::runtime::Runtime>>,
    runtime_handle: Option<tokio::runtime::Handle>,
    shutdown_done: AtomicBool,
}

impl TracerShared {
    /// Initialization order: cache → bundle → ULDE → exporters started →
    /// provider decision → registry registration → session bootstrap. The
    /// bootstrap HTTP call runs last so the provider decision never waits
    /// on the network; a failed bootstrap degrades the already-registered
    /// instance in place.
    pub fn init(config: ResolvedConfig) -> Result<Arc<TracerShared>> {
        if config.verbose {
            init_verbose_logging();
        }

        let id = Uuid::new_v4();

        if config.disable_tracing {
            debug!(tracer = %id, "tracing disabled; no-op tracer");
            let shared = Arc::new(TracerShared {
                id,
                session_id: RwLock::new(config.session_id.unwrap_or_else(Uuid::new_v4)),
                config,
                session_started: AtomicBool::new(false),
                degraded: AtomicBool::new(true),
                role: OnceLock::new(),
                factory: RwLock::new(None),
                processor: None,
                pipeline: None,
                runtime: Mutex::new(None),
                runtime_handle: None,
                shutdown_done: AtomicBool::new(false),
            });
            TracerRegistry::global().register(&shared);
            return Ok(shared);
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("honeyhive-export")
            .enable_all()
            .build()?;
        let runtime_handle = runtime.handle().clone();

        // ULDE readiness. A missing/corrupt bundle disables detection but
        // not the tracer.
        let ulde = match Bundle::load() {
            Ok(bundle) => Some((
                DetectionEngine::new(bundle.clone(), DETECTION_CACHE_ENTRIES, CACHE_TTL),
                ExtractorEngine::new(bundle, EXTRACTOR_CACHE_ENTRIES, CACHE_TTL),
            )),
            Err(err) => {
                warn!(%err, "rule bundle unavailable; detection disabled");
                None
            }
        };

        let session_id = config.session_id.unwrap_or_else(Uuid::new_v4);
        // A missing key is known without touching the network; bootstrap
        // failures flip this flag later.
        let degraded = config.api_key.is_none();
        if degraded {
            warn!("no api key; tracer degraded (events will be dropped)");
        }

        let drop_cell = Arc::new(AtomicU64::new(0));
        let export_config = config.export_config();
        let transport: Box<dyn Transport> = match config.export_mode {
            ExportMode::Otlp => Box::new(OtlpTransport::new(
                &config.server_url,
                config.api_key.as_deref().unwrap_or_default(),
                &config.project,
                &config.source,
                export_config.http_timeout,
                false,
            )?),
            ExportMode::Events => Box::new(EventTransport::new(
                &config.server_url,
                config.api_key.as_deref().unwrap_or_default(),
                export_config.http_timeout,
            )?),
        };
        let pipeline = ExportPipeline::with_counters(
            export_config,
            transport,
            ExportCounters::new(drop_cell.clone()),
        );
        pipeline.start(&runtime_handle);

        let identity = ProcessorIdentity {
            tracer_id: id,
            session_id,
            project: config.project.clone(),
            source: config.source.clone(),
            degraded,
        };
        let processor = Arc::new(SpanProcessor::new(
            ulde,
            pipeline.handle(),
            identity,
            drop_cell,
        ));

        let factory = SpanFactory::new(
            processor.clone(),
            base_baggage(id, session_id, &config),
            *session_id.as_bytes(),
            config.disable_http_tracing,
        );

        let shared = Arc::new(TracerShared {
            id,
            session_id: RwLock::new(session_id),
            config,
            session_started: AtomicBool::new(false),
            degraded: AtomicBool::new(degraded),
            role: OnceLock::new(),
            factory: RwLock::new(Some(factory)),
            processor: Some(processor),
            pipeline: Some(pipeline),
            runtime: Mutex::new(Some(runtime)),
            runtime_handle: Some(runtime_handle),
            shutdown_done: AtomicBool::new(false),
        });

        // Atomic provider decision, then registration. A later tracer never
        // displaces a live main provider.
        let role = provider::decide(id, Arc::downgrade(&shared));
        let _ = shared.role.set(role);
        let registry = TracerRegistry::global();
        registry.register(&shared);
        if role == ProviderRole::Main && registry.get_default().is_none() {
            registry.set_default(&shared);
        }

        // Session bootstrap last; every failure path degrades instead of
        // erroring.
        shared.bootstrap_session();

        Ok(shared)
    }

    /// One-shot session creation against the backend. Runs after the
    /// instance is registered; failures degrade it in place.
    fn bootstrap_session(&self) {
        let Some(api_key) = &self.config.api_key else {
            return;
        };
        let Some(handle) = &self.runtime_handle else {
            return;
        };

        let requested = self.session_id();
        let bootstrap = SessionClient::new(
            &self.config.server_url,
            api_key,
            self.config
                .http_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(Duration::from_secs(10)),
        )
        .and_then(|client| {
            block_on_safely(
                handle,
                client.start(
                    &self.config.project,
                    &self.config.source,
                    requested,
                    &self.config.project,
                ),
            )
        });

        match bootstrap {
            Ok(assigned) => {
                if assigned != requested {
                    self.apply_session_id(assigned);
                }
            }
            Err(err) => {
                warn!(%err, "session bootstrap failed; tracer degraded");
                self.degraded.store(true, Ordering::Release);
                if let Some(processor) = &self.processor {
                    processor.set_degraded(true);
                }
            }
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn session_id(&self) -> Uuid {
        *self.session_id.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    pub fn role(&self) -> Option<ProviderRole> {
        self.role.get().copied()
    }

    /// Re-point the instance at a session. Allowed until the first span
    /// starts.
    pub fn set_session_id(&self, new_id: Uuid) -> bool {
        if self.session_started.load(Ordering::Acquire) {
            return false;
        }
        self.apply_session_id(new_id);
        true
    }

    fn apply_session_id(&self, new_id: Uuid) {
        {
            let mut session = self.session_id.write().unwrap_or_else(|e| e.into_inner());
            *session = new_id;
        }
        if let Some(processor) = &self.processor {
            processor.set_session_id(new_id);
            let mut factory = self.factory.write().unwrap_or_else(|e| e.into_inner());
            *factory = Some(SpanFactory::new(
                processor.clone(),
                base_baggage(self.id, new_id, &self.config),
                *new_id.as_bytes(),
                self.config.disable_http_tracing,
            ));
        }
    }

    /// Start an intercepted span (C6 path).
    pub fn start_span(&self, name: &str, options: SpanOptions) -> Span {
        if self.shutdown_done.load(Ordering::Acquire) {
            return Span::noop(name);
        }
        let factory = self.factory.read().unwrap_or_else(|e| e.into_inner());
        match factory.as_ref() {
            Some(factory) => {
                self.session_started.store(true, Ordering::Release);
                factory.start_span(name, options)
            }
            None => Span::noop(name),
        }
    }

    /// Feed a span observed from a third-party source through the
    /// read-only on-end path.
    pub fn observe_external(&self, data: honeyhive_engine::SpanData) {
        if self.shutdown_done.load(Ordering::Acquire) {
            return;
        }
        if let Some(processor) = &self.processor {
            processor.on_end_external(data);
        }
    }

    /// Baggage carrying this instance's identity, for scope entry.
    pub fn scope_baggage(&self) -> Baggage {
        base_baggage(self.id, self.session_id(), &self.config)
    }

    /// Emit a session-level enrichment event (feedback, metrics, user
    /// properties attached to the session).
    pub fn enrich_session(&self, enrichment: &Enrichment) {
        if enrichment.is_empty() {
            return;
        }
        let mut span = self.start_span(
            "session",
            SpanOptions {
                event_type: Some(EventType::Session),
                ..SpanOptions::default()
            },
        );
        // The span just started; it cannot have ended yet.
        let _ = span.enrich(enrichment);
        span.end();
    }

    /// Flush all exporters owned by this instance, bounded by `deadline`.
    /// A no-op after shutdown.
    pub fn flush(&self, deadline: Option<Duration>) -> FlushReport {
        if self.shutdown_done.load(Ordering::Acquire) {
            return FlushReport::default();
        }
        let deadline = deadline.unwrap_or(DEFAULT_FLUSH_DEADLINE);
        match (&self.pipeline, &self.runtime_handle) {
            (Some(pipeline), Some(handle)) => {
                block_on_safely(handle, pipeline.flush(deadline))
            }
            _ => FlushReport::default(),
        }
    }

    /// Shutdown: flush with the default deadline, stop workers, release the
    /// registry entry and caches. Idempotent; later calls are no-ops.
    pub fn shutdown(&self) -> FlushReport {
        if self.shutdown_done.swap(true, Ordering::AcqRel) {
            return FlushReport::default();
        }

        let report = match (&self.pipeline, &self.runtime_handle) {
            (Some(pipeline), Some(handle)) => {
                block_on_safely(handle, pipeline.shutdown(DEFAULT_SHUTDOWN_DEADLINE))
            }
            _ => FlushReport::default(),
        };

        TracerRegistry::global().unregister(self.id);
        if let Some(processor) = &self.processor {
            processor.clear_caches();
        }
        {
            let mut factory = self.factory.write().unwrap_or_else(|e| e.into_inner());
            *factory = None;
        }
        let runtime = {
            let mut guard = self.runtime.lock().unwrap_or_else(|e| e.into_inner());
            guard.take()
        };
        if let Some(runtime) = runtime {
            runtime.shutdown_timeout(Duration::from_secs(1));
        }
        debug!(tracer = %self.id, "tracer shut down");
        report
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown_done.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> ExportStats {
        self.pipeline
            .as_ref()
            .map(|p| p.stats())
            .unwrap_or_default()
    }
}

impl Drop for TracerShared {
    fn drop(&mut self) {
        if self.shutdown_done.load(Ordering::Acquire) {
            return;
        }
        // Best-effort: release background threads without blocking the
        // host's drop path. Unflushed spans are lost, as documented.
        TracerRegistry::global().unregister(self.id);
        let runtime = {
            let mut guard = self.runtime.lock().unwrap_or_else(|e| e.into_inner());
            guard.take()
        };
        if let Some(runtime) = runtime {
            runtime.shutdown_background();
        }
    }
}

fn base_baggage(tracer_id: Uuid, session_id: Uuid, config: &ResolvedConfig) -> Baggage {
    let mut baggage = Baggage::new();
    baggage.set(keys::SESSION_ID, session_id.to_string());
    baggage.set(keys::PROJECT, config.project.clone());
    baggage.set(keys::SOURCE, config.source.clone());
    baggage.set(keys::TRACER_ID, tracer_id.to_string());
    for (suffix, value) in config.experiment_entries() {
        baggage.set(format!("{}{}", keys::EXPERIMENT_PREFIX, suffix), value);
    }
    baggage
}

/// Block on a future owned by our runtime, tolerating callers that are
/// themselves inside an async context (where `Handle::block_on` would
/// panic).
fn block_on_safely<F>(handle: &tokio::runtime::Handle, future: F) -> F::Output
where
    F: Future + Send,
    F::Output: Send,
{
    if tokio::runtime::Handle::try_current().is_ok() {
        std::thread::scope(|scope| {
            scope
                .spawn(|| handle.block_on(future))
                .join()
                .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
        })
    } else {
        handle.block_on(future)
    }
}

fn init_verbose_logging() {
    use tracing_subscriber::{EnvFilter, fmt};
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("honeyhive=debug,honeyhive_export=debug"));
    // A host subscriber may already be installed; that is fine.
    let _ = fmt().with_env_filter(filter).try_init();
}
