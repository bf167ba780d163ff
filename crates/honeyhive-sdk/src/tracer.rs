use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use honeyhive_engine::{
    Baggage, BaggageGuard, Enrichment, Span, SpanData, SpanOptions, WithBaggage, current_baggage,
    enter,
};
use honeyhive_export::{ExportStats, FlushReport};
use honeyhive_runtime::{TracerConfig, TracerRegistry, TracerShared};
use honeyhive_types::{EventType, keys};

use crate::error::Result;

/// Options for [`Tracer::trace`] / [`Tracer::trace_async`].
#[derive(Debug, Clone, Default)]
pub struct TraceOptions {
    /// Explicit event type; defaults to heuristics (usually `tool`).
    pub event_type: Option<EventType>,
    /// Recorded as `inputs._params_`.
    pub params: Option<Value>,
    pub kind: honeyhive_types::SpanKind,
}

/// Public tracer facade (C12).
///
/// A thin handle over the shared instance core; clones are cheap and all
/// refer to the same tracer.
#[derive(Clone)]
pub struct Tracer {
    inner: Arc<TracerShared>,
}

impl Tracer {
    /// Initialize a tracer. Configuration problems (missing project, bad
    /// URL) surface here; a missing API key or failed session bootstrap
    /// degrades instead of failing.
    pub fn init(config: TracerConfig) -> Result<Tracer> {
        let resolved = config.resolve().map_err(crate::error::Error::Init)?;
        let inner = TracerShared::init(resolved).map_err(crate::error::Error::Init)?;
        Ok(Tracer { inner })
    }

    /// Initialize, downgrading configuration errors to a disabled tracer
    /// instead of failing. Useful when telemetry must never block startup.
    pub fn init_degraded(config: TracerConfig) -> Tracer {
        match Tracer::init(config.clone()) {
            Ok(tracer) => tracer,
            Err(err) => {
                warn!(%err, "tracer init failed; continuing disabled");
                // Pin every field the environment could poison so the
                // fallback resolve cannot fail.
                let mut fallback = config;
                fallback.project = Some(
                    fallback
                        .project
                        .clone()
                        .unwrap_or_else(|| "unknown".to_string()),
                );
                fallback.server_url =
                    Some(honeyhive_runtime::config::DEFAULT_SERVER_URL.to_string());
                fallback.session_id = Some(fallback.session_id.unwrap_or_else(Uuid::new_v4));
                fallback.disable_tracing = Some(true);
                let resolved = fallback
                    .resolve()
                    .expect("pinned fallback config is always valid");
                let inner = TracerShared::init(resolved)
                    .expect("disabled tracer init cannot fail");
                Tracer { inner }
            }
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id()
    }

    pub fn session_id(&self) -> Uuid {
        self.inner.session_id()
    }

    pub fn project(&self) -> &str {
        &self.inner.config().project
    }

    pub fn source(&self) -> &str {
        &self.inner.config().source
    }

    pub fn is_degraded(&self) -> bool {
        self.inner.is_degraded()
    }

    /// Re-point the tracer at a session; allowed until the first span.
    pub fn set_session_id(&self, session_id: Uuid) -> bool {
        self.inner.set_session_id(session_id)
    }

    /// Start an intercepted span with default options.
    pub fn start_span(&self, name: &str) -> Span {
        self.inner.start_span(name, SpanOptions::default())
    }

    pub fn start_span_with(&self, name: &str, options: SpanOptions) -> Span {
        self.inner.start_span(name, options)
    }

    /// Feed a span observed from a third-party source through the
    /// read-only on-end path.
    pub fn observe_external(&self, data: SpanData) {
        self.inner.observe_external(data);
    }

    /// Set canonical attributes on a live span. Fails once the span ended.
    pub fn enrich_span(&self, span: &mut Span, enrichment: &Enrichment) -> Result<()> {
        span.enrich(enrichment).map_err(crate::error::Error::Span)
    }

    /// Attach feedback/metrics/user properties to the session itself.
    pub fn enrich_session(&self, enrichment: &Enrichment) {
        self.inner.enrich_session(enrichment);
    }

    /// Enter this tracer's baggage scope on the current thread. Spans
    /// started inside the scope (by any tracer-aware code path) resolve to
    /// this instance.
    pub fn scope(&self) -> BaggageGuard {
        enter(self.inner.scope_baggage())
    }

    /// Run `f` inside a span. The span's event id becomes the parent of
    /// any span started within; the return value is recorded as
    /// `outputs.result`. A panic marks the span failed and is re-raised.
    pub fn trace<T, F>(&self, name: &str, options: TraceOptions, f: F) -> T
    where
        T: Serialize,
        F: FnOnce(&mut Span) -> T,
    {
        let mut span = self.start_trace_span(name, &options);
        let baggage = self.child_baggage(&span);

        let outcome = {
            let _guard = enter(baggage);
            catch_unwind(AssertUnwindSafe(|| f(&mut span)))
        };

        match outcome {
            Ok(result) => {
                record_result(&mut span, &result);
                span.end();
                result
            }
            Err(panic) => {
                span.record_error(panic_message(&panic));
                span.end();
                resume_unwind(panic)
            }
        }
    }

    /// Like [`Tracer::trace`], for closures returning `Result`. An `Err`
    /// marks the span failed and is returned unchanged.
    pub fn trace_result<T, E, F>(
        &self,
        name: &str,
        options: TraceOptions,
        f: F,
    ) -> std::result::Result<T, E>
    where
        T: Serialize,
        E: std::fmt::Display,
        F: FnOnce(&mut Span) -> std::result::Result<T, E>,
    {
        let mut span = self.start_trace_span(name, &options);
        let baggage = self.child_baggage(&span);

        let outcome = {
            let _guard = enter(baggage);
            f(&mut span)
        };

        match &outcome {
            Ok(result) => record_result(&mut span, result),
            Err(err) => span.record_error(err.to_string()),
        }
        span.end();
        outcome
    }

    /// Async counterpart of [`Tracer::trace`]: the future runs inside the
    /// span's baggage scope (re-entered around every poll).
    pub async fn trace_async<T, Fut>(&self, name: &str, options: TraceOptions, future: Fut) -> T
    where
        T: Serialize,
        Fut: Future<Output = T>,
    {
        let mut span = self.start_trace_span(name, &options);
        let baggage = self.child_baggage(&span);

        let outcome = WithBaggage::new(AssertUnwindSafe(future).catch_unwind(), baggage).await;

        match outcome {
            Ok(result) => {
                record_result(&mut span, &result);
                span.end();
                result
            }
            Err(panic) => {
                span.record_error(panic_message(&panic));
                span.end();
                resume_unwind(panic)
            }
        }
    }

    /// Flush all exporters owned by this instance; bounded by `deadline`.
    pub fn flush(&self, deadline: Option<Duration>) -> FlushReport {
        self.inner.flush(deadline)
    }

    /// Flush with the default deadline, stop workers, release resources.
    /// Idempotent; post-shutdown spans are no-ops.
    pub fn shutdown(&self) -> FlushReport {
        self.inner.shutdown()
    }

    /// Export/drop counters for this instance.
    pub fn stats(&self) -> ExportStats {
        self.inner.stats()
    }

    fn start_trace_span(&self, name: &str, options: &TraceOptions) -> Span {
        let mut span = self.inner.start_span(
            name,
            SpanOptions {
                kind: options.kind,
                event_type: options.event_type,
                ..SpanOptions::default()
            },
        );
        if let Some(params) = &options.params {
            let mut enrichment = Enrichment::default();
            enrichment
                .inputs
                .insert("_params_".to_string(), params.clone());
            // The span just started; it cannot have ended.
            let _ = span.enrich(&enrichment);
        }
        span
    }

    fn child_baggage(&self, span: &Span) -> Baggage {
        // Keep anything the caller's scope already carries (experiment
        // overrides, outer parents), then point children at this span.
        let mut baggage = self.inner.scope_baggage().merged_with(&current_baggage());
        if !span.is_noop() {
            baggage.set(keys::PARENT_ID, span.event_id().to_string());
        }
        baggage
    }
}

fn record_result<T: Serialize>(span: &mut Span, result: &T) {
    if span.is_noop() {
        return;
    }
    if let Ok(value) = serde_json::to_value(result)
        && !value.is_null()
    {
        let mut enrichment = Enrichment::default();
        enrichment.outputs.insert("result".to_string(), value);
        let _ = span.enrich(&enrichment);
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}

/// Run `f` inside a span on the discovered tracer. Discovery order:
/// `explicit` argument > tracer referenced by the current baggage scope >
/// process default. With none of those, `f` runs unmodified under an inert
/// span.
pub fn trace_discovered<T, F>(
    explicit: Option<&Tracer>,
    name: &str,
    options: TraceOptions,
    f: F,
) -> T
where
    T: Serialize,
    F: FnOnce(&mut Span) -> T,
{
    let discovered = TracerRegistry::global().discover(explicit.map(|t| t.inner.clone()));
    match discovered {
        Some(inner) => Tracer { inner }.trace(name, options, f),
        None => {
            let mut span = Span::noop(name);
            f(&mut span)
        }
    }
}

/// Make `tracer` the process default (decorator auto-discovery fallback).
pub fn set_default_tracer(tracer: &Tracer) {
    TracerRegistry::global().set_default(&tracer.inner);
}

/// The process default tracer, if one is set and alive.
pub fn get_default_tracer() -> Option<Tracer> {
    TracerRegistry::global()
        .get_default()
        .map(|inner| Tracer { inner })
}
