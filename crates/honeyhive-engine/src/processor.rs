use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::{debug, warn};
use uuid::Uuid;

use honeyhive_types::{AttrMap, AttrValue, CanonicalEvent, EventType, SpanKind, keys};
use honeyhive_ulde::{DetectionEngine, ExtractorEngine};

use crate::baggage::Baggage;
use crate::event::build_event;
use crate::span::SpanData;

/// Identity baked into a processor at tracer init; the fallback when a span
/// reaches the processor without enrichment baggage.
#[derive(Debug, Clone)]
pub struct ProcessorIdentity {
    pub tracer_id: Uuid,
    pub session_id: Uuid,
    pub project: String,
    pub source: String,
    pub degraded: bool,
}

/// A fully processed span ready for export: the sealed span data plus the
/// canonical event assembled from it.
#[derive(Debug, Clone)]
pub struct ProcessedSpan {
    pub data: SpanData,
    pub event: CanonicalEvent,
}

/// Why a sink refused a span
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// Queue at capacity; the span was dropped and counted.
    QueueFull,
    /// The exporter has shut down.
    Shutdown,
}

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkError::QueueFull => write!(f, "export queue full"),
            SinkError::Shutdown => write!(f, "exporter shut down"),
        }
    }
}

/// Export seam. Exactly one sink receives each span; the concrete
/// implementations (OTLP, event API) live in the export layer.
pub trait SpanSink: Send + Sync {
    fn submit(&self, span: ProcessedSpan) -> std::result::Result<(), SinkError>;
}

/// Span processor (C7): enrichment at start, detection/extraction at the
/// pre-end hook or the read-only on-end path, then dispatch.
///
/// Every entry point swallows its own failures; host code never sees an
/// error from span processing.
pub struct SpanProcessor {
    /// `None` when the rule bundle failed to load: enrichment still runs,
    /// extraction yields empty sections.
    ulde: Option<(DetectionEngine, ExtractorEngine)>,
    sink: Arc<dyn SpanSink>,
    /// Session bootstrap completes after the processor exists, so the
    /// identity stays adjustable (session id, degraded flag).
    identity: RwLock<ProcessorIdentity>,
    error_count: AtomicU64,
    drop_count: Arc<AtomicU64>,
}

impl SpanProcessor {
    pub fn new(
        ulde: Option<(DetectionEngine, ExtractorEngine)>,
        sink: Arc<dyn SpanSink>,
        identity: ProcessorIdentity,
        drop_count: Arc<AtomicU64>,
    ) -> Self {
        Self {
            ulde,
            sink,
            identity: RwLock::new(identity),
            error_count: AtomicU64::new(0),
            drop_count,
        }
    }

    pub fn identity(&self) -> ProcessorIdentity {
        self.identity
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn set_session_id(&self, session_id: Uuid) {
        let mut identity = self.identity.write().unwrap_or_else(|e| e.into_inner());
        identity.session_id = session_id;
    }

    pub fn set_degraded(&self, degraded: bool) {
        let mut identity = self.identity.write().unwrap_or_else(|e| e.into_inner());
        identity.degraded = degraded;
    }

    /// on_start: write enrichment attributes from baggage (with the legacy
    /// mirror), detect a provisional event type, record the start state.
    pub fn on_start(&self, data: &mut SpanData, baggage: &Baggage) {
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            self.enrich_from_baggage(data, baggage);
            data.event_type = detect_event_type(&data.name, data.kind, &data.attributes);
        }));
        if outcome.is_err() {
            self.log_swallowed("on_start");
        }
    }

    /// Pre-end hook (C6): runs while the span is still mutable, after
    /// third-party instrumentors have written their attributes. Writes the
    /// canonical `honeyhive_*` set back onto the span.
    pub fn run_pre_end(&self, data: &mut SpanData) {
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            // The explicit attribute is authoritative over heuristics.
            data.event_type = detect_event_type(&data.name, data.kind, &data.attributes);

            let Some((detection_engine, extraction_engine)) = &self.ulde else {
                self.seal(data);
                return;
            };

            let detection = detection_engine.detect(&data.attributes);
            data.instrumentor = detection.instrumentor;
            if detection.is_known() {
                data.provider = Some(detection.provider.clone());
            }

            let sections =
                extraction_engine.extract(&detection.provider, detection.instrumentor, &data.attributes);

            for (prefix, map) in [
                (keys::INPUTS_PREFIX, &sections.inputs),
                (keys::OUTPUTS_PREFIX, &sections.outputs),
                (keys::CONFIG_PREFIX, &sections.config),
                (keys::METADATA_PREFIX, &sections.metadata),
            ] {
                for (field, value) in map.iter() {
                    if let Some(attr) = AttrValue::from_json(value) {
                        data.attributes.insert(format!("{}{}", prefix, field), attr);
                    }
                }
            }
            self.seal(data);
        }));
        if outcome.is_err() {
            self.log_swallowed("pre_end");
        }
    }

    fn seal(&self, data: &mut SpanData) {
        data.attributes.insert(
            keys::PROCESSED.to_string(),
            AttrValue::Str("true".to_string()),
        );
        data.attributes.insert(
            keys::SCHEMA_VERSION.to_string(),
            AttrValue::Str(honeyhive_types::SCHEMA_VERSION.to_string()),
        );
    }

    /// on_end: dispatch a span that already ran the pre-end hook.
    pub fn on_end(&self, data: SpanData) {
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let event = build_event(&data, &self.identity());
            self.dispatch(ProcessedSpan { data, event });
        }));
        if outcome.is_err() {
            self.log_swallowed("on_end");
        }
    }

    /// Read-only path for spans not created through our tracer: detection
    /// and extraction run over the attribute set as observed; the span is
    /// never mutated upstream.
    pub fn on_end_external(&self, mut data: SpanData) {
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let already_processed = data
                .attributes
                .get(keys::PROCESSED)
                .and_then(|v| v.as_str().map(|s| s == "true"))
                .unwrap_or(false);
            if !already_processed {
                self.run_pre_end(&mut data);
            }
            let event = build_event(&data, &self.identity());
            self.dispatch(ProcessedSpan { data, event });
        }));
        if outcome.is_err() {
            self.log_swallowed("on_end_external");
        }
    }

    fn dispatch(&self, span: ProcessedSpan) {
        let degraded = self
            .identity
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .degraded;
        if degraded {
            self.drop_count.fetch_add(1, Ordering::Relaxed);
            debug!(event = %span.event.event_id, "degraded mode; event dropped");
            return;
        }
        match self.sink.submit(span) {
            Ok(()) => {}
            Err(SinkError::QueueFull) => {
                self.drop_count.fetch_add(1, Ordering::Relaxed);
            }
            Err(SinkError::Shutdown) => {
                self.drop_count.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn enrich_from_baggage(&self, data: &mut SpanData, baggage: &Baggage) {
        let identity = self.identity();
        let session_id = baggage
            .session_id()
            .map(str::to_string)
            .unwrap_or_else(|| identity.session_id.to_string());
        let project = baggage
            .project()
            .map(str::to_string)
            .unwrap_or_else(|| identity.project.clone());
        let source = baggage
            .source()
            .map(str::to_string)
            .unwrap_or_else(|| identity.source.clone());

        let pairs: [(&str, &str, Option<&str>); 4] = [
            (
                keys::SESSION_ID,
                keys::LEGACY_SESSION_ID,
                Some(session_id.as_str()),
            ),
            (keys::PROJECT, keys::LEGACY_PROJECT, Some(project.as_str())),
            (keys::SOURCE, keys::LEGACY_SOURCE, Some(source.as_str())),
            (keys::PARENT_ID, keys::LEGACY_PARENT_ID, baggage.parent_id()),
        ];
        for (key, legacy_key, value) in pairs {
            if let Some(value) = value {
                data.attributes
                    .insert(key.to_string(), AttrValue::Str(value.to_string()));
                // Write-only legacy mirror; never read back for detection.
                data.attributes
                    .insert(legacy_key.to_string(), AttrValue::Str(value.to_string()));
            }
        }

        data.attributes.insert(
            keys::TRACER_ID.to_string(),
            AttrValue::Str(
                baggage
                    .tracer_id()
                    .map(str::to_string)
                    .unwrap_or_else(|| identity.tracer_id.to_string()),
            ),
        );

        for (suffix, value) in baggage.experiment_entries() {
            data.attributes.insert(
                format!("{}{}", keys::EXPERIMENT_PREFIX, suffix),
                AttrValue::Str(value.to_string()),
            );
        }
    }

    /// Drop the detection/extraction caches (instance release path).
    pub fn clear_caches(&self) {
        if let Some((detection, extraction)) = &self.ulde {
            detection.clear_cache();
            extraction.clear_cache();
        }
    }

    /// Rate-limited error logging: first few occurrences, then every 100th.
    fn log_swallowed(&self, site: &str) {
        let n = self.error_count.fetch_add(1, Ordering::Relaxed);
        if n < 5 || n % 100 == 0 {
            warn!(site, occurrences = n + 1, "span processing error swallowed");
        }
    }
}

/// Event-type detection (C7 precedence):
/// explicit attribute > model-indicative attribute prefixes > span-name
/// keywords > `tool`. Case-insensitive prefix checks over fixed tuples; no
/// regex.
pub fn detect_event_type(name: &str, _kind: SpanKind, attrs: &AttrMap) -> EventType {
    if let Some(value) = attrs.get(keys::EVENT_TYPE)
        && let Some(s) = value.as_str()
        && let Some(explicit) = EventType::parse(s)
    {
        return explicit;
    }

    for key in attrs.keys() {
        for prefix in keys::MODEL_INDICATIVE_PREFIXES {
            if key.starts_with(prefix) {
                return EventType::Model;
            }
        }
    }

    let lower = name.to_ascii_lowercase();
    const CHAIN: &[&str] = &["chain", "workflow", "pipeline"];
    const TOOL: &[&str] = &["tool", "function", "api", "search"];
    if CHAIN.iter().any(|k| lower.starts_with(k)) {
        return EventType::Chain;
    }
    if TOOL.iter().any(|k| lower.starts_with(k)) {
        return EventType::Tool;
    }
    if lower.starts_with("session") {
        return EventType::Session;
    }

    EventType::Tool
}
