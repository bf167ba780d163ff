use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use uuid::Uuid;

use honeyhive_bundle::Bundle;
use honeyhive_engine::{
    Baggage, ProcessorIdentity, Span, SpanData, SpanFactory, SpanOptions, SpanProcessor,
};
use honeyhive_types::{AttrMap, CanonicalEvent, SpanKind, keys};
use honeyhive_ulde::{DetectionEngine, ExtractorEngine};

use crate::capture::CaptureSink;

/// In-memory span pipeline for integration tests: real bundle, detection,
/// extraction and event assembly, with a capturing sink in place of the
/// HTTP exporters.
pub struct PipelineWorld {
    pub sink: Arc<CaptureSink>,
    pub processor: Arc<SpanProcessor>,
    pub factory: SpanFactory,
    pub session_id: Uuid,
    pub tracer_id: Uuid,
}

impl PipelineWorld {
    pub fn new() -> Result<Self> {
        let bundle = Bundle::load()?;
        let detection = DetectionEngine::new(bundle.clone(), 256, Duration::from_secs(300));
        let extraction = ExtractorEngine::new(bundle, 64, Duration::from_secs(300));

        let sink = Arc::new(CaptureSink::new());
        let tracer_id = Uuid::new_v4();
        let session_id = Uuid::new_v4();
        let identity = ProcessorIdentity {
            tracer_id,
            session_id,
            project: "test-project".to_string(),
            source: "dev".to_string(),
            degraded: false,
        };
        let processor = Arc::new(SpanProcessor::new(
            Some((detection, extraction)),
            sink.clone(),
            identity,
            Arc::new(std::sync::atomic::AtomicU64::new(0)),
        ));

        let mut baggage = Baggage::new();
        baggage.set(keys::SESSION_ID, session_id.to_string());
        baggage.set(keys::PROJECT, "test-project");
        baggage.set(keys::SOURCE, "dev");
        baggage.set(keys::TRACER_ID, tracer_id.to_string());

        let factory = SpanFactory::new(processor.clone(), baggage, *session_id.as_bytes(), false);

        Ok(Self {
            sink,
            processor,
            factory,
            session_id,
            tracer_id,
        })
    }

    /// Start an intercepted span.
    pub fn start_span(&self, name: &str) -> Span {
        self.factory.start_span(name, SpanOptions::default())
    }

    /// Run a span with the given vendor attributes through the full
    /// intercepted path (start, attribute writes, pre-end hook, capture).
    pub fn run_instrumented(&self, name: &str, attrs: AttrMap) -> CanonicalEvent {
        let mut span = self.start_span(name);
        for (key, value) in attrs {
            span.set_attribute(key, value);
        }
        span.end();
        self.last_event()
    }

    /// Feed a third-party span through the read-only on-end path.
    pub fn run_external(&self, name: &str, attrs: AttrMap) -> CanonicalEvent {
        let mut data = SpanData::new(name, SpanKind::Client, *self.session_id.as_bytes());
        data.end_ns = data.start_ns + 1_000_000;
        data.attributes = attrs;
        self.processor.on_end_external(data);
        self.last_event()
    }

    pub fn events(&self) -> Vec<CanonicalEvent> {
        self.sink.events()
    }

    fn last_event(&self) -> CanonicalEvent {
        self.sink
            .events()
            .last()
            .cloned()
            .expect("pipeline produced no event")
    }
}
