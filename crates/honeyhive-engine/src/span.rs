use std::sync::Arc;

use serde_json::{Map, Value};
use uuid::Uuid;

use honeyhive_types::{
    AttrMap, AttrValue, EventType, Instrumentor, SpanKind, SpanStatus, keys, now_nanos,
};

use crate::error::{Error, Result};
use crate::processor::SpanProcessor;

/// Span lifecycle states.
///
/// `PreEnd` is the single window where the pipeline may mutate attributes
/// after third-party instrumentors have written; after `Ended` the
/// attribute map is immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanState {
    Starting,
    Active,
    PreEnd,
    Ended,
}

/// Options for starting a span
#[derive(Debug, Clone, Default)]
pub struct SpanOptions {
    pub kind: SpanKind,
    pub event_type: Option<EventType>,
    pub attributes: Vec<(String, AttrValue)>,
    /// Overrides the parent taken from baggage.
    pub parent_event_id: Option<Uuid>,
}

/// Immutable snapshot of a finished span; also the mutable core while the
/// span is live (the `Span` wrapper enforces state transitions).
#[derive(Debug, Clone)]
pub struct SpanData {
    pub name: String,
    pub kind: SpanKind,
    pub trace_id: [u8; 16],
    pub span_id: [u8; 8],
    pub parent_span_id: Option<[u8; 8]>,
    /// Canonical event identity, fixed at start so children can reference
    /// it before the span ends.
    pub event_id: Uuid,
    pub start_ns: i64,
    pub end_ns: i64,
    pub attributes: AttrMap,
    pub status: SpanStatus,
    pub event_type: EventType,
    /// Filled by the pre-end hook (or the on-end path for external spans).
    pub provider: Option<String>,
    pub instrumentor: Instrumentor,
}

impl SpanData {
    pub fn new(name: impl Into<String>, kind: SpanKind, trace_id: [u8; 16]) -> Self {
        let event_id = Uuid::new_v4();
        let mut span_id = [0u8; 8];
        span_id.copy_from_slice(&Uuid::new_v4().as_bytes()[..8]);
        Self {
            name: name.into(),
            kind,
            trace_id,
            span_id,
            parent_span_id: None,
            event_id,
            start_ns: now_nanos(),
            end_ns: 0,
            attributes: AttrMap::new(),
            status: SpanStatus::Unset,
            event_type: EventType::Tool,
            provider: None,
            instrumentor: Instrumentor::Unknown,
        }
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<AttrValue>) {
        self.attributes.insert(key.into(), value.into());
    }

    pub fn get_attribute(&self, key: &str) -> Option<&AttrValue> {
        self.attributes.get(key)
    }

    pub fn duration_ms(&self) -> i64 {
        ((self.end_ns - self.start_ns) / 1_000_000).max(0)
    }
}

/// Typed enrichment applied to a live span (or, at session level, to the
/// session event).
#[derive(Debug, Clone, Default)]
pub struct Enrichment {
    pub inputs: Map<String, Value>,
    pub outputs: Map<String, Value>,
    pub config: Map<String, Value>,
    pub metadata: Map<String, Value>,
    pub metrics: Map<String, Value>,
    pub feedback: Map<String, Value>,
    pub user_properties: Map<String, Value>,
    pub error: Option<String>,
    pub event_type: Option<EventType>,
}

impl Enrichment {
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
            && self.outputs.is_empty()
            && self.config.is_empty()
            && self.metadata.is_empty()
            && self.metrics.is_empty()
            && self.feedback.is_empty()
            && self.user_properties.is_empty()
            && self.error.is_none()
            && self.event_type.is_none()
    }
}

/// A live span created through the SDK's tracer.
///
/// Ends exactly once: explicitly via [`Span::end`], or on drop. Spans
/// created while the tracer is disabled are inert no-ops.
pub struct Span {
    data: SpanData,
    state: SpanState,
    processor: Option<Arc<SpanProcessor>>,
    /// Spans created through our tracer run the pre-end hook; externally
    /// observed spans never do.
    intercepted: bool,
}

impl Span {
    pub(crate) fn new(data: SpanData, processor: Arc<SpanProcessor>) -> Self {
        Self {
            data,
            state: SpanState::Active,
            processor: Some(processor),
            intercepted: true,
        }
    }

    /// An inert span (disabled tracing, refused span names).
    pub fn noop(name: impl Into<String>) -> Self {
        Self {
            data: SpanData::new(name, SpanKind::Internal, [0u8; 16]),
            state: SpanState::Active,
            processor: None,
            intercepted: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.data.name
    }

    pub fn event_id(&self) -> Uuid {
        self.data.event_id
    }

    pub fn state(&self) -> SpanState {
        self.state
    }

    pub fn is_ended(&self) -> bool {
        self.state == SpanState::Ended
    }

    pub fn is_noop(&self) -> bool {
        self.processor.is_none()
    }

    /// Set a scalar attribute. Ignored after end.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<AttrValue>) {
        if self.state == SpanState::Ended {
            return;
        }
        self.data.set_attribute(key, value);
    }

    pub fn get_attribute(&self, key: &str) -> Option<&AttrValue> {
        self.data.get_attribute(key)
    }

    /// Record an error status; the message lands on the canonical event.
    pub fn record_error(&mut self, message: impl Into<String>) {
        if self.state == SpanState::Ended {
            return;
        }
        let message = message.into();
        self.data
            .set_attribute(keys::ERROR, AttrValue::Str(message.clone()));
        self.data.status = SpanStatus::Error(message);
    }

    pub fn set_ok(&mut self) {
        if self.state != SpanState::Ended {
            self.data.status = SpanStatus::Ok;
        }
    }

    /// Apply typed enrichment in place. Fails once the span has ended.
    pub fn enrich(&mut self, enrichment: &Enrichment) -> Result<()> {
        if self.state == SpanState::Ended {
            return Err(Error::SpanEnded(self.data.name.clone()));
        }
        apply_enrichment(&mut self.data, enrichment);
        Ok(())
    }

    /// End the span: run the pre-end hook (detection + extraction +
    /// canonical write-back), seal the attribute map, hand off for export.
    /// Idempotent.
    pub fn end(&mut self) {
        if matches!(self.state, SpanState::PreEnd | SpanState::Ended) {
            return;
        }
        self.state = SpanState::PreEnd;
        self.data.end_ns = now_nanos();

        if let Some(processor) = &self.processor {
            if self.intercepted {
                processor.run_pre_end(&mut self.data);
            }
            self.state = SpanState::Ended;
            processor.on_end(self.data.clone());
        } else {
            self.state = SpanState::Ended;
        }
    }
}

impl Drop for Span {
    fn drop(&mut self) {
        self.end();
    }
}

/// Write enrichment sections onto the wire-level attribute map. Complex
/// values are JSON-encoded (the transport forbids nested types).
pub(crate) fn apply_enrichment(data: &mut SpanData, enrichment: &Enrichment) {
    let sections: [(&str, &Map<String, Value>); 7] = [
        (keys::INPUTS_PREFIX, &enrichment.inputs),
        (keys::OUTPUTS_PREFIX, &enrichment.outputs),
        (keys::CONFIG_PREFIX, &enrichment.config),
        (keys::METADATA_PREFIX, &enrichment.metadata),
        (keys::METRICS_PREFIX, &enrichment.metrics),
        (keys::FEEDBACK_PREFIX, &enrichment.feedback),
        (keys::USER_PROPERTIES_PREFIX, &enrichment.user_properties),
    ];
    for (prefix, map) in sections {
        for (field, value) in map.iter() {
            if let Some(attr) = AttrValue::from_json(value) {
                data.attributes.insert(format!("{}{}", prefix, field), attr);
            }
        }
    }
    if let Some(error) = &enrichment.error {
        data.attributes
            .insert(keys::ERROR.to_string(), AttrValue::Str(error.clone()));
        data.status = SpanStatus::Error(error.clone());
    }
    if let Some(event_type) = enrichment.event_type {
        data.event_type = event_type;
        data.attributes.insert(
            keys::EVENT_TYPE.to_string(),
            AttrValue::Str(event_type.as_str().to_string()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_noop_span_is_inert() {
        let mut span = Span::noop("anything");
        span.set_attribute("k", "v");
        span.end();
        span.end();
        assert!(span.is_ended());
    }

    #[test]
    fn test_enrich_after_end_fails() {
        let mut span = Span::noop("s");
        span.end();
        let err = span.enrich(&Enrichment::default()).unwrap_err();
        assert!(matches!(err, Error::SpanEnded(_)));
    }

    #[test]
    fn test_enrichment_json_encodes_complex_values() {
        let mut data = SpanData::new("s", SpanKind::Internal, [0u8; 16]);
        let mut enrichment = Enrichment::default();
        enrichment
            .metadata
            .insert("tags".to_string(), json!(["a", "b"]));
        enrichment.metrics.insert("latency".to_string(), json!(12));

        apply_enrichment(&mut data, &enrichment);

        assert_eq!(
            data.get_attribute("honeyhive_metadata.tags"),
            Some(&AttrValue::Str(r#"["a","b"]"#.to_string()))
        );
        assert_eq!(
            data.get_attribute("honeyhive_metrics.latency"),
            Some(&AttrValue::Int(12))
        );
    }

    #[test]
    fn test_record_error_sets_status() {
        let mut span = Span::noop("s");
        span.record_error("kaboom");
        assert!(matches!(span.data.status, SpanStatus::Error(_)));
    }
}
