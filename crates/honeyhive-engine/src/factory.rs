use std::sync::Arc;

use honeyhive_types::{AttrValue, keys};

use crate::baggage::{Baggage, current_baggage};
use crate::processor::SpanProcessor;
use crate::span::{Span, SpanData, SpanOptions};

/// Creates intercepted spans for one tracer instance (C6).
///
/// Every span starts with the tracer's base baggage overlaid by the
/// innermost thread scope, goes through `on_start` enrichment, and carries
/// the pre-end hook by construction.
pub struct SpanFactory {
    processor: Arc<SpanProcessor>,
    base_baggage: Baggage,
    trace_id: [u8; 16],
    disable_http_tracing: bool,
}

impl SpanFactory {
    pub fn new(
        processor: Arc<SpanProcessor>,
        base_baggage: Baggage,
        trace_id: [u8; 16],
        disable_http_tracing: bool,
    ) -> Self {
        Self {
            processor,
            base_baggage,
            trace_id,
            disable_http_tracing,
        }
    }

    pub fn base_baggage(&self) -> &Baggage {
        &self.base_baggage
    }

    pub fn processor(&self) -> &Arc<SpanProcessor> {
        &self.processor
    }

    /// Start a span. Outbound-HTTP instrumentation spans are refused as
    /// inert no-ops when `disable_http_tracing` is set.
    pub fn start_span(&self, name: &str, options: SpanOptions) -> Span {
        if self.disable_http_tracing && is_http_client_span(name) {
            return Span::noop(name);
        }

        let effective = self.base_baggage.merged_with(&current_baggage());
        let mut data = SpanData::new(name, options.kind, self.trace_id);

        self.processor.on_start(&mut data, &effective);

        // Explicit options override baggage-derived enrichment.
        if let Some(event_type) = options.event_type {
            data.event_type = event_type;
            data.attributes.insert(
                keys::EVENT_TYPE.to_string(),
                AttrValue::Str(event_type.as_str().to_string()),
            );
        }
        if let Some(parent) = options.parent_event_id {
            data.attributes.insert(
                keys::PARENT_ID.to_string(),
                AttrValue::Str(parent.to_string()),
            );
        }
        for (key, value) in options.attributes {
            data.attributes.insert(key, value);
        }

        Span::new(data, self.processor.clone())
    }

    /// Feed an externally created span through the read-only on-end path.
    pub fn observe_external(&self, data: SpanData) {
        self.processor.on_end_external(data);
    }
}

fn is_http_client_span(name: &str) -> bool {
    name.starts_with("http.") || name.starts_with("HTTP ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_span_name_detection() {
        assert!(is_http_client_span("http.request"));
        assert!(is_http_client_span("HTTP POST"));
        assert!(!is_http_client_span("fetch_data"));
    }
}
