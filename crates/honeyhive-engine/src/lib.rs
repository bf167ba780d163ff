//! Span processing pipeline.
//!
//! Spans created through the SDK's own tracer go through the intercepted
//! path: enrichment at start, a pre-end hook that runs detection and
//! extraction while the attribute map is still mutable, then dispatch.
//! Spans observed from third-party sources arrive read-only at `on_end` and
//! are processed without mutation. Errors never cross the processor
//! boundary into host code.

pub mod baggage;
pub mod error;
pub mod event;
pub mod factory;
pub mod processor;
pub mod span;

pub use baggage::{Baggage, BaggageGuard, WithBaggage, current_baggage, enter};
pub use error::{Error, Result};
pub use event::build_event;
pub use factory::SpanFactory;
pub use processor::{
    ProcessedSpan, ProcessorIdentity, SinkError, SpanProcessor, SpanSink, detect_event_type,
};
pub use span::{Enrichment, Span, SpanData, SpanOptions, SpanState};
