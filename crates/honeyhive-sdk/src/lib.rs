//! honeyhive: client-side telemetry for LLM applications.
//!
//! # Overview
//!
//! The SDK captures spans from your application (and from third-party LLM
//! instrumentors such as Traceloop, OpenInference and OpenLit), normalizes
//! their vendor attributes into a single canonical event schema, and ships
//! the events to the HoneyHive ingestion service over OTLP/HTTP or the
//! event API.
//!
//! # Quickstart
//!
//! ```no_run
//! use honeyhive::{Tracer, TracerConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let tracer = Tracer::init(TracerConfig::new("my-api-key", "my-project"))?;
//!
//! let mut span = tracer.start_span("ChatCompletion");
//! span.set_attribute("gen_ai.system", "openai");
//! span.set_attribute("gen_ai.request.model", "gpt-4o");
//! span.end();
//!
//! tracer.shutdown();
//! # Ok(())
//! # }
//! ```
//!
//! # Tracing a function
//!
//! ```no_run
//! use honeyhive::{Tracer, TracerConfig, TraceOptions};
//! use serde_json::json;
//!
//! # fn fetch_data(city: &str) -> Vec<String> { vec![] }
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let tracer = Tracer::init(TracerConfig::new("my-api-key", "my-project"))?;
//!
//! let options = TraceOptions {
//!     params: Some(json!({ "city": "Paris" })),
//!     ..TraceOptions::default()
//! };
//! let rows = tracer.trace("fetch_data", options, |_span| fetch_data("Paris"));
//! # let _ = rows;
//! # Ok(())
//! # }
//! ```
//!
//! # Degraded mode
//!
//! A tracer without a working API key (or whose session bootstrap failed)
//! keeps accepting spans and enriching them; export is refused and drops
//! are counted. The host application is never crashed by this SDK.

pub mod error;
pub mod tracer;

pub use error::{Error, Result};
pub use tracer::{
    TraceOptions, Tracer, get_default_tracer, set_default_tracer, trace_discovered,
};

// Re-exported building blocks.
pub use honeyhive_engine::{Baggage, Enrichment, Span, SpanOptions, WithBaggage};
pub use honeyhive_export::{ExportStats, FlushReport};
pub use honeyhive_runtime::TracerConfig;
pub use honeyhive_types::{
    CanonicalEvent, EventType, ExportMode, Instrumentor, Message, Role, SpanKind,
};
pub use honeyhive_ulde::{Detection, DetectionMethod};

/// Version of the compiled detection/extraction rule bundle shipped with
/// this build, for diagnostics.
pub fn rule_bundle_version() -> Option<String> {
    honeyhive_bundle::Bundle::load()
        .ok()
        .map(|bundle| bundle.version().to_string())
}
