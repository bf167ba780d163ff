//! Universal LLM discovery engine (ULDE).
//!
//! Two responsibilities, both driven by the compiled rule bundle:
//! - detection: which instrumentor wrote a span's vendor attributes, and
//!   which LLM provider they describe (O(1) at steady state via the
//!   signature cache);
//! - extraction: table-driven transformation of those attributes into the
//!   canonical `{inputs, outputs, config, metadata}` sections.
//!
//! Detection and extraction are pure with respect to their inputs; the only
//! side effect is cache population, which never changes outputs.

pub mod detect;
pub mod extract;
mod flatten;
mod transforms;

pub use detect::{Detection, DetectionEngine, DetectionMethod};
pub use extract::{CompiledExtractor, ExtractorEngine};
