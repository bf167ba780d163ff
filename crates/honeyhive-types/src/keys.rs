//! Wire-level span attribute keys.
//!
//! The canonical `honeyhive.*` / `honeyhive_*` set is always produced by the
//! pipeline; the mirrored `traceloop.association.properties.*` set is a
//! write-only duplication for legacy backends and is never read back. The
//! consumed set (`gen_ai.*`, `llm.*`, `openlit.*`) is pinned by the rule
//! bundle.

// Baggage / enrichment
pub const SESSION_ID: &str = "honeyhive.session_id";
pub const PROJECT: &str = "honeyhive.project";
pub const SOURCE: &str = "honeyhive.source";
pub const PARENT_ID: &str = "honeyhive.parent_id";
pub const TRACER_ID: &str = "honeyhive.tracer_id";
pub const EXPERIMENT_PREFIX: &str = "honeyhive.experiment.";

// Canonical output
pub const EVENT_TYPE: &str = "honeyhive_event_type";
pub const EVENT_NAME: &str = "honeyhive_event_name";
pub const PROCESSED: &str = "honeyhive_processed";
pub const SCHEMA_VERSION: &str = "honeyhive_schema_version";
pub const INPUTS_PREFIX: &str = "honeyhive_inputs.";
pub const OUTPUTS_PREFIX: &str = "honeyhive_outputs.";
pub const CONFIG_PREFIX: &str = "honeyhive_config.";
pub const METADATA_PREFIX: &str = "honeyhive_metadata.";
pub const METRICS_PREFIX: &str = "honeyhive_metrics.";
pub const FEEDBACK_PREFIX: &str = "honeyhive_feedback.";
pub const USER_PROPERTIES_PREFIX: &str = "honeyhive_user_properties.";
pub const ERROR: &str = "honeyhive_error";

// Legacy mirror (write-only)
pub const LEGACY_SESSION_ID: &str = "traceloop.association.properties.session_id";
pub const LEGACY_PROJECT: &str = "traceloop.association.properties.project";
pub const LEGACY_SOURCE: &str = "traceloop.association.properties.source";
pub const LEGACY_PARENT_ID: &str = "traceloop.association.properties.parent_id";

// Consumed instrumentor prefixes, in tie-break priority order
pub const INSTRUMENTOR_PREFIXES: &[&str] = &["gen_ai.", "llm.", "openlit."];

// Model-indicative prefixes for event-type detection
pub const MODEL_INDICATIVE_PREFIXES: &[&str] =
    &["gen_ai.request.", "llm.model_name", "openlit.model"];
