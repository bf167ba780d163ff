mod util;

pub mod attr;
pub mod error;
pub mod event;
pub mod keys;

use serde::{Deserialize, Serialize};

pub use attr::{AttrMap, AttrValue};
pub use error::{Error, Result};
pub use event::{
    CanonicalEvent, CanonicalSections, EventConfig, EventInputs, EventMetadata, EventOutputs,
    FinishReason, FunctionCall, Message, Role, ScopeInfo, ToolCall,
};
pub use util::*;

/// Schema version written to every processed span and emitted event.
pub const SCHEMA_VERSION: &str = "1.0";

/// Type of canonical event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Model,
    Chain,
    Tool,
    Session,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Model => "model",
            EventType::Chain => "chain",
            EventType::Tool => "tool",
            EventType::Session => "session",
        }
    }

    /// Parse the wire-level `honeyhive_event_type` attribute value.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "model" => Some(EventType::Model),
            "chain" => Some(EventType::Chain),
            "tool" => Some(EventType::Tool),
            "session" => Some(EventType::Session),
            _ => None,
        }
    }
}

/// Third-party instrumentation library that wrote a span's vendor attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Instrumentor {
    Traceloop,
    Openinference,
    Openlit,
    Unknown,
}

impl Instrumentor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Instrumentor::Traceloop => "traceloop",
            Instrumentor::Openinference => "openinference",
            Instrumentor::Openlit => "openlit",
            Instrumentor::Unknown => "unknown",
        }
    }

    /// Attribute prefix this instrumentor writes, if any.
    pub fn prefix(&self) -> Option<&'static str> {
        match self {
            Instrumentor::Traceloop => Some("gen_ai."),
            Instrumentor::Openinference => Some("llm."),
            Instrumentor::Openlit => Some("openlit."),
            Instrumentor::Unknown => None,
        }
    }
}

/// Span kind (subset of the OTLP kinds the pipeline distinguishes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    #[default]
    Internal,
    Client,
    Server,
    Producer,
    Consumer,
}

/// Span status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SpanStatus {
    #[default]
    Unset,
    Ok,
    Error(String),
}

/// Export mode selected at tracer construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExportMode {
    /// OTLP/HTTP traces endpoint (default)
    #[default]
    Otlp,
    /// Domain event API
    Events,
}
