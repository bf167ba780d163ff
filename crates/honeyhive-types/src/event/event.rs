use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::{EventType, now_millis};

use super::sections::{EventConfig, EventInputs, EventMetadata, EventOutputs};

// NOTE: Schema Design Goals
//
// 1. Single target: every vendor attribute dialect funnels into this one
//    shape. There is no per-instrumentor event variant.
// 2. Identity: event_id/session_id/parent_id/children_ids are UUIDv4;
//    timestamps are UTC unix-millis; duration is always end - start.
// 3. Sections: inputs/outputs/config/metadata carry typed well-known fields
//    plus an open extras map, so bundle rule tables can evolve without a
//    schema change here.
// 4. Pass-through fidelity: tool-call arguments stay JSON-encoded strings;
//    chat history keeps message order.

/// Canonical event shipped to the ingestion backend.
/// Maps 1:1 to a row in the events API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalEvent {
    pub project_id: String,
    pub source: String,
    pub session_id: Uuid,
    pub event_id: Uuid,
    pub parent_id: Option<Uuid>,
    #[serde(default)]
    pub children_ids: Vec<Uuid>,

    pub event_name: String,
    pub event_type: EventType,

    /// UTC unix-millis
    pub start_time: i64,
    /// UTC unix-millis
    pub end_time: i64,
    /// Milliseconds; always `end_time - start_time`
    pub duration: i64,

    #[serde(default)]
    pub inputs: EventInputs,
    #[serde(default)]
    pub outputs: EventOutputs,
    #[serde(default)]
    pub config: EventConfig,
    #[serde(default)]
    pub metadata: EventMetadata,

    pub error: Option<String>,
    #[serde(default)]
    pub feedback: Map<String, Value>,
    #[serde(default)]
    pub metrics: Map<String, Value>,
    #[serde(default)]
    pub user_properties: Map<String, Value>,
}

impl CanonicalEvent {
    /// Create an event with fresh identity and zero-length duration at now.
    pub fn new(
        project_id: impl Into<String>,
        source: impl Into<String>,
        session_id: Uuid,
        event_name: impl Into<String>,
        event_type: EventType,
    ) -> Self {
        let now = now_millis();
        Self {
            project_id: project_id.into(),
            source: source.into(),
            session_id,
            event_id: Uuid::new_v4(),
            parent_id: None,
            children_ids: Vec::new(),
            event_name: event_name.into(),
            event_type,
            start_time: now,
            end_time: now,
            duration: 0,
            inputs: EventInputs::default(),
            outputs: EventOutputs::default(),
            config: EventConfig::default(),
            metadata: EventMetadata::default(),
            error: None,
            feedback: Map::new(),
            metrics: Map::new(),
            user_properties: Map::new(),
        }
    }

    /// Set start/end and recompute duration. `end < start` is clamped.
    pub fn set_times(&mut self, start_time: i64, end_time: i64) {
        self.start_time = start_time;
        self.end_time = end_time.max(start_time);
        self.duration = self.end_time - self.start_time;
    }

    /// Check the schema invariants an ingestible event must satisfy.
    pub fn validate(&self) -> Result<()> {
        if self.event_id == self.session_id {
            return Err(Error::InvalidEvent(
                "event_id must differ from session_id".to_string(),
            ));
        }
        if self.duration != self.end_time - self.start_time || self.duration < 0 {
            return Err(Error::InvalidEvent(format!(
                "inconsistent timing: start={} end={} duration={}",
                self.start_time, self.end_time, self.duration
            )));
        }
        Ok(())
    }
}
