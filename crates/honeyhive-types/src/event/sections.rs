use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::message::{Message, ToolCall};

/// Untyped canonical sections, as produced by extraction.
///
/// Field names inside each map are canonical (`chat_history`, `model`, ...);
/// values keep their extracted JSON shape. [`CanonicalSections::into_typed`]
/// lifts the known fields into the typed section structs, leaving everything
/// else in the per-section `extra` map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalSections {
    pub inputs: Map<String, Value>,
    pub outputs: Map<String, Value>,
    pub config: Map<String, Value>,
    pub metadata: Map<String, Value>,
}

impl CanonicalSections {
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
            && self.outputs.is_empty()
            && self.config.is_empty()
            && self.metadata.is_empty()
    }

    /// Lift into the typed event sections. A field whose value does not fit
    /// its typed slot is omitted; the rest of the section is unaffected.
    pub fn into_typed(self) -> (EventInputs, EventOutputs, EventConfig, EventMetadata) {
        (
            coerce(self.inputs),
            coerce(self.outputs),
            coerce(self.config),
            coerce(self.metadata),
        )
    }
}

fn coerce<T: Default + serde::de::DeserializeOwned>(map: Map<String, Value>) -> T {
    match serde_json::from_value(Value::Object(map.clone())) {
        Ok(typed) => typed,
        Err(_) => {
            // Retry with the offending entries sifted out one probe at a time.
            let mut kept = Map::new();
            for (key, value) in map {
                let mut probe = Map::new();
                probe.insert(key.clone(), value.clone());
                if serde_json::from_value::<T>(Value::Object(probe)).is_ok() {
                    kept.insert(key, value);
                }
            }
            serde_json::from_value(Value::Object(kept)).unwrap_or_default()
        }
    }
}

/// `inputs` section of a canonical event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventInputs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_history: Option<Vec<Message>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub functions: Option<Value>,
    #[serde(rename = "_params_", skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `outputs` section of a canonical event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventOutputs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `config` section of a canonical event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_streaming: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `metadata` section of a canonical event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_fingerprint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<ScopeInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Identifies the SDK build that produced an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeInfo {
    pub name: String,
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_into_typed_lifts_known_fields_and_keeps_extras() {
        let mut sections = CanonicalSections::default();
        sections.config.insert("model".into(), json!("gpt-4o"));
        sections.config.insert("temperature".into(), json!(0.7));
        sections
            .config
            .insert("frequency_penalty".into(), json!(0.1));

        let (_, _, config, _) = sections.into_typed();
        assert_eq!(config.model.as_deref(), Some("gpt-4o"));
        assert_eq!(config.temperature, Some(0.7));
        assert_eq!(config.extra.get("frequency_penalty"), Some(&json!(0.1)));
    }

    #[test]
    fn test_chat_history_round_trips_through_json() {
        let mut sections = CanonicalSections::default();
        sections.inputs.insert(
            "chat_history".into(),
            json!([{"role": "user", "content": "2+2?"}]),
        );

        let (inputs, _, _, _) = sections.into_typed();
        let history = inputs.chat_history.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content.as_deref(), Some("2+2?"));
    }
}
