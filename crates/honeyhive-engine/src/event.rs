use serde_json::{Map, Value};
use uuid::Uuid;

use honeyhive_types::{
    AttrValue, CanonicalEvent, CanonicalSections, ScopeInfo, SpanStatus, keys, nanos_to_millis,
};

use crate::processor::ProcessorIdentity;
use crate::span::SpanData;

const SCOPE_NAME: &str = "honeyhive-rust-sdk";
const SCOPE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Assemble the canonical event for a sealed span.
///
/// Reads the wire-level `honeyhive_*` attributes the pre-end hook wrote;
/// identity fields fall back to the processor's own when the span carries
/// no enrichment (degraded or pre-session spans).
pub fn build_event(data: &SpanData, identity: &ProcessorIdentity) -> CanonicalEvent {
    let session_id = attr_uuid(data, keys::SESSION_ID).unwrap_or(identity.session_id);
    let project = attr_string(data, keys::PROJECT).unwrap_or_else(|| identity.project.clone());
    let source = attr_string(data, keys::SOURCE).unwrap_or_else(|| identity.source.clone());

    let mut event = CanonicalEvent::new(
        project,
        source,
        session_id,
        data.name.clone(),
        data.event_type,
    );
    event.event_id = data.event_id;
    event.parent_id = attr_uuid(data, keys::PARENT_ID);
    event.set_times(
        nanos_to_millis(data.start_ns),
        nanos_to_millis(data.end_ns.max(data.start_ns)),
    );

    let mut sections = CanonicalSections::default();
    for (key, value) in &data.attributes {
        let Some((prefix, field)) = split_section(key) else {
            continue;
        };
        let decoded = decode_attr(value);
        match prefix {
            keys::INPUTS_PREFIX => sections.inputs.insert(field.to_string(), decoded),
            keys::OUTPUTS_PREFIX => sections.outputs.insert(field.to_string(), decoded),
            keys::CONFIG_PREFIX => sections.config.insert(field.to_string(), decoded),
            keys::METADATA_PREFIX => sections.metadata.insert(field.to_string(), decoded),
            keys::METRICS_PREFIX => event.metrics.insert(field.to_string(), decoded),
            keys::FEEDBACK_PREFIX => event.feedback.insert(field.to_string(), decoded),
            keys::USER_PROPERTIES_PREFIX => {
                event.user_properties.insert(field.to_string(), decoded)
            }
            _ => None,
        };
    }

    // Detection result backs config.provider when no rule produced one.
    if !sections.config.contains_key("provider")
        && let Some(provider) = &data.provider
    {
        sections
            .config
            .insert("provider".to_string(), Value::String(provider.clone()));
    }

    let experiment: Map<String, Value> = data
        .attributes
        .iter()
        .filter_map(|(k, v)| {
            k.strip_prefix(keys::EXPERIMENT_PREFIX)
                .map(|suffix| (suffix.to_string(), v.to_json()))
        })
        .collect();
    if !experiment.is_empty() {
        sections
            .metadata
            .insert("experiment".to_string(), Value::Object(experiment));
    }

    let (inputs, outputs, config, mut metadata) = sections.into_typed();
    metadata.scope = Some(ScopeInfo {
        name: SCOPE_NAME.to_string(),
        version: SCOPE_VERSION.to_string(),
    });
    if identity.degraded {
        metadata.degraded = Some(true);
    }

    event.inputs = inputs;
    event.outputs = outputs;
    event.config = config;
    event.metadata = metadata;

    event.error = match &data.status {
        SpanStatus::Error(message) => Some(message.clone()),
        _ => attr_string(data, keys::ERROR),
    }
    .map(|message| honeyhive_types::truncate(&message, ERROR_MAX_CHARS));

    event
}

const ERROR_MAX_CHARS: usize = 4096;

fn split_section(key: &str) -> Option<(&'static str, &str)> {
    const PREFIXES: &[&str] = &[
        keys::INPUTS_PREFIX,
        keys::OUTPUTS_PREFIX,
        keys::CONFIG_PREFIX,
        keys::METADATA_PREFIX,
        keys::METRICS_PREFIX,
        keys::FEEDBACK_PREFIX,
        keys::USER_PROPERTIES_PREFIX,
    ];
    for prefix in PREFIXES {
        if let Some(field) = key.strip_prefix(prefix) {
            return Some((prefix, field));
        }
    }
    None
}

/// Invert the wire encoding: JSON-encoded lists/objects decode back to
/// structures; every other string stays a string.
fn decode_attr(value: &AttrValue) -> Value {
    if let AttrValue::Str(s) = value {
        let trimmed = s.trim_start();
        if trimmed.starts_with('[') || trimmed.starts_with('{') {
            if let Ok(parsed) = serde_json::from_str::<Value>(s) {
                if parsed.is_array() || parsed.is_object() {
                    return parsed;
                }
            }
        }
    }
    value.to_json()
}

fn attr_string(data: &SpanData, key: &str) -> Option<String> {
    data.attributes
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

fn attr_uuid(data: &SpanData, key: &str) -> Option<Uuid> {
    data.attributes
        .get(key)
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use honeyhive_types::{EventType, SpanKind};
    use serde_json::json;

    fn identity() -> ProcessorIdentity {
        ProcessorIdentity {
            tracer_id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            project: "demo".to_string(),
            source: "production".to_string(),
            degraded: false,
        }
    }

    #[test]
    fn test_event_assembly_from_canonical_attributes() {
        let identity = identity();
        let session = Uuid::new_v4();
        let mut data = SpanData::new("ChatCompletion", SpanKind::Client, *session.as_bytes());
        data.event_type = EventType::Model;
        data.start_ns = 1_000_000_000;
        data.end_ns = 1_250_000_000;
        data.set_attribute(keys::SESSION_ID, session.to_string());
        data.set_attribute(keys::PROJECT, "demo");
        data.set_attribute(keys::SOURCE, "production");
        data.set_attribute("honeyhive_config.model", "gpt-4o");
        data.set_attribute(
            "honeyhive_inputs.chat_history",
            r#"[{"role":"user","content":"hi"}]"#,
        );
        data.set_attribute("honeyhive_metadata.prompt_tokens", 10i64);
        data.set_attribute("honeyhive_metrics.latency_ms", 250i64);

        let event = build_event(&data, &identity);

        assert_eq!(event.session_id, session);
        assert_eq!(event.event_type, EventType::Model);
        assert_eq!(event.start_time, 1_000);
        assert_eq!(event.end_time, 1_250);
        assert_eq!(event.duration, 250);
        assert_eq!(event.config.model.as_deref(), Some("gpt-4o"));
        let history = event.inputs.chat_history.as_ref().unwrap();
        assert_eq!(history[0].content.as_deref(), Some("hi"));
        assert_eq!(event.metadata.prompt_tokens, Some(10));
        assert_eq!(event.metrics.get("latency_ms"), Some(&json!(250)));
        assert!(event.metadata.scope.is_some());
    }

    #[test]
    fn test_identity_fallback_without_enrichment() {
        let identity = identity();
        let data = SpanData::new("bare", SpanKind::Internal, [0u8; 16]);
        let event = build_event(&data, &identity);
        assert_eq!(event.session_id, identity.session_id);
        assert_eq!(event.project_id, "demo");
        assert_eq!(event.parent_id, None);
    }

    #[test]
    fn test_scalar_content_is_not_json_decoded() {
        let identity = identity();
        let mut data = SpanData::new("s", SpanKind::Internal, [0u8; 16]);
        // A content string that superficially looks numeric must survive.
        data.set_attribute("honeyhive_outputs.content", "4");
        let event = build_event(&data, &identity);
        assert_eq!(event.outputs.content.as_deref(), Some("4"));
    }

    #[test]
    fn test_error_status_wins() {
        let identity = identity();
        let mut data = SpanData::new("s", SpanKind::Internal, [0u8; 16]);
        data.status = SpanStatus::Error("kaboom".to_string());
        let event = build_event(&data, &identity);
        assert_eq!(event.error.as_deref(), Some("kaboom"));
    }
}
