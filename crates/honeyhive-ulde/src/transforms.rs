//! Pure transforms applied to pattern output.
//!
//! Every transform is total over `Value`: anything it cannot handle yields
//! `None`, the field is omitted, and a warning is logged once per
//! (provider, transform) per process.

use std::collections::HashSet;
use std::sync::Mutex;

use serde_json::{Map, Value, json};
use tracing::warn;

use honeyhive_bundle::{Bundle, TransformKind};
use honeyhive_types::FinishReason;
use honeyhive_types::event::Role;

static WARNED: Mutex<Option<HashSet<(String, &'static str)>>> = Mutex::new(None);

/// Log a transform failure once per (provider, transform) per process.
pub fn warn_once(provider: &str, transform: TransformKind, detail: &str) {
    let mut guard = WARNED.lock().unwrap_or_else(|e| e.into_inner());
    let warned = guard.get_or_insert_with(HashSet::new);
    if warned.insert((provider.to_string(), transform.as_str())) {
        warn!(
            provider,
            transform = transform.as_str(),
            detail,
            "transform failed; field omitted"
        );
    }
}

/// Apply a transform. `provider` and `bundle` feed cost calculation only.
pub fn apply(
    transform: TransformKind,
    value: Value,
    provider: &str,
    bundle: &Bundle,
) -> Option<Value> {
    let result = match transform {
        TransformKind::Direct => Some(value),
        TransformKind::JsonParseOrDirect => Some(json_parse_or_direct(value)),
        TransformKind::ParseMessages => parse_messages(value),
        TransformKind::ParseFlattenedMessages => parse_flattened_messages(value),
        TransformKind::ExtractContentFromMessages => extract_content_from_messages(value),
        TransformKind::ExtractFirstValue => extract_first_value(value),
        TransformKind::CostCalculate => cost_calculate(value, provider, bundle),
        TransformKind::FinishReasonNormalize => finish_reason_normalize(value),
    };
    // Null results are misses, not values.
    match result {
        Some(Value::Null) | None => None,
        some => some,
    }
}

/// Attempt a JSON parse of string input; fall back to the raw value.
fn json_parse_or_direct(value: Value) -> Value {
    match &value {
        Value::String(s) => serde_json::from_str(s).unwrap_or(value),
        _ => value,
    }
}

/// Normalize a JSON string, list, or single object into a message list.
///
/// Accepts both `role`/`content` and nested `message.role`/`message.content`
/// shapes. Tool-call arguments that arrive as objects are encoded to a JSON
/// string exactly once; string arguments pass through untouched.
fn parse_messages(value: Value) -> Option<Value> {
    let value = json_parse_or_direct(value);
    let entries = match value {
        Value::Array(items) => items,
        Value::Object(_) => vec![value],
        Value::String(s) => vec![json!({ "role": "user", "content": s })],
        _ => return None,
    };

    let normalized: Vec<Value> = entries.into_iter().filter_map(normalize_message).collect();
    if normalized.is_empty() {
        None
    } else {
        Some(Value::Array(normalized))
    }
}

/// Normalize the array produced by indexed flattening.
fn parse_flattened_messages(value: Value) -> Option<Value> {
    match value {
        Value::Array(items) => {
            let normalized: Vec<Value> =
                items.into_iter().filter_map(normalize_message).collect();
            if normalized.is_empty() {
                None
            } else {
                Some(Value::Array(normalized))
            }
        }
        _ => None,
    }
}

fn normalize_message(entry: Value) -> Option<Value> {
    let object = match entry {
        Value::Object(map) => map,
        Value::String(s) => {
            return Some(json!({ "role": "user", "content": s }));
        }
        _ => return None,
    };

    // Accept `message.role` (dotted), `message: {role}` (nested), `role`.
    let role_raw = field(&object, "role")?;
    let role = Role::parse_or_user(role_raw.as_str().unwrap_or("user"));

    let mut message = Map::new();
    message.insert("role".to_string(), json!(role.as_str()));
    message.insert(
        "content".to_string(),
        field(&object, "content").unwrap_or(Value::Null),
    );

    if let Some(name) = field(&object, "name")
        && !name.is_null()
    {
        message.insert("name".to_string(), name);
    }
    if let Some(id) = field(&object, "tool_call_id")
        && !id.is_null()
    {
        message.insert("tool_call_id".to_string(), id);
    }
    if let Some(calls) = field(&object, "tool_calls")
        && let Some(calls) = normalize_tool_calls(calls)
    {
        message.insert("tool_calls".to_string(), calls);
    }

    Some(Value::Object(message))
}

/// Pull a field from a raw message object, tolerating the dialect variants.
fn field(object: &Map<String, Value>, name: &str) -> Option<Value> {
    if let Some(v) = object.get(name) {
        return Some(v.clone());
    }
    let dotted = format!("message.{}", name);
    if let Some(v) = object.get(&dotted) {
        return Some(v.clone());
    }
    object
        .get("message")
        .and_then(|m| m.as_object())
        .and_then(|m| m.get(name))
        .cloned()
}

/// Normalize tool calls to `{id?, type, function: {name, arguments}}`,
/// keeping `arguments` a JSON-encoded string.
fn normalize_tool_calls(value: Value) -> Option<Value> {
    let calls = match json_parse_or_direct(value) {
        Value::Array(items) => items,
        single @ Value::Object(_) => vec![single],
        _ => return None,
    };

    let mut normalized = Vec::new();
    for call in calls {
        let call = call.as_object()?;
        let function = call
            .get("function")
            .and_then(|f| f.as_object())
            .cloned()
            .unwrap_or_else(|| call.clone());

        let name = function.get("name")?.as_str()?.to_string();
        let arguments = match function.get("arguments") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => serde_json::to_string(other).ok()?,
            None => "{}".to_string(),
        };

        let mut out = Map::new();
        if let Some(id) = call.get("id").and_then(|i| i.as_str()) {
            out.insert("id".to_string(), json!(id));
        }
        out.insert(
            "type".to_string(),
            call.get("type").cloned().unwrap_or_else(|| json!("function")),
        );
        out.insert(
            "function".to_string(),
            json!({ "name": name, "arguments": arguments }),
        );
        normalized.push(Value::Object(out));
    }

    if normalized.is_empty() {
        None
    } else {
        Some(Value::Array(normalized))
    }
}

/// First assistant message's content, else the first content-bearing one.
fn extract_content_from_messages(value: Value) -> Option<Value> {
    let messages = match parse_messages(value)? {
        Value::Array(items) => items,
        _ => return None,
    };

    let content_of = |m: &Value| -> Option<String> {
        m.get("content")
            .and_then(|c| c.as_str())
            .map(str::to_string)
    };

    for message in &messages {
        if message.get("role").and_then(|r| r.as_str()) == Some("assistant")
            && let Some(content) = content_of(message)
        {
            return Some(Value::String(content));
        }
    }
    messages
        .iter()
        .find_map(|m| content_of(m).map(Value::String))
}

/// First non-null value from a key-list pattern.
fn extract_first_value(value: Value) -> Option<Value> {
    match value {
        Value::Array(items) => items.into_iter().find(|v| !v.is_null()),
        other => Some(other),
    }
}

/// Pricing-table lookup keyed by provider+model. The key-list pattern feeds
/// `[model, prompt_tokens, completion_tokens]`; a missing price omits the
/// field.
fn cost_calculate(value: Value, provider: &str, bundle: &Bundle) -> Option<Value> {
    let items = value.as_array()?;
    let model = items.first()?.as_str()?;
    let prompt_tokens = as_u64(items.get(1)?)?;
    let completion_tokens = as_u64(items.get(2)?)?;

    let price = bundle.price(provider, model)?;
    let cost = price.cost(prompt_tokens, completion_tokens);
    serde_json::Number::from_f64(cost).map(Value::Number)
}

fn finish_reason_normalize(value: Value) -> Option<Value> {
    let raw = value.as_str()?;
    Some(Value::String(
        FinishReason::normalize(raw).as_str().to_string(),
    ))
}

fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle() -> std::sync::Arc<Bundle> {
        Bundle::load().unwrap()
    }

    #[test]
    fn test_parse_messages_from_json_string() {
        let value = Value::String(r#"[{"role":"user","content":"hi"}]"#.to_string());
        let messages = parse_messages(value).unwrap();
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[0]["content"], "hi");
    }

    #[test]
    fn test_parse_messages_nested_message_shape() {
        let value = json!([{ "message": { "role": "assistant", "content": "hello" } }]);
        let messages = parse_messages(value).unwrap();
        assert_eq!(messages[0]["role"], "assistant");
        assert_eq!(messages[0]["content"], "hello");
    }

    #[test]
    fn test_gemini_model_role_folds_to_assistant() {
        let value = json!([{ "role": "model", "content": "pong" }]);
        let messages = parse_messages(value).unwrap();
        assert_eq!(messages[0]["role"], "assistant");
    }

    #[test]
    fn test_tool_call_arguments_not_reserialized() {
        let original = r#"{"city":"Paris","units":"C"}"#;
        let value = json!([{
            "role": "assistant",
            "content": null,
            "tool_calls": [{
                "id": "call_1",
                "type": "function",
                "function": { "name": "get_weather", "arguments": original }
            }]
        }]);
        let messages = parse_messages(value).unwrap();
        let arguments = messages[0]["tool_calls"][0]["function"]["arguments"]
            .as_str()
            .unwrap();
        assert_eq!(arguments, original);
    }

    #[test]
    fn test_tool_call_object_arguments_encoded_once() {
        let value = json!([{
            "role": "assistant",
            "tool_calls": [{ "function": { "name": "f", "arguments": { "a": 1 } } }]
        }]);
        let messages = parse_messages(value).unwrap();
        let arguments = messages[0]["tool_calls"][0]["function"]["arguments"]
            .as_str()
            .unwrap();
        assert_eq!(arguments, r#"{"a":1}"#);
    }

    #[test]
    fn test_extract_content_prefers_assistant() {
        let value = json!([
            { "role": "user", "content": "question" },
            { "role": "assistant", "content": "answer" }
        ]);
        assert_eq!(
            extract_content_from_messages(value).unwrap(),
            Value::String("answer".to_string())
        );
    }

    #[test]
    fn test_cost_calculate_known_and_unknown_model() {
        let bundle = bundle();
        let value = json!(["gpt-4o", "10", 1]);
        let cost = cost_calculate(value, "openai", &bundle).unwrap();
        let expected = (10.0 * 2.5 + 1.0 * 10.0) / 1_000_000.0;
        assert!((cost.as_f64().unwrap() - expected).abs() < 1e-12);

        let value = json!(["not-a-model", 10, 1]);
        assert!(cost_calculate(value, "openai", &bundle).is_none());
    }

    #[test]
    fn test_json_parse_or_direct_falls_back() {
        let parsed = json_parse_or_direct(Value::String("0.7".to_string()));
        assert_eq!(parsed, json!(0.7));
        let raw = json_parse_or_direct(Value::String("not json".to_string()));
        assert_eq!(raw, Value::String("not json".to_string()));
    }

    #[test]
    fn test_apply_treats_null_as_miss() {
        let bundle = bundle();
        assert_eq!(
            apply(TransformKind::Direct, Value::Null, "openai", &bundle),
            None
        );
    }
}
