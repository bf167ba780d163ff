//! Indexed-key reconstruction (`base.{i}.{field}` -> ordered array).
//!
//! One pass over the attribute map, integer parsing only; no regex.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use honeyhive_types::AttrMap;

/// Rebuild an ordered array of objects from flattened indexed keys.
///
/// `base_prefix` includes the trailing dot (`"gen_ai.prompt."`). Keys look
/// like `gen_ai.prompt.0.role`; the suffix after the index must be one of
/// `fields` (which may itself contain dots, e.g. `message.role`). Returns
/// `None` when nothing matched.
pub fn collect_indexed(attrs: &AttrMap, base_prefix: &str, fields: &[String]) -> Option<Value> {
    let mut by_index: BTreeMap<usize, Map<String, Value>> = BTreeMap::new();

    for (key, value) in attrs.range(base_prefix.to_string()..) {
        let Some(rest) = key.strip_prefix(base_prefix) else {
            // BTreeMap range is sorted; once past the prefix we are done.
            break;
        };
        let Some((index, field)) = split_index(rest) else {
            continue;
        };
        if !fields.iter().any(|f| f == field) {
            continue;
        }
        by_index
            .entry(index)
            .or_default()
            .insert(field.to_string(), value.to_json());
    }

    if by_index.is_empty() {
        return None;
    }
    Some(Value::Array(
        by_index.into_values().map(Value::Object).collect(),
    ))
}

/// Split `"0.role"` into `(0, "role")`.
fn split_index(rest: &str) -> Option<(usize, &str)> {
    let dot = rest.find('.')?;
    let (digits, field) = rest.split_at(dot);
    let index: usize = digits.parse().ok()?;
    Some((index, &field[1..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use honeyhive_types::AttrValue;

    fn attrs(pairs: &[(&str, &str)]) -> AttrMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), AttrValue::Str(v.to_string())))
            .collect()
    }

    #[test]
    fn test_reconstruction_orders_by_index() {
        let map = attrs(&[
            ("gen_ai.prompt.1.role", "user"),
            ("gen_ai.prompt.1.content", "2+2?"),
            ("gen_ai.prompt.0.role", "system"),
            ("gen_ai.prompt.0.content", "You are helpful."),
        ]);
        let fields = vec!["role".to_string(), "content".to_string()];
        let value = collect_indexed(&map, "gen_ai.prompt.", &fields).unwrap();

        let array = value.as_array().unwrap();
        assert_eq!(array.len(), 2);
        assert_eq!(array[0]["role"], "system");
        assert_eq!(array[1]["content"], "2+2?");
    }

    #[test]
    fn test_nested_field_names() {
        let map = attrs(&[
            ("llm.input_messages.0.message.role", "user"),
            ("llm.input_messages.0.message.content", "hi"),
        ]);
        let fields = vec!["message.role".to_string(), "message.content".to_string()];
        let value = collect_indexed(&map, "llm.input_messages.", &fields).unwrap();
        assert_eq!(value.as_array().unwrap()[0]["message.role"], "user");
    }

    #[test]
    fn test_unmatched_keys_yield_none() {
        let map = attrs(&[("gen_ai.system", "openai")]);
        let fields = vec!["role".to_string()];
        assert!(collect_indexed(&map, "gen_ai.prompt.", &fields).is_none());
    }

    #[test]
    fn test_non_numeric_index_skipped() {
        let map = attrs(&[
            ("gen_ai.prompt.x.role", "user"),
            ("gen_ai.prompt.0.role", "system"),
        ]);
        let fields = vec!["role".to_string()];
        let value = collect_indexed(&map, "gen_ai.prompt.", &fields).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 1);
    }
}
