use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use honeyhive_bundle::{Bundle, FieldRule, RulePattern, TransformKind};
use honeyhive_cache::TtlCache;
use honeyhive_types::{AttrMap, CanonicalSections, Instrumentor};

use crate::flatten::collect_indexed;
use crate::transforms;

/// A rule compiled down to cheap runtime checks (owned prefixes, exact
/// keys); no pattern interpretation happens per span.
#[derive(Debug, Clone)]
enum CompiledPattern {
    Exact(String),
    Prefix(Vec<String>),
    Indexed {
        base_prefix: String,
        fields: Vec<String>,
    },
    Keys(Vec<String>),
}

#[derive(Debug, Clone)]
struct CompiledRule {
    pattern: CompiledPattern,
    transform: TransformKind,
}

/// Field extractor compiled for one (provider, instrumentor) pair.
///
/// The identity extractor (empty rule set) backs unknown pairs; it yields
/// empty canonical sections.
pub struct CompiledExtractor {
    provider: String,
    bundle: Arc<Bundle>,
    /// (section, field, rules) — rule order within a field is fixed; the
    /// first rule producing a non-null value wins.
    fields: Vec<(String, String, Vec<CompiledRule>)>,
}

impl CompiledExtractor {
    fn identity(bundle: Arc<Bundle>, provider: &str) -> Self {
        Self {
            provider: provider.to_string(),
            bundle,
            fields: Vec::new(),
        }
    }

    fn compile(bundle: Arc<Bundle>, provider: &str, instrumentor: Instrumentor) -> Self {
        let Some(table) = bundle.extraction_table(instrumentor.as_str()) else {
            return Self::identity(bundle, provider);
        };

        let overrides = bundle.extraction_overrides(provider, instrumentor.as_str());
        let mut fields = Vec::with_capacity(table.len());

        for (path, rules) in table {
            let effective = overrides.and_then(|o| o.get(path)).unwrap_or(rules);
            let Some((section, field)) = path.split_once('.') else {
                continue;
            };
            let compiled = effective.iter().map(compile_rule).collect();
            fields.push((section.to_string(), field.to_string(), compiled));
        }

        // Fields only present in the override table.
        if let Some(overrides) = overrides {
            for (path, rules) in overrides {
                if table.contains_key(path) {
                    continue;
                }
                let Some((section, field)) = path.split_once('.') else {
                    continue;
                };
                let compiled = rules.iter().map(compile_rule).collect();
                fields.push((section.to_string(), field.to_string(), compiled));
            }
        }

        Self {
            provider: provider.to_string(),
            bundle,
            fields,
        }
    }

    /// Apply the compiled rules to an attribute map.
    pub fn apply(&self, attrs: &AttrMap) -> CanonicalSections {
        let mut sections = CanonicalSections::default();

        for (section, field, rules) in &self.fields {
            let Some(value) = self.first_match(attrs, rules) else {
                continue;
            };
            let slot = match section.as_str() {
                "inputs" => &mut sections.inputs,
                "outputs" => &mut sections.outputs,
                "config" => &mut sections.config,
                "metadata" => &mut sections.metadata,
                _ => continue,
            };
            slot.insert(field.clone(), value);
        }

        // A chat completion without an explicit output role is an assistant
        // turn.
        if sections.outputs.contains_key("content") && !sections.outputs.contains_key("role") {
            sections
                .outputs
                .insert("role".to_string(), Value::String("assistant".to_string()));
        }

        sections
    }

    fn first_match(&self, attrs: &AttrMap, rules: &[CompiledRule]) -> Option<Value> {
        for rule in rules {
            let Some(raw) = eval_pattern(&rule.pattern, attrs) else {
                continue;
            };
            let applied = catch_unwind(AssertUnwindSafe(|| {
                transforms::apply(rule.transform, raw, &self.provider, &self.bundle)
            }));
            match applied {
                Ok(Some(value)) => return Some(value),
                Ok(None) => continue,
                Err(_) => {
                    transforms::warn_once(&self.provider, rule.transform, "transform panicked");
                    continue;
                }
            }
        }
        None
    }
}

fn compile_rule(rule: &FieldRule) -> CompiledRule {
    let pattern = match &rule.pattern {
        RulePattern::Exact { key } => CompiledPattern::Exact(key.clone()),
        RulePattern::Prefix { prefixes } => CompiledPattern::Prefix(prefixes.clone()),
        RulePattern::Indexed { base, fields } => CompiledPattern::Indexed {
            base_prefix: format!("{}.", base),
            fields: fields.clone(),
        },
        RulePattern::Keys { keys } => CompiledPattern::Keys(keys.clone()),
    };
    CompiledRule {
        pattern,
        transform: rule.transform,
    }
}

fn eval_pattern(pattern: &CompiledPattern, attrs: &AttrMap) -> Option<Value> {
    match pattern {
        CompiledPattern::Exact(key) => attrs.get(key).map(|v| v.to_json()),
        CompiledPattern::Prefix(prefixes) => {
            let mut object = serde_json::Map::new();
            for (key, value) in attrs {
                if prefixes.iter().any(|p| key.starts_with(p.as_str())) {
                    object.insert(key.clone(), value.to_json());
                }
            }
            if object.is_empty() {
                None
            } else {
                Some(Value::Object(object))
            }
        }
        CompiledPattern::Indexed {
            base_prefix,
            fields,
        } => collect_indexed(attrs, base_prefix, fields),
        CompiledPattern::Keys(keys) => {
            let values: Vec<Value> = keys
                .iter()
                .map(|k| attrs.get(k).map_or(Value::Null, |v| v.to_json()))
                .collect();
            if values.iter().all(Value::is_null) {
                None
            } else {
                Some(Value::Array(values))
            }
        }
    }
}

/// Compiles and caches extractors per (provider, instrumentor).
pub struct ExtractorEngine {
    bundle: Arc<Bundle>,
    compiled: TtlCache<(String, Instrumentor), Arc<CompiledExtractor>>,
}

impl ExtractorEngine {
    pub fn new(bundle: Arc<Bundle>, cache_entries: usize, cache_ttl: Duration) -> Self {
        Self {
            bundle,
            compiled: TtlCache::new(cache_entries, cache_ttl),
        }
    }

    /// Fetch (compiling on first access) the extractor for a pair. O(1)
    /// afterwards. Unknown pairs get the identity extractor.
    pub fn extractor(&self, provider: &str, instrumentor: Instrumentor) -> Arc<CompiledExtractor> {
        let key = (provider.to_string(), instrumentor);
        self.compiled.get_or_compute(key, || {
            if instrumentor == Instrumentor::Unknown {
                Arc::new(CompiledExtractor::identity(self.bundle.clone(), provider))
            } else {
                Arc::new(CompiledExtractor::compile(
                    self.bundle.clone(),
                    provider,
                    instrumentor,
                ))
            }
        })
    }

    /// Extraction entry point used by the span processor.
    pub fn extract(
        &self,
        provider: &str,
        instrumentor: Instrumentor,
        attrs: &AttrMap,
    ) -> CanonicalSections {
        self.extractor(provider, instrumentor).apply(attrs)
    }

    pub fn clear_cache(&self) {
        self.compiled.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use honeyhive_types::AttrValue;
    use serde_json::json;

    fn engine() -> ExtractorEngine {
        ExtractorEngine::new(Bundle::load().unwrap(), 64, Duration::from_secs(300))
    }

    fn attrs(pairs: &[(&str, &str)]) -> AttrMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), AttrValue::Str(v.to_string())))
            .collect()
    }

    #[test]
    fn test_traceloop_openai_extraction() {
        let engine = engine();
        let map = attrs(&[
            ("gen_ai.system", "openai"),
            ("gen_ai.request.model", "gpt-4o"),
            ("gen_ai.request.temperature", "0.7"),
            ("gen_ai.prompt.0.role", "system"),
            ("gen_ai.prompt.0.content", "You are helpful."),
            ("gen_ai.prompt.1.role", "user"),
            ("gen_ai.prompt.1.content", "2+2?"),
            ("gen_ai.completion.0.role", "assistant"),
            ("gen_ai.completion.0.content", "4"),
            ("gen_ai.completion.0.finish_reason", "stop"),
            ("gen_ai.usage.prompt_tokens", "10"),
            ("gen_ai.usage.completion_tokens", "1"),
            ("gen_ai.usage.total_tokens", "11"),
        ]);

        let sections = engine.extract("openai", Instrumentor::Traceloop, &map);

        assert_eq!(sections.config.get("provider"), Some(&json!("openai")));
        assert_eq!(sections.config.get("model"), Some(&json!("gpt-4o")));
        assert_eq!(sections.config.get("temperature"), Some(&json!(0.7)));
        assert_eq!(
            sections.inputs.get("chat_history"),
            Some(&json!([
                { "role": "system", "content": "You are helpful." },
                { "role": "user", "content": "2+2?" }
            ]))
        );
        assert_eq!(sections.outputs.get("content"), Some(&json!("4")));
        assert_eq!(sections.outputs.get("role"), Some(&json!("assistant")));
        assert_eq!(sections.outputs.get("finish_reason"), Some(&json!("stop")));
        assert_eq!(sections.metadata.get("prompt_tokens"), Some(&json!(10)));
        assert_eq!(sections.metadata.get("completion_tokens"), Some(&json!(1)));
        assert_eq!(sections.metadata.get("total_tokens"), Some(&json!(11)));
        // gpt-4o is priced, so cost comes along.
        assert!(sections.metadata.contains_key("cost"));
    }

    #[test]
    fn test_openinference_anthropic_extraction() {
        let engine = engine();
        let map = attrs(&[
            ("llm.provider", "anthropic"),
            ("llm.model_name", "claude-3-5-sonnet"),
            ("llm.input_messages", r#"[{"role":"user","content":"hi"}]"#),
            (
                "llm.output_messages",
                r#"[{"role":"assistant","content":"hello"}]"#,
            ),
            ("llm.token_count.prompt", "5"),
            ("llm.token_count.completion", "1"),
        ]);

        let sections = engine.extract("anthropic", Instrumentor::Openinference, &map);

        assert_eq!(sections.config.get("provider"), Some(&json!("anthropic")));
        assert_eq!(
            sections.config.get("model"),
            Some(&json!("claude-3-5-sonnet"))
        );
        assert_eq!(
            sections.inputs.get("chat_history"),
            Some(&json!([{ "role": "user", "content": "hi" }]))
        );
        assert_eq!(sections.outputs.get("content"), Some(&json!("hello")));
        assert_eq!(sections.outputs.get("role"), Some(&json!("assistant")));
        assert_eq!(sections.metadata.get("prompt_tokens"), Some(&json!(5)));
        assert_eq!(sections.metadata.get("completion_tokens"), Some(&json!(1)));
    }

    #[test]
    fn test_openlit_gemini_extraction() {
        let engine = engine();
        let map = attrs(&[
            ("openlit.provider", "gemini"),
            ("openlit.model", "gemini-1.5-pro"),
            ("openlit.input_messages", r#"[{"role":"user","content":"ping"}]"#),
            ("openlit.output.content", "pong"),
            ("openlit.usage.input_tokens", "2"),
            ("openlit.usage.output_tokens", "1"),
        ]);

        let sections = engine.extract("gemini", Instrumentor::Openlit, &map);

        assert_eq!(sections.config.get("provider"), Some(&json!("gemini")));
        assert_eq!(sections.config.get("model"), Some(&json!("gemini-1.5-pro")));
        assert_eq!(
            sections.inputs.get("chat_history"),
            Some(&json!([{ "role": "user", "content": "ping" }]))
        );
        assert_eq!(sections.outputs.get("content"), Some(&json!("pong")));
        assert_eq!(sections.metadata.get("prompt_tokens"), Some(&json!(2)));
        assert_eq!(sections.metadata.get("completion_tokens"), Some(&json!(1)));
    }

    #[test]
    fn test_prefix_pattern_collects_request_parameters() {
        let engine = engine();
        let map = attrs(&[
            ("openlit.provider", "gemini"),
            ("openlit.model", "gemini-1.5-pro"),
            ("openlit.request.top_k", "40"),
            ("openlit.request.candidate_count", "1"),
        ]);
        let sections = engine.extract("gemini", Instrumentor::Openlit, &map);
        let parameters = sections.config.get("parameters").unwrap();
        assert_eq!(parameters["openlit.request.top_k"], json!("40"));
        assert_eq!(parameters["openlit.request.candidate_count"], json!("1"));
    }

    #[test]
    fn test_identity_extractor_for_unknown() {
        let engine = engine();
        let map = attrs(&[("custom.thing", "x")]);
        let sections = engine.extract("unknown", Instrumentor::Unknown, &map);
        assert!(sections.is_empty());
    }

    #[test]
    fn test_first_non_null_rule_wins() {
        let engine = engine();
        // Traceloop token rules fall back to input/output token names.
        let map = attrs(&[
            ("gen_ai.system", "anthropic"),
            ("gen_ai.usage.input_tokens", "7"),
            ("gen_ai.usage.output_tokens", "3"),
        ]);
        let sections = engine.extract("anthropic", Instrumentor::Traceloop, &map);
        assert_eq!(sections.metadata.get("prompt_tokens"), Some(&json!(7)));
        assert_eq!(sections.metadata.get("completion_tokens"), Some(&json!(3)));
    }
}
