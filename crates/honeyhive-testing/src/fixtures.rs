//! Vendor attribute fixtures, one per supported instrumentor dialect.

use honeyhive_types::{AttrMap, AttrValue};

pub fn attrs(pairs: &[(&str, &str)]) -> AttrMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), AttrValue::Str(v.to_string())))
        .collect()
}

/// Traceloop-style OpenAI chat completion (flattened prompt/completion).
pub fn traceloop_openai() -> AttrMap {
    attrs(&[
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
    ])
}

/// OpenInference-style Anthropic call (JSON-string message lists).
pub fn openinference_anthropic() -> AttrMap {
    attrs(&[
        ("llm.provider", "anthropic"),
        ("llm.model_name", "claude-3-5-sonnet"),
        ("llm.input_messages", r#"[{"role":"user","content":"hi"}]"#),
        (
            "llm.output_messages",
            r#"[{"role":"assistant","content":"hello"}]"#,
        ),
        ("llm.token_count.prompt", "5"),
        ("llm.token_count.completion", "1"),
    ])
}

/// OpenLit-style Gemini call.
pub fn openlit_gemini() -> AttrMap {
    attrs(&[
        ("openlit.provider", "gemini"),
        ("openlit.model", "gemini-1.5-pro"),
        (
            "openlit.input_messages",
            r#"[{"role":"user","content":"ping"}]"#,
        ),
        ("openlit.output.content", "pong"),
        ("openlit.usage.input_tokens", "2"),
        ("openlit.usage.output_tokens", "1"),
    ])
}

/// An attribute set no bundle signature or explicit field matches.
pub fn unrecognized() -> AttrMap {
    attrs(&[
        ("db.system", "postgres"),
        ("db.statement", "select 1"),
    ])
}
