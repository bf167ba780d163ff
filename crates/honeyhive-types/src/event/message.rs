use serde::{Deserialize, Serialize};

/// Role of a chat-history entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
    Function,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
            Role::Function => "function",
        }
    }

    /// Parse a vendor role string, folding known aliases into the canonical
    /// set. Unrecognized roles normalize to `user`.
    pub fn parse_or_user(s: &str) -> Role {
        match s {
            "system" => Role::System,
            "user" | "human" => Role::User,
            "assistant" | "ai" | "model" => Role::Assistant,
            "tool" => Role::Tool,
            "function" => Role::Function,
            _ => Role::User,
        }
    }
}

/// Normalized chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            name: None,
            tool_call_id: None,
            tool_calls: None,
        }
    }
}

/// Tool call recorded on an assistant message.
///
/// `function.arguments` is a JSON-encoded string, preserving OpenAI
/// semantics; it is never re-serialized by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

/// Normalized finish reason
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    FunctionCall,
    Other,
}

impl FinishReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinishReason::Stop => "stop",
            FinishReason::Length => "length",
            FinishReason::ToolCalls => "tool_calls",
            FinishReason::ContentFilter => "content_filter",
            FinishReason::FunctionCall => "function_call",
            FinishReason::Other => "other",
        }
    }

    /// Map a vendor finish/stop reason onto the canonical enum.
    pub fn normalize(s: &str) -> FinishReason {
        match s {
            "stop" | "end_turn" | "stop_sequence" | "STOP" | "eos" => FinishReason::Stop,
            "length" | "max_tokens" | "MAX_TOKENS" | "model_length" => FinishReason::Length,
            "tool_calls" | "tool_use" | "tool_call" => FinishReason::ToolCalls,
            "content_filter" | "SAFETY" | "RECITATION" | "safety" => FinishReason::ContentFilter,
            "function_call" => FinishReason::FunctionCall,
            _ => FinishReason::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_serialization_omits_absent_fields() {
        let message = Message::new(Role::User, "hi");
        insta::assert_json_snapshot!(message, @r###"
        {
          "role": "user",
          "content": "hi"
        }
        "###);
    }

    #[test]
    fn test_tool_call_arguments_stay_a_string() {
        let json = r#"{"id":"call_1","type":"function","function":{"name":"get_weather","arguments":"{\"city\":\"Paris\"}"}}"#;
        let call: ToolCall = serde_json::from_str(json).unwrap();
        assert_eq!(call.function.arguments, r#"{"city":"Paris"}"#);
        let back = serde_json::to_string(&call).unwrap();
        assert_eq!(back, json);
    }

    #[test]
    fn test_finish_reason_normalization() {
        assert_eq!(FinishReason::normalize("end_turn"), FinishReason::Stop);
        assert_eq!(FinishReason::normalize("MAX_TOKENS"), FinishReason::Length);
        assert_eq!(FinishReason::normalize("tool_use"), FinishReason::ToolCalls);
        assert_eq!(FinishReason::normalize("weird"), FinishReason::Other);
    }

    #[test]
    fn test_role_aliases() {
        assert_eq!(Role::parse_or_user("model"), Role::Assistant);
        assert_eq!(Role::parse_or_user("human"), Role::User);
        assert_eq!(Role::parse_or_user("mystery"), Role::User);
    }
}
