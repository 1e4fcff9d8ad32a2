//! Common types used by the provider trait and implementations.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A message in provider-neutral format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderMessage {
    /// Message role ("user" or "assistant").
    pub role: String,
    /// Content blocks.
    pub content: Vec<ProviderContent>,
}

/// Content block in provider-neutral format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProviderContent {
    /// Plain text.
    #[serde(rename = "text")]
    Text { text: String },

    /// Invocation of a locally-executed tool.
    #[serde(rename = "tool_call")]
    ToolCall {
        id: String,
        name: String,
        arguments: Value,
    },

    /// Result of a locally-executed tool.
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_call_id: String,
        content: String,
        is_error: bool,
    },

    /// Invocation of a tool the service runs itself.
    #[serde(rename = "server_tool_call")]
    ServerToolCall {
        id: String,
        name: String,
        arguments: Value,
    },

    /// Service-side result, kept as the raw block so it can be sent back
    /// unchanged.
    #[serde(rename = "server_tool_result")]
    ServerToolResult { tool_call_id: String, payload: Value },
}

/// Tool definition for the provider API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolDefinition {
    /// A tool the model calls and this process executes.
    Function {
        name: String,
        description: String,
        /// JSON Schema for the tool's parameters.
        parameters: Value,
    },
    /// A tool the service executes; `spec` is forwarded verbatim.
    Server { name: String, spec: Value },
}

impl ToolDefinition {
    pub fn name(&self) -> &str {
        match self {
            ToolDefinition::Function { name, .. } | ToolDefinition::Server { name, .. } => name,
        }
    }
}

/// Request to a provider.
#[derive(Debug, Clone, Default)]
pub struct Request {
    /// Model override; the provider's current model when `None`.
    pub model: Option<String>,
    /// Conversation messages.
    pub messages: Vec<ProviderMessage>,
    /// Available tools.
    pub tools: Vec<ToolDefinition>,
    /// System prompt.
    pub system: Option<String>,
    /// Maximum tokens in the response.
    pub max_tokens: Option<usize>,
}

/// Non-streaming response from a provider.
#[derive(Debug, Clone)]
pub struct Response {
    /// Content blocks in the response.
    pub content: Vec<ProviderContent>,
    /// Stop reason.
    pub stop_reason: StopReason,
    /// Token usage.
    pub usage: Usage,
}

/// Token usage information.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Input tokens consumed.
    pub input_tokens: usize,
    /// Output tokens generated.
    pub output_tokens: usize,
}

/// Reason the model stopped generating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Normal end of response.
    EndTurn,
    /// Model wants to use a tool.
    ToolUse,
    /// Max tokens reached.
    MaxTokens,
    /// Stop sequence matched.
    StopSequence,
    /// The service paused a long-running server tool turn.
    PauseTurn,
    /// The model declined to answer.
    Refusal,
}

impl StopReason {
    /// Parse the wire name. Unknown reasons end the turn.
    pub fn from_wire(reason: &str) -> Self {
        match reason {
            "tool_use" => StopReason::ToolUse,
            "max_tokens" => StopReason::MaxTokens,
            "stop_sequence" => StopReason::StopSequence,
            "pause_turn" => StopReason::PauseTurn,
            "refusal" => StopReason::Refusal,
            _ => StopReason::EndTurn,
        }
    }

    /// Whether the model asked for tool results before it can continue.
    pub fn requests_tools(&self) -> bool {
        matches!(self, StopReason::ToolUse)
    }
}

/// Information about a model supported by a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model identifier (e.g., "claude-sonnet-4-20250514").
    pub id: String,
    /// Human-readable model name.
    pub name: String,
    /// Maximum context window in tokens.
    pub context_window: usize,
    /// Maximum output tokens.
    pub max_output_tokens: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_reason_from_wire() {
        assert_eq!(StopReason::from_wire("tool_use"), StopReason::ToolUse);
        assert_eq!(StopReason::from_wire("pause_turn"), StopReason::PauseTurn);
        assert_eq!(StopReason::from_wire("something_new"), StopReason::EndTurn);
        assert!(StopReason::ToolUse.requests_tools());
        assert!(!StopReason::PauseTurn.requests_tools());
    }

    #[test]
    fn test_content_serde_tag() {
        let block = ProviderContent::ToolResult {
            tool_call_id: "t1".to_string(),
            content: "ok".to_string(),
            is_error: false,
        };
        let value = serde_json::to_value(&block).unwrap();
        assert_eq!(value["type"], "tool_result");
    }

    #[test]
    fn test_tool_definition_name() {
        let def = ToolDefinition::Server {
            name: "web_search".to_string(),
            spec: serde_json::json!({}),
        };
        assert_eq!(def.name(), "web_search");
    }
}
