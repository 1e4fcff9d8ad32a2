//! Conversation transcript types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Unique message identifier based on ULID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Generate a new unique message ID.
    pub fn new() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A block of content within a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    /// Plain text content.
    #[serde(rename = "text")]
    Text { text: String },

    /// A tool invocation by the assistant. `arguments` are unvalidated.
    #[serde(rename = "tool_call")]
    ToolCall {
        id: String,
        name: String,
        arguments: Value,
    },

    /// The result of a locally-executed tool.
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_call_id: String,
        content: String,
        is_error: bool,
    },

    /// A tool invocation the model service resolves itself.
    #[serde(rename = "server_tool_call")]
    ServerToolCall {
        id: String,
        name: String,
        arguments: Value,
    },

    /// The service's own result for a `ServerToolCall`, kept verbatim.
    #[serde(rename = "server_tool_result")]
    ServerToolResult { tool_call_id: String, payload: Value },
}

impl ContentBlock {
    /// The local tool invocation this block carries, if any.
    pub fn invocation(&self) -> Option<ToolInvocation> {
        match self {
            ContentBlock::ToolCall {
                id,
                name,
                arguments,
            } => Some(ToolInvocation {
                id: id.clone(),
                name: name.clone(),
                arguments: arguments.clone(),
            }),
            _ => None,
        }
    }
}

/// One tool invocation taken from an assistant turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// Outcome of dispatching a local tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
            is_error: true,
        }
    }
}

impl From<ToolResult> for ContentBlock {
    fn from(result: ToolResult) -> Self {
        ContentBlock::ToolResult {
            tool_call_id: result.tool_call_id,
            content: result.content,
            is_error: result.is_error,
        }
    }
}

/// A single turn in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: Vec<ContentBlock>,
    /// Unix timestamp (seconds since epoch).
    pub timestamp: u64,
}

impl Message {
    fn now_timestamp() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }

    fn with_content(role: Role, content: Vec<ContentBlock>) -> Self {
        Self {
            id: MessageId::new(),
            role,
            content,
            timestamp: Self::now_timestamp(),
        }
    }

    /// Create a new user message from text.
    pub fn user(text: impl Into<String>) -> Self {
        Self::with_content(Role::User, vec![ContentBlock::Text { text: text.into() }])
    }

    /// Create a new assistant message from content blocks.
    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        Self::with_content(Role::Assistant, content)
    }

    /// Create the user turn that answers an assistant turn's local invocations.
    pub fn tool_results(results: Vec<ToolResult>) -> Self {
        Self::with_content(Role::User, results.into_iter().map(Into::into).collect())
    }

    /// Concatenated text blocks.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// Tool results in block order.
    pub fn tool_results_iter(&self) -> impl Iterator<Item = (&str, &str, bool)> {
        self.content.iter().filter_map(|block| match block {
            ContentBlock::ToolResult {
                tool_call_id,
                content,
                is_error,
            } => Some((tool_call_id.as_str(), content.as_str(), *is_error)),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_id_unique() {
        assert_ne!(MessageId::new(), MessageId::new());
    }

    #[test]
    fn test_user_message() {
        let msg = Message::user("Hello, world!");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.text(), "Hello, world!");
        assert!(msg.timestamp > 0);
    }

    #[test]
    fn test_tool_results_message() {
        let msg = Message::tool_results(vec![
            ToolResult::success("a", "fine"),
            ToolResult::error("b", "broken"),
        ]);
        assert_eq!(msg.role, Role::User);

        let results: Vec<_> = msg.tool_results_iter().collect();
        assert_eq!(results, vec![("a", "fine", false), ("b", "broken", true)]);
    }

    #[test]
    fn test_invocations_skip_server_calls() {
        let msg = Message::assistant(vec![
            ContentBlock::Text {
                text: "Hello ".to_string(),
            },
            ContentBlock::ToolCall {
                id: "tc_1".to_string(),
                name: "bash".to_string(),
                arguments: serde_json::json!({"command": "ls"}),
            },
            ContentBlock::ServerToolCall {
                id: "srv_1".to_string(),
                name: "web_search".to_string(),
                arguments: Value::Null,
            },
            ContentBlock::Text {
                text: "world".to_string(),
            },
        ]);

        assert_eq!(msg.text(), "Hello world");
        let invocations: Vec<_> = msg
            .content
            .iter()
            .filter_map(ContentBlock::invocation)
            .collect();
        assert_eq!(invocations.len(), 1);
        assert_eq!(invocations[0].name, "bash");
    }

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
        let role: Role = serde_json::from_str("\"assistant\"").unwrap();
        assert_eq!(role, Role::Assistant);
    }

    #[test]
    fn test_content_block_tag() {
        let block = ContentBlock::ServerToolResult {
            tool_call_id: "srv_1".to_string(),
            payload: serde_json::json!({"type": "web_search_tool_result"}),
        };
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["type"], "server_tool_result");
        let back: ContentBlock = serde_json::from_value(json).unwrap();
        assert_eq!(back, block);
    }
}
