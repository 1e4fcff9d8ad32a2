//! Anthropic Claude provider implementation.
//!
//! Implements the Provider trait for Anthropic's Messages API. Requests are
//! sent without streaming; the orchestrator only needs the finished turn.

use crate::error::ProviderError;
use crate::traits::Provider;
use crate::types::{
    ModelInfo, ProviderContent, ProviderMessage, Request, Response, StopReason, ToolDefinition,
    Usage,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

const API_BASE: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const DEFAULT_MAX_TOKENS: usize = 8_192;

/// Server tool types that are only accepted with a beta flag.
const SERVER_TOOL_BETAS: &[(&str, &str)] = &[("web_fetch_", "web-fetch-2025-09-10")];

/// Anthropic Claude provider.
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: API_BASE.to_string(),
        }
    }

    /// Create from `ANTHROPIC_API_KEY`.
    pub fn from_env() -> Result<Self, ProviderError> {
        std::env::var("ANTHROPIC_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .map(Self::new)
            .ok_or_else(|| ProviderError::Auth("ANTHROPIC_API_KEY is not set".to_string()))
    }

    /// Create with a custom base URL (for testing/proxy).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Convert a generic Request into the Anthropic API request body.
    fn build_request_body(&self, request: &Request) -> Value {
        let messages: Vec<Value> = request
            .messages
            .iter()
            .filter_map(convert_message)
            .collect();

        let mut body = json!({
            "model": request.model.as_deref().unwrap_or(&self.model),
            "messages": messages,
            "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        });

        if !request.tools.is_empty() {
            body["tools"] = Value::Array(request.tools.iter().map(convert_tool).collect());
        }

        if let Some(ref system) = request.system {
            body["system"] = json!(system);
        }

        body
    }
}

/// Convert a ProviderMessage to the Anthropic JSON format.
fn convert_message(msg: &ProviderMessage) -> Option<Value> {
    let role = match msg.role.as_str() {
        "user" | "assistant" => msg.role.as_str(),
        _ => return None,
    };

    let content: Vec<Value> = msg.content.iter().map(convert_content).collect();
    if content.is_empty() {
        return None;
    }

    Some(json!({
        "role": role,
        "content": content,
    }))
}

/// Convert a ProviderContent block to Anthropic format.
fn convert_content(content: &ProviderContent) -> Value {
    match content {
        ProviderContent::Text { text } => json!({
            "type": "text",
            "text": text,
        }),
        ProviderContent::ToolCall {
            id,
            name,
            arguments,
        } => json!({
            "type": "tool_use",
            "id": id,
            "name": name,
            "input": arguments,
        }),
        ProviderContent::ToolResult {
            tool_call_id,
            content,
            is_error,
        } => json!({
            "type": "tool_result",
            "tool_use_id": tool_call_id,
            "content": content,
            "is_error": is_error,
        }),
        ProviderContent::ServerToolCall {
            id,
            name,
            arguments,
        } => json!({
            "type": "server_tool_use",
            "id": id,
            "name": name,
            "input": arguments,
        }),
        ProviderContent::ServerToolResult { payload, .. } => payload.clone(),
    }
}

/// Convert a ToolDefinition to Anthropic format.
fn convert_tool(tool: &ToolDefinition) -> Value {
    match tool {
        ToolDefinition::Function {
            name,
            description,
            parameters,
        } => json!({
            "name": name,
            "description": description,
            "input_schema": parameters,
        }),
        ToolDefinition::Server { spec, .. } => spec.clone(),
    }
}

/// Value for the `anthropic-beta` header, if any offered tool needs one.
fn beta_header(tools: &[ToolDefinition]) -> Option<String> {
    let mut betas: Vec<&str> = Vec::new();
    for tool in tools {
        let ToolDefinition::Server { spec, .. } = tool else {
            continue;
        };
        let Some(kind) = spec.get("type").and_then(Value::as_str) else {
            continue;
        };
        for &(prefix, beta) in SERVER_TOOL_BETAS {
            if kind.starts_with(prefix) && !betas.contains(&beta) {
                betas.push(beta);
            }
        }
    }
    (!betas.is_empty()).then(|| betas.join(","))
}

/// Parse a Messages API response body.
fn parse_response(body: MessagesResponse) -> Response {
    let content = body.content.into_iter().filter_map(parse_block).collect();

    Response {
        content,
        stop_reason: body
            .stop_reason
            .as_deref()
            .map(StopReason::from_wire)
            .unwrap_or(StopReason::EndTurn),
        usage: Usage {
            input_tokens: body.usage.input_tokens,
            output_tokens: body.usage.output_tokens,
        },
    }
}

fn parse_block(block: Value) -> Option<ProviderContent> {
    let kind = block.get("type").and_then(Value::as_str).unwrap_or_default();
    let field = |key: &str| {
        block
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    match kind {
        "text" => Some(ProviderContent::Text { text: field("text") }),
        "tool_use" => Some(ProviderContent::ToolCall {
            id: field("id"),
            name: field("name"),
            arguments: block.get("input").cloned().unwrap_or(Value::Null),
        }),
        "server_tool_use" => Some(ProviderContent::ServerToolCall {
            id: field("id"),
            name: field("name"),
            arguments: block.get("input").cloned().unwrap_or(Value::Null),
        }),
        k if k.ends_with("_tool_result") => Some(ProviderContent::ServerToolResult {
            tool_call_id: field("tool_use_id"),
            payload: block,
        }),
        other => {
            debug!(block_type = other, "Skipping unsupported content block");
            None
        }
    }
}

/// Pull the human-readable message out of an API error body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .map(|env| format!("{}: {}", env.error.error_type, env.error.message))
        .unwrap_or_else(|_| body.to_string())
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn models(&self) -> Vec<ModelInfo> {
        vec![
            ModelInfo {
                id: "claude-sonnet-4-20250514".to_string(),
                name: "Claude Sonnet 4".to_string(),
                context_window: 200_000,
                max_output_tokens: 64_000,
            },
            ModelInfo {
                id: "claude-opus-4-20250514".to_string(),
                name: "Claude Opus 4".to_string(),
                context_window: 200_000,
                max_output_tokens: 32_000,
            },
            ModelInfo {
                id: "claude-3-7-sonnet-20250219".to_string(),
                name: "Claude 3.7 Sonnet".to_string(),
                context_window: 200_000,
                max_output_tokens: 64_000,
            },
            ModelInfo {
                id: "claude-3-5-haiku-20241022".to_string(),
                name: "Claude 3.5 Haiku".to_string(),
                context_window: 200_000,
                max_output_tokens: 8_192,
            },
        ]
    }

    fn current_model(&self) -> &str {
        &self.model
    }

    fn set_model(&mut self, model: &str) -> Result<(), ProviderError> {
        if self.models().iter().any(|m| m.id == model) {
            self.model = model.to_string();
            Ok(())
        } else {
            Err(ProviderError::InvalidModel(model.to_string()))
        }
    }

    async fn complete(&self, request: Request) -> Result<Response, ProviderError> {
        let body = self.build_request_body(&request);
        debug!(
            model = %body["model"],
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Sending messages request"
        );

        let mut builder = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json");
        if let Some(betas) = beta_header(&request.tools) {
            builder = builder.header("anthropic-beta", betas);
        }

        let response = builder.json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let message = error_message(&error_body);
            return Err(match status.as_u16() {
                401 | 403 => ProviderError::Auth(message),
                code => ProviderError::Api {
                    status: code,
                    message,
                },
            });
        }

        let text = response.text().await?;
        let parsed: MessagesResponse = serde_json::from_str(&text)
            .map_err(|e| ProviderError::InvalidResponse(format!("{e}: {text}")))?;
        Ok(parse_response(parsed))
    }
}

// Anthropic wire types (internal)

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<Value>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: UsageData,
}

#[derive(Debug, Default, Deserialize)]
struct UsageData {
    #[serde(default)]
    input_tokens: usize,
    #[serde(default)]
    output_tokens: usize,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorData,
}

#[derive(Debug, Deserialize)]
struct ErrorData {
    #[serde(rename = "type", default)]
    error_type: String,
    #[serde(default)]
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_text(text: &str) -> ProviderMessage {
        ProviderMessage {
            role: "user".to_string(),
            content: vec![ProviderContent::Text {
                text: text.to_string(),
            }],
        }
    }

    #[test]
    fn test_provider_name() {
        let provider = AnthropicProvider::new("test-key");
        assert_eq!(provider.name(), "anthropic");
        assert_eq!(provider.current_model(), DEFAULT_MODEL);
    }

    #[test]
    fn test_set_model() {
        let mut provider = AnthropicProvider::new("test-key");
        provider.set_model("claude-3-5-haiku-20241022").unwrap();
        assert_eq!(provider.current_model(), "claude-3-5-haiku-20241022");
        assert!(matches!(
            provider.set_model("nonexistent-model"),
            Err(ProviderError::InvalidModel(_))
        ));
    }

    #[test]
    fn test_build_request_body() {
        let provider = AnthropicProvider::new("test-key");
        let request = Request {
            messages: vec![user_text("Hello")],
            system: Some("You are helpful.".to_string()),
            max_tokens: Some(1024),
            ..Default::default()
        };

        let body = provider.build_request_body(&request);
        assert_eq!(body["model"], DEFAULT_MODEL);
        assert_eq!(body["max_tokens"], 1024);
        assert_eq!(body["system"], "You are helpful.");
        assert_eq!(body["messages"][0]["content"][0]["text"], "Hello");
        assert!(body.get("stream").is_none());
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn test_build_request_with_tools() {
        let provider = AnthropicProvider::new("test-key");
        let request = Request {
            model: Some("claude-3-5-haiku-20241022".to_string()),
            tools: vec![
                ToolDefinition::Function {
                    name: "bash".to_string(),
                    description: "Run a command".to_string(),
                    parameters: json!({"type": "object"}),
                },
                ToolDefinition::Server {
                    name: "web_search".to_string(),
                    spec: json!({"type": "web_search_20250305", "name": "web_search"}),
                },
            ],
            ..Default::default()
        };

        let body = provider.build_request_body(&request);
        assert_eq!(body["model"], "claude-3-5-haiku-20241022");
        assert_eq!(body["tools"][0]["name"], "bash");
        assert_eq!(body["tools"][0]["input_schema"]["type"], "object");
        assert_eq!(body["tools"][1]["type"], "web_search_20250305");
        assert_eq!(beta_header(&request.tools), None);
    }

    #[test]
    fn test_web_fetch_requires_beta_header() {
        let tools = vec![
            ToolDefinition::Server {
                name: "web_search".to_string(),
                spec: json!({"type": "web_search_20250305", "name": "web_search"}),
            },
            ToolDefinition::Server {
                name: "web_fetch".to_string(),
                spec: json!({"type": "web_fetch_20250910", "name": "web_fetch"}),
            },
        ];
        assert_eq!(beta_header(&tools).as_deref(), Some("web-fetch-2025-09-10"));
        assert_eq!(beta_header(&[]), None);
    }

    #[test]
    fn test_convert_tool_blocks() {
        let call = convert_content(&ProviderContent::ToolCall {
            id: "tu_1".to_string(),
            name: "bash".to_string(),
            arguments: json!({"command": "ls"}),
        });
        assert_eq!(call["type"], "tool_use");
        assert_eq!(call["input"]["command"], "ls");

        let result = convert_content(&ProviderContent::ToolResult {
            tool_call_id: "tu_1".to_string(),
            content: "boom".to_string(),
            is_error: true,
        });
        assert_eq!(result["tool_use_id"], "tu_1");
        assert_eq!(result["is_error"], true);
    }

    #[test]
    fn test_parse_response_blocks() {
        let raw = r#"{
            "content": [
                {"type": "text", "text": "Looking"},
                {"type": "server_tool_use", "id": "srv_1", "name": "web_search", "input": {"query": "rust"}},
                {"type": "web_search_tool_result", "tool_use_id": "srv_1", "content": []},
                {"type": "tool_use", "id": "tu_1", "name": "bash", "input": {"command": "ls"}},
                {"type": "thinking", "thinking": "hmm"}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 12, "output_tokens": 34}
        }"#;

        let response = parse_response(serde_json::from_str(raw).unwrap());
        assert_eq!(response.stop_reason, StopReason::ToolUse);
        assert_eq!(response.usage.output_tokens, 34);
        assert_eq!(response.content.len(), 4);
        assert!(matches!(
            &response.content[1],
            ProviderContent::ServerToolCall { name, .. } if name == "web_search"
        ));
        match &response.content[2] {
            ProviderContent::ServerToolResult {
                tool_call_id,
                payload,
            } => {
                assert_eq!(tool_call_id, "srv_1");
                // Sent back exactly as received.
                assert_eq!(convert_content(&response.content[2]), *payload);
            }
            other => panic!("Expected ServerToolResult, got: {other:?}"),
        }
    }

    #[test]
    fn test_error_message() {
        let body = r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        assert_eq!(error_message(body), "overloaded_error: Overloaded");
        assert_eq!(error_message("upstream died"), "upstream died");
    }
}
