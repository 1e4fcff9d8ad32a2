//! Conversation orchestration loop.
//!
//! One run is a sequence of model calls:
//! 1. Send the transcript and tool list to the provider (with retry)
//! 2. Append the assistant turn and show its text
//! 3. Dispatch local tool invocations in order and append their results
//! 4. Repeat while the model asks for tool results, up to `max_depth` calls

use crate::dispatch::dispatch;
use crate::error::OrchestratorError;
use crate::message::{ContentBlock, Message, Role};
use crate::retry::{FailureClass, RetryPolicy};
use crate::sink::OutputSink;
use relay_provider::{
    Provider, ProviderContent, ProviderError, ProviderMessage, Request, Response, ToolDefinition,
};
use relay_tools::{ToolCapability, ToolRegistry};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Maximum model calls in one run.
    pub max_depth: usize,
    /// Maximum tokens per response.
    pub max_tokens: Option<usize>,
    pub retry: RetryPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_tokens: None,
            retry: RetryPolicy::default(),
        }
    }
}

/// Drives the model/tool exchange for one conversation.
pub struct Orchestrator {
    provider: Arc<dyn Provider>,
    tools: ToolRegistry,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn Provider>, tools: ToolRegistry, config: OrchestratorConfig) -> Self {
        Self {
            provider,
            tools,
            config,
        }
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn model(&self) -> &str {
        self.provider.current_model()
    }

    /// Run the tool loop on `transcript` and return the turns it produced,
    /// oldest first.
    ///
    /// `transcript` is not modified. On a fatal error nothing is returned, so
    /// the caller's transcript stays consistent.
    pub async fn run(
        &self,
        system_prompt: Option<&str>,
        transcript: &[Message],
        sink: &dyn OutputSink,
    ) -> Result<Vec<Message>, OrchestratorError> {
        let mut history: Vec<Message> = transcript.to_vec();
        let mut appended = Vec::new();
        let mut depth = 0;

        loop {
            if depth >= self.config.max_depth {
                let err = OrchestratorError::DepthExceeded {
                    max_depth: self.config.max_depth,
                    model: self.model().to_string(),
                    tool_names: self.tools.names(),
                    transcript_len: history.len(),
                };
                error!(%err, "Aborting run");
                sink.show_error(&err.to_string());
                return Err(err);
            }

            let response = self.call_with_retry(system_prompt, &history, sink).await?;
            let stop_reason = response.stop_reason.clone();

            let assistant = Message::assistant(
                response.content.into_iter().map(from_provider_content).collect(),
            );
            debug!(depth, blocks = assistant.content.len(), ?stop_reason, "Assistant turn");

            let mut results = Vec::new();
            for block in &assistant.content {
                match block {
                    ContentBlock::Text { text } => sink.show_message(text),
                    ContentBlock::ServerToolCall { name, .. } => {
                        debug!(tool = %name, "Service-side tool invocation");
                    }
                    _ => {
                        let Some(invocation) = block.invocation() else {
                            continue;
                        };
                        if let Some(result) = dispatch(&invocation, &self.tools, sink).await {
                            results.push(result);
                        }
                    }
                }
            }

            history.push(assistant.clone());
            appended.push(assistant);

            if !results.is_empty() {
                let turn = Message::tool_results(results);
                history.push(turn.clone());
                appended.push(turn);
            }

            if !stop_reason.requests_tools() {
                info!(calls = depth + 1, turns = appended.len(), "Run complete");
                return Ok(appended);
            }
            depth += 1;
        }
    }

    async fn call_with_retry(
        &self,
        system_prompt: Option<&str>,
        history: &[Message],
        sink: &dyn OutputSink,
    ) -> Result<Response, OrchestratorError> {
        let request = self.build_request(system_prompt, history);
        let max_attempts = self.config.retry.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            sink.start_thinking();
            let err: ProviderError = match self.provider.complete(request.clone()).await {
                Ok(response) => {
                    sink.stop_thinking(None);
                    return Ok(response);
                }
                Err(e) => e,
            };
            sink.stop_thinking(Some(&err.to_string()));

            if attempt >= max_attempts {
                let err = OrchestratorError::ServiceFailed {
                    model: self.model().to_string(),
                    tool_names: self.tools.names(),
                    prompt_chars: system_prompt.map(|p| p.chars().count()).unwrap_or(0),
                    transcript_len: history.len(),
                    attempts: attempt,
                    source: err,
                };
                error!(%err, "Aborting run");
                sink.show_error(&err.to_string());
                return Err(err);
            }

            let class = FailureClass::of(&err);
            let delay = self.config.retry.delay_for(attempt, class);
            warn!(
                attempt,
                max_attempts,
                ?class,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Model call failed; retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    fn build_request(&self, system_prompt: Option<&str>, history: &[Message]) -> Request {
        Request {
            model: Some(self.model().to_string()),
            messages: history.iter().map(to_provider_message).collect(),
            tools: self.tool_definitions(),
            system: system_prompt.map(str::to_string),
            max_tokens: self.config.max_tokens,
        }
    }

    /// Tool list in registration order.
    fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|descriptor| match descriptor.capability() {
                ToolCapability::Local(tool) => ToolDefinition::Function {
                    name: tool.name().to_string(),
                    description: tool.description().to_string(),
                    parameters: tool.parameters_schema(),
                },
                ToolCapability::Remote(remote) => ToolDefinition::Server {
                    name: remote.name.clone(),
                    spec: remote.spec.clone(),
                },
            })
            .collect()
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("provider", &self.provider.name())
            .field("model", &self.provider.current_model())
            .field("tools", &self.tools.names())
            .field("config", &self.config)
            .finish()
    }
}

fn to_provider_message(msg: &Message) -> ProviderMessage {
    let role = match msg.role {
        Role::User => "user",
        Role::Assistant => "assistant",
    };

    let content = msg
        .content
        .iter()
        .map(|block| match block {
            ContentBlock::Text { text } => ProviderContent::Text { text: text.clone() },
            ContentBlock::ToolCall {
                id,
                name,
                arguments,
            } => ProviderContent::ToolCall {
                id: id.clone(),
                name: name.clone(),
                arguments: arguments.clone(),
            },
            ContentBlock::ToolResult {
                tool_call_id,
                content,
                is_error,
            } => ProviderContent::ToolResult {
                tool_call_id: tool_call_id.clone(),
                content: content.clone(),
                is_error: *is_error,
            },
            ContentBlock::ServerToolCall {
                id,
                name,
                arguments,
            } => ProviderContent::ServerToolCall {
                id: id.clone(),
                name: name.clone(),
                arguments: arguments.clone(),
            },
            ContentBlock::ServerToolResult {
                tool_call_id,
                payload,
            } => ProviderContent::ServerToolResult {
                tool_call_id: tool_call_id.clone(),
                payload: payload.clone(),
            },
        })
        .collect();

    ProviderMessage {
        role: role.to_string(),
        content,
    }
}

fn from_provider_content(content: ProviderContent) -> ContentBlock {
    match content {
        ProviderContent::Text { text } => ContentBlock::Text { text },
        ProviderContent::ToolCall {
            id,
            name,
            arguments,
        } => ContentBlock::ToolCall {
            id,
            name,
            arguments,
        },
        ProviderContent::ToolResult {
            tool_call_id,
            content,
            is_error,
        } => ContentBlock::ToolResult {
            tool_call_id,
            content,
            is_error,
        },
        ProviderContent::ServerToolCall {
            id,
            name,
            arguments,
        } => ContentBlock::ServerToolCall {
            id,
            name,
            arguments,
        },
        ProviderContent::ServerToolResult {
            tool_call_id,
            payload,
        } => ContentBlock::ServerToolResult {
            tool_call_id,
            payload,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{NullSink, RecordingSink, SinkEvent};
    use async_trait::async_trait;
    use relay_provider::{ModelInfo, StopReason, Usage};
    use relay_tools::{LocalTool, RemoteTool, ToolError, ValidatedInput};
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    /// Replays scripted responses and records every request.
    struct ScriptedProvider {
        script: StdMutex<VecDeque<Result<Response, ProviderError>>>,
        requests: StdMutex<Vec<Request>>,
        /// Returned once the script runs out.
        fallback: fn() -> Result<Response, ProviderError>,
    }

    impl ScriptedProvider {
        fn new(script: Vec<Result<Response, ProviderError>>) -> Self {
            Self {
                script: StdMutex::new(script.into()),
                requests: StdMutex::new(Vec::new()),
                fallback: || Ok(text_response("done", StopReason::EndTurn)),
            }
        }

        fn repeating(fallback: fn() -> Result<Response, ProviderError>) -> Self {
            Self {
                fallback,
                ..Self::new(Vec::new())
            }
        }

        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        fn request(&self, idx: usize) -> Request {
            self.requests.lock().unwrap()[idx].clone()
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }
        fn models(&self) -> Vec<ModelInfo> {
            vec![]
        }
        fn current_model(&self) -> &str {
            "scripted-model"
        }
        fn set_model(&mut self, _model: &str) -> Result<(), ProviderError> {
            Ok(())
        }
        async fn complete(&self, request: Request) -> Result<Response, ProviderError> {
            self.requests.lock().unwrap().push(request);
            let next = self.script.lock().unwrap().pop_front();
            next.unwrap_or_else(self.fallback)
        }
    }

    struct UpperTool;

    #[async_trait]
    impl LocalTool for UpperTool {
        fn name(&self) -> &str {
            "upper"
        }
        fn description(&self) -> &str {
            "Uppercase text"
        }
        fn parameters_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": {"text": {"type": "string"}},
                "required": ["text"],
            })
        }
        async fn execute(&self, input: ValidatedInput) -> Result<Value, ToolError> {
            let text = input.as_value()["text"].as_str().unwrap_or_default();
            Ok(Value::String(text.to_uppercase()))
        }
    }

    fn text_response(text: &str, stop_reason: StopReason) -> Response {
        Response {
            content: vec![ProviderContent::Text {
                text: text.to_string(),
            }],
            stop_reason,
            usage: Usage::default(),
        }
    }

    fn tool_call(id: &str, name: &str, arguments: Value) -> ProviderContent {
        ProviderContent::ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments,
        }
    }

    fn tool_response(calls: Vec<ProviderContent>) -> Response {
        Response {
            content: calls,
            stop_reason: StopReason::ToolUse,
            usage: Usage::default(),
        }
    }

    fn overloaded() -> ProviderError {
        ProviderError::Api {
            status: 529,
            message: "overloaded_error: Overloaded".to_string(),
        }
    }

    fn registry() -> ToolRegistry {
        let mut tools = ToolRegistry::new();
        tools.register_local(Arc::new(UpperTool)).unwrap();
        tools
            .register_remote(RemoteTool::new(
                "web_search",
                json!({"type": "web_search_20250305", "name": "web_search"}),
            ))
            .unwrap();
        tools
    }

    fn orchestrator(provider: Arc<ScriptedProvider>, max_depth: usize) -> Orchestrator {
        Orchestrator::new(
            provider,
            registry(),
            OrchestratorConfig {
                max_depth,
                max_tokens: Some(512),
                retry: RetryPolicy::immediate(),
            },
        )
    }

    #[test]
    fn test_config_default() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.max_depth, DEFAULT_MAX_DEPTH);
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.max_tokens.is_none());
    }

    #[tokio::test]
    async fn test_text_only_run() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(text_response(
            "Hello!",
            StopReason::EndTurn,
        ))]));
        let sink = RecordingSink::new();

        let turns = orchestrator(Arc::clone(&provider), 10)
            .run(Some("Be brief."), &[Message::user("hi")], &sink)
            .await
            .unwrap();

        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].role, Role::Assistant);
        assert_eq!(turns[0].text(), "Hello!");
        assert_eq!(sink.messages(), vec!["Hello!"]);
        assert_eq!(
            sink.events()[..2],
            [SinkEvent::StartThinking, SinkEvent::StopThinking(None)]
        );

        let request = provider.request(0);
        assert_eq!(request.system.as_deref(), Some("Be brief."));
        assert_eq!(request.max_tokens, Some(512));
        assert_eq!(request.messages.len(), 1);
        let names: Vec<_> = request.tools.iter().map(|t| t.name().to_string()).collect();
        assert_eq!(names, vec!["upper", "web_search"]);
        assert!(matches!(request.tools[1], ToolDefinition::Server { .. }));
    }

    #[tokio::test]
    async fn test_local_tool_result_turn() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(tool_response(vec![tool_call("t1", "upper", json!({"text": "abc"}))])),
            Ok(text_response("It is ABC.", StopReason::EndTurn)),
        ]));

        let turns = orchestrator(Arc::clone(&provider), 10)
            .run(None, &[Message::user("shout abc")], &NullSink)
            .await
            .unwrap();

        assert_eq!(turns.len(), 3);
        assert_eq!(turns[1].role, Role::User);
        let results: Vec<_> = turns[1].tool_results_iter().collect();
        assert_eq!(results, vec![("t1", "ABC", false)]);
        assert_eq!(turns[2].text(), "It is ABC.");

        // The follow-up request carries the full transcript.
        assert_eq!(provider.calls(), 2);
        let second = provider.request(1);
        assert_eq!(second.messages.len(), 3);
        assert!(matches!(
            &second.messages[2].content[0],
            ProviderContent::ToolResult { tool_call_id, .. } if tool_call_id == "t1"
        ));
    }

    #[tokio::test]
    async fn test_results_follow_invocation_order() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(tool_response(vec![
            tool_call("a", "upper", json!({"text": "one"})),
            tool_call("b", "missing", json!({})),
            tool_call("c", "upper", json!({"text": 3})),
            tool_call("d", "upper", json!({"text": "four"})),
        ]))]));

        let turns = orchestrator(provider, 10)
            .run(None, &[Message::user("go")], &NullSink)
            .await
            .unwrap();

        let results: Vec<_> = turns[1].tool_results_iter().collect();
        let ids: Vec<_> = results.iter().map(|(id, _, _)| *id).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
        assert_eq!(results[0].1, "ONE");
        assert_eq!(results[1], ("b", "Unknown tool missing", true));
        assert!(results[2].2);
        assert!(!results[3].2);
    }

    #[tokio::test]
    async fn test_remote_tools_add_no_result_turn() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(Response {
            content: vec![
                ProviderContent::ServerToolCall {
                    id: "srv_1".to_string(),
                    name: "web_search".to_string(),
                    arguments: json!({"query": "rust"}),
                },
                ProviderContent::ServerToolResult {
                    tool_call_id: "srv_1".to_string(),
                    payload: json!({"type": "web_search_tool_result", "tool_use_id": "srv_1"}),
                },
                ProviderContent::Text {
                    text: "Rust is a language.".to_string(),
                },
            ],
            stop_reason: StopReason::EndTurn,
            usage: Usage::default(),
        })]));

        let turns = orchestrator(provider, 10)
            .run(None, &[Message::user("search")], &NullSink)
            .await
            .unwrap();

        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].content.len(), 3);
        assert_eq!(turns[0].tool_results_iter().count(), 0);
    }

    #[tokio::test]
    async fn test_remote_tool_use_continues_without_results() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(tool_response(vec![tool_call("w1", "web_search", json!({}))])),
            Ok(text_response("found it", StopReason::EndTurn)),
        ]));

        let turns = orchestrator(Arc::clone(&provider), 10)
            .run(None, &[Message::user("look it up")], &NullSink)
            .await
            .unwrap();

        assert_eq!(turns.len(), 2);
        assert!(turns.iter().all(|t| t.role == Role::Assistant));
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_depth_bound_is_fatal() {
        let provider = Arc::new(ScriptedProvider::repeating(|| {
            Ok(tool_response(vec![tool_call("t", "upper", json!({"text": "x"}))]))
        }));
        let sink = RecordingSink::new();

        let err = orchestrator(Arc::clone(&provider), 3)
            .run(None, &[Message::user("loop")], &sink)
            .await
            .unwrap_err();

        assert_eq!(provider.calls(), 3);
        match &err {
            OrchestratorError::DepthExceeded {
                max_depth,
                model,
                tool_names,
                ..
            } => {
                assert_eq!(*max_depth, 3);
                assert_eq!(model, "scripted-model");
                assert_eq!(tool_names, &vec!["upper", "web_search"]);
            }
            other => panic!("Expected DepthExceeded, got: {other:?}"),
        }
        assert_eq!(sink.errors(), vec![err.to_string()]);
    }

    #[tokio::test]
    async fn test_final_call_without_tools_stays_within_depth() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(tool_response(vec![tool_call("t1", "upper", json!({"text": "a"}))])),
            Ok(text_response("finished", StopReason::EndTurn)),
        ]));

        let turns = orchestrator(Arc::clone(&provider), 2)
            .run(None, &[Message::user("go")], &NullSink)
            .await
            .unwrap();
        assert_eq!(turns.len(), 3);
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_transient_failures_then_success() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(overloaded()),
            Err(overloaded()),
            Ok(text_response("third time lucky", StopReason::EndTurn)),
        ]));

        let turns = orchestrator(Arc::clone(&provider), 10)
            .run(None, &[Message::user("hi")], &NullSink)
            .await
            .unwrap();

        assert_eq!(provider.calls(), 3);
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].text(), "third time lucky");
    }

    #[tokio::test]
    async fn test_exhausted_retries_are_fatal() {
        let provider = Arc::new(ScriptedProvider::repeating(|| {
            Err(ProviderError::Api {
                status: 400,
                message: "invalid_request_error: bad".to_string(),
            })
        }));
        let sink = RecordingSink::new();

        let err = orchestrator(Arc::clone(&provider), 10)
            .run(Some("sys"), &[Message::user("hi")], &sink)
            .await
            .unwrap_err();

        assert_eq!(provider.calls(), 3);
        match &err {
            OrchestratorError::ServiceFailed {
                attempts,
                prompt_chars,
                transcript_len,
                source,
                ..
            } => {
                assert_eq!(*attempts, 3);
                assert_eq!(*prompt_chars, 3);
                assert_eq!(*transcript_len, 1);
                assert!(matches!(source, ProviderError::Api { status: 400, .. }));
            }
            other => panic!("Expected ServiceFailed, got: {other:?}"),
        }
        let message = err.to_string();
        assert!(message.contains("scripted-model"));
        assert!(message.contains("upper, web_search"));
        assert_eq!(sink.errors().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_mid_run_returns_no_turns() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(tool_response(vec![tool_call("t1", "upper", json!({"text": "a"}))])),
            Err(overloaded()),
            Err(overloaded()),
            Err(overloaded()),
        ]));

        let result = orchestrator(provider, 10)
            .run(None, &[Message::user("go")], &NullSink)
            .await;
        assert!(matches!(result, Err(OrchestratorError::ServiceFailed { .. })));
    }
}
