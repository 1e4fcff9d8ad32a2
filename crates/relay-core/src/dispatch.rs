//! Tool dispatch: one invocation in, at most one result out.

use crate::message::{ToolInvocation, ToolResult};
use crate::sink::OutputSink;
use relay_tools::{ToolCapability, ToolRegistry};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Validate and run one tool invocation.
///
/// Returns `None` for remote tools, whose results arrive from the service.
/// Every local failure becomes an error result; nothing escapes as an `Err`
/// or a panic. A tool that returns no data is reported as failed as well.
pub async fn dispatch(
    invocation: &ToolInvocation,
    registry: &ToolRegistry,
    sink: &dyn OutputSink,
) -> Option<ToolResult> {
    let Some(descriptor) = registry.get(&invocation.name) else {
        let message = format!("Unknown tool {}", invocation.name);
        warn!(tool = %invocation.name, "Model requested an unknown tool");
        sink.show_error(&message);
        return Some(ToolResult::error(&invocation.id, message));
    };

    let tool = match descriptor.capability() {
        ToolCapability::Remote(_) => {
            debug!(tool = %invocation.name, "Remote tool; result comes from the service");
            return None;
        }
        ToolCapability::Local(tool) => Arc::clone(tool),
    };

    sink.start_tool(&invocation.name);

    let input = match tool.validate(&invocation.arguments) {
        Ok(input) => input,
        Err(e) => {
            let message = format!("Invalid input for {}: {e}", invocation.name);
            sink.stop_tool(&invocation.name, false, &message);
            return Some(ToolResult::error(&invocation.id, message));
        }
    };

    debug!(tool = %invocation.name, id = %invocation.id, "Executing tool");
    let task = tokio::spawn(async move { tool.execute(input).await });

    let result = match task.await {
        Ok(Ok(value)) if is_empty(&value) => {
            ToolResult::error(&invocation.id, format!("{} returned no data", invocation.name))
        }
        Ok(Ok(value)) => ToolResult::success(&invocation.id, render(value)),
        Ok(Err(e)) => ToolResult::error(&invocation.id, e.to_string()),
        Err(e) => ToolResult::error(
            &invocation.id,
            format!("{} failed unexpectedly: {e}", invocation.name),
        ),
    };

    sink.stop_tool(&invocation.name, !result.is_error, &result.content);
    Some(result)
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

fn render(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}
