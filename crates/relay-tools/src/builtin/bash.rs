//! Bash tool — shell command execution through the shared session.

use crate::error::ToolError;
use crate::session::{CommandFailure, CommandOutcome, CommandSession};
use crate::traits::{schema_for, validate_against_schema, LocalTool, ValidatedInput};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct BashParams {
    /// Shell command to execute. Required unless `restart` is true.
    #[serde(default)]
    pub command: Option<String>,
    /// Reset the working directory and environment instead of running a command.
    #[serde(default)]
    pub restart: bool,
}

pub struct BashTool {
    session: Arc<CommandSession>,
}

impl BashTool {
    pub fn new(session: Arc<CommandSession>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl LocalTool for BashTool {
    fn name(&self) -> &str {
        "bash"
    }

    fn description(&self) -> &str {
        "Run a shell command in a persistent session. After a successful command the \
         session keeps the directory the shell ended in and any variables set with \
         `export`; changes made inside a subshell `( ... )`, a pipeline stage or a \
         failed command are discarded. Set restart=true to reset the session. \
         Interactive programs and destructive system commands are refused."
    }

    fn parameters_schema(&self) -> Value {
        schema_for::<BashParams>()
    }

    fn validate(&self, raw: &Value) -> Result<ValidatedInput, ToolError> {
        let input = validate_against_schema(&self.parameters_schema(), raw)?;
        let params: BashParams = input.clone().parse()?;
        let has_command = params
            .command
            .as_deref()
            .is_some_and(|command| !command.trim().is_empty());
        if !params.restart && !has_command {
            return Err(ToolError::InvalidParameters(
                "command is required unless restart is true".to_string(),
            ));
        }
        Ok(input)
    }

    async fn execute(&self, input: ValidatedInput) -> Result<Value, ToolError> {
        let params: BashParams = input.parse()?;
        let command = params.command.unwrap_or_default();

        let outcome = self.session.execute(&command, params.restart).await;
        if outcome.success {
            Ok(serde_json::to_value(&outcome)?)
        } else {
            Err(failure_error(outcome))
        }
    }
}

/// Map a failed outcome onto the tool error channel, keeping captured output.
fn failure_error(outcome: CommandOutcome) -> ToolError {
    let Some(failure) = outcome.error else {
        return ToolError::ExecutionError("command failed".to_string());
    };

    let mut detail = failure.to_string();
    if let Some(stdout) = outcome.stdout {
        detail.push_str("\nSTDOUT:\n");
        detail.push_str(&stdout);
    }
    if let Some(stderr) = outcome.stderr {
        detail.push_str("\nSTDERR:\n");
        detail.push_str(&stderr);
    }

    match failure {
        CommandFailure::Timeout { .. } => ToolError::Timeout(detail),
        CommandFailure::NotFound => ToolError::NotFound(detail),
        CommandFailure::PermissionDenied => ToolError::PermissionDenied(detail),
        CommandFailure::Blocked { reason } => ToolError::Blocked(reason),
        CommandFailure::Execution { .. } => ToolError::ExecutionError(detail),
    }
}
