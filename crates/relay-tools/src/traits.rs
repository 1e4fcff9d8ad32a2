//! Local tool trait and input validation.

use crate::error::ToolError;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Tool input that has passed a tool's validator.
///
/// `LocalTool::execute` only accepts this type, so a tool cannot be run on
/// arguments that were never validated.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedInput(Value);

impl ValidatedInput {
    /// Wrap a value that a validator has accepted.
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// Deserialize into the tool's typed parameters.
    pub fn parse<T: DeserializeOwned>(self) -> Result<T, ToolError> {
        serde_json::from_value(self.0).map_err(|e| ToolError::InvalidParameters(e.to_string()))
    }
}

/// A tool whose logic runs in this process.
///
/// Tools signal "no data" by returning `Value::Null` or an empty value;
/// the dispatcher reports that as a failed tool call.
#[async_trait]
pub trait LocalTool: Send + Sync {
    /// Machine-readable tool name (e.g., "bash").
    fn name(&self) -> &str;

    /// Description of what the tool does.
    fn description(&self) -> &str;

    /// JSON Schema describing the tool's parameters.
    fn parameters_schema(&self) -> Value;

    /// Check raw model-supplied arguments. Defaults to schema validation.
    fn validate(&self, raw: &Value) -> Result<ValidatedInput, ToolError> {
        validate_against_schema(&self.parameters_schema(), raw)
    }

    /// Execute the tool with validated arguments.
    async fn execute(&self, input: ValidatedInput) -> Result<Value, ToolError>;
}

// Compile-time check: LocalTool must be object-safe
const _: () = {
    fn _assert_object_safe(_: &dyn LocalTool) {}
};

/// Validate `raw` against a JSON Schema, collecting every violation.
pub fn validate_against_schema(schema: &Value, raw: &Value) -> Result<ValidatedInput, ToolError> {
    let validator = jsonschema::validator_for(schema)
        .map_err(|e| ToolError::ExecutionError(format!("Invalid tool schema: {e}")))?;

    let errors: Vec<String> = validator.iter_errors(raw).map(|e| e.to_string()).collect();
    if !errors.is_empty() {
        return Err(ToolError::InvalidParameters(errors.join("; ")));
    }

    Ok(ValidatedInput::new(raw.clone()))
}

/// JSON Schema for a parameter struct.
pub fn schema_for<T: JsonSchema>() -> Value {
    serde_json::to_value(schemars::schema_for!(T))
        .unwrap_or_else(|_| serde_json::json!({ "type": "object" }))
}
