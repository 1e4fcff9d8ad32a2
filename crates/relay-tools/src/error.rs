//! Error types for the relay-tools crate.

/// Errors that can occur while validating or executing a tool.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// Invalid parameters passed to tool
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// Tool execution failed
    #[error("Execution error: {0}")]
    ExecutionError(String),

    /// Permission denied for operation
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Operation timed out
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The requested program does not exist
    #[error("Command not found: {0}")]
    NotFound(String),

    /// Rejected by the command security screen
    #[error("Blocked for security: {0}")]
    Blocked(String),

    /// A tool with this name is already registered
    #[error("Duplicate tool name '{0}'")]
    DuplicateTool(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error during tool execution
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
