//! Error types for the relay-core crate.

use relay_provider::ProviderError;

/// Fatal conditions that abort a conversation run.
///
/// Tool failures never appear here; they are reported to the model as error
/// results instead.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// Every attempt to reach the model service failed.
    #[error(
        "model service failed after {attempts} attempt(s) \
         (model {model}, tools [{tools}], prompt {prompt_chars} chars, \
         transcript {transcript_len} messages): {source}",
        tools = .tool_names.join(", ")
    )]
    ServiceFailed {
        model: String,
        tool_names: Vec<String>,
        prompt_chars: usize,
        transcript_len: usize,
        attempts: u32,
        #[source]
        source: ProviderError,
    },

    /// The model kept requesting tools past the depth bound.
    #[error(
        "tool loop exceeded max depth {max_depth} \
         (model {model}, tools [{tools}], transcript {transcript_len} messages)",
        tools = .tool_names.join(", ")
    )]
    DepthExceeded {
        max_depth: usize,
        model: String,
        tool_names: Vec<String>,
        transcript_len: usize,
    },
}

/// Core error type for configuration and I/O.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No home directory to place the config in
    #[error("Config error: {0}")]
    Config(String),
}
