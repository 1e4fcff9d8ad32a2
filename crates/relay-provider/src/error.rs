//! Error types for the relay-provider crate.

/// Substrings in error text that mark a failure as worth retrying.
const TRANSIENT_INDICATORS: &[&str] = &[
    "rate limit",
    "rate_limit",
    "overloaded",
    "timeout",
    "timed out",
    "temporarily unavailable",
];

/// Errors that can occur in model service operations.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Response body did not have the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Invalid model specified
    #[error("Invalid model: {0}")]
    InvalidModel(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Authentication error
    #[error("Authentication error: {0}")]
    Auth(String),
}

impl ProviderError {
    /// Whether the failure is likely to clear up on its own: rate limiting,
    /// overload, timeouts and server-side errors.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|s| is_transient_status(s.as_u16()))
                    || mentions_transient(&e.to_string())
            }
            ProviderError::Api { status, message } => {
                is_transient_status(*status) || mentions_transient(message)
            }
            ProviderError::InvalidResponse(_)
            | ProviderError::InvalidModel(_)
            | ProviderError::Serialization(_)
            | ProviderError::Auth(_) => false,
        }
    }
}

fn is_transient_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500..=599)
}

fn mentions_transient(text: &str) -> bool {
    let lower = text.to_lowercase();
    TRANSIENT_INDICATORS.iter().any(|needle| lower.contains(needle))
}
