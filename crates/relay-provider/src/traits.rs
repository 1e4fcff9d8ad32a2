//! Provider trait definition.

use crate::error::ProviderError;
use crate::types::{ModelInfo, Request, Response};
use async_trait::async_trait;

/// A language-model service that can request tool invocations.
///
/// Implementations normalize the vendor protocol into [`Response`] so the
/// orchestrator never sees wire formats.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider name (e.g., "anthropic").
    fn name(&self) -> &str;

    /// Models this provider accepts.
    fn models(&self) -> Vec<ModelInfo>;

    /// Currently selected model identifier.
    fn current_model(&self) -> &str;

    /// Switch to a different model.
    fn set_model(&mut self, model: &str) -> Result<(), ProviderError>;

    /// Send one request and wait for the complete response.
    async fn complete(&self, request: Request) -> Result<Response, ProviderError>;
}

// Compile-time check: Provider must be object-safe
const _: () = {
    fn _assert_object_safe(_: &dyn Provider) {}
};
