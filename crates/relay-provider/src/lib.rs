//! relay-provider: model service abstraction and the Anthropic client.

mod error;
pub mod providers;
pub mod traits;
pub mod types;

pub use error::ProviderError;
pub use providers::anthropic::AnthropicProvider;
pub use traits::Provider;
pub use types::{
    ModelInfo, ProviderContent, ProviderMessage, Request, Response, StopReason, ToolDefinition,
    Usage,
};
