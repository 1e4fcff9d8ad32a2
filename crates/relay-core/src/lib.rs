//! relay-core: transcript types, tool dispatch and the conversation loop.

pub mod config;
pub mod dispatch;
mod error;
pub mod message;
pub mod orchestrator;
pub mod retry;
pub mod sink;

pub use config::{Config, ConfigStore};
pub use dispatch::dispatch;
pub use error::{OrchestratorError, RelayError};
pub use message::{ContentBlock, Message, MessageId, Role, ToolInvocation, ToolResult};
pub use orchestrator::{Orchestrator, OrchestratorConfig, DEFAULT_MAX_DEPTH};
pub use retry::{FailureClass, RetryPolicy};
pub use sink::{NullSink, OutputSink, RecordingSink, SinkEvent};
