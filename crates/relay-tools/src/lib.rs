//! relay-tools: tool registry, the shell command session and built-in tools.

pub mod builtin;
mod error;
pub mod guard;
pub mod registry;
pub mod session;
pub mod traits;

pub use builtin::register_all;
pub use error::ToolError;
pub use registry::{RemoteTool, ToolCapability, ToolDescriptor, ToolRegistry};
pub use session::{CommandFailure, CommandOutcome, CommandSession, RESTART_MESSAGE};
pub use traits::{schema_for, validate_against_schema, LocalTool, ValidatedInput};
