//! Chat, exec and tools command implementations.

pub mod chat;
pub mod exec;
pub mod tools;

use relay_core::{Config, Orchestrator};
use relay_provider::{AnthropicProvider, Provider};
use relay_tools::{CommandSession, ToolRegistry};
use std::sync::Arc;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a command-line assistant running on the user's \
machine. Use the bash tool to inspect and change the system, str_replace_editor to read and edit \
files, and search to find text in files. Prefer small, verifiable steps and report what you did.";

/// Everything a conversation needs: the loop, its tools' shell session and
/// the system prompt.
pub struct Runtime {
    pub orchestrator: Orchestrator,
    pub session: Arc<CommandSession>,
    pub system_prompt: String,
}

impl Runtime {
    pub fn build(config: &Config, api_key: Option<&str>) -> anyhow::Result<Self> {
        let provider = create_provider(config, api_key)?;
        let session = Arc::new(CommandSession::from_process(config.execution_limits())?);
        let tools = build_registry(Arc::clone(&session), config.web_tools)?;

        Ok(Self {
            orchestrator: Orchestrator::new(provider, tools, config.orchestrator_config()),
            session,
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
        })
    }
}

pub fn build_registry(
    session: Arc<CommandSession>,
    include_web: bool,
) -> anyhow::Result<ToolRegistry> {
    let mut tools = ToolRegistry::new();
    relay_tools::register_all(&mut tools, session, include_web)
        .map_err(|e| anyhow::anyhow!("Failed to register tools: {e}"))?;
    Ok(tools)
}

fn create_provider(config: &Config, api_key: Option<&str>) -> anyhow::Result<Arc<dyn Provider>> {
    let mut provider = match api_key.filter(|key| !key.trim().is_empty()) {
        Some(key) => AnthropicProvider::new(key),
        None => AnthropicProvider::from_env().map_err(|_| {
            anyhow::anyhow!(
                "ANTHROPIC_API_KEY not set. Set it with:\n  \
                 export ANTHROPIC_API_KEY=your-key-here"
            )
        })?,
    };

    if provider.current_model() != config.model {
        provider
            .set_model(&config.model)
            .map_err(|e| anyhow::anyhow!("{e}"))?;
    }
    Ok(Arc::new(provider))
}
