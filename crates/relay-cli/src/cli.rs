//! CLI argument and command definitions.

use clap::{Parser, Subcommand};
use relay_core::Config;

#[derive(Parser)]
#[command(
    name = "relay",
    version,
    about = "Command-line agent that lets a language model drive local tools"
)]
pub struct Cli {
    /// Model to use (defaults to the configured model).
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Maximum model calls per prompt.
    #[arg(long, global = true)]
    pub max_depth: Option<usize>,

    /// Do not offer the service-side web tools.
    #[arg(long, global = true)]
    pub no_web: bool,

    /// Anthropic API key.
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true, global = true)]
    pub api_key: Option<String>,

    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Start an interactive chat session (default).
    Chat,

    /// Execute a single prompt and exit.
    Exec {
        /// The prompt to execute.
        prompt: String,
    },

    /// List the available tools.
    Tools,
}

impl Cli {
    /// Layer command-line overrides on top of the saved config.
    pub fn apply(&self, mut config: Config) -> Config {
        if let Some(ref model) = self.model {
            config.model = model.clone();
        }
        if let Some(depth) = self.max_depth {
            config.max_depth = depth;
        }
        if self.no_web {
            config.web_tools = false;
        }
        config
    }
}
