//! relay — a command-line agent that lets a language model drive local tools.

mod cli;
mod commands;
mod console;

use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_store = relay_core::ConfigStore::new();
    config_store.hydrate_env();
    let config = cli.apply(config_store.load());

    match cli.command {
        None | Some(Commands::Chat) => {
            let runtime = commands::Runtime::build(&config, cli.api_key.as_deref())?;
            commands::chat::run(runtime).await?;
        }
        Some(Commands::Exec { ref prompt }) => {
            let runtime = commands::Runtime::build(&config, cli.api_key.as_deref())?;
            if let Err(err) = commands::exec::run(runtime, prompt).await {
                // Fatal run errors were already reported by the console sink.
                if err.downcast_ref::<relay_core::OrchestratorError>().is_some() {
                    std::process::exit(1);
                }
                return Err(err);
            }
        }
        Some(Commands::Tools) => commands::tools::run(&config)?,
    }

    Ok(())
}

/// Logs go to stderr so they never interleave with model output.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("relay=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
