use super::Runtime;
use crate::console::ConsoleSink;
use relay_core::Message;
use tracing::debug;

/// Run a single prompt to completion.
///
/// Fatal run errors come back as `OrchestratorError` inside the `anyhow`
/// error so the caller can pick the exit code.
pub async fn run(runtime: Runtime, prompt: &str) -> anyhow::Result<()> {
    let sink = ConsoleSink::new();
    let transcript = vec![Message::user(prompt)];

    let turns = runtime
        .orchestrator
        .run(Some(&runtime.system_prompt), &transcript, &sink)
        .await?;

    debug!(turns = turns.len(), "Exec finished");
    Ok(())
}
