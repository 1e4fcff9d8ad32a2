use super::Runtime;
use crate::console::ConsoleSink;
use relay_core::{Message, Orchestrator, OrchestratorError, OutputSink};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

/// One line of REPL input.
#[derive(Debug, PartialEq, Eq)]
enum ReplInput<'a> {
    Empty,
    Exit,
    Reset,
    Prompt(&'a str),
}

impl<'a> ReplInput<'a> {
    fn parse(line: &'a str) -> Self {
        match line.trim() {
            "" => ReplInput::Empty,
            "/exit" | "/quit" => ReplInput::Exit,
            "/reset" => ReplInput::Reset,
            prompt => ReplInput::Prompt(prompt),
        }
    }
}

/// Transcript kept across prompts.
#[derive(Debug, Default)]
struct Conversation {
    transcript: Vec<Message>,
}

impl Conversation {
    /// Run one prompt. The transcript only grows when the run succeeds.
    async fn submit(
        &mut self,
        orchestrator: &Orchestrator,
        system_prompt: &str,
        prompt: &str,
        sink: &dyn OutputSink,
    ) -> Result<(), OrchestratorError> {
        let mut candidate = self.transcript.clone();
        candidate.push(Message::user(prompt));

        let turns = orchestrator.run(Some(system_prompt), &candidate, sink).await?;
        candidate.extend(turns);
        self.transcript = candidate;
        Ok(())
    }

    fn clear(&mut self) {
        self.transcript.clear();
    }
}

/// Run interactive chat mode on stdin.
pub async fn run(runtime: Runtime) -> anyhow::Result<()> {
    let sink = ConsoleSink::new();
    let mut conversation = Conversation::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!(
        "relay ({}) - /reset to start over, /exit to quit",
        runtime.orchestrator.model()
    );

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match ReplInput::parse(&line) {
            ReplInput::Empty => continue,
            ReplInput::Exit => break,
            ReplInput::Reset => {
                runtime.session.execute("", true).await;
                conversation.clear();
                println!("Conversation and shell session reset.");
            }
            ReplInput::Prompt(prompt) => {
                // Fatal errors are already shown by the sink; the
                // transcript is left as it was.
                let _ = conversation
                    .submit(&runtime.orchestrator, &runtime.system_prompt, prompt, &sink)
                    .await;
            }
        }
    }

    Ok(())
}
