//! Plain terminal output.

use relay_core::OutputSink;
use std::io::Write;

const SUMMARY_CHARS: usize = 120;

/// Writes assistant text to stdout and progress to stderr.
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl ConsoleSink {
    pub fn new() -> Self {
        Self
    }
}

impl OutputSink for ConsoleSink {
    fn start_thinking(&self) {
        eprint!("thinking...");
        let _ = std::io::stderr().flush();
    }

    fn stop_thinking(&self, message: Option<&str>) {
        match message {
            Some(message) => eprintln!("\r{}", summarize(message, SUMMARY_CHARS)),
            None => eprint!("\r           \r"),
        }
    }

    fn start_tool(&self, name: &str) {
        eprintln!("-> {name}");
    }

    fn stop_tool(&self, name: &str, success: bool, message: &str) {
        let mark = if success { "ok" } else { "failed" };
        eprintln!("<- {name} {mark}: {}", summarize(message, SUMMARY_CHARS));
    }

    fn show_message(&self, text: &str) {
        println!("{text}");
    }

    fn show_error(&self, text: &str) {
        eprintln!("error: {text}");
    }
}

/// First line of `text`, cut to `max` characters.
fn summarize(text: &str, max: usize) -> String {
    let first = text.lines().next().unwrap_or_default();
    if first.chars().count() > max {
        let cut: String = first.chars().take(max).collect();
        format!("{cut}...")
    } else if text.lines().nth(1).is_some() {
        format!("{first} ...")
    } else {
        first.to_string()
    }
}
