//! Output notifications.
//!
//! The orchestrator and dispatcher report progress through an [`OutputSink`].
//! Notifications never feed back into control flow.

use std::sync::Mutex;

/// Receiver for progress and output notifications.
pub trait OutputSink: Send + Sync {
    /// A model service call is starting.
    fn start_thinking(&self);

    /// The model service call finished; `message` is set when it failed.
    fn stop_thinking(&self, message: Option<&str>);

    /// A local tool is about to run.
    fn start_tool(&self, name: &str);

    /// A local tool finished.
    fn stop_tool(&self, name: &str, success: bool, message: &str);

    /// Assistant text for the user.
    fn show_message(&self, text: &str);

    fn show_error(&self, text: &str);
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl OutputSink for NullSink {
    fn start_thinking(&self) {}
    fn stop_thinking(&self, _message: Option<&str>) {}
    fn start_tool(&self, _name: &str) {}
    fn stop_tool(&self, _name: &str, _success: bool, _message: &str) {}
    fn show_message(&self, _text: &str) {}
    fn show_error(&self, _text: &str) {}
}

/// A notification captured by [`RecordingSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    StartThinking,
    StopThinking(Option<String>),
    StartTool(String),
    StopTool {
        name: String,
        success: bool,
        message: String,
    },
    Message(String),
    Error(String),
}

/// Sink that records every notification in order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SinkEvent::Message(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SinkEvent::Error(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: SinkEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl OutputSink for RecordingSink {
    fn start_thinking(&self) {
        self.push(SinkEvent::StartThinking);
    }

    fn stop_thinking(&self, message: Option<&str>) {
        self.push(SinkEvent::StopThinking(message.map(str::to_string)));
    }

    fn start_tool(&self, name: &str) {
        self.push(SinkEvent::StartTool(name.to_string()));
    }

    fn stop_tool(&self, name: &str, success: bool, message: &str) {
        self.push(SinkEvent::StopTool {
            name: name.to_string(),
            success,
            message: message.to_string(),
        });
    }

    fn show_message(&self, text: &str) {
        self.push(SinkEvent::Message(text.to_string()));
    }

    fn show_error(&self, text: &str) {
        self.push(SinkEvent::Error(text.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_sink_keeps_order() {
        let sink = RecordingSink::new();
        sink.start_tool("bash");
        sink.stop_tool("bash", true, "ok");
        sink.show_message("done");

        assert_eq!(
            sink.events(),
            vec![
                SinkEvent::StartTool("bash".to_string()),
                SinkEvent::StopTool {
                    name: "bash".to_string(),
                    success: true,
                    message: "ok".to_string(),
                },
                SinkEvent::Message("done".to_string()),
            ]
        );
        assert_eq!(sink.messages(), vec!["done"]);
        assert!(sink.errors().is_empty());
    }
}
