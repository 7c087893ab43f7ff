//! Progress events emitted during a turn.

use serde::Serialize;
use tokio::sync::mpsc;

use crate::core::VsMetadata;
use crate::llm::message::TokenUsage;

/// One out-of-band event from a running turn.
///
/// `Token` is for display; `Usage` and `Grounding` are for recording.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ChatEvent {
    /// A fragment of answer text.
    Token(String),
    /// Running token usage for the turn.
    Usage(TokenUsage),
    /// Grounding metadata captured by retrieval.
    Grounding(VsMetadata),
    /// The answer stream is complete.
    Finished,
}

/// Where a turn sends its progress events.
///
/// A sink with no receiver, or whose receiver was dropped, silently
/// discards events so a disconnected caller never fails the turn.
#[derive(Debug, Clone, Default)]
pub struct ProgressSink {
    tx: Option<mpsc::UnboundedSender<ChatEvent>>,
}

impl ProgressSink {
    /// A sink that discards everything.
    #[must_use]
    pub const fn discard() -> Self {
        Self { tx: None }
    }

    /// Creates a sink and the receiver for its events.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ChatEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Sends an event. Returns `false` if nobody is listening.
    pub fn emit(&self, event: ChatEvent) -> bool {
        self.tx.as_ref().is_some_and(|tx| tx.send(event).is_ok())
    }
}
