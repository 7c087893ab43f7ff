//! Streaming delta types.
//!
//! Providers translate their SDK stream chunks into a flat sequence of
//! [`StreamDelta`]s. One SDK chunk may expand into several deltas (text
//! plus tool-call fragments plus a usage report).

use super::message::TokenUsage;

/// A fragment of a tool call as it arrives on the stream.
///
/// `id` and `name` normally arrive only on the first fragment for an
/// index; later fragments carry only argument text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCallDelta {
    /// Position of the call within the response.
    pub index: u32,
    /// Provider-assigned call id.
    pub id: Option<String>,
    /// Function name.
    pub name: Option<String>,
    /// Fragment of the JSON argument string.
    pub arguments: Option<String>,
}

/// One incremental piece of a streamed model response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamDelta {
    /// Plain text content.
    Text(String),
    /// A partial tool call.
    ToolCall(ToolCallDelta),
    /// Usage report (usually the last chunk).
    Usage(TokenUsage),
    /// Finish reason (e.g. `"stop"`, `"tool_calls"`).
    Finish(String),
}

impl StreamDelta {
    /// Convenience constructor for text deltas.
    #[must_use]
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// Convenience constructor for a tool-call fragment.
    #[must_use]
    pub fn tool_call(
        index: u32,
        id: Option<&str>,
        name: Option<&str>,
        arguments: Option<&str>,
    ) -> Self {
        Self::ToolCall(ToolCallDelta {
            index,
            id: id.map(str::to_string),
            name: name.map(str::to_string),
            arguments: arguments.map(str::to_string),
        })
    }
}
