//! Reassembly of streamed model output.
//!
//! [`DeltaAccumulator`] collects text and index-keyed tool-call fragments
//! as they arrive; [`DeltaAccumulator::finalize`] turns the buffers into
//! complete [`ToolCall`]s once the stream ends.

use std::collections::BTreeMap;

use tracing::warn;

use crate::llm::delta::{StreamDelta, ToolCallDelta};
use crate::llm::message::TokenUsage;
use crate::llm::tool::ToolCall;

#[derive(Debug, Default)]
struct PartialCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// Running state of one streamed response.
#[derive(Debug, Default)]
pub struct DeltaAccumulator {
    text: String,
    calls: BTreeMap<u32, PartialCall>,
    usage: Option<TokenUsage>,
    finish_reason: Option<String>,
}

/// Everything a finished stream produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Accumulated {
    /// Consolidated text.
    pub text: String,
    /// Fully assembled tool calls, ordered by index.
    pub tool_calls: Vec<ToolCall>,
    /// Last usage report seen.
    pub usage: Option<TokenUsage>,
    /// Finish reason, if the provider sent one.
    pub finish_reason: Option<String>,
}

impl DeltaAccumulator {
    /// Creates an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorbs one delta. Returns the text fragment to emit, if any.
    pub fn push(&mut self, delta: StreamDelta) -> Option<String> {
        match delta {
            StreamDelta::Text(t) => {
                if t.is_empty() {
                    return None;
                }
                self.text.push_str(&t);
                Some(t)
            }
            StreamDelta::ToolCall(d) => {
                self.push_call(d);
                None
            }
            StreamDelta::Usage(u) => {
                self.usage = Some(u);
                None
            }
            StreamDelta::Finish(reason) => {
                self.finish_reason = Some(reason);
                None
            }
        }
    }

    fn push_call(&mut self, d: ToolCallDelta) {
        let entry = self.calls.entry(d.index).or_default();
        if entry.id.is_none() {
            entry.id = d.id.filter(|s| !s.is_empty());
        }
        if entry.name.is_none() {
            entry.name = d.name.filter(|s| !s.is_empty());
        }
        if let Some(fragment) = d.arguments {
            entry.arguments.push_str(&fragment);
        }
    }

    /// Text accumulated so far.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether any tool-call fragment has arrived.
    #[must_use]
    pub fn has_tool_calls(&self) -> bool {
        !self.calls.is_empty()
    }

    /// Last usage report seen so far.
    #[must_use]
    pub const fn usage(&self) -> Option<TokenUsage> {
        self.usage
    }

    /// Parses the buffered calls and returns the final output.
    ///
    /// Calls without a name or with unparseable arguments are dropped with
    /// a warning. An empty argument buffer parses as `{}`.
    #[must_use]
    pub fn finalize(self) -> Accumulated {
        let mut tool_calls = Vec::with_capacity(self.calls.len());
        for (index, partial) in self.calls {
            let Some(name) = partial.name else {
                warn!(index, "dropping streamed tool call without a name");
                continue;
            };
            let raw = partial.arguments.trim();
            let arguments = if raw.is_empty() {
                serde_json::Value::Object(serde_json::Map::new())
            } else {
                match serde_json::from_str(raw) {
                    Ok(v) => v,
                    Err(e) => {
                        warn!(index, tool = %name, error = %e, "dropping tool call with unparseable arguments");
                        continue;
                    }
                }
            };
            tool_calls.push(ToolCall {
                id: partial.id.unwrap_or_else(|| format!("call_{index}")),
                name,
                arguments,
            });
        }

        Accumulated {
            text: self.text,
            tool_calls,
            usage: self.usage,
            finish_reason: self.finish_reason,
        }
    }
}
