//! Per-thread conversation state.

use serde::{Deserialize, Serialize};

use super::grade::Grade;
use crate::llm::message::{ChatMessage, Role};

/// Grounding metadata captured when retrieval runs in a turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VsMetadata {
    /// Stores that were searched successfully.
    pub searched_tables: Vec<String>,
    /// Stores whose search failed.
    pub failed_tables: Vec<String>,
    /// Documents handed to the model after dedup and cap.
    pub documents: usize,
    /// The query actually used for search.
    pub query: String,
    /// Whether `query` is a rephrasing of the user's question.
    pub rephrased: bool,
    /// Relevance grade of the retrieved context.
    pub relevant: Grade,
}

/// Conversation state for one thread.
///
/// Created per thread and mutated by every stage of a turn. Persisting it
/// between turns is the caller's job; it serializes with serde.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationState {
    /// Opaque thread identifier.
    pub thread_id: String,
    /// Ordered messages.
    pub messages: Vec<ChatMessage>,
    /// Grounding metadata from the current turn, if retrieval ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vs_metadata: Option<VsMetadata>,
    /// Client whose settings govern this turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Model used for this turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl ConversationState {
    /// Creates an empty state for a thread.
    #[must_use]
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            ..Self::default()
        }
    }

    /// Appends a message.
    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Index of the most recent user message.
    #[must_use]
    pub fn last_user_index(&self) -> Option<usize> {
        self.messages.iter().rposition(|m| m.role == Role::User)
    }

    /// User and plain assistant messages before the latest user message.
    ///
    /// Tool traffic and system messages are excluded; these are the
    /// "turns" a rephrase prompt sees.
    #[must_use]
    pub fn prior_turns(&self) -> Vec<&ChatMessage> {
        let end = self.last_user_index().unwrap_or(0);
        self.messages[..end]
            .iter()
            .filter(|m| {
                m.role == Role::User || (m.role == Role::Assistant && m.tool_calls.is_empty())
            })
            .collect()
    }
}
