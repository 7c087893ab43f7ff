//! Assembles the message list sent to the model.
//!
//! With history on, the model sees the whole thread under a fresh system
//! prompt. With history off it sees only the current turn, and any tool
//! results from that turn are folded into one user message, because some
//! providers reject a tool-result message that is not directly preceded
//! by its tool-call message in the same request.

use std::collections::HashSet;
use std::fmt::Write;

use tracing::error;

use crate::core::ConversationState;
use crate::error::HistoryError;
use crate::llm::message::{ChatMessage, Role, system_message, user_message};

/// Header of the synthetic context message.
pub const CONTEXT_HEADER: &str = "Here is relevant context for the question that follows:";

/// Builds the ordered message list for a model call.
///
/// # Errors
///
/// Returns [`HistoryError::OrphanToolResult`] if a tool result does not
/// answer a call in the closest preceding assistant tool-call message.
pub fn build_messages(
    state: &ConversationState,
    system_prompt: &str,
    use_history: bool,
) -> Result<Vec<ChatMessage>, HistoryError> {
    check_pairing(&state.messages)?;

    if use_history {
        let mut out = Vec::with_capacity(state.messages.len() + 1);
        out.push(system_message(system_prompt));
        out.extend(
            state
                .messages
                .iter()
                .filter(|m| m.role != Role::System)
                .cloned(),
        );
        return Ok(out);
    }

    let mut out = vec![system_message(system_prompt)];
    let Some(user_idx) = state.last_user_index() else {
        return Ok(out);
    };

    if let Some(context) = flatten_tool_results(&state.messages[user_idx + 1..]) {
        out.push(user_message(&context));
    }
    out.push(state.messages[user_idx].clone());
    Ok(out)
}

/// Verifies every tool result answers a call from the closest preceding
/// assistant tool-call message.
fn check_pairing(messages: &[ChatMessage]) -> Result<(), HistoryError> {
    let mut open: HashSet<&str> = HashSet::new();
    for m in messages {
        match m.role {
            Role::Assistant if m.has_tool_calls() => {
                open = m.tool_calls.iter().map(|c| c.id.as_str()).collect();
            }
            Role::Tool => {
                let id = m.tool_call_id.as_deref().unwrap_or_default();
                if !open.contains(id) {
                    error!(tool_call_id = id, "tool result has no matching tool call");
                    return Err(HistoryError::OrphanToolResult {
                        tool_call_id: id.to_string(),
                    });
                }
            }
            Role::User | Role::Assistant => open.clear(),
            Role::System => {}
        }
    }
    Ok(())
}

/// Folds tool results into one context block, in call order.
fn flatten_tool_results(turn: &[ChatMessage]) -> Option<String> {
    let mut sections: Vec<String> = Vec::new();
    for (pos, m) in turn.iter().enumerate() {
        if !m.has_tool_calls() {
            continue;
        }
        for call in &m.tool_calls {
            let result = turn[pos + 1..]
                .iter()
                .take_while(|r| r.role == Role::Tool)
                .find(|r| r.tool_call_id.as_deref() == Some(call.id.as_str()));
            if let Some(result) = result
                && !result.content.trim().is_empty()
            {
                sections.push(format!("[{}]\n{}", call.name, result.content));
            }
        }
    }

    if sections.is_empty() {
        return None;
    }
    let mut out = String::from(CONTEXT_HEADER);
    for s in &sections {
        let _ = write!(out, "\n\n{s}");
    }
    Some(out)
}
