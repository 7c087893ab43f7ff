//! Rewrites a follow-up question into a standalone search query.

use tracing::{debug, warn};

use super::utility_request;
use crate::llm::message::ChatMessage;
use crate::llm::provider::LlmProvider;
use crate::prompt::build_rephrase_prompt;

/// Fewest prior turns for which rephrasing is attempted.
pub const MIN_PRIOR_TURNS: usize = 2;

/// The query to search with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rephrased {
    /// Query text.
    pub query: String,
    /// Whether `query` differs from the original question.
    pub rephrased: bool,
}

impl Rephrased {
    /// The original question, unchanged.
    #[must_use]
    pub fn original(question: &str) -> Self {
        Self {
            query: question.to_string(),
            rephrased: false,
        }
    }
}

/// Whether a rephrase call should be made.
#[must_use]
pub const fn should_rephrase(use_history: bool, enabled: bool, prior_turns: usize) -> bool {
    use_history && enabled && prior_turns >= MIN_PRIOR_TURNS
}

/// Asks the model for a standalone query. Any failure keeps the original.
pub async fn rephrase(
    provider: &dyn LlmProvider,
    model: &str,
    system_prompt: &str,
    question: &str,
    prior_turns: &[&ChatMessage],
    max_tokens: u32,
) -> Rephrased {
    let request = utility_request(
        model,
        system_prompt,
        &build_rephrase_prompt(question, prior_turns),
        max_tokens,
        false,
    );

    match provider.chat(&request).await {
        Ok(response) => {
            let query = clean_query(&response.content);
            if query.is_empty() || query == question.trim() {
                return Rephrased::original(question);
            }
            debug!(original = question, rephrased = %query, "rephrased question");
            Rephrased {
                query,
                rephrased: true,
            }
        }
        Err(e) => {
            warn!(error = %e, "rephrase failed, using original question");
            Rephrased::original(question)
        }
    }
}

/// Trims whitespace, a `Query:` prefix and surrounding quotes.
fn clean_query(raw: &str) -> String {
    let mut s = raw.trim();
    for prefix in ["Standalone query:", "Query:", "query:"] {
        if let Some(rest) = s.strip_prefix(prefix) {
            s = rest.trim();
        }
    }
    s.trim_matches(|c| c == '"' || c == '\'' || c == '`').trim().to_string()
}
