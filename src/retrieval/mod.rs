//! Vector-search retrieval pipeline.
//!
//! Stages run in order: rephrase, discover, select, per-store search,
//! dedup, rank and cap, grade. Every stage except discovery degrades to a
//! documented fallback instead of failing the turn.

pub mod dedup;
pub mod discovery;
pub mod grader;
pub mod pipeline;
pub mod rephrase;
pub mod search;
pub mod selector;

use crate::llm::message::{ChatRequest, system_message, user_message};

pub use dedup::{dedup, rank_and_cap};
pub use pipeline::{RetrievalInput, RetrievalPipeline, VectorSearchResult};
pub use search::{ScoredHit, SearchMode};

/// Builds a deterministic, non-streaming request for a pipeline stage.
pub(crate) fn utility_request(
    model: &str,
    system: &str,
    user: &str,
    max_tokens: u32,
    json_mode: bool,
) -> ChatRequest {
    let mut request = ChatRequest::new(model, vec![system_message(system), user_message(user)]);
    request.temperature = Some(0.0);
    request.max_tokens = Some(max_tokens);
    request.json_mode = json_mode;
    request
}
