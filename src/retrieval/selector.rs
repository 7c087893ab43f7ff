//! Chooses which candidate stores to search.

use std::collections::HashSet;

use tracing::{debug, warn};

use super::utility_request;
use crate::chat::completion::strip_code_fence;
use crate::core::RetrievalCandidate;
use crate::llm::provider::LlmProvider;
use crate::prompt::build_select_prompt;

/// Picks up to `max_tables` stores for `question`.
///
/// A single candidate is returned without a model call. Otherwise the model
/// picks; an unusable answer falls back to the first candidate. The result
/// is never empty when `candidates` is not, never longer than `max_tables`
/// (at least one), and only contains names from `candidates`.
pub async fn select_tables(
    provider: &dyn LlmProvider,
    model: &str,
    system_prompt: &str,
    question: &str,
    candidates: &[RetrievalCandidate],
    max_tables: usize,
    max_tokens: u32,
) -> Vec<RetrievalCandidate> {
    if candidates.len() <= 1 {
        return candidates.to_vec();
    }
    let max_tables = max_tables.max(1);

    let request = utility_request(
        model,
        system_prompt,
        &build_select_prompt(question, candidates, max_tables),
        max_tokens,
        true,
    );
    let names = match provider.chat(&request).await {
        Ok(response) => parse_selection(&response.content),
        Err(e) => {
            warn!(error = %e, "table selection failed");
            None
        }
    };

    let chosen = names
        .map(|n| filter_selection(&n, candidates, max_tables))
        .unwrap_or_default();
    if chosen.is_empty() {
        warn!(fallback = %candidates[0].name, "unusable table selection, using first candidate");
        return vec![candidates[0].clone()];
    }
    debug!(tables = ?chosen.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(), "selected tables");
    chosen
}

/// Parses a selection answer into store names.
///
/// Accepts a JSON list of strings or an object with a `tables` list.
/// Returns `None` for anything else.
#[must_use]
pub fn parse_selection(raw: &str) -> Option<Vec<String>> {
    let value: serde_json::Value = serde_json::from_str(strip_code_fence(raw)).ok()?;
    let list = match &value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(obj) => obj.get("tables")?.as_array()?,
        _ => return None,
    };
    Some(
        list.iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .collect(),
    )
}

/// Keeps known names, first occurrence only, up to `max_tables`.
fn filter_selection(
    names: &[String],
    candidates: &[RetrievalCandidate],
    max_tables: usize,
) -> Vec<RetrievalCandidate> {
    let mut seen = HashSet::new();
    names
        .iter()
        .filter_map(|n| {
            candidates
                .iter()
                .find(|c| c.name.eq_ignore_ascii_case(n))
        })
        .filter(|c| seen.insert(c.name.clone()))
        .take(max_tables)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::{MockFailure, MockProvider};
    use proptest::prelude::*;

    fn candidates(names: &[&str]) -> Vec<RetrievalCandidate> {
        names.iter().map(|n| RetrievalCandidate::new(*n, "m")).collect()
    }

    fn names(c: &[RetrievalCandidate]) -> Vec<&str> {
        c.iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn test_parse_selection_shapes() {
        assert_eq!(parse_selection(r#"["A", "B"]"#), Some(vec!["A".to_string(), "B".to_string()]));
        assert_eq!(parse_selection("```json\n{\"tables\": [\"A\"]}\n```"), Some(vec!["A".to_string()]));
        assert_eq!(parse_selection(r#"{"choice": "A"}"#), None);
        assert_eq!(parse_selection("A and B"), None);
        assert_eq!(parse_selection("\"A\""), None);
    }

    #[tokio::test]
    async fn test_single_candidate_makes_no_call() {
        let provider = MockProvider::new();
        let out = select_tables(&provider, "m", "s", "q", &candidates(&["ONLY"]), 3, 64).await;
        assert_eq!(names(&out), vec!["ONLY"]);
        assert!(provider.chat_requests().is_empty());
    }

    #[tokio::test]
    async fn test_selection_filters_dedupes_and_caps() {
        let provider = MockProvider::new().with_chat(r#"{"tables": ["C", "GHOST", "a", "C", "B", "D"]}"#);
        let out = select_tables(&provider, "m", "s", "q", &candidates(&["A", "B", "C", "D"]), 3, 64).await;
        assert_eq!(names(&out), vec!["C", "A", "B"]);
        let sent = provider.chat_requests();
        assert_eq!(sent[0].temperature, Some(0.0));
        assert!(sent[0].json_mode);
        assert_eq!(sent[0].max_tokens, Some(64));
    }

    #[tokio::test]
    async fn test_unusable_answers_fall_back_to_first() {
        let provider = MockProvider::new()
            .with_chat("not json")
            .with_chat(r#"["GHOST"]"#)
            .with_chat_error(MockFailure::Api);
        let c = candidates(&["A", "B"]);
        for _ in 0..3 {
            let out = select_tables(&provider, "m", "s", "q", &c, 3, 64).await;
            assert_eq!(names(&out), vec!["A"]);
        }
    }

    proptest! {
        #[test]
        fn prop_selection_within_candidates_and_cap(
            picked in prop::collection::vec("[A-F]", 0..10),
            max in 0usize..5,
        ) {
            let c = candidates(&["A", "B", "C", "D"]);
            let out = filter_selection(&picked, &c, max.max(1));
            prop_assert!(out.len() <= max.max(1));
            prop_assert!(out.iter().all(|o| c.contains(o)));
        }
    }
}
