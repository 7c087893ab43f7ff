//! Binary relevance check over retrieved documents.

use tracing::{debug, warn};

use super::utility_request;
use crate::chat::completion::strip_code_fence;
use crate::core::Grade;
use crate::llm::provider::LlmProvider;
use crate::prompt::build_grade_prompt;

/// Grades `documents` against `question`.
///
/// Fails open: a failed call or a non-binary answer grades as
/// [`Grade::Yes`].
pub async fn grade(
    provider: &dyn LlmProvider,
    model: &str,
    system_prompt: &str,
    question: &str,
    documents: &str,
    max_tokens: u32,
) -> Grade {
    let request = utility_request(
        model,
        system_prompt,
        &build_grade_prompt(question, documents),
        max_tokens,
        true,
    );
    match provider.chat(&request).await {
        Ok(response) => match Grade::parse(strip_code_fence(&response.content)) {
            Some(g) => {
                debug!(grade = %g, "graded retrieved documents");
                g
            }
            None => {
                warn!(answer = %response.content, "non-binary grade, treating as relevant");
                Grade::Yes
            }
        },
        Err(e) => {
            warn!(error = %e, "grading failed, treating as relevant");
            Grade::Yes
        }
    }
}
