//! Provider registry and factory.
//!
//! Maps provider names to concrete [`LlmProvider`] implementations.

use std::sync::Arc;

use crate::error::LlmError;
use crate::llm::config::EngineConfig;
use crate::llm::provider::LlmProvider;
use crate::llm::providers::OpenAiProvider;

/// Creates an [`LlmProvider`] based on the configured provider name.
///
/// # Supported Providers
///
/// - `"openai"` (default): OpenAI-compatible APIs via `async-openai`
///
/// # Errors
///
/// Returns [`LlmError::UnsupportedProvider`] for unknown provider names.
pub fn create_provider(config: &EngineConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiProvider::new(config))),
        other => Err(LlmError::UnsupportedProvider {
            name: other.to_string(),
        }),
    }
}
