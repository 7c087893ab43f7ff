//! `OpenAI` embeddings via `async-openai`.

use std::sync::Arc;

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::CreateEmbeddingRequestArgs;
use async_trait::async_trait;
use tracing::debug;

use super::{Embedder, EmbedderFactory};
use crate::error::EmbeddingError;
use crate::llm::config::EngineConfig;

/// Embedding client for one `OpenAI`-compatible model.
pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(texts.to_vec())
            .build()
            .map_err(|e| self.request_error(&e))?;

        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| self.request_error(&e))?;

        let mut data = response.data;
        data.sort_by_key(|e| e.index);
        if data.len() != texts.len() {
            return Err(EmbeddingError::Request {
                model: self.model.clone(),
                message: format!("expected {} embeddings, got {}", texts.len(), data.len()),
            });
        }
        debug!(model = %self.model, count = data.len(), "embedded batch");
        Ok(data.into_iter().map(|e| e.embedding).collect())
    }
}

impl OpenAiEmbedder {
    fn request_error(&self, e: &dyn std::fmt::Display) -> EmbeddingError {
        EmbeddingError::Request {
            model: self.model.clone(),
            message: e.to_string(),
        }
    }
}

/// Creates [`OpenAiEmbedder`]s sharing one client configuration.
pub struct OpenAiEmbedderFactory {
    config: OpenAIConfig,
    allowed: Option<Vec<String>>,
}

impl OpenAiEmbedderFactory {
    /// Creates a factory from engine configuration.
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        let mut openai_config = OpenAIConfig::new().with_api_key(&config.api_key);
        if let Some(ref base_url) = config.base_url {
            openai_config = openai_config.with_api_base(base_url);
        }
        Self {
            config: openai_config,
            allowed: None,
        }
    }

    /// Restricts the factory to the given models.
    #[must_use]
    pub fn with_allowed_models(mut self, models: Vec<String>) -> Self {
        self.allowed = Some(models);
        self
    }
}

impl EmbedderFactory for OpenAiEmbedderFactory {
    fn create(&self, model: &str) -> Result<Arc<dyn Embedder>, EmbeddingError> {
        if model.trim().is_empty()
            || self
                .allowed
                .as_ref()
                .is_some_and(|allowed| !allowed.iter().any(|m| m == model))
        {
            return Err(EmbeddingError::UnknownModel {
                model: model.to_string(),
            });
        }
        Ok(Arc::new(OpenAiEmbedder {
            client: Client::with_config(self.config.clone()),
            model: model.to_string(),
        }))
    }
}
