//! Embedding clients.
//!
//! Different stores may be embedded with different models, so the
//! retrieval pipeline asks an [`EmbedderFactory`] for a client per store.

#[cfg(test)]
pub(crate) mod mock;
pub mod openai;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::EmbeddingError;

pub use openai::{OpenAiEmbedder, OpenAiEmbedderFactory};

/// Turns text into vectors with one embedding model.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier.
    fn model(&self) -> &str;

    /// Embeds a batch of texts, one vector per input in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Embeds a single query.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Empty {
                model: self.model().to_string(),
            })
    }
}

/// Builds an [`Embedder`] for a model identifier.
pub trait EmbedderFactory: Send + Sync {
    /// Returns a client for `model`.
    ///
    /// # Errors
    ///
    /// Returns [`EmbeddingError::UnknownModel`] if the model is not served.
    fn create(&self, model: &str) -> Result<Arc<dyn Embedder>, EmbeddingError>;
}
