//! Deterministic embedder for tests.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use super::{Embedder, EmbedderFactory};
use crate::error::EmbeddingError;

const DIM: usize = 64;

/// Bag-of-words embedder: each lowercase word sets one hashed dimension.
pub(crate) struct WordEmbedder {
    model: String,
}

pub(crate) fn embed_words(text: &str) -> Vec<f32> {
    let mut v = vec![0.0; DIM];
    for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
        let h = word
            .to_lowercase()
            .bytes()
            .fold(7_usize, |acc, b| acc.wrapping_mul(31).wrapping_add(usize::from(b)));
        v[h % DIM] += 1.0;
    }
    v
}

#[async_trait]
impl Embedder for WordEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| embed_words(t)).collect())
    }
}

/// Factory serving [`WordEmbedder`] for every model except the failing ones.
#[derive(Default)]
pub(crate) struct MockEmbedderFactory {
    failing: HashSet<String>,
}

impl MockEmbedderFactory {
    pub(crate) fn failing_for(mut self, model: &str) -> Self {
        self.failing.insert(model.to_string());
        self
    }
}

impl EmbedderFactory for MockEmbedderFactory {
    fn create(&self, model: &str) -> Result<Arc<dyn Embedder>, EmbeddingError> {
        if self.failing.contains(model) {
            return Err(EmbeddingError::UnknownModel {
                model: model.to_string(),
            });
        }
        Ok(Arc::new(WordEmbedder {
            model: model.to_string(),
        }))
    }
}
