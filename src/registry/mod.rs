//! Store and settings registries.
//!
//! The engine reads both through traits so deployments can back them with
//! whatever they already have. This crate ships an in-memory
//! implementation of each and a SQLite store registry.

pub mod memory;
pub mod settings;
pub mod sqlite;

use async_trait::async_trait;

use crate::core::{RetrievalCandidate, RetrievedDocument};
use crate::error::StoreError;
use crate::retrieval::search::SearchMode;

pub use memory::{InMemorySettingsRegistry, InMemoryStoreRegistry};
pub use settings::ClientSettings;
pub use sqlite::{DEFAULT_DB_PATH, SqliteStoreRegistry, StoreRecord};

/// Lookup and search of grounding stores.
#[async_trait]
pub trait StoreRegistry: Send + Sync {
    /// Stores visible to a client. `None` lists only shared stores.
    async fn list_stores(&self, client_id: Option<&str>)
    -> Result<Vec<RetrievalCandidate>, StoreError>;

    /// Runs a similarity search against one store.
    async fn similarity_search(
        &self,
        store: &RetrievalCandidate,
        query: &[f32],
        mode: &SearchMode,
    ) -> Result<Vec<RetrievedDocument>, StoreError>;
}

/// Per-client configuration lookup.
pub trait SettingsRegistry: Send + Sync {
    /// Settings for a client, or the defaults when none are registered.
    fn settings(&self, client_id: Option<&str>) -> ClientSettings;

    /// Replaces a client's settings.
    fn set_settings(&self, client_id: &str, settings: ClientSettings);
}

/// Scores stored chunks against a query and applies the search mode.
pub(crate) fn search_chunks(
    store: &RetrievalCandidate,
    query: &[f32],
    chunks: Vec<(String, Vec<f32>)>,
    mode: &SearchMode,
) -> Result<Vec<RetrievedDocument>, StoreError> {
    use crate::retrieval::search::{ScoredHit, select, similarity};

    let mut hits = Vec::with_capacity(chunks.len());
    for (content, embedding) in chunks {
        if embedding.len() != query.len() {
            return Err(StoreError::DimensionMismatch {
                store: store.name.clone(),
                expected: query.len(),
                actual: embedding.len(),
            });
        }
        let score = similarity(store.distance, query, &embedding);
        hits.push(ScoredHit {
            content,
            score,
            embedding,
        });
    }

    Ok(select(hits, mode)
        .into_iter()
        .map(|h| RetrievedDocument::new(h.content, store.name.clone(), Some(h.score)))
        .collect())
}
