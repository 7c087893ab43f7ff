//! In-memory registries.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use super::settings::ClientSettings;
use super::{SettingsRegistry, StoreRegistry, search_chunks};
use crate::core::{RetrievalCandidate, RetrievedDocument};
use crate::error::StoreError;
use crate::retrieval::search::SearchMode;

/// Settings held in a map, with a fallback for unknown clients.
#[derive(Debug, Default)]
pub struct InMemorySettingsRegistry {
    fallback: ClientSettings,
    clients: RwLock<HashMap<String, ClientSettings>>,
}

impl InMemorySettingsRegistry {
    /// Creates a registry whose unknown clients get `fallback`.
    #[must_use]
    pub fn new(fallback: ClientSettings) -> Self {
        Self {
            fallback,
            clients: RwLock::new(HashMap::new()),
        }
    }
}

impl SettingsRegistry for InMemorySettingsRegistry {
    fn settings(&self, client_id: Option<&str>) -> ClientSettings {
        client_id
            .and_then(|id| {
                self.clients
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .get(id)
                    .cloned()
            })
            .unwrap_or_else(|| self.fallback.clone())
    }

    fn set_settings(&self, client_id: &str, settings: ClientSettings) {
        self.clients
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(client_id.to_string(), settings);
    }
}

#[derive(Debug)]
struct MemoryStore {
    candidate: RetrievalCandidate,
    client_id: Option<String>,
    chunks: Vec<(String, Vec<f32>)>,
}

/// Stores and their chunks held in memory.
#[derive(Debug, Default)]
pub struct InMemoryStoreRegistry {
    stores: RwLock<Vec<MemoryStore>>,
}

impl InMemoryStoreRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a store. `client_id` of `None` shares it with every client.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyExists`] if the name is taken.
    pub fn add_store(
        &self,
        candidate: RetrievalCandidate,
        client_id: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut stores = self.stores.write().unwrap_or_else(PoisonError::into_inner);
        if stores.iter().any(|s| s.candidate.name == candidate.name) {
            return Err(StoreError::AlreadyExists(candidate.name));
        }
        stores.push(MemoryStore {
            candidate,
            client_id: client_id.map(str::to_string),
            chunks: Vec::new(),
        });
        Ok(())
    }

    /// Adds an embedded chunk to a store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the store does not exist.
    pub fn add_chunk(
        &self,
        store: &str,
        content: impl Into<String>,
        embedding: Vec<f32>,
    ) -> Result<(), StoreError> {
        let mut stores = self.stores.write().unwrap_or_else(PoisonError::into_inner);
        let entry = stores
            .iter_mut()
            .find(|s| s.candidate.name == store)
            .ok_or_else(|| StoreError::NotFound(store.to_string()))?;
        entry.chunks.push((content.into(), embedding));
        Ok(())
    }
}

#[async_trait]
impl StoreRegistry for InMemoryStoreRegistry {
    async fn list_stores(
        &self,
        client_id: Option<&str>,
    ) -> Result<Vec<RetrievalCandidate>, StoreError> {
        let stores = self.stores.read().unwrap_or_else(PoisonError::into_inner);
        Ok(stores
            .iter()
            .filter(|s| s.client_id.is_none() || s.client_id.as_deref() == client_id)
            .map(|s| s.candidate.clone())
            .collect())
    }

    async fn similarity_search(
        &self,
        store: &RetrievalCandidate,
        query: &[f32],
        mode: &SearchMode,
    ) -> Result<Vec<RetrievedDocument>, StoreError> {
        let chunks = {
            let stores = self.stores.read().unwrap_or_else(PoisonError::into_inner);
            stores
                .iter()
                .find(|s| s.candidate.name == store.name)
                .map(|s| s.chunks.clone())
                .ok_or_else(|| StoreError::NotFound(store.name.clone()))?
        };
        search_chunks(store, query, chunks, mode)
    }
}
