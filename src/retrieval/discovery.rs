//! Finds the grounding stores a turn may search.

use tracing::{debug, warn};

use crate::core::RetrievalCandidate;
use crate::error::RetrievalError;
use crate::registry::{ClientSettings, StoreRegistry};

/// Lists candidate stores for a client.
///
/// With discovery on, every visible store whose embedding model is enabled.
/// With discovery off, the statically configured store.
///
/// # Errors
///
/// Returns [`RetrievalError::NoStores`] when nothing is available, and
/// [`RetrievalError::Store`] if the registry cannot be read.
pub async fn discover(
    stores: &dyn StoreRegistry,
    settings: &ClientSettings,
    client_id: Option<&str>,
) -> Result<Vec<RetrievalCandidate>, RetrievalError> {
    let candidates: Vec<RetrievalCandidate> = if settings.discovery {
        let all = stores.list_stores(client_id).await?;
        let total = all.len();
        let enabled: Vec<RetrievalCandidate> = all
            .into_iter()
            .filter(|c| settings.embed_model_enabled(&c.embed_model))
            .collect();
        debug!(total, enabled = enabled.len(), "discovered stores");
        enabled
    } else {
        settings.static_store.iter().cloned().collect()
    };

    if candidates.is_empty() {
        warn!(discovery = settings.discovery, "no grounding stores available");
        return Err(RetrievalError::NoStores);
    }
    Ok(candidates)
}
