//! Per-client settings.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::RetrievalCandidate;
use crate::error::{Error, Result};
use crate::retrieval::search::SearchMode;

/// Default cap on stores searched per turn.
pub const DEFAULT_MAX_TABLES: usize = 3;

/// Everything that governs a client's turns.
///
/// Missing fields take their defaults when deserializing, so a settings
/// file only needs the values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Enabled tool capabilities (`vs_*`, `sql_*`).
    pub tools: Vec<String>,
    /// Send the whole thread to the model.
    pub use_history: bool,
    /// Rewrite follow-ups into standalone queries before searching.
    pub rephrase: bool,
    /// Discover stores from the registry instead of using `static_store`.
    pub discovery: bool,
    /// Grade retrieved documents for relevance.
    pub grading: bool,
    /// Search mode and its parameters.
    pub search: SearchMode,
    /// Most stores searched in one turn.
    pub max_tables: usize,
    /// Embedding models whose stores may be discovered. `None` allows all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled_embed_models: Option<Vec<String>>,
    /// Store used when discovery is off.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub static_store: Option<RetrievalCandidate>,
    /// Chat model override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Sampling temperature for the answer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// System prompt override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Rephrase prompt override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rephrase_prompt: Option<String>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            tools: Vec::new(),
            use_history: true,
            rephrase: true,
            discovery: true,
            grading: true,
            search: SearchMode::default(),
            max_tables: DEFAULT_MAX_TABLES,
            enabled_embed_models: None,
            static_store: None,
            model: None,
            temperature: None,
            system_prompt: None,
            rephrase_prompt: None,
        }
    }
}

impl ClientSettings {
    /// Loads settings from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(Error::from)
    }

    /// Whether stores built with `model` may be searched.
    #[must_use]
    pub fn embed_model_enabled(&self, model: &str) -> bool {
        self.enabled_embed_models
            .as_ref()
            .is_none_or(|models| models.iter().any(|m| m == model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{"tools": ["vs_search"], "grading": false,
                       "search": {"mode": "similarity_threshold", "top_k": 6, "score_threshold": 0.4}}"#;
        let s: ClientSettings = serde_json::from_str(json).unwrap_or_else(|_| unreachable!());
        assert_eq!(s.tools, vec!["vs_search".to_string()]);
        assert!(!s.grading);
        assert!(s.use_history);
        assert_eq!(s.max_tables, DEFAULT_MAX_TABLES);
        assert_eq!(s.search.top_k(), 6);
    }

    #[test]
    fn test_embed_model_enabled() {
        let mut s = ClientSettings::default();
        assert!(s.embed_model_enabled("anything"));
        s.enabled_embed_models = Some(vec!["m1".to_string()]);
        assert!(s.embed_model_enabled("m1"));
        assert!(!s.embed_model_enabled("m2"));
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"discovery": false, "static_store": {"name": "DOCS", "embed_model": "m"}}"#)
            .unwrap_or_else(|_| unreachable!());
        let s = ClientSettings::from_json_file(&path).unwrap_or_else(|_| unreachable!());
        assert!(!s.discovery);
        assert_eq!(s.static_store.map(|c| c.name), Some("DOCS".to_string()));
        assert!(ClientSettings::from_json_file(&dir.path().join("missing.json")).is_err());
    }
}
