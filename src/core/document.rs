//! Grounding store candidates and retrieved documents.

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Distance metric a grounding store was indexed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Cosine similarity.
    #[default]
    Cosine,
    /// Raw dot product.
    DotProduct,
    /// Euclidean (L2) distance.
    Euclidean,
}

impl DistanceMetric {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::DotProduct => "dot_product",
            Self::Euclidean => "euclidean",
        }
    }
}

impl std::str::FromStr for DistanceMetric {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "dot_product" | "dot" => Ok(Self::DotProduct),
            "euclidean" | "l2" => Ok(Self::Euclidean),
            _ => Err(StoreError::InvalidValue {
                field: "distance_metric",
                value: s.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Vector index kind of a grounding store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    /// Hierarchical navigable small world graph.
    #[default]
    Hnsw,
    /// Inverted file index.
    Ivf,
    /// No index; exhaustive scan.
    Flat,
}

impl IndexKind {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Hnsw => "hnsw",
            Self::Ivf => "ivf",
            Self::Flat => "flat",
        }
    }
}

impl std::str::FromStr for IndexKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hnsw" => Ok(Self::Hnsw),
            "ivf" => Ok(Self::Ivf),
            "flat" | "none" => Ok(Self::Flat),
            _ => Err(StoreError::InvalidValue {
                field: "index_kind",
                value: s.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for IndexKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A grounding store that may be searched this turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalCandidate {
    /// Store (table) name.
    pub name: String,
    /// Embedding model the store was built with.
    pub embed_model: String,
    /// Distance metric of the store's vectors.
    #[serde(default)]
    pub distance: DistanceMetric,
    /// Vector index kind.
    #[serde(default)]
    pub index_kind: IndexKind,
    /// Human-friendly alias.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// What the store contains. Shown to the model during table selection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl RetrievalCandidate {
    /// Creates a candidate with default metric and index kind.
    #[must_use]
    pub fn new(name: impl Into<String>, embed_model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            embed_model: embed_model.into(),
            distance: DistanceMetric::default(),
            index_kind: IndexKind::default(),
            alias: None,
            description: None,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A document chunk returned by a similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    /// Chunk text. Also the deduplication key.
    pub content: String,
    /// Store the chunk came from.
    pub source: String,
    /// Similarity score, higher is better.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

impl RetrievedDocument {
    /// Creates a document.
    #[must_use]
    pub fn new(content: impl Into<String>, source: impl Into<String>, score: Option<f32>) -> Self {
        Self {
            content: content.into(),
            source: source.into(),
            score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_metric_parse() {
        assert_eq!("COSINE".parse::<DistanceMetric>().ok(), Some(DistanceMetric::Cosine));
        assert_eq!("dot".parse::<DistanceMetric>().ok(), Some(DistanceMetric::DotProduct));
        assert_eq!("l2".parse::<DistanceMetric>().ok(), Some(DistanceMetric::Euclidean));
        assert!("manhattan".parse::<DistanceMetric>().is_err());
    }

    #[test]
    fn test_index_kind_round_trip_labels() {
        for kind in [IndexKind::Hnsw, IndexKind::Ivf, IndexKind::Flat] {
            assert_eq!(kind.as_str().parse::<IndexKind>().ok(), Some(kind));
        }
    }

    #[test]
    fn test_candidate_defaults_on_deserialize() {
        let json = r#"{"name": "DOCS", "embed_model": "text-embedding-3-small"}"#;
        let candidate: RetrievalCandidate =
            serde_json::from_str(json).unwrap_or_else(|_| unreachable!());
        assert_eq!(candidate.distance, DistanceMetric::Cosine);
        assert_eq!(candidate.index_kind, IndexKind::Hnsw);
        assert!(candidate.description.is_none());
    }
}
