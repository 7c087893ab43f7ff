//! Search modes and the similarity math behind them.
//!
//! [`select`] is a pure function over pre-scored hits, so any store
//! registry that can produce `(content, embedding)` pairs gets the three
//! search modes for free.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::core::DistanceMetric;

/// Default number of documents returned per store.
pub const DEFAULT_TOP_K: usize = 4;
/// Default MMR candidate pool size.
pub const DEFAULT_FETCH_K: usize = 20;
/// Default MMR relevance/diversity balance (1.0 = pure relevance).
pub const DEFAULT_LAMBDA: f32 = 0.5;

/// How a store is searched, with the mode's parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SearchMode {
    /// Plain top-k by similarity.
    Similarity {
        /// Documents to return.
        top_k: usize,
    },
    /// Top-k, dropping hits below a score threshold.
    SimilarityThreshold {
        /// Documents to return.
        top_k: usize,
        /// Minimum similarity score.
        score_threshold: f32,
    },
    /// Maximal marginal relevance over a wider candidate pool.
    Mmr {
        /// Documents to return.
        top_k: usize,
        /// Size of the candidate pool taken by similarity first.
        fetch_k: usize,
        /// Relevance weight in `[0, 1]`; the rest goes to diversity.
        lambda: f32,
    },
}

impl Default for SearchMode {
    fn default() -> Self {
        Self::Similarity {
            top_k: DEFAULT_TOP_K,
        }
    }
}

impl SearchMode {
    /// Number of documents this mode returns at most.
    #[must_use]
    pub const fn top_k(&self) -> usize {
        match *self {
            Self::Similarity { top_k }
            | Self::SimilarityThreshold { top_k, .. }
            | Self::Mmr { top_k, .. } => top_k,
        }
    }

    /// Mode label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Similarity { .. } => "similarity",
            Self::SimilarityThreshold { .. } => "similarity_score_threshold",
            Self::Mmr { .. } => "mmr",
        }
    }
}

/// A stored chunk scored against the query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredHit {
    /// Chunk text.
    pub content: String,
    /// Similarity to the query, higher is better.
    pub score: f32,
    /// The chunk's embedding (needed for MMR diversity).
    pub embedding: Vec<f32>,
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn norm(a: &[f32]) -> f32 {
    dot(a, a).sqrt()
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let denom = norm(a) * norm(b);
    if denom == 0.0 { 0.0 } else { dot(a, b) / denom }
}

/// Similarity between two vectors under `metric`, higher is better.
///
/// Euclidean distance is mapped to `1 / (1 + d)` so every metric sorts
/// the same way.
#[must_use]
pub fn similarity(metric: DistanceMetric, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        DistanceMetric::Cosine => cosine(a, b),
        DistanceMetric::DotProduct => dot(a, b),
        DistanceMetric::Euclidean => {
            let d: f32 = a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt();
            1.0 / (1.0 + d)
        }
    }
}

fn by_score_desc(a: &ScoredHit, b: &ScoredHit) -> Ordering {
    b.score.total_cmp(&a.score)
}

/// Applies a search mode to scored hits.
///
/// The sort is stable, so equal scores keep storage order.
#[must_use]
pub fn select(mut hits: Vec<ScoredHit>, mode: &SearchMode) -> Vec<ScoredHit> {
    hits.sort_by(by_score_desc);
    match *mode {
        SearchMode::Similarity { top_k } => {
            hits.truncate(top_k);
            hits
        }
        SearchMode::SimilarityThreshold {
            top_k,
            score_threshold,
        } => {
            hits.retain(|h| h.score >= score_threshold);
            hits.truncate(top_k);
            hits
        }
        SearchMode::Mmr {
            top_k,
            fetch_k,
            lambda,
        } => {
            hits.truncate(fetch_k.max(top_k));
            maximal_marginal_relevance(hits, top_k, lambda.clamp(0.0, 1.0))
        }
    }
}

/// Greedy MMR: each step takes the hit maximizing
/// `lambda * score - (1 - lambda) * max_sim_to_selected`.
fn maximal_marginal_relevance(pool: Vec<ScoredHit>, k: usize, lambda: f32) -> Vec<ScoredHit> {
    let mut remaining = pool;
    let mut selected: Vec<ScoredHit> = Vec::with_capacity(k.min(remaining.len()));

    while selected.len() < k && !remaining.is_empty() {
        let mut best_idx = 0;
        let mut best_value = f32::NEG_INFINITY;
        for (idx, hit) in remaining.iter().enumerate() {
            let redundancy = selected
                .iter()
                .map(|s| cosine(&hit.embedding, &s.embedding))
                .fold(0.0_f32, f32::max);
            let value = lambda.mul_add(hit.score, -(1.0 - lambda) * redundancy);
            if value > best_value {
                best_value = value;
                best_idx = idx;
            }
        }
        selected.push(remaining.remove(best_idx));
    }

    selected
}
