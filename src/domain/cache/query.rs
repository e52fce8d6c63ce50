//! Scoped similarity queries

use std::cmp::Ordering;

use super::CacheEntry;
use crate::domain::DomainError;

/// Resolution bucket and model a similarity query is confined to
///
/// Cannot be constructed without both fields, so an unscoped nearest-neighbor
/// search is not expressible.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeFilter {
    resolution_bucket: String,
    model_id: String,
}

impl ScopeFilter {
    pub fn new(
        resolution_bucket: impl Into<String>,
        model_id: impl Into<String>,
    ) -> Result<Self, DomainError> {
        let resolution_bucket = resolution_bucket.into();
        let model_id = model_id.into();

        if !is_bucket_label(&resolution_bucket) {
            return Err(DomainError::validation(format!(
                "Invalid resolution bucket '{}': expected WIDTHxHEIGHT",
                resolution_bucket
            )));
        }

        if model_id.trim().is_empty() {
            return Err(DomainError::validation("Scope model ID cannot be empty"));
        }

        Ok(Self {
            resolution_bucket,
            model_id,
        })
    }

    pub fn resolution_bucket(&self) -> &str {
        &self.resolution_bucket
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn matches(&self, resolution_bucket: &str, model_id: &str) -> bool {
        self.resolution_bucket == resolution_bucket && self.model_id == model_id
    }
}

fn is_bucket_label(label: &str) -> bool {
    let Some((width, height)) = label.split_once('x') else {
        return false;
    };

    matches!(
        (width.parse::<u32>(), height.parse::<u32>()),
        (Ok(w), Ok(h)) if w > 0 && h > 0
    )
}

/// Nearest-neighbor query against the vector index
#[derive(Debug, Clone)]
pub struct SimilarityQuery {
    embedding: Vec<f32>,
    scope: ScopeFilter,
    /// Only entries embedded with this version are comparable
    embedding_version: String,
    top_k: usize,
}

impl SimilarityQuery {
    pub fn new(
        embedding: Vec<f32>,
        scope: ScopeFilter,
        embedding_version: impl Into<String>,
        top_k: usize,
    ) -> Self {
        Self {
            embedding,
            scope,
            embedding_version: embedding_version.into(),
            top_k: top_k.max(1),
        }
    }

    pub fn embedding(&self) -> &[f32] {
        &self.embedding
    }

    pub fn scope(&self) -> &ScopeFilter {
        &self.scope
    }

    pub fn embedding_version(&self) -> &str {
        &self.embedding_version
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Whether a stored entry is a valid candidate for this query
    ///
    /// Entries from another scope, another embedding version or with a
    /// different vector length are never compared.
    pub fn accepts(&self, entry: &CacheEntry) -> bool {
        entry.in_scope(&self.scope)
            && entry.embedding_version() == self.embedding_version
            && entry.dimensions() == self.embedding.len()
    }
}

/// A candidate entry and its cosine similarity to the query
#[derive(Debug, Clone)]
pub struct ScoredEntry {
    pub entry: CacheEntry,
    pub similarity: f32,
}

impl ScoredEntry {
    pub fn new(entry: CacheEntry, similarity: f32) -> Self {
        Self { entry, similarity }
    }
}

/// Order candidates best first: highest similarity, then most recent
pub fn rank_candidates(candidates: &mut [ScoredEntry]) {
    candidates.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.entry.cached_at().cmp(&a.entry.cached_at()))
    });
}
