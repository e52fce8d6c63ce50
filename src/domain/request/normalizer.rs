//! Request normalization
//!
//! Canonicalizes a prompt and its render parameters into the stable text used
//! both for exact-match hashing and as embedding input.

use serde::{Deserialize, Serialize};

use super::bucket::bucket;
use super::params::RenderParams;
use crate::domain::cache::{EntryHash, ScopeFilter};
use crate::domain::DomainError;

/// A request reduced to its canonical form
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NormalizedRequest {
    canonical_text: String,
    resolution_bucket: String,
    model_id: String,
}

impl NormalizedRequest {
    /// Canonical prompt text including sorted control tokens
    pub fn canonical_text(&self) -> &str {
        &self.canonical_text
    }

    /// Resolution bucket key
    pub fn resolution_bucket(&self) -> &str {
        &self.resolution_bucket
    }

    /// Generative model identifier
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Content hash addressing this request in the exact-match store
    pub fn hash(&self) -> EntryHash {
        EntryHash::compute(&self.canonical_text, &self.resolution_bucket, &self.model_id)
    }

    /// Metadata scope for similarity search
    pub fn scope(&self) -> Result<ScopeFilter, DomainError> {
        ScopeFilter::new(&self.resolution_bucket, &self.model_id)
    }
}

/// Normalize a request
///
/// Total over its input: validation (non-empty prompt, non-zero resolution)
/// happens before this is called.
pub fn normalize(prompt: &str, params: &RenderParams, model_id: &str) -> NormalizedRequest {
    let mut parts = Vec::with_capacity(params.controls.len() + 1);

    let text = normalize_text(prompt);
    if !text.is_empty() {
        parts.push(text);
    }

    // BTreeMap keys are iterated sorted, but two raw keys may collapse to the
    // same normalized key, so sort again after normalizing.
    let mut controls: Vec<String> = params
        .controls
        .iter()
        .filter_map(|(key, value)| {
            let key = normalize_text(key);
            let value = normalize_text(value);

            if key.is_empty() || value.is_empty() {
                None
            } else {
                Some(format!("{}:{}", key, value))
            }
        })
        .collect();
    controls.sort();
    controls.dedup();
    parts.extend(controls);

    NormalizedRequest {
        canonical_text: parts.join(" "),
        resolution_bucket: bucket(params.width, params.height),
        model_id: model_id.trim().to_string(),
    }
}

/// Lowercase, trim and collapse internal whitespace runs to a single space
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}
