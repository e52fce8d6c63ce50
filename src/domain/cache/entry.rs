//! Cache entries and their content-addressed keys

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::ScopeFilter;
use crate::domain::request::NormalizedRequest;
use crate::domain::DomainError;

/// Opaque handle to a stored artifact (object key, URL, ...)
///
/// The cache stores references only, never artifact bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactRef(String);

impl ArtifactRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ArtifactRef {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ArtifactRef {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Hex-encoded SHA-256 over the canonical text, bucket and model
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryHash(String);

impl EntryHash {
    /// Hash the normalized request fields
    ///
    /// Fields are newline-separated; canonical text never contains a newline,
    /// so distinct field splits cannot collide.
    pub fn compute(canonical_text: &str, resolution_bucket: &str, model_id: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(canonical_text.as_bytes());
        hasher.update(b"\n");
        hasher.update(resolution_bucket.as_bytes());
        hasher.update(b"\n");
        hasher.update(model_id.as_bytes());

        Self(hex::encode(hasher.finalize()))
    }

    /// Parse a previously stored hash
    pub fn from_hex(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();

        if value.len() != 64 || !value.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(DomainError::validation(format!(
                "Invalid entry hash '{}': expected 64 hex characters",
                value
            )));
        }

        Ok(Self(value.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An immutable cached artifact with its embedding and scope metadata
///
/// Created once by the cache writer after a successful generation; never
/// edited afterwards. A better match is a new entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    hash: EntryHash,
    embedding: Vec<f32>,
    /// Embedding model version the vector was produced with
    embedding_version: String,
    artifact_ref: ArtifactRef,
    resolution_bucket: String,
    model_id: String,
    cached_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Create an entry for a normalized request, stamped with the current time
    pub fn new(
        request: &NormalizedRequest,
        embedding: Vec<f32>,
        embedding_version: impl Into<String>,
        artifact_ref: ArtifactRef,
    ) -> Self {
        Self {
            hash: request.hash(),
            embedding,
            embedding_version: embedding_version.into(),
            artifact_ref,
            resolution_bucket: request.resolution_bucket().to_string(),
            model_id: request.model_id().to_string(),
            cached_at: Utc::now(),
        }
    }

    /// Rebuild an entry read back from a persistent index
    pub fn restore(
        hash: EntryHash,
        embedding: Vec<f32>,
        embedding_version: impl Into<String>,
        artifact_ref: ArtifactRef,
        resolution_bucket: impl Into<String>,
        model_id: impl Into<String>,
        cached_at: DateTime<Utc>,
    ) -> Self {
        Self {
            hash,
            embedding,
            embedding_version: embedding_version.into(),
            artifact_ref,
            resolution_bucket: resolution_bucket.into(),
            model_id: model_id.into(),
            cached_at,
        }
    }

    /// Override the creation timestamp before the entry is stored
    #[cfg(test)]
    pub(crate) fn with_cached_at(mut self, cached_at: DateTime<Utc>) -> Self {
        self.cached_at = cached_at;
        self
    }

    pub fn hash(&self) -> &EntryHash {
        &self.hash
    }

    pub fn embedding(&self) -> &[f32] {
        &self.embedding
    }

    pub fn dimensions(&self) -> usize {
        self.embedding.len()
    }

    pub fn embedding_version(&self) -> &str {
        &self.embedding_version
    }

    pub fn artifact_ref(&self) -> &ArtifactRef {
        &self.artifact_ref
    }

    pub fn resolution_bucket(&self) -> &str {
        &self.resolution_bucket
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn cached_at(&self) -> DateTime<Utc> {
        self.cached_at
    }

    /// Whether the entry belongs to the given bucket/model scope
    pub fn in_scope(&self, scope: &ScopeFilter) -> bool {
        scope.matches(&self.resolution_bucket, &self.model_id)
    }

    /// Whether the entry is older than `ttl` at `now`
    pub fn is_expired_at(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => self.cached_at + ttl <= now,
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::request::{normalize, RenderParams};

    fn request() -> NormalizedRequest {
        normalize("a red car", &RenderParams::new(512, 512), "sdxl")
    }

    #[test]
    fn test_hash_is_hex_sha256() {
        let hash = EntryHash::compute("a red car", "512x512", "sdxl");

        assert_eq!(hash.as_str().len(), 64);
        assert!(hash.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hash, EntryHash::compute("a red car", "512x512", "sdxl"));
    }

    #[test]
    fn test_hash_field_boundaries_do_not_collide() {
        let a = EntryHash::compute("foo1", "2x3", "m");
        let b = EntryHash::compute("foo", "12x3", "m");

        assert_ne!(a, b);
    }

    #[test]
    fn test_hash_from_hex() {
        let hash = EntryHash::compute("x", "1x1", "m");
        let parsed = EntryHash::from_hex(hash.as_str().to_uppercase()).unwrap();

        assert_eq!(parsed, hash);
        assert!(EntryHash::from_hex("not-a-hash").is_err());
    }

    #[test]
    fn test_entry_from_request() {
        let request = request();
        let entry = CacheEntry::new(&request, vec![0.1, 0.2], "hashing:v1:2", "s3://bucket/a.png".into());

        assert_eq!(entry.hash(), &request.hash());
        assert_eq!(entry.resolution_bucket(), "512x512");
        assert_eq!(entry.model_id(), "sdxl");
        assert_eq!(entry.dimensions(), 2);
        assert_eq!(entry.artifact_ref().as_str(), "s3://bucket/a.png");
        assert_eq!(entry.embedding_version(), "hashing:v1:2");
    }

    #[test]
    fn test_entry_expiry() {
        let now = Utc::now();
        let entry = CacheEntry::new(&request(), vec![1.0], "v", "ref".into())
            .with_cached_at(now - chrono::Duration::seconds(120));

        assert!(entry.is_expired_at(Duration::from_secs(60), now));
        assert!(!entry.is_expired_at(Duration::from_secs(600), now));
    }

    #[test]
    fn test_entry_scope() {
        let entry = CacheEntry::new(&request(), vec![1.0], "v", "ref".into());

        assert!(entry.in_scope(&ScopeFilter::new("512x512", "sdxl").unwrap()));
        assert!(!entry.in_scope(&ScopeFilter::new("512x768", "sdxl").unwrap()));
        assert!(!entry.in_scope(&ScopeFilter::new("512x512", "flux").unwrap()));
    }
}
