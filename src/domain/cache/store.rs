//! Exact-match store trait definition

use std::fmt::Debug;

use async_trait::async_trait;

use super::{ArtifactRef, EntryHash};
use crate::domain::DomainError;

/// Key-value store from normalized request hash to artifact reference
///
/// Writes are insert-if-absent: the first artifact stored for a hash wins
/// and later writes for the same hash are no-ops.
#[async_trait]
pub trait ExactMatchStore: Send + Sync + Debug {
    /// Look up the artifact stored for a hash
    async fn get(&self, hash: &EntryHash) -> Result<Option<ArtifactRef>, DomainError>;

    /// Store an artifact if the hash is absent
    ///
    /// Returns `true` when the entry was inserted, `false` when one was
    /// already present.
    async fn put(&self, hash: &EntryHash, artifact_ref: &ArtifactRef) -> Result<bool, DomainError>;

    /// Remove the entry for a hash
    async fn remove(&self, hash: &EntryHash) -> Result<bool, DomainError>;

    /// Purge expired entries, returning how many were removed
    ///
    /// Backends that expire keys natively have nothing to do here.
    async fn evict_expired(&self) -> Result<usize, DomainError> {
        Ok(0)
    }

    /// Approximate number of live entries
    async fn size(&self) -> Result<usize, DomainError>;

    /// Backend name for logs and metrics
    fn store_name(&self) -> &'static str;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Mock exact-match store for testing
    #[derive(Debug, Default)]
    pub struct MockExactStore {
        entries: Mutex<HashMap<EntryHash, ArtifactRef>>,
        error: Mutex<Option<String>>,
        put_failures: AtomicU32,
        get_delay: Option<Duration>,
        put_calls: AtomicU32,
    }

    impl MockExactStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_entry(self, hash: EntryHash, artifact_ref: impl Into<ArtifactRef>) -> Self {
            self.entries
                .lock()
                .unwrap()
                .insert(hash, artifact_ref.into());
            self
        }

        /// Fail every operation
        pub fn with_error(self, error: impl Into<String>) -> Self {
            *self.error.lock().unwrap() = Some(error.into());
            self
        }

        /// Fail the first `count` writes
        pub fn with_put_failures(self, count: u32) -> Self {
            self.put_failures.store(count, Ordering::SeqCst);
            self
        }

        pub fn with_get_delay(mut self, delay: Duration) -> Self {
            self.get_delay = Some(delay);
            self
        }

        pub fn put_calls(&self) -> u32 {
            self.put_calls.load(Ordering::SeqCst)
        }

        pub fn contains(&self, hash: &EntryHash) -> bool {
            self.entries.lock().unwrap().contains_key(hash)
        }

        fn check_error(&self) -> Result<(), DomainError> {
            if let Some(error) = self.error.lock().unwrap().clone() {
                return Err(DomainError::cache(error));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ExactMatchStore for MockExactStore {
        async fn get(&self, hash: &EntryHash) -> Result<Option<ArtifactRef>, DomainError> {
            if let Some(delay) = self.get_delay {
                tokio::time::sleep(delay).await;
            }

            self.check_error()?;
            Ok(self.entries.lock().unwrap().get(hash).cloned())
        }

        async fn put(
            &self,
            hash: &EntryHash,
            artifact_ref: &ArtifactRef,
        ) -> Result<bool, DomainError> {
            self.put_calls.fetch_add(1, Ordering::SeqCst);
            self.check_error()?;

            let should_fail = self
                .put_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();

            if should_fail {
                return Err(DomainError::cache("transient write failure"));
            }

            let mut entries = self.entries.lock().unwrap();

            if entries.contains_key(hash) {
                return Ok(false);
            }

            entries.insert(hash.clone(), artifact_ref.clone());
            Ok(true)
        }

        async fn remove(&self, hash: &EntryHash) -> Result<bool, DomainError> {
            self.check_error()?;
            Ok(self.entries.lock().unwrap().remove(hash).is_some())
        }

        async fn size(&self) -> Result<usize, DomainError> {
            self.check_error()?;
            Ok(self.entries.lock().unwrap().len())
        }

        fn store_name(&self) -> &'static str {
            "mock"
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn hash(text: &str) -> EntryHash {
            EntryHash::compute(text, "512x512", "sdxl")
        }

        #[tokio::test]
        async fn test_mock_put_is_insert_if_absent() {
            let store = MockExactStore::new();

            assert!(store.put(&hash("a"), &"first".into()).await.unwrap());
            assert!(!store.put(&hash("a"), &"second".into()).await.unwrap());

            let stored = store.get(&hash("a")).await.unwrap();
            assert_eq!(stored, Some(ArtifactRef::new("first")));
        }

        #[tokio::test]
        async fn test_mock_put_failures() {
            let store = MockExactStore::new().with_put_failures(1);

            assert!(store.put(&hash("a"), &"ref".into()).await.is_err());
            assert!(store.put(&hash("a"), &"ref".into()).await.unwrap());
            assert_eq!(store.put_calls(), 2);
        }

        #[tokio::test]
        async fn test_mock_with_error() {
            let store = MockExactStore::new().with_error("down");

            assert!(store.get(&hash("a")).await.is_err());
        }
    }
}
