//! Redis exact-match store

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};

use crate::domain::cache::{ArtifactRef, EntryHash, ExactMatchStore};
use crate::domain::DomainError;

/// Exact-match store backed by Redis
///
/// Keys are `{prefix}:exact:{hash}`; writes use `SET NX EX` so concurrent
/// writers for the same hash cannot overwrite each other and every key
/// carries the cache TTL.
#[derive(Clone)]
pub struct RedisExactStore {
    connection: ConnectionManager,
    key_prefix: String,
    ttl: Duration,
}

impl fmt::Debug for RedisExactStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisExactStore")
            .field("key_prefix", &self.key_prefix)
            .field("ttl", &self.ttl)
            .field("connection", &"<ConnectionManager>")
            .finish()
    }
}

impl RedisExactStore {
    pub async fn connect(
        url: &str,
        key_prefix: impl Into<String>,
        ttl: Duration,
    ) -> Result<Self, DomainError> {
        let client = Client::open(url)
            .map_err(|e| DomainError::cache(format!("Failed to create Redis client: {}", e)))?;

        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| DomainError::cache(format!("Failed to connect to Redis: {}", e)))?;

        Ok(Self {
            connection,
            key_prefix: key_prefix.into(),
            ttl,
        })
    }

    fn key(&self, hash: &EntryHash) -> String {
        exact_key(&self.key_prefix, hash)
    }
}

fn exact_key(prefix: &str, hash: &EntryHash) -> String {
    if prefix.is_empty() {
        format!("exact:{}", hash)
    } else {
        format!("{}:exact:{}", prefix, hash)
    }
}

#[async_trait]
impl ExactMatchStore for RedisExactStore {
    async fn get(&self, hash: &EntryHash) -> Result<Option<ArtifactRef>, DomainError> {
        let mut conn = self.connection.clone();

        let value: Option<String> = conn.get(self.key(hash)).await.map_err(|e| {
            DomainError::cache(format!("Failed to get entry '{}': {}", hash, e))
        })?;

        Ok(value.map(ArtifactRef::from))
    }

    async fn put(&self, hash: &EntryHash, artifact_ref: &ArtifactRef) -> Result<bool, DomainError> {
        let mut conn = self.connection.clone();
        let ttl_secs = self.ttl.as_secs().max(1);

        let result: Option<String> = redis::cmd("SET")
            .arg(self.key(hash))
            .arg(artifact_ref.as_str())
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut conn)
            .await
            .map_err(|e| DomainError::cache(format!("Failed to store entry '{}': {}", hash, e)))?;

        // "OK" when set, nil when the key already existed
        Ok(result.is_some())
    }

    async fn remove(&self, hash: &EntryHash) -> Result<bool, DomainError> {
        let mut conn = self.connection.clone();

        let deleted: i32 = conn.del(self.key(hash)).await.map_err(|e| {
            DomainError::cache(format!("Failed to delete entry '{}': {}", hash, e))
        })?;

        Ok(deleted > 0)
    }

    async fn size(&self) -> Result<usize, DomainError> {
        let mut conn = self.connection.clone();
        let pattern = if self.key_prefix.is_empty() {
            "exact:*".to_string()
        } else {
            format!("{}:exact:*", self.key_prefix)
        };

        let mut cursor = 0u64;
        let mut total = 0usize;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(500)
                .query_async(&mut conn)
                .await
                .map_err(|e| DomainError::cache(format!("Failed to scan entries: {}", e)))?;

            total += keys.len();
            cursor = next;

            if cursor == 0 {
                break;
            }
        }

        Ok(total)
    }

    fn store_name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        let hash = EntryHash::compute("a", "512x512", "sdxl");

        assert_eq!(exact_key("media", &hash), format!("media:exact:{}", hash));
        assert_eq!(exact_key("", &hash), format!("exact:{}", hash));
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_url() {
        let result = RedisExactStore::connect("not-a-redis-url", "media", Duration::from_secs(60)).await;

        assert!(matches!(result, Err(DomainError::Cache { .. })));
    }
}
