//! Vector index factory for runtime selection

use std::sync::Arc;

use crate::config::VectorIndexConfig;
use crate::domain::{DomainError, SemanticCacheConfig, VectorIndex};

use super::in_memory::InMemoryVectorIndex;
use super::pgvector::{PgvectorIndex, PgvectorIndexConfig};

/// Supported vector index backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VectorIndexType {
    /// Brute-force cosine scan over scope partitions
    #[default]
    InMemory,
    Pgvector,
}

impl std::fmt::Display for VectorIndexType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InMemory => write!(f, "in_memory"),
            Self::Pgvector => write!(f, "pgvector"),
        }
    }
}

impl std::str::FromStr for VectorIndexType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "in_memory" | "inmemory" | "memory" => Ok(Self::InMemory),
            "pgvector" | "postgres" => Ok(Self::Pgvector),
            _ => Err(DomainError::configuration(format!(
                "Unknown vector index type: {}. Valid types: in_memory, pgvector",
                s
            ))),
        }
    }
}

/// Create the vector index described by the configuration
///
/// `dimensions` comes from the embedding client and sizes the pgvector column.
pub async fn create_vector_index(
    config: &VectorIndexConfig,
    cache: &SemanticCacheConfig,
    dimensions: usize,
) -> Result<Arc<dyn VectorIndex>, DomainError> {
    let index_type: VectorIndexType = config.index_type.parse()?;

    let index: Arc<dyn VectorIndex> = match index_type {
        VectorIndexType::InMemory => {
            Arc::new(InMemoryVectorIndex::new(cache.ttl(), cache.max_entries))
        }
        VectorIndexType::Pgvector => {
            let url = config.database_url.as_deref().ok_or_else(|| {
                DomainError::configuration("Database URL is required for the pgvector index")
            })?;

            let pg_config = PgvectorIndexConfig::new(dimensions)
                .with_table_name(config.table_name.clone())
                .with_ttl(cache.ttl())
                .with_max_entries(cache.max_entries);

            Arc::new(PgvectorIndex::connect(url, config.max_connections, pg_config).await?)
        }
    };

    tracing::info!(index = %index_type, dimensions, "Vector index configured");

    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_type_from_str() {
        assert_eq!("in_memory".parse::<VectorIndexType>().unwrap(), VectorIndexType::InMemory);
        assert_eq!("PGVECTOR".parse::<VectorIndexType>().unwrap(), VectorIndexType::Pgvector);
        assert_eq!("postgres".parse::<VectorIndexType>().unwrap(), VectorIndexType::Pgvector);
        assert!("faiss".parse::<VectorIndexType>().is_err());
    }

    #[tokio::test]
    async fn test_create_in_memory() {
        let index = create_vector_index(
            &VectorIndexConfig::default(),
            &SemanticCacheConfig::default(),
            256,
        )
        .await
        .unwrap();

        assert_eq!(index.index_name(), "in_memory");
        assert_eq!(index.size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_create_pgvector_requires_url() {
        let config = VectorIndexConfig {
            index_type: "pgvector".into(),
            ..Default::default()
        };

        let result = create_vector_index(&config, &SemanticCacheConfig::default(), 256).await;
        assert!(result.is_err());
    }
}
