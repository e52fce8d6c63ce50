use serde::Deserialize;

use crate::domain::SemanticCacheConfig;

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub cache: SemanticCacheConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub exact_store: ExactStoreConfig,
    #[serde(default)]
    pub vector_index: VectorIndexConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Embedding model selection
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingConfig {
    /// `hashing` (offline) or `openai` (OpenAI-compatible HTTP)
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    /// Model name; the provider's default when unset
    #[serde(default)]
    pub model: Option<String>,
    /// Vector size; the model's native size when unset
    #[serde(default)]
    pub dimensions: Option<usize>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Retries per embed call after the first attempt
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,
}

/// Exact-match store backend
#[derive(Debug, Clone, Deserialize)]
pub struct ExactStoreConfig {
    /// `in_memory` or `redis`
    #[serde(default = "default_in_memory")]
    pub store_type: String,
    #[serde(default)]
    pub redis_url: Option<String>,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

/// Vector index backend
#[derive(Debug, Clone, Deserialize)]
pub struct VectorIndexConfig {
    /// `in_memory` or `pgvector`
    #[serde(default = "default_in_memory")]
    pub index_type: String,
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default = "default_table_name")]
    pub table_name: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_embedding_provider() -> String {
    "hashing".to_string()
}

fn default_embedding_retries() -> u32 {
    1
}

fn default_in_memory() -> String {
    "in_memory".to_string()
}

fn default_key_prefix() -> String {
    "media-cache".to_string()
}

fn default_table_name() -> String {
    "media_cache_entries".to_string()
}

fn default_max_connections() -> u32 {
    5
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dimensions: None,
            base_url: None,
            api_key: None,
            max_retries: default_embedding_retries(),
        }
    }
}

impl Default for ExactStoreConfig {
    fn default() -> Self {
        Self {
            store_type: default_in_memory(),
            redis_url: None,
            key_prefix: default_key_prefix(),
        }
    }
}

impl Default for VectorIndexConfig {
    fn default() -> Self {
        Self {
            index_type: default_in_memory(),
            database_url: None,
            table_name: default_table_name(),
            max_connections: default_max_connections(),
        }
    }
}

impl AppConfig {
    /// Load `config/default`, `config/local`, then `MEDIA_CACHE__*` environment overrides
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("MEDIA_CACHE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();

        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert_eq!(config.embedding.provider, "hashing");
        assert_eq!(config.embedding.max_retries, 1);
        assert_eq!(config.exact_store.store_type, "in_memory");
        assert_eq!(config.vector_index.index_type, "in_memory");
        assert_eq!(config.vector_index.table_name, "media_cache_entries");
        assert!(config.cache.enabled);
    }

    #[test]
    fn test_deserialize_sections() {
        let source = config::Config::builder()
            .add_source(config::File::from_str(
                r#"
                [logging]
                format = "json"

                [cache]
                similarity_threshold = 0.9
                top_k = 3

                [embedding]
                provider = "openai"
                model = "text-embedding-3-small"
                dimensions = 512

                [exact_store]
                store_type = "redis"
                redis_url = "redis://localhost:6379"

                [vector_index]
                index_type = "pgvector"
                database_url = "postgres://localhost/media"
                "#,
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap();

        let config: AppConfig = source.try_deserialize().unwrap();

        assert_eq!(config.logging.format, LogFormat::Json);
        assert!((config.cache.similarity_threshold - 0.9).abs() < 0.001);
        assert_eq!(config.cache.top_k, 3);
        assert_eq!(config.cache.ttl_secs, 86_400);
        assert_eq!(config.embedding.provider, "openai");
        assert_eq!(config.embedding.dimensions, Some(512));
        assert_eq!(config.exact_store.redis_url.as_deref(), Some("redis://localhost:6379"));
        assert_eq!(config.exact_store.key_prefix, "media-cache");
        assert_eq!(config.vector_index.index_type, "pgvector");
        assert_eq!(config.vector_index.max_connections, 5);
    }
}
