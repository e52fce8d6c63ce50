mod app_config;

pub use app_config::{
    AppConfig, EmbeddingConfig, ExactStoreConfig, LogFormat, LoggingConfig, VectorIndexConfig,
};
