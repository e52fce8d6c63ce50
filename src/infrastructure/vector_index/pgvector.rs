//! pgvector-backed vector index

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;

use crate::domain::cache::{
    rank_candidates, ArtifactRef, CacheEntry, EntryHash, ScoredEntry, SimilarityQuery,
    UpsertOutcome, VectorIndex,
};
use crate::domain::DomainError;
use crate::infrastructure::observability::record_discarded_candidates;

static TABLE_NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").unwrap());

/// Configuration for the pgvector index
#[derive(Debug, Clone)]
pub struct PgvectorIndexConfig {
    pub table_name: String,
    /// Width of the `vector` column; must match the embedding client
    pub dimensions: usize,
    pub ttl: Duration,
    /// Rows kept by `evict_expired`, most recently used first
    pub max_entries: usize,
}

impl PgvectorIndexConfig {
    pub fn new(dimensions: usize) -> Self {
        Self {
            table_name: "media_cache_entries".to_string(),
            dimensions,
            ttl: Duration::from_secs(86_400),
            max_entries: 100_000,
        }
    }

    pub fn with_table_name(mut self, name: impl Into<String>) -> Self {
        self.table_name = name.into();
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    fn validate(&self) -> Result<(), DomainError> {
        if !TABLE_NAME_PATTERN.is_match(&self.table_name) {
            return Err(DomainError::configuration(format!(
                "Invalid pgvector table name '{}'",
                self.table_name
            )));
        }

        if self.dimensions == 0 {
            return Err(DomainError::configuration(
                "pgvector dimensions must be positive",
            ));
        }

        Ok(())
    }
}

/// Vector index stored in PostgreSQL with the pgvector extension
///
/// Scope columns are B-tree indexed and filtered in the `WHERE` clause, so
/// cosine distance (`<=>`) is only computed inside the query's scope.
/// Candidates are ranked by an exact scan of that scope; no approximate
/// index is built. Dedup relies on the `hash` primary key together with the
/// stored embedding version.
pub struct PgvectorIndex {
    pool: PgPool,
    config: PgvectorIndexConfig,
}

impl Debug for PgvectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgvectorIndex")
            .field("config", &self.config)
            .field("pool", &"<PgPool>")
            .finish()
    }
}

impl PgvectorIndex {
    pub fn new(pool: PgPool, config: PgvectorIndexConfig) -> Result<Self, DomainError> {
        config.validate()?;
        Ok(Self { pool, config })
    }

    /// Connect, then create the table and indexes if needed
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        config: PgvectorIndexConfig,
    ) -> Result<Self, DomainError> {
        config.validate()?;

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| DomainError::vector_index(format!("Failed to connect: {}", e)))?;

        let index = Self { pool, config };
        index.ensure_schema().await?;

        Ok(index)
    }

    pub async fn ensure_schema(&self) -> Result<(), DomainError> {
        let table = &self.config.table_name;

        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                DomainError::vector_index(format!("Failed to create vector extension: {}", e))
            })?;

        let create_table = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                hash CHAR(64) PRIMARY KEY,
                embedding vector({dims}) NOT NULL,
                embedding_version TEXT NOT NULL,
                artifact_ref TEXT NOT NULL,
                resolution_bucket TEXT NOT NULL,
                model_id TEXT NOT NULL,
                cached_at TIMESTAMPTZ NOT NULL,
                last_used_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            table = table,
            dims = self.config.dimensions
        );

        sqlx::query(&create_table)
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::vector_index(format!("Failed to create table: {}", e)))?;

        let scope_index = format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_scope ON {table} (resolution_bucket, model_id, embedding_version)",
            table = table
        );

        sqlx::query(&scope_index)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                DomainError::vector_index(format!("Failed to create scope index: {}", e))
            })?;

        // A table created for another embedding width keeps its old column
        let column_type = sqlx::query(
            "SELECT format_type(atttypid, atttypmod) FROM pg_attribute \
             WHERE attrelid = $1::text::regclass AND attname = 'embedding' AND NOT attisdropped",
        )
        .bind(table.as_str())
        .fetch_one(&self.pool)
        .await
        .and_then(|row| row.try_get::<String, _>(0))
        .map_err(|e| {
            DomainError::vector_index(format!("Failed to inspect embedding column: {}", e))
        })?;

        check_column_type(table, &column_type, self.config.dimensions)?;

        Ok(())
    }

    fn ttl_secs(&self) -> f64 {
        self.config.ttl.as_secs_f64()
    }

    fn row_to_entry(row: &PgRow) -> Result<(CacheEntry, f64), DomainError> {
        let get_err = |e: sqlx::Error| DomainError::vector_index(format!("Bad row: {}", e));

        let hash: String = row.try_get("hash").map_err(get_err)?;
        let embedding: String = row.try_get("embedding").map_err(get_err)?;
        let embedding_version: String = row.try_get("embedding_version").map_err(get_err)?;
        let artifact_ref: String = row.try_get("artifact_ref").map_err(get_err)?;
        let resolution_bucket: String = row.try_get("resolution_bucket").map_err(get_err)?;
        let model_id: String = row.try_get("model_id").map_err(get_err)?;
        let cached_at: DateTime<Utc> = row.try_get("cached_at").map_err(get_err)?;
        let distance: f64 = row.try_get("distance").map_err(get_err)?;

        let entry = CacheEntry::restore(
            EntryHash::from_hex(hash.trim())?,
            parse_pgvector(&embedding)?,
            embedding_version,
            ArtifactRef::new(artifact_ref),
            resolution_bucket,
            model_id,
            cached_at,
        );

        Ok((entry, distance))
    }
}

#[async_trait]
impl VectorIndex for PgvectorIndex {
    async fn upsert(&self, entry: CacheEntry) -> Result<UpsertOutcome, DomainError> {
        if entry.dimensions() != self.config.dimensions {
            return Err(DomainError::validation(format!(
                "Embedding has {} dimensions, index expects {}",
                entry.dimensions(),
                self.config.dimensions
            )));
        }

        // An existing row is only replaced once it has expired or was
        // embedded under another version
        let query = format!(
            r#"
            INSERT INTO {table}
                (hash, embedding, embedding_version, artifact_ref, resolution_bucket, model_id, cached_at, last_used_at)
            VALUES ($1, $2::vector, $3, $4, $5, $6, $7, NOW())
            ON CONFLICT (hash) DO UPDATE SET
                embedding = EXCLUDED.embedding,
                embedding_version = EXCLUDED.embedding_version,
                artifact_ref = EXCLUDED.artifact_ref,
                cached_at = EXCLUDED.cached_at,
                last_used_at = NOW()
            WHERE {table}.cached_at <= NOW() - make_interval(secs => $8)
               OR {table}.embedding_version <> EXCLUDED.embedding_version
            "#,
            table = self.config.table_name
        );

        let result = sqlx::query(&query)
            .bind(entry.hash().as_str())
            .bind(format_pgvector(entry.embedding()))
            .bind(entry.embedding_version())
            .bind(entry.artifact_ref().as_str())
            .bind(entry.resolution_bucket())
            .bind(entry.model_id())
            .bind(entry.cached_at())
            .bind(self.ttl_secs())
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::vector_index(format!("Failed to upsert entry: {}", e)))?;

        if result.rows_affected() > 0 {
            Ok(UpsertOutcome::Inserted)
        } else {
            Ok(UpsertOutcome::AlreadyPresent)
        }
    }

    async fn query(&self, query: &SimilarityQuery) -> Result<Vec<ScoredEntry>, DomainError> {
        if query.embedding().len() != self.config.dimensions {
            tracing::warn!(
                expected = self.config.dimensions,
                actual = query.embedding().len(),
                "Query embedding does not fit the index column"
            );
            return Ok(Vec::new());
        }

        let sql = format!(
            r#"
            SELECT
                hash,
                embedding::text AS embedding,
                embedding_version,
                artifact_ref,
                resolution_bucket,
                model_id,
                cached_at,
                (embedding <=> $1::vector)::float8 AS distance
            FROM {table}
            WHERE resolution_bucket = $2
              AND model_id = $3
              AND embedding_version = $4
              AND cached_at > NOW() - make_interval(secs => $5)
            ORDER BY distance ASC, cached_at DESC
            LIMIT $6
            "#,
            table = self.config.table_name
        );

        let rows = sqlx::query(&sql)
            .bind(format_pgvector(query.embedding()))
            .bind(query.scope().resolution_bucket())
            .bind(query.scope().model_id())
            .bind(query.embedding_version())
            .bind(self.ttl_secs())
            .bind(query.top_k() as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DomainError::vector_index(format!("Similarity query failed: {}", e)))?;

        let mut candidates = Vec::with_capacity(rows.len());
        let mut discarded = 0;

        for row in &rows {
            match Self::row_to_entry(row) {
                Ok((entry, distance)) if query.accepts(&entry) => {
                    let similarity = (1.0 - distance).clamp(-1.0, 1.0) as f32;
                    candidates.push(ScoredEntry::new(entry, similarity));
                }
                Ok(_) => discarded += 1,
                Err(e) => {
                    tracing::warn!(error = %e, "Discarding unreadable index row");
                    discarded += 1;
                }
            }
        }

        record_discarded_candidates("invalid_row", discarded);
        rank_candidates(&mut candidates);

        Ok(candidates)
    }

    async fn contains(
        &self,
        hash: &EntryHash,
        embedding_version: &str,
    ) -> Result<bool, DomainError> {
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE hash = $1 AND embedding_version = $2 \
             AND cached_at > NOW() - make_interval(secs => $3))",
            self.config.table_name
        );

        let row = sqlx::query(&sql)
            .bind(hash.as_str())
            .bind(embedding_version)
            .bind(self.ttl_secs())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DomainError::vector_index(format!("Lookup failed: {}", e)))?;

        row.try_get::<bool, _>(0)
            .map_err(|e| DomainError::vector_index(format!("Bad row: {}", e)))
    }

    async fn touch(&self, hash: &EntryHash) -> Result<(), DomainError> {
        let sql = format!(
            "UPDATE {} SET last_used_at = NOW() WHERE hash = $1",
            self.config.table_name
        );

        sqlx::query(&sql)
            .bind(hash.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::vector_index(format!("Touch failed: {}", e)))?;

        Ok(())
    }

    async fn touch_many(&self, hashes: &[EntryHash]) -> Result<(), DomainError> {
        if hashes.is_empty() {
            return Ok(());
        }

        let sql = format!(
            "UPDATE {} SET last_used_at = NOW() WHERE hash = ANY($1)",
            self.config.table_name
        );
        let keys: Vec<String> = hashes.iter().map(|h| h.as_str().to_string()).collect();

        sqlx::query(&sql)
            .bind(keys)
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::vector_index(format!("Touch failed: {}", e)))?;

        Ok(())
    }

    async fn remove(&self, hash: &EntryHash) -> Result<bool, DomainError> {
        let sql = format!("DELETE FROM {} WHERE hash = $1", self.config.table_name);

        let result = sqlx::query(&sql)
            .bind(hash.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::vector_index(format!("Delete failed: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }

    async fn remove_by_model(&self, model_id: &str) -> Result<usize, DomainError> {
        let sql = format!("DELETE FROM {} WHERE model_id = $1", self.config.table_name);

        let result = sqlx::query(&sql)
            .bind(model_id)
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::vector_index(format!("Delete failed: {}", e)))?;

        Ok(result.rows_affected() as usize)
    }

    async fn evict_expired(&self) -> Result<usize, DomainError> {
        let table = &self.config.table_name;

        let expired = sqlx::query(&format!(
            "DELETE FROM {} WHERE cached_at <= NOW() - make_interval(secs => $1)",
            table
        ))
        .bind(self.ttl_secs())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::vector_index(format!("Expiry sweep failed: {}", e)))?
        .rows_affected();

        let over_capacity = sqlx::query(&format!(
            "DELETE FROM {table} WHERE hash IN (SELECT hash FROM {table} ORDER BY last_used_at DESC OFFSET $1)",
            table = table
        ))
        .bind(self.config.max_entries as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::vector_index(format!("Capacity sweep failed: {}", e)))?
        .rows_affected();

        Ok((expired + over_capacity) as usize)
    }

    async fn size(&self) -> Result<usize, DomainError> {
        let row = sqlx::query(&format!("SELECT COUNT(*) FROM {}", self.config.table_name))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DomainError::vector_index(format!("Count failed: {}", e)))?;

        let count: i64 = row
            .try_get(0)
            .map_err(|e| DomainError::vector_index(format!("Bad row: {}", e)))?;

        Ok(count.max(0) as usize)
    }

    fn index_name(&self) -> &'static str {
        "pgvector"
    }
}

/// Render a vector in pgvector's text format
fn format_pgvector(vector: &[f32]) -> String {
    let parts: Vec<String> = vector.iter().map(|v| v.to_string()).collect();
    format!("[{}]", parts.join(","))
}

/// Parse a pgvector string representation back to a Vec<f32>
fn parse_pgvector(s: &str) -> Result<Vec<f32>, DomainError> {
    let trimmed = s.trim().trim_start_matches('[').trim_end_matches(']');

    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    trimmed
        .split(',')
        .map(|v| v.trim().parse::<f32>())
        .collect::<Result<Vec<f32>, _>>()
        .map_err(|e| DomainError::vector_index(format!("Failed to parse vector: {}", e)))
}

/// Fail when an existing `embedding` column has another width than configured
fn check_column_type(table: &str, column_type: &str, dimensions: usize) -> Result<(), DomainError> {
    let expected = format!("vector({})", dimensions);

    if column_type.trim() != expected {
        return Err(DomainError::configuration(format!(
            "Table '{}' stores embeddings as {}, but {} is configured; migrate or drop the table",
            table, column_type, expected
        )));
    }

    Ok(())
}
