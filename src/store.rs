//! SQLite-backed vector document store.
//!
//! One row per document (id, content, embedding BLOB, metadata JSON), with
//! the embedding dimension pinned store-wide at creation time. Batch writes
//! run in a single transaction so a batch either lands in full or not at
//! all, and SQLite's single-writer transactions serialize concurrent writes
//! targeting the same ids. Similarity search is brute-force in process:
//! embeddings are decoded from their BLOBs and scored against the query
//! vector under the requested metric.

use std::cmp::Ordering;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::{debug, warn};

use crate::config::StoreConfig;
use crate::document::Document;
use crate::error::StoreError;

/// Scoring metric for [`VectorStore::similarity_search`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    Dot,
    L2,
}

/// What to do when a written document's id already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DedupPolicy {
    /// Leave the existing row untouched; the document is not counted as written.
    Skip,
    /// Replace content, embedding, and metadata atomically.
    Overwrite,
    /// Abort the whole batch; nothing is written.
    Fail,
}

/// Handle to the documents table, shared process-wide behind a bounded pool.
#[derive(Debug)]
pub struct VectorStore {
    pool: SqlitePool,
    dimension: usize,
    read_retries: u32,
}

impl VectorStore {
    /// Open (creating if missing) the store at `config.path`.
    ///
    /// The first open pins the embedding dimension; reopening with a
    /// different configured dimension fails with
    /// [`StoreError::DimensionConflict`]. Pool exhaustion blocks callers
    /// for up to `acquire_timeout_secs` before surfacing an error.
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Database(sqlx::Error::Io(e)))?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", config.path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(config.acquire_timeout_secs));

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect_with(options)
            .await?;

        let store = Self {
            pool,
            dimension: config.dimension,
            read_retries: config.read_retries,
        };
        store.migrate(config.dimension).await?;
        Ok(store)
    }

    async fn migrate(&self, dimension: usize) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                embedding BLOB,
                metadata_json TEXT NOT NULL DEFAULT '{}',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS store_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        let stored: Option<String> =
            sqlx::query_scalar("SELECT value FROM store_meta WHERE key = 'dimension'")
                .fetch_optional(&self.pool)
                .await?;

        match stored.and_then(|v| v.parse::<usize>().ok()) {
            Some(stored) if stored != dimension => {
                return Err(StoreError::DimensionConflict {
                    stored,
                    configured: dimension,
                })
            }
            Some(_) => {}
            None => {
                sqlx::query(
                    "INSERT INTO store_meta (key, value) VALUES ('dimension', ?) \
                     ON CONFLICT(key) DO NOTHING",
                )
                .bind(dimension.to_string())
                .execute(&self.pool)
                .await?;
            }
        }

        debug!("store ready (dimension: {})", dimension);
        Ok(())
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Write a batch of documents under the given dedup policy.
    ///
    /// The batch is one transaction: dimension checks run for every
    /// document before any row is touched, and a [`DedupPolicy::Fail`]
    /// conflict rolls the whole batch back. Returns the number of rows
    /// actually inserted or replaced.
    pub async fn write_documents(
        &self,
        docs: &[Document],
        policy: DedupPolicy,
    ) -> Result<usize, StoreError> {
        for doc in docs {
            if let Some(embedding) = &doc.embedding {
                if embedding.len() != self.dimension {
                    return Err(StoreError::DimensionMismatch {
                        expected: self.dimension,
                        actual: embedding.len(),
                    });
                }
            }
        }

        let mut tx = self.pool.begin().await?;
        let now = chrono::Utc::now().timestamp();
        let mut written = 0usize;

        for doc in docs {
            let metadata_json =
                serde_json::to_string(&doc.metadata).map_err(|source| StoreError::Metadata {
                    id: doc.id.clone(),
                    source,
                })?;
            let blob = doc.embedding.as_deref().map(vec_to_blob);

            match policy {
                DedupPolicy::Skip => {
                    let result = sqlx::query(
                        r#"
                        INSERT INTO documents (id, content, embedding, metadata_json, created_at, updated_at)
                        VALUES (?, ?, ?, ?, ?, ?)
                        ON CONFLICT(id) DO NOTHING
                        "#,
                    )
                    .bind(&doc.id)
                    .bind(&doc.content)
                    .bind(&blob)
                    .bind(&metadata_json)
                    .bind(now)
                    .bind(now)
                    .execute(&mut *tx)
                    .await?;
                    written += result.rows_affected() as usize;
                }
                DedupPolicy::Overwrite => {
                    sqlx::query(
                        r#"
                        INSERT INTO documents (id, content, embedding, metadata_json, created_at, updated_at)
                        VALUES (?, ?, ?, ?, ?, ?)
                        ON CONFLICT(id) DO UPDATE SET
                            content = excluded.content,
                            embedding = excluded.embedding,
                            metadata_json = excluded.metadata_json,
                            updated_at = excluded.updated_at
                        "#,
                    )
                    .bind(&doc.id)
                    .bind(&doc.content)
                    .bind(&blob)
                    .bind(&metadata_json)
                    .bind(now)
                    .bind(now)
                    .execute(&mut *tx)
                    .await?;
                    written += 1;
                }
                DedupPolicy::Fail => {
                    // The existence check sees earlier inserts of this same
                    // transaction, so in-batch duplicates abort too.
                    let exists: bool =
                        sqlx::query_scalar("SELECT COUNT(*) > 0 FROM documents WHERE id = ?")
                            .bind(&doc.id)
                            .fetch_one(&mut *tx)
                            .await?;
                    if exists {
                        return Err(StoreError::DuplicateDocument(doc.id.clone()));
                    }
                    sqlx::query(
                        r#"
                        INSERT INTO documents (id, content, embedding, metadata_json, created_at, updated_at)
                        VALUES (?, ?, ?, ?, ?, ?)
                        "#,
                    )
                    .bind(&doc.id)
                    .bind(&doc.content)
                    .bind(&blob)
                    .bind(&metadata_json)
                    .bind(now)
                    .bind(now)
                    .execute(&mut *tx)
                    .await?;
                    written += 1;
                }
            }
        }

        tx.commit().await?;
        debug!("wrote {} of {} documents ({:?})", written, docs.len(), policy);
        Ok(written)
    }

    /// Nearest neighbors of `query` under `metric`.
    ///
    /// Returns at most `top_k` `(document, score)` pairs: similarity
    /// (descending) for cosine and dot, distance (ascending) for L2. Ties
    /// break by ascending id so results are deterministic. An empty store
    /// yields an empty result, not an error.
    pub async fn similarity_search(
        &self,
        query: &[f32],
        top_k: usize,
        metric: DistanceMetric,
    ) -> Result<Vec<(Document, f32)>, StoreError> {
        if query.len() != self.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let rows = self
            .fetch_with_retry(
                "SELECT id, content, embedding, metadata_json FROM documents \
                 WHERE embedding IS NOT NULL",
            )
            .await?;

        let mut scored = Vec::with_capacity(rows.len());
        for row in rows {
            let doc = row_to_document(&row)?;
            let embedding = doc.embedding.as_deref().unwrap_or_default();
            let score = match metric {
                DistanceMetric::Cosine => cosine_similarity(query, embedding),
                DistanceMetric::Dot => dot_product(query, embedding),
                DistanceMetric::L2 => l2_distance(query, embedding),
            };
            scored.push((doc, score));
        }

        scored.sort_by(|a, b| {
            let by_score = match metric {
                DistanceMetric::Cosine | DistanceMetric::Dot => b.1.partial_cmp(&a.1),
                DistanceMetric::L2 => a.1.partial_cmp(&b.1),
            }
            .unwrap_or(Ordering::Equal);
            by_score.then_with(|| a.0.id.cmp(&b.0.id))
        });
        scored.truncate(top_k);
        Ok(scored)
    }

    pub async fn count_documents(&self) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    pub async fn get_document(&self, id: &str) -> Result<Option<Document>, StoreError> {
        let row = sqlx::query(
            "SELECT id, content, embedding, metadata_json FROM documents WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| row_to_document(&row)).transpose()
    }

    /// Bounded retry with backoff for transient read failures.
    async fn fetch_with_retry(&self, sql: &str) -> Result<Vec<SqliteRow>, StoreError> {
        let mut attempt = 0u32;
        loop {
            match sqlx::query(sql).fetch_all(&self.pool).await {
                Ok(rows) => return Ok(rows),
                Err(err) if attempt < self.read_retries => {
                    attempt += 1;
                    let delay = Duration::from_millis(100 * (1 << (attempt - 1).min(4)));
                    warn!("store read failed (attempt {}): {}; retrying", attempt, err);
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

fn row_to_document(row: &SqliteRow) -> Result<Document, StoreError> {
    let id: String = row.get("id");
    let metadata_json: String = row.get("metadata_json");
    let metadata = serde_json::from_str(&metadata_json).map_err(|source| StoreError::Metadata {
        id: id.clone(),
        source,
    })?;
    let embedding: Option<Vec<u8>> = row.get("embedding");

    Ok(Document {
        id,
        content: row.get("content"),
        embedding: embedding.as_deref().map(blob_to_vec),
        metadata,
    })
}

/// Encode a float vector as little-endian f32 bytes for BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`. Zero for empty or mismatched vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Inner product. Zero for mismatched vectors.
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Euclidean distance. Infinity for mismatched vectors so they sort last.
pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::INFINITY;
    }
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        assert_eq!(blob.len(), 20);
        assert_eq!(blob_to_vec(&blob), vec);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_mismatched_lengths() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[test]
    fn test_dot_product() {
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![4.0, 5.0, 6.0];
        assert!((dot_product(&a, &b) - 32.0).abs() < 1e-6);
    }

    #[test]
    fn test_l2_distance() {
        let a = vec![0.0, 0.0];
        let b = vec![3.0, 4.0];
        assert!((l2_distance(&a, &b) - 5.0).abs() < 1e-6);
        assert_eq!(l2_distance(&a, &[1.0]), f32::INFINITY);
    }
}
