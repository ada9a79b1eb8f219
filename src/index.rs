//! Persistent vector index over chunk embeddings.
//!
//! Backed by a single SQLite database (WAL mode). Two tables:
//!
//! | Table | Contents |
//! |-------|----------|
//! | `index_entries` | one row per chunk: opaque entry id, insertion sequence, chunk text and metadata, embedding BLOB |
//! | `index_meta` | a single row describing the current index (entry count, model, dims, build time) |
//!
//! # Atomicity
//!
//! [`VectorIndex::build`] embeds every chunk **before** touching the
//! database, then replaces all rows and the metadata row inside one
//! transaction. An embedding failure therefore writes nothing, and a write
//! failure rolls back. In both cases the previous index stays queryable.
//!
//! # Query
//!
//! Exact brute-force cosine similarity over all entries. Results are sorted by
//! descending score; equal scores keep insertion order.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use crate::embedding::{self, EmbeddingProvider};
use crate::error::{QaError, Result};
use crate::models::{Chunk, ChunkMetadata, ScoredChunk};

/// Describes the index currently stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexHandle {
    pub entry_count: usize,
    pub model: String,
    pub dims: usize,
    pub built_at: DateTime<Utc>,
}

pub struct VectorIndex {
    pool: SqlitePool,
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    path: PathBuf,
}

impl VectorIndex {
    /// Opens the index at `path`, creating the database and schema if missing.
    pub async fn open(
        path: &Path,
        provider: Arc<dyn EmbeddingProvider>,
        batch_size: usize,
    ) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| QaError::io("create directory", parent, e))?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        run_migrations(&pool).await?;

        Ok(Self {
            pool,
            provider,
            batch_size: batch_size.max(1),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    /// Embeds and stores `chunks`, replacing whatever the index held before.
    pub async fn build(&self, chunks: &[Chunk]) -> Result<IndexHandle> {
        let vectors = self.embed_all(chunks).await?;
        let dims = vectors.first().map(Vec::len).unwrap_or(self.provider.dims());
        let built_at = Utc::now();

        let handle = self.write_all(chunks, &vectors, dims, built_at).await?;
        tracing::info!(
            path = %self.path.display(),
            entries = handle.entry_count,
            model = %handle.model,
            dims = handle.dims,
            "index built"
        );
        Ok(handle)
    }

    /// Drops the current index and rebuilds it from `chunks`.
    ///
    /// Same atomicity as [`build`](Self::build): on failure the old index is kept.
    pub async fn reindex(&self, chunks: &[Chunk]) -> Result<IndexHandle> {
        tracing::info!(path = %self.path.display(), chunks = chunks.len(), "reindexing");
        self.build(chunks).await
    }

    /// Returns the `k` entries most similar to `text`.
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        if k == 0 {
            return Err(QaError::invalid("k must be >= 1"));
        }

        let Some(handle) = self.handle().await? else {
            return Ok(Vec::new());
        };
        if handle.entry_count == 0 {
            return Ok(Vec::new());
        }
        if handle.model != self.provider.model_name() {
            return Err(QaError::Embedding(format!(
                "index was built with model '{}' but queries use '{}'; run `docqa index --rebuild`",
                handle.model,
                self.provider.model_name()
            )));
        }

        let query_vec = embedding::embed_query(self.provider.as_ref(), text)
            .await
            .map_err(|e| QaError::Embedding(format!("{:#}", e)))?;
        if query_vec.len() != handle.dims {
            return Err(QaError::Embedding(format!(
                "query embedding has {} dims but the index was built with {} ({})",
                query_vec.len(),
                handle.dims,
                handle.model
            )));
        }

        let rows = sqlx::query(
            r#"
            SELECT chunk_id, chunk_index, source_id, file_path, created_at, content, embedding
            FROM index_entries
            ORDER BY seq ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut scored = Vec::with_capacity(rows.len());
        for row in &rows {
            let blob: Vec<u8> = row.get("embedding");
            let score = embedding::cosine_similarity(&query_vec, &embedding::blob_to_vec(&blob));
            scored.push(ScoredChunk {
                chunk: row_to_chunk(row)?,
                score,
            });
        }

        // Stable sort keeps insertion order for equal scores
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);

        tracing::debug!(k, returned = scored.len(), "index query");
        Ok(scored)
    }

    /// Metadata for the current index, or `None` if nothing was ever built.
    pub async fn handle(&self) -> Result<Option<IndexHandle>> {
        let row = sqlx::query("SELECT entry_count, model, dims, built_at FROM index_meta WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let entry_count: i64 = row.get("entry_count");
        let dims: i64 = row.get("dims");
        let built_at: String = row.get("built_at");

        Ok(Some(IndexHandle {
            entry_count: entry_count as usize,
            model: row.get("model"),
            dims: dims as usize,
            built_at: parse_timestamp(&built_at)?,
        }))
    }

    /// Number of stored entries.
    pub async fn len(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM index_entries")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn embed_all(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(chunks.len());

        for (batch_no, batch) in chunks.chunks(self.batch_size).enumerate() {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let batch_vectors = self.provider.embed(&texts).await.map_err(|e| {
                tracing::error!(batch = batch_no, error = %e, "embedding batch failed");
                QaError::Embedding(format!("{:#}", e))
            })?;

            if batch_vectors.len() != batch.len() {
                return Err(QaError::Embedding(format!(
                    "provider returned {} vectors for {} texts",
                    batch_vectors.len(),
                    batch.len()
                )));
            }
            vectors.extend(batch_vectors);
            tracing::debug!(batch = batch_no, embedded = vectors.len(), total = chunks.len(), "embedded batch");
        }

        let declared = self.provider.dims();
        let expected = vectors.first().map(Vec::len).unwrap_or(declared);
        if declared > 0 && declared != expected {
            return Err(QaError::Embedding(format!(
                "provider declares {} dims but returned {}",
                declared, expected
            )));
        }
        for (i, v) in vectors.iter().enumerate() {
            if v.is_empty() || v.len() != expected {
                return Err(QaError::Embedding(format!(
                    "embedding {} has {} dims, expected {}",
                    i,
                    v.len(),
                    expected
                )));
            }
        }

        Ok(vectors)
    }

    async fn write_all(
        &self,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
        dims: usize,
        built_at: DateTime<Utc>,
    ) -> Result<IndexHandle> {
        let mut tx = self.pool.begin().await.map_err(write_error)?;

        sqlx::query("DELETE FROM index_entries")
            .execute(&mut *tx)
            .await
            .map_err(write_error)?;

        for (seq, (chunk, vector)) in chunks.iter().zip(vectors).enumerate() {
            let meta = &chunk.metadata;
            sqlx::query(
                r#"
                INSERT INTO index_entries
                    (entry_id, seq, chunk_id, chunk_index, source_id, file_path, created_at, content, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(uuid::Uuid::new_v4().to_string())
            .bind(seq as i64)
            .bind(&meta.chunk_id)
            .bind(meta.chunk_index as i64)
            .bind(&meta.source_id)
            .bind(&meta.file_path)
            .bind(format_timestamp(&meta.created_at))
            .bind(&chunk.content)
            .bind(embedding::vec_to_blob(vector))
            .execute(&mut *tx)
            .await
            .map_err(write_error)?;
        }

        let model = self.provider.model_name().to_string();
        sqlx::query(
            r#"
            INSERT INTO index_meta (id, entry_count, model, dims, built_at)
            VALUES (1, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                entry_count = excluded.entry_count,
                model = excluded.model,
                dims = excluded.dims,
                built_at = excluded.built_at
            "#,
        )
        .bind(chunks.len() as i64)
        .bind(&model)
        .bind(dims as i64)
        .bind(format_timestamp(&built_at))
        .execute(&mut *tx)
        .await
        .map_err(write_error)?;

        tx.commit().await.map_err(write_error)?;

        Ok(IndexHandle {
            entry_count: chunks.len(),
            model,
            dims,
            built_at,
        })
    }
}

async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_entries (
            entry_id TEXT PRIMARY KEY,
            seq INTEGER NOT NULL,
            chunk_id TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            source_id TEXT NOT NULL,
            file_path TEXT NOT NULL,
            created_at TEXT NOT NULL,
            content TEXT NOT NULL,
            embedding BLOB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_meta (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            entry_count INTEGER NOT NULL,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            built_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_index_entries_seq ON index_entries(seq)")
        .execute(pool)
        .await?;

    Ok(())
}

fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> Result<Chunk> {
    let chunk_index: i64 = row.get("chunk_index");
    let created_at: String = row.get("created_at");
    Ok(Chunk {
        content: row.get("content"),
        metadata: ChunkMetadata {
            source_id: row.get("source_id"),
            file_path: row.get("file_path"),
            created_at: parse_timestamp(&created_at)?,
            chunk_id: row.get("chunk_id"),
            chunk_index: chunk_index as usize,
        },
    })
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| QaError::Index(sqlx::Error::Decode(Box::new(e))))
}

fn write_error(e: sqlx::Error) -> QaError {
    tracing::error!(error = %e, "index write failed, rolling back");
    QaError::IndexWrite(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashedProvider;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct ConstantProvider;

    #[async_trait]
    impl EmbeddingProvider for ConstantProvider {
        fn model_name(&self) -> &str {
            "constant"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    /// Same vector space shape as [`ConstantProvider`], different model.
    struct OtherConstantProvider;

    #[async_trait]
    impl EmbeddingProvider for OtherConstantProvider {
        fn model_name(&self) -> &str {
            "other-constant"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.0, 1.0]).collect())
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl EmbeddingProvider for FailingProvider {
        fn model_name(&self) -> &str {
            "hashed"
        }
        fn dims(&self) -> usize {
            64
        }
        async fn embed(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            anyhow::bail!("connection refused")
        }
    }

    struct ShortProvider;

    #[async_trait]
    impl EmbeddingProvider for ShortProvider {
        fn model_name(&self) -> &str {
            "short"
        }
        fn dims(&self) -> usize {
            0
        }
        async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().skip(1).map(|_| vec![1.0]).collect())
        }
    }

    fn chunk(source: &str, index: usize, content: &str) -> Chunk {
        Chunk {
            content: content.to_string(),
            metadata: ChunkMetadata {
                source_id: source.to_string(),
                file_path: format!("texts/{}", source),
                created_at: Utc::now(),
                chunk_id: format!("{}_{}", source, index),
                chunk_index: index,
            },
        }
    }

    fn corpus() -> Vec<Chunk> {
        vec![
            chunk("A.txt", 0, "Hello world."),
            chunk("B.txt", 0, "Goodbye world."),
            chunk("C.txt", 0, "Bananas are yellow fruit."),
        ]
    }

    async fn open_hashed(tmp: &TempDir) -> VectorIndex {
        VectorIndex::open(
            &tmp.path().join("index").join("docqa.sqlite"),
            Arc::new(HashedProvider::new(64)),
            2,
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_unbuilt_index_is_empty() {
        let tmp = TempDir::new().unwrap();
        let index = open_hashed(&tmp).await;
        assert!(index.handle().await.unwrap().is_none());
        assert_eq!(index.len().await.unwrap(), 0);
        assert!(index.query("anything", 4).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_build_and_query() {
        let tmp = TempDir::new().unwrap();
        let index = open_hashed(&tmp).await;
        let chunks = corpus();

        let handle = index.build(&chunks).await.unwrap();
        assert_eq!(handle.entry_count, 3);
        assert_eq!(handle.dims, 64);
        assert_eq!(handle.model, "hashed");
        assert_eq!(index.len().await.unwrap(), 3);

        let results = index.query("world", 2).await.unwrap();
        assert_eq!(results.len(), 2);
        let sources: Vec<&str> = results
            .iter()
            .map(|r| r.chunk.metadata.source_id.as_str())
            .collect();
        assert!(sources.contains(&"A.txt"));
        assert!(sources.contains(&"B.txt"));
        assert!(results[0].score >= results[1].score);
    }

    #[tokio::test]
    async fn test_query_roundtrips_chunk() {
        let tmp = TempDir::new().unwrap();
        let index = open_hashed(&tmp).await;
        let chunks = corpus();
        index.build(&chunks).await.unwrap();

        let results = index.query("bananas yellow", 1).await.unwrap();
        assert_eq!(results[0].chunk, chunks[2]);
    }

    #[tokio::test]
    async fn test_k_zero_rejected() {
        let tmp = TempDir::new().unwrap();
        let index = open_hashed(&tmp).await;
        index.build(&corpus()).await.unwrap();
        assert!(matches!(
            index.query("world", 0).await,
            Err(QaError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_k_larger_than_index() {
        let tmp = TempDir::new().unwrap();
        let index = open_hashed(&tmp).await;
        index.build(&corpus()).await.unwrap();
        assert_eq!(index.query("world", 50).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_ties_keep_insertion_order() {
        let tmp = TempDir::new().unwrap();
        let index = VectorIndex::open(&tmp.path().join("t.sqlite"), Arc::new(ConstantProvider), 8)
            .await
            .unwrap();
        let chunks: Vec<Chunk> = (0..6).map(|i| chunk("T.txt", i, &format!("text {}", i))).collect();
        index.build(&chunks).await.unwrap();

        let results = index.query("q", 4).await.unwrap();
        let ids: Vec<usize> = results.iter().map(|r| r.chunk.metadata.chunk_index).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_reindex_replaces_entries() {
        let tmp = TempDir::new().unwrap();
        let index = open_hashed(&tmp).await;
        index.build(&corpus()).await.unwrap();

        let handle = index
            .reindex(&[chunk("D.txt", 0, "Only this remains.")])
            .await
            .unwrap();
        assert_eq!(handle.entry_count, 1);
        assert_eq!(index.len().await.unwrap(), 1);

        let results = index.query("world", 4).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.metadata.source_id, "D.txt");
    }

    #[tokio::test]
    async fn test_embedding_failure_keeps_prior_index() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("keep.sqlite");

        let good = VectorIndex::open(&path, Arc::new(HashedProvider::new(64)), 4)
            .await
            .unwrap();
        good.build(&corpus()).await.unwrap();
        good.close().await;

        let failing = VectorIndex::open(&path, Arc::new(FailingProvider), 4)
            .await
            .unwrap();
        let err = failing
            .reindex(&[chunk("X.txt", 0, "new")])
            .await
            .unwrap_err();
        assert!(matches!(err, QaError::Embedding(_)));
        assert_eq!(failing.len().await.unwrap(), 3);
        failing.close().await;

        let reopened = VectorIndex::open(&path, Arc::new(HashedProvider::new(64)), 4)
            .await
            .unwrap();
        assert_eq!(reopened.query("world", 4).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_vector_count_mismatch_is_embedding_error() {
        let tmp = TempDir::new().unwrap();
        let index = VectorIndex::open(&tmp.path().join("s.sqlite"), Arc::new(ShortProvider), 4)
            .await
            .unwrap();
        let err = index.build(&corpus()).await.unwrap_err();
        assert!(matches!(err, QaError::Embedding(_)));
        assert!(index.handle().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_query_with_different_model_is_embedding_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("m.sqlite");
        {
            let index = VectorIndex::open(&path, Arc::new(ConstantProvider), 4)
                .await
                .unwrap();
            index.build(&corpus()).await.unwrap();
            index.close().await;
        }

        let index = VectorIndex::open(&path, Arc::new(OtherConstantProvider), 4)
            .await
            .unwrap();
        let err = index.query("world", 2).await.unwrap_err();
        match err {
            QaError::Embedding(msg) => {
                assert!(msg.contains("constant"), "got: {}", msg);
                assert!(msg.contains("other-constant"), "got: {}", msg);
            }
            other => panic!("expected Embedding error, got {:?}", other),
        }

        // Rebuilding with the new model makes the index queryable again
        index.build(&corpus()).await.unwrap();
        assert_eq!(index.query("world", 2).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("p.sqlite");
        {
            let index = VectorIndex::open(&path, Arc::new(HashedProvider::new(64)), 4)
                .await
                .unwrap();
            index.build(&corpus()).await.unwrap();
            index.close().await;
        }
        let index = VectorIndex::open(&path, Arc::new(HashedProvider::new(64)), 4)
            .await
            .unwrap();
        let handle = index.handle().await.unwrap().unwrap();
        assert_eq!(handle.entry_count, 3);
    }

    #[tokio::test]
    async fn test_empty_build_records_handle() {
        let tmp = TempDir::new().unwrap();
        let index = open_hashed(&tmp).await;
        let handle = index.build(&[]).await.unwrap();
        assert_eq!(handle.entry_count, 0);
        assert!(index.handle().await.unwrap().is_some());
        assert!(index.query("world", 4).await.unwrap().is_empty());
    }
}
