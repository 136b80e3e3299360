//! Vector index abstraction over upsert-by-id and metadata-filtered
//! nearest-neighbor query.
//!
//! Any backend supporting those two operations qualifies; the bundled
//! [`SqliteVectorIndex`] stores vectors as little-endian f32 BLOBs and
//! scores candidates with brute-force cosine similarity at query time.
//! [`MemoryVectorIndex`] backs tests. [`UnconfiguredIndex`] stands in when
//! no backend is configured: every operation fails with
//! `index_unavailable`, so ingestion aborts explicitly and retrieval can
//! degrade, and callers can always distinguish "no matches" from "index
//! down".

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::{PipelineError, Result};
use crate::models::{VectorEntry, VectorMatch};

/// Deterministic composite identifier for one chunk's vector.
///
/// Re-upload of the same file under the same knowledge base re-derives the
/// same ids, so the upsert overwrites prior vectors instead of duplicating
/// them, provided chunk boundaries are stable for identical input.
pub fn vector_id(kb_id: &str, filename: &str, chunk_index: i64) -> String {
    format!("{}_{}_{}", kb_id, filename, chunk_index)
}

/// Durable store mapping vector → metadata, filtered by knowledge base.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Configured vector dimensionality. `0` means unconfigured.
    fn dims(&self) -> usize;

    /// Insert or overwrite entries, idempotent by composite id.
    async fn upsert(&self, entries: &[VectorEntry]) -> Result<()>;

    /// Top-K cosine-similarity search restricted to one knowledge base.
    /// Results are ordered score descending, ties broken by chunk index
    /// ascending then id ascending.
    async fn query(&self, vector: &[f32], top_k: usize, kb_id: &str) -> Result<Vec<VectorMatch>>;

    /// Remove every entry belonging to a knowledge base.
    async fn delete_kb(&self, kb_id: &str) -> Result<()>;

    /// Remove every entry for one file within a knowledge base.
    async fn delete_file(&self, kb_id: &str, filename: &str) -> Result<()>;
}

fn check_dims(expected: usize, got: usize) -> Result<()> {
    if expected != 0 && got != expected {
        return Err(PipelineError::IndexUnavailable(format!(
            "vector dimension mismatch: got {}, index expects {}",
            got, expected
        )));
    }
    Ok(())
}

/// Deterministic ranking: score desc, then chunk index asc, then id asc.
fn rank(matches: &mut Vec<VectorMatch>, top_k: usize) {
    matches.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.chunk_index.cmp(&b.chunk_index))
            .then(a.id.cmp(&b.id))
    });
    matches.truncate(top_k);
}

// ============ SQLite backend ============

/// Vector index over the `vectors` table of the application database.
pub struct SqliteVectorIndex {
    pool: SqlitePool,
    dims: usize,
}

impl SqliteVectorIndex {
    pub fn new(pool: SqlitePool, dims: usize) -> Self {
        Self { pool, dims }
    }
}

fn index_err(e: sqlx::Error) -> PipelineError {
    PipelineError::IndexUnavailable(e.to_string())
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    fn dims(&self) -> usize {
        self.dims
    }

    async fn upsert(&self, entries: &[VectorEntry]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(index_err)?;
        for entry in entries {
            check_dims(self.dims, entry.vector.len())?;
            sqlx::query(
                r#"
                INSERT INTO vectors (id, kb_id, kb_name, filename, chunk_index, text, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    kb_id = excluded.kb_id,
                    kb_name = excluded.kb_name,
                    filename = excluded.filename,
                    chunk_index = excluded.chunk_index,
                    text = excluded.text,
                    embedding = excluded.embedding
                "#,
            )
            .bind(&entry.id)
            .bind(&entry.kb_id)
            .bind(&entry.kb_name)
            .bind(&entry.filename)
            .bind(entry.chunk_index)
            .bind(&entry.text)
            .bind(vec_to_blob(&entry.vector))
            .execute(&mut *tx)
            .await
            .map_err(index_err)?;
        }
        tx.commit().await.map_err(index_err)?;
        Ok(())
    }

    async fn query(&self, vector: &[f32], top_k: usize, kb_id: &str) -> Result<Vec<VectorMatch>> {
        check_dims(self.dims, vector.len())?;

        let rows = sqlx::query(
            "SELECT id, kb_id, filename, chunk_index, text, embedding FROM vectors WHERE kb_id = ?",
        )
        .bind(kb_id)
        .fetch_all(&self.pool)
        .await
        .map_err(index_err)?;

        let mut matches: Vec<VectorMatch> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let stored = blob_to_vec(&blob);
                VectorMatch {
                    id: row.get("id"),
                    score: cosine_similarity(vector, &stored),
                    kb_id: row.get("kb_id"),
                    filename: row.get("filename"),
                    chunk_index: row.get("chunk_index"),
                    text: row.get("text"),
                }
            })
            .collect();

        rank(&mut matches, top_k);
        Ok(matches)
    }

    async fn delete_kb(&self, kb_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM vectors WHERE kb_id = ?")
            .bind(kb_id)
            .execute(&self.pool)
            .await
            .map_err(index_err)?;
        Ok(())
    }

    async fn delete_file(&self, kb_id: &str, filename: &str) -> Result<()> {
        sqlx::query("DELETE FROM vectors WHERE kb_id = ? AND filename = ?")
            .bind(kb_id)
            .bind(filename)
            .execute(&self.pool)
            .await
            .map_err(index_err)?;
        Ok(())
    }
}

// ============ In-memory backend ============

/// In-memory index for tests. Brute-force cosine over a `HashMap` keyed by
/// composite id, behind an `RwLock`.
pub struct MemoryVectorIndex {
    dims: usize,
    entries: RwLock<HashMap<String, VectorEntry>>,
}

impl MemoryVectorIndex {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Total stored entries, for test assertions.
    pub fn entry_count(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    /// Entries stored for one file, for test assertions.
    pub fn file_entry_count(&self, kb_id: &str, filename: &str) -> usize {
        self.entries
            .read()
            .unwrap()
            .values()
            .filter(|e| e.kb_id == kb_id && e.filename == filename)
            .count()
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    fn dims(&self) -> usize {
        self.dims
    }

    async fn upsert(&self, entries: &[VectorEntry]) -> Result<()> {
        for entry in entries {
            check_dims(self.dims, entry.vector.len())?;
        }
        let mut stored = self.entries.write().unwrap();
        for entry in entries {
            stored.insert(entry.id.clone(), entry.clone());
        }
        Ok(())
    }

    async fn query(&self, vector: &[f32], top_k: usize, kb_id: &str) -> Result<Vec<VectorMatch>> {
        check_dims(self.dims, vector.len())?;
        let stored = self.entries.read().unwrap();
        let mut matches: Vec<VectorMatch> = stored
            .values()
            .filter(|e| e.kb_id == kb_id)
            .map(|e| VectorMatch {
                id: e.id.clone(),
                score: cosine_similarity(vector, &e.vector),
                kb_id: e.kb_id.clone(),
                filename: e.filename.clone(),
                chunk_index: e.chunk_index,
                text: e.text.clone(),
            })
            .collect();
        rank(&mut matches, top_k);
        Ok(matches)
    }

    async fn delete_kb(&self, kb_id: &str) -> Result<()> {
        self.entries
            .write()
            .unwrap()
            .retain(|_, e| e.kb_id != kb_id);
        Ok(())
    }

    async fn delete_file(&self, kb_id: &str, filename: &str) -> Result<()> {
        self.entries
            .write()
            .unwrap()
            .retain(|_, e| !(e.kb_id == kb_id && e.filename == filename));
        Ok(())
    }
}

// ============ Unconfigured backend ============

/// Placeholder used when `index.backend = "disabled"`. Every operation
/// fails with `index_unavailable` instead of silently succeeding.
pub struct UnconfiguredIndex;

#[async_trait]
impl VectorIndex for UnconfiguredIndex {
    fn dims(&self) -> usize {
        0
    }

    async fn upsert(&self, _entries: &[VectorEntry]) -> Result<()> {
        Err(unconfigured())
    }

    async fn query(&self, _vector: &[f32], _top_k: usize, _kb_id: &str) -> Result<Vec<VectorMatch>> {
        Err(unconfigured())
    }

    async fn delete_kb(&self, _kb_id: &str) -> Result<()> {
        Err(unconfigured())
    }

    async fn delete_file(&self, _kb_id: &str, _filename: &str) -> Result<()> {
        Err(unconfigured())
    }
}

fn unconfigured() -> PipelineError {
    PipelineError::IndexUnavailable("no vector index backend configured".to_string())
}
