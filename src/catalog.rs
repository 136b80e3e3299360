//! Durable catalog of knowledge bases and their file manifests.
//!
//! Name uniqueness is enforced by the storage layer (UNIQUE constraint),
//! not by check-then-insert, so concurrent creation under the same name
//! cannot produce duplicates. Counter increments in [`Catalog::append_file`]
//! happen inside one transaction together with the manifest insert, keeping
//! the aggregate counters consistent with the per-file sums at all times.

use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::{PipelineError, Result};
use crate::models::{FileManifest, KnowledgeBase};

/// Fields for creating a new knowledge base.
#[derive(Debug, Clone, Default)]
pub struct NewKnowledgeBase {
    pub name: String,
    pub description: Option<String>,
    pub board: Option<String>,
    pub subject: Option<String>,
    pub level: Option<String>,
}

#[derive(Clone)]
pub struct Catalog {
    pool: SqlitePool,
}

impl Catalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a knowledge base with a unique, trimmed name. Callers
    /// validate that the name is non-empty before reaching the catalog.
    pub async fn create(&self, spec: &NewKnowledgeBase) -> Result<KnowledgeBase> {
        let name = spec.name.trim();
        let id = Uuid::new_v4().to_string();
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO knowledge_bases
                (id, name, description, board, subject, level, total_chunks, total_tokens, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, 0, 0, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(name)
        .bind(&spec.description)
        .bind(&spec.board)
        .bind(&spec.subject)
        .bind(&spec.level)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => self.get(&id).await,
            Err(e) => {
                if e.as_database_error()
                    .map(|d| d.is_unique_violation())
                    .unwrap_or(false)
                {
                    Err(PipelineError::DuplicateName(name.to_string()))
                } else {
                    Err(e.into())
                }
            }
        }
    }

    /// Fetch one knowledge base with its file manifest.
    pub async fn get(&self, kb_id: &str) -> Result<KnowledgeBase> {
        let row = sqlx::query(
            r#"
            SELECT id, name, description, board, subject, level,
                   total_chunks, total_tokens, created_at, updated_at
            FROM knowledge_bases WHERE id = ?
            "#,
        )
        .bind(kb_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| PipelineError::NotFound(kb_id.to_string()))?;

        let files = self.list_files(kb_id).await?;

        Ok(KnowledgeBase {
            id: row.get("id"),
            name: row.get("name"),
            description: row.get("description"),
            board: row.get("board"),
            subject: row.get("subject"),
            level: row.get("level"),
            total_chunks: row.get("total_chunks"),
            total_tokens: row.get("total_tokens"),
            files,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    /// All knowledge bases with counters and manifests, newest first.
    pub async fn list(&self) -> Result<Vec<KnowledgeBase>> {
        let rows = sqlx::query("SELECT id FROM knowledge_bases ORDER BY created_at DESC, id ASC")
            .fetch_all(&self.pool)
            .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.get("id");
            out.push(self.get(&id).await?);
        }
        Ok(out)
    }

    /// Append a file manifest and bump the aggregate counters atomically.
    /// Returns the updated knowledge base.
    pub async fn append_file(&self, kb_id: &str, file: &FileManifest) -> Result<KnowledgeBase> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO kb_files
                (kb_id, stored_name, original_name, byte_size, chunk_count, token_count, uploaded_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(kb_id)
        .bind(&file.stored_name)
        .bind(&file.original_name)
        .bind(file.byte_size)
        .bind(file.chunk_count)
        .bind(file.token_count)
        .bind(file.uploaded_at)
        .execute(&mut *tx)
        .await?;

        let now = chrono::Utc::now().timestamp();
        let updated = sqlx::query(
            r#"
            UPDATE knowledge_bases
            SET total_chunks = total_chunks + ?,
                total_tokens = total_tokens + ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(file.chunk_count)
        .bind(file.token_count)
        .bind(now)
        .bind(kb_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            // Rolls back the manifest insert on drop.
            return Err(PipelineError::NotFound(kb_id.to_string()));
        }

        tx.commit().await?;
        self.get(kb_id).await
    }

    /// Remove a knowledge base and its manifests. The caller is responsible
    /// for deleting the index's vectors first so no orphans are left.
    pub async fn delete(&self, kb_id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM kb_files WHERE kb_id = ?")
            .bind(kb_id)
            .execute(&mut *tx)
            .await?;

        let deleted = sqlx::query("DELETE FROM knowledge_bases WHERE id = ?")
            .bind(kb_id)
            .execute(&mut *tx)
            .await?;

        if deleted.rows_affected() == 0 {
            return Err(PipelineError::NotFound(kb_id.to_string()));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_files(&self, kb_id: &str) -> Result<Vec<FileManifest>> {
        let rows = sqlx::query(
            r#"
            SELECT stored_name, original_name, byte_size, chunk_count, token_count, uploaded_at
            FROM kb_files WHERE kb_id = ?
            ORDER BY uploaded_at ASC, id ASC
            "#,
        )
        .bind(kb_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| FileManifest {
                stored_name: row.get("stored_name"),
                original_name: row.get("original_name"),
                byte_size: row.get("byte_size"),
                chunk_count: row.get("chunk_count"),
                token_count: row.get("token_count"),
                uploaded_at: row.get("uploaded_at"),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, migrate};

    async fn test_catalog() -> (tempfile::TempDir, Catalog) {
        let tmp = tempfile::tempdir().unwrap();
        let pool = db::connect(&tmp.path().join("catalog.sqlite")).await.unwrap();
        migrate::run_migrations(&pool).await.unwrap();
        (tmp, Catalog::new(pool))
    }

    fn manifest(chunks: i64, tokens: i64) -> FileManifest {
        FileManifest {
            stored_name: "stored.txt".to_string(),
            original_name: "notes.txt".to_string(),
            byte_size: 1234,
            uploaded_at: chrono::Utc::now().timestamp(),
            chunk_count: chunks,
            token_count: tokens,
        }
    }

    fn spec(name: &str) -> NewKnowledgeBase {
        NewKnowledgeBase {
            name: name.to_string(),
            description: Some("test corpus".to_string()),
            board: Some("IB".to_string()),
            subject: Some("Mathematics".to_string()),
            level: Some("HL".to_string()),
        }
    }

    #[tokio::test]
    async fn create_trims_name_and_starts_at_zero() {
        let (_tmp, catalog) = test_catalog().await;
        let kb = catalog.create(&spec("  IB Math AA HL  ")).await.unwrap();
        assert_eq!(kb.name, "IB Math AA HL");
        assert_eq!(kb.total_chunks, 0);
        assert_eq!(kb.total_tokens, 0);
        assert!(kb.files.is_empty());
    }

    #[tokio::test]
    async fn duplicate_name_is_a_conflict() {
        let (_tmp, catalog) = test_catalog().await;
        catalog.create(&spec("Physics SL")).await.unwrap();
        let err = catalog.create(&spec("Physics SL")).await.unwrap_err();
        assert!(matches!(err, PipelineError::DuplicateName(_)));
    }

    #[tokio::test]
    async fn append_file_updates_counters_and_manifest() {
        let (_tmp, catalog) = test_catalog().await;
        let kb = catalog.create(&spec("Chemistry HL")).await.unwrap();

        let updated = catalog.append_file(&kb.id, &manifest(4, 120)).await.unwrap();
        assert_eq!(updated.total_chunks, 4);
        assert_eq!(updated.total_tokens, 120);
        assert_eq!(updated.files.len(), 1);

        let updated = catalog.append_file(&kb.id, &manifest(3, 90)).await.unwrap();
        assert_eq!(updated.total_chunks, 7);
        assert_eq!(updated.total_tokens, 210);
        assert_eq!(updated.files.len(), 2);

        // Counters always match the manifest sums.
        let chunk_sum: i64 = updated.files.iter().map(|f| f.chunk_count).sum();
        let token_sum: i64 = updated.files.iter().map(|f| f.token_count).sum();
        assert_eq!(updated.total_chunks, chunk_sum);
        assert_eq!(updated.total_tokens, token_sum);
    }

    #[tokio::test]
    async fn append_to_missing_kb_is_not_found() {
        let (_tmp, catalog) = test_catalog().await;
        let err = catalog
            .append_file("no-such-id", &manifest(1, 10))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_removes_kb_and_manifests() {
        let (_tmp, catalog) = test_catalog().await;
        let kb = catalog.create(&spec("Biology SL")).await.unwrap();
        catalog.append_file(&kb.id, &manifest(2, 50)).await.unwrap();

        catalog.delete(&kb.id).await.unwrap();
        assert!(matches!(
            catalog.get(&kb.id).await.unwrap_err(),
            PipelineError::NotFound(_)
        ));
        assert!(catalog.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_missing_kb_is_not_found() {
        let (_tmp, catalog) = test_catalog().await;
        let err = catalog.delete("no-such-id").await.unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));
    }
}
