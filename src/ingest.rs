//! Ingestion orchestration.
//!
//! Drives one uploaded file through extract → chunk → embed → index →
//! catalog as a sequential pipeline. The embedding loop is fail-fast: the
//! first per-chunk failure aborts the whole file, and nothing is written to
//! the index until every chunk has embedded successfully, so a failed file
//! leaves zero vectors and zero counter changes behind.
//!
//! The ingest target is resolved only after every chunk has embedded.
//! A create request whose file fails extraction, chunking, or embedding
//! therefore creates no knowledge base, and retrying the identical request
//! cannot collide with a leftover name.
//!
//! Vectors are written before the catalog append; if the append then fails,
//! the just-written vectors for that file are deleted again so the index
//! and the catalog cannot drift apart.

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::catalog::{Catalog, NewKnowledgeBase};
use crate::chunk::chunk_text;
use crate::embedding::{truncate_for_embedding, EmbeddingClient};
use crate::error::{PipelineError, Result};
use crate::extract::extract_text;
use crate::index::{vector_id, VectorIndex};
use crate::models::{FileManifest, IngestReport, KnowledgeBase, VectorEntry};

/// Where an uploaded file should land.
pub enum IngestTarget {
    /// Create a new knowledge base (conflict if the name exists).
    Create(NewKnowledgeBase),
    /// Append to an existing knowledge base by id.
    Existing(String),
}

/// Coordinates the ingestion pipeline and the cascading delete path.
pub struct Ingestor {
    embedder: Arc<dyn EmbeddingClient>,
    index: Arc<dyn VectorIndex>,
    catalog: Catalog,
    max_chunk_chars: usize,
    max_embed_chars: usize,
    snippet_max_chars: usize,
}

impl Ingestor {
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        index: Arc<dyn VectorIndex>,
        catalog: Catalog,
        max_chunk_chars: usize,
        max_embed_chars: usize,
        snippet_max_chars: usize,
    ) -> Self {
        Self {
            embedder,
            index,
            catalog,
            max_chunk_chars,
            max_embed_chars,
            snippet_max_chars,
        }
    }

    /// Ingest a spooled upload, removing the temp file on every outcome.
    pub async fn ingest_temp_file(
        &self,
        target: IngestTarget,
        original_name: &str,
        temp_path: &std::path::Path,
    ) -> Result<IngestReport> {
        let bytes = std::fs::read(temp_path).map_err(PipelineError::Io);
        let result = match bytes {
            Ok(bytes) => self.ingest_file(target, original_name, &bytes).await,
            Err(e) => Err(e),
        };
        if let Err(e) = std::fs::remove_file(temp_path) {
            warn!(path = %temp_path.display(), error = %e, "failed to remove temp upload");
        }
        result
    }

    /// Run the full pipeline for one file's bytes.
    pub async fn ingest_file(
        &self,
        target: IngestTarget,
        original_name: &str,
        bytes: &[u8],
    ) -> Result<IngestReport> {
        let extension = original_name.rsplit('.').next().unwrap_or_default();

        let text = extract_text(bytes, extension)?;
        debug!(file = original_name, chars = text.len(), "extracted text");

        let chunks = chunk_text(&text, self.max_chunk_chars);
        if chunks.is_empty() {
            return Err(PipelineError::EmptyContent);
        }
        debug!(file = original_name, chunks = chunks.len(), "chunked text");

        // Embed every chunk before resolving the target or touching the
        // index. First failure aborts the file; vectors computed so far
        // are discarded, and a Create target has not created anything yet.
        let mut embedded: Vec<EmbeddedChunk> = Vec::with_capacity(chunks.len());
        let mut token_count: i64 = 0;
        for chunk in &chunks {
            if chunk.text.trim().is_empty() {
                warn!(
                    file = original_name,
                    chunk = chunk.index,
                    "skipping whitespace-only chunk"
                );
                continue;
            }

            let (input, truncated) = truncate_for_embedding(&chunk.text, self.max_embed_chars);
            if truncated {
                warn!(
                    file = original_name,
                    chunk = chunk.index,
                    original_chars = chunk.text.chars().count(),
                    cap = self.max_embed_chars,
                    "truncating chunk text for embedding"
                );
            }

            let vector =
                self.embedder
                    .embed(input)
                    .await
                    .map_err(|e| PipelineError::EmbeddingFailed {
                        chunk_index: chunk.index,
                        reason: e.to_string(),
                    })?;

            let expected = self.index.dims();
            if expected != 0 && vector.len() != expected {
                return Err(PipelineError::EmbeddingFailed {
                    chunk_index: chunk.index,
                    reason: format!(
                        "dimension mismatch: got {}, index expects {}",
                        vector.len(),
                        expected
                    ),
                });
            }

            let snippet = chunk
                .text
                .chars()
                .take(self.snippet_max_chars)
                .collect::<String>();
            embedded.push(EmbeddedChunk {
                index: chunk.index as i64,
                snippet,
                vector,
            });
            token_count += chunk.token_estimate as i64;
        }

        if embedded.is_empty() {
            return Err(PipelineError::EmptyContent);
        }

        let kb = self.resolve_target(target).await?;

        let entries: Vec<VectorEntry> = embedded
            .into_iter()
            .map(|e| VectorEntry {
                id: vector_id(&kb.id, original_name, e.index),
                kb_id: kb.id.clone(),
                kb_name: kb.name.clone(),
                filename: original_name.to_string(),
                chunk_index: e.index,
                text: e.snippet,
                vector: e.vector,
            })
            .collect();

        self.index.upsert(&entries).await?;
        debug!(file = original_name, vectors = entries.len(), "indexed vectors");

        let manifest = FileManifest {
            stored_name: stored_name(extension),
            original_name: original_name.to_string(),
            byte_size: bytes.len() as i64,
            uploaded_at: chrono::Utc::now().timestamp(),
            chunk_count: entries.len() as i64,
            token_count,
        };

        match self.catalog.append_file(&kb.id, &manifest).await {
            Ok(updated) => Ok(IngestReport {
                knowledge_base: updated,
                file: manifest,
            }),
            Err(e) => {
                // Compensate so the index holds no vectors the catalog
                // never heard about.
                if let Err(del) = self.index.delete_file(&kb.id, original_name).await {
                    warn!(
                        kb = %kb.id,
                        file = original_name,
                        error = %del,
                        "failed to roll back vectors after catalog error"
                    );
                }
                Err(e)
            }
        }
    }

    /// Delete a knowledge base, vectors first so no orphans remain.
    pub async fn delete_knowledge_base(&self, kb_id: &str) -> Result<()> {
        // Existence check up front so a bad id is NotFound, not a silent
        // index delete.
        self.catalog.get(kb_id).await?;
        self.index.delete_kb(kb_id).await?;
        self.catalog.delete(kb_id).await
    }

    async fn resolve_target(&self, target: IngestTarget) -> Result<KnowledgeBase> {
        match target {
            IngestTarget::Create(spec) => self.catalog.create(&spec).await,
            IngestTarget::Existing(id) => self.catalog.get(&id).await,
        }
    }
}

/// One chunk's embedding output, held until the ingest target resolves
/// and the composite ids can be derived.
struct EmbeddedChunk {
    index: i64,
    snippet: String,
    vector: Vec<f32>,
}

fn stored_name(extension: &str) -> String {
    format!("{}.{}", Uuid::new_v4(), extension.to_ascii_lowercase())
}
