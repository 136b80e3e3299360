//! Core data models for the knowledge-base pipeline.
//!
//! These types represent the knowledge bases, file manifests, chunks, and
//! vector entries that flow through ingestion and retrieval.

use serde::Serialize;

/// One logical corpus (e.g. "IB Mathematics AA HL").
///
/// Invariant: `total_chunks` and `total_tokens` always equal the sums over
/// `files`; [`crate::catalog::Catalog::append_file`] updates both in one
/// transaction.
#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeBase {
    pub id: String,
    /// Unique, trimmed display name.
    pub name: String,
    pub description: Option<String>,
    /// Educational metadata tags.
    pub board: Option<String>,
    pub subject: Option<String>,
    pub level: Option<String>,
    pub total_chunks: i64,
    pub total_tokens: i64,
    pub files: Vec<FileManifest>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// One ingested source file within a knowledge base. Owned exclusively by
/// its parent; never referenced elsewhere.
#[derive(Debug, Clone, Serialize)]
pub struct FileManifest {
    /// Generated storage filename (uuid + original extension).
    pub stored_name: String,
    pub original_name: String,
    pub byte_size: i64,
    pub uploaded_at: i64,
    /// Chunks this file contributed to the index.
    pub chunk_count: i64,
    /// Approximate token estimate for the file's extracted text.
    pub token_count: i64,
}

/// A bounded span of normalized text. Transient: exists only during
/// ingestion and as metadata inside a [`VectorEntry`].
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Position within the file's chunk sequence, assigned in text order.
    pub index: usize,
    pub text: String,
    /// Approximate token count (`ceil(chars / 4)`), never exact.
    pub token_estimate: usize,
}

/// One row in the vector store.
#[derive(Debug, Clone)]
pub struct VectorEntry {
    /// Deterministic composite id, `{kb_id}_{filename}_{chunk_index}`.
    /// Re-derivable, so re-ingesting the same file overwrites.
    pub id: String,
    pub kb_id: String,
    pub kb_name: String,
    pub filename: String,
    pub chunk_index: i64,
    /// Source text truncated to the configured snippet cap.
    pub text: String,
    pub vector: Vec<f32>,
}

/// A scored entry returned from a vector-index query.
#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub id: String,
    pub score: f32,
    pub kb_id: String,
    pub filename: String,
    pub chunk_index: i64,
    pub text: String,
}

/// A ranked context snippet handed to the chat-response generator.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedSnippet {
    pub text: String,
    pub score: f32,
    pub filename: String,
    pub chunk_index: i64,
}

/// Caller-visible result of a successful ingestion.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    /// Updated (possibly newly created) knowledge base with fresh counters.
    pub knowledge_base: KnowledgeBase,
    pub file: FileManifest,
}
