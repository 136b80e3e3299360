//! Closed error taxonomy for the ingestion and retrieval pipeline.
//!
//! Every fallible pipeline operation returns [`PipelineError`]; HTTP and CLI
//! layers map variants to status codes and exit messages. [`PipelineError::code`]
//! is the stable machine-readable kind surfaced in API error bodies, so
//! renaming a variant must not change its code.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The uploaded file's extension is not one of pdf/txt/docx.
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// The file matched a supported format but could not be parsed.
    #[error("text extraction failed: {0}")]
    ExtractionFailed(String),

    /// Extraction and chunking produced no usable text.
    #[error("file has no extractable text")]
    EmptyContent,

    /// The embedding provider failed for one chunk; the whole file aborts.
    #[error("embedding failed at chunk {chunk_index}: {reason}")]
    EmbeddingFailed { chunk_index: usize, reason: String },

    /// The vector index backend is not configured or not reachable.
    #[error("vector index unavailable: {0}")]
    IndexUnavailable(String),

    /// A knowledge base with this name already exists.
    #[error("knowledge base name already in use: {0}")]
    DuplicateName(String),

    /// No knowledge base with this id.
    #[error("knowledge base not found: {0}")]
    NotFound(String),

    #[error("catalog error: {0}")]
    Catalog(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Stable machine-readable code for API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::UnsupportedFormat(_) => "unsupported_format",
            PipelineError::ExtractionFailed(_) => "extraction_failed",
            PipelineError::EmptyContent => "empty_content",
            PipelineError::EmbeddingFailed { .. } => "embedding_failed",
            PipelineError::IndexUnavailable(_) => "index_unavailable",
            PipelineError::DuplicateName(_) => "duplicate_name",
            PipelineError::NotFound(_) => "not_found",
            PipelineError::Catalog(_) => "catalog_error",
            PipelineError::Io(_) => "io_error",
        }
    }
}
