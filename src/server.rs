//! HTTP API for uploads, knowledge-base administration, and retrieval.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/kb/upload` | Multipart upload into a new or existing knowledge base |
//! | `GET`  | `/kb` | List knowledge bases with counters and manifests |
//! | `DELETE` | `/kb/{id}` | Delete a knowledge base and its vectors |
//! | `POST` | `/kb/{id}/query` | Retrieve ranked context snippets |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! Failures return `{"error": code, "details": message}` where `code` is the
//! stable machine-readable kind and `details` is human-readable:
//!
//! ```json
//! { "error": "empty_content", "details": "file has no extractable text" }
//! ```
//!
//! Statuses: 400 bad request / unsupported format / empty content,
//! 404 not found, 409 duplicate name, 413 file too large,
//! 422 extraction failed, 502 embedding failed, 503 index unavailable.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! front ends.

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use uuid::Uuid;

use crate::catalog::{Catalog, NewKnowledgeBase};
use crate::config::Config;
use crate::error::PipelineError;
use crate::ingest::{IngestTarget, Ingestor};
use crate::retrieve::{Retrieval, Retriever};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Catalog,
    pub ingestor: Arc<Ingestor>,
    pub retriever: Arc<Retriever>,
    pub max_file_bytes: u64,
}

/// Builds the API router for the given state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let body_limit = state.max_file_bytes as usize + 1024 * 1024; // multipart overhead

    Router::new()
        .route("/kb/upload", post(handle_upload))
        .route("/kb", get(handle_list))
        .route("/kb/{id}", delete(handle_delete))
        .route("/kb/{id}/query", post(handle_query))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(state)
}

/// Binds and serves the API until the process is terminated.
pub async fn run_server(config: &Config, state: AppState) -> anyhow::Result<()> {
    let app = router(state);
    info!(bind = %config.server.bind, "API server listening");
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

// ============ Error response ============

/// Error response with a machine-readable `error` code and human-readable
/// `details`, so a front end can show an actionable message without
/// leaking internals.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
    details: String,
}

struct ApiError {
    status: StatusCode,
    code: String,
    details: String,
}

impl ApiError {
    fn bad_request(code: &str, details: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: code.to_string(),
            details: details.into(),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        let status = match &err {
            PipelineError::UnsupportedFormat(_) | PipelineError::EmptyContent => {
                StatusCode::BAD_REQUEST
            }
            PipelineError::ExtractionFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PipelineError::DuplicateName(_) => StatusCode::CONFLICT,
            PipelineError::NotFound(_) => StatusCode::NOT_FOUND,
            PipelineError::EmbeddingFailed { .. } => StatusCode::BAD_GATEWAY,
            PipelineError::IndexUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            PipelineError::Catalog(_) | PipelineError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            code: err.code().to_string(),
            details: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.code,
            details: self.details,
        };
        (self.status, Json(body)).into_response()
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /kb/upload ============

#[derive(Default)]
struct UploadForm {
    file_name: Option<String>,
    file_bytes: Option<Vec<u8>>,
    criteria_id: Option<String>,
    criteria_name: Option<String>,
    description: Option<String>,
    educational_board: Option<String>,
    subject: Option<String>,
    level: Option<String>,
}

async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<crate::models::IngestReport>, ApiError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request("bad_request", e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                form.file_name = field.file_name().map(|s| s.to_string());
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request("bad_request", e.to_string()))?;
                form.file_bytes = Some(bytes.to_vec());
            }
            other => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request("bad_request", e.to_string()))?;
                let value = value.trim().to_string();
                if value.is_empty() {
                    continue;
                }
                match other {
                    "criteriaId" => form.criteria_id = Some(value),
                    "criteriaName" => form.criteria_name = Some(value),
                    "description" => form.description = Some(value),
                    "educationalBoard" => form.educational_board = Some(value),
                    "subject" => form.subject = Some(value),
                    "level" => form.level = Some(value),
                    _ => {}
                }
            }
        }
    }

    let bytes = form
        .file_bytes
        .ok_or_else(|| ApiError::bad_request("bad_request", "missing 'file' field"))?;
    let original_name = form
        .file_name
        .ok_or_else(|| ApiError::bad_request("bad_request", "uploaded file has no filename"))?;

    if bytes.len() as u64 > state.max_file_bytes {
        return Err(ApiError {
            status: StatusCode::PAYLOAD_TOO_LARGE,
            code: "file_too_large".to_string(),
            details: format!(
                "file is {} bytes, limit is {}",
                bytes.len(),
                state.max_file_bytes
            ),
        });
    }

    let target = match (form.criteria_id, form.criteria_name) {
        (Some(id), _) => IngestTarget::Existing(id),
        (None, Some(name)) => IngestTarget::Create(NewKnowledgeBase {
            name,
            description: form.description,
            board: form.educational_board,
            subject: form.subject,
            level: form.level,
        }),
        (None, None) => {
            return Err(ApiError::bad_request(
                "bad_request",
                "provide criteriaId or criteriaName",
            ))
        }
    };

    // Spool to disk so the ingestor's guaranteed temp-file cleanup covers
    // the upload regardless of outcome.
    let temp_path = std::env::temp_dir().join(format!("tkb-upload-{}", Uuid::new_v4()));
    spool_to_disk(&temp_path, &bytes).map_err(PipelineError::Io)?;

    let report = state
        .ingestor
        .ingest_temp_file(target, &original_name, &temp_path)
        .await?;

    Ok(Json(report))
}

/// Write the upload to a temp path, removing any partially written file
/// if the write fails. The ingestor's cleanup only sees paths that were
/// fully written.
fn spool_to_disk(path: &std::path::Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Err(e) = std::fs::write(path, bytes) {
        let _ = std::fs::remove_file(path);
        return Err(e);
    }
    Ok(())
}

// ============ GET /kb ============

#[derive(Serialize)]
struct ListResponse {
    knowledge_bases: Vec<crate::models::KnowledgeBase>,
}

async fn handle_list(State(state): State<AppState>) -> Result<Json<ListResponse>, ApiError> {
    let knowledge_bases = state.catalog.list().await?;
    Ok(Json(ListResponse { knowledge_bases }))
}

// ============ DELETE /kb/{id} ============

#[derive(Serialize)]
struct DeleteResponse {
    deleted: String,
}

async fn handle_delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    state.ingestor.delete_knowledge_base(&id).await?;
    Ok(Json(DeleteResponse { deleted: id }))
}

// ============ POST /kb/{id}/query ============

#[derive(Deserialize)]
struct QueryRequest {
    query: String,
    #[serde(rename = "topK", default)]
    top_k: Option<usize>,
}

#[derive(Serialize)]
struct QueryResponse {
    /// `false` when the index backend is down or the query embedding
    /// failed; distinguishes "no context available" from "no matches".
    available: bool,
    snippets: Vec<crate::models::RetrievedSnippet>,
}

async fn handle_query(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    // 404 for unknown knowledge bases; an existing-but-empty one answers
    // with an empty snippet list instead.
    state.catalog.get(&id).await?;

    let response = match state.retriever.retrieve(&id, &req.query, req.top_k).await {
        Retrieval::Snippets(snippets) => QueryResponse {
            available: true,
            snippets,
        },
        Retrieval::Unavailable => QueryResponse {
            available: false,
            snippets: Vec::new(),
        },
    };
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spool_writes_and_is_removable() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("upload.bin");
        spool_to_disk(&path, b"payload").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"payload");
    }

    #[test]
    fn failed_spool_leaves_no_file_behind() {
        let tmp = tempfile::tempdir().unwrap();
        // Writing over a directory fails; nothing may remain at the path
        // afterwards for the ingestor to trip on.
        let path = tmp.path().join("occupied");
        std::fs::create_dir(&path).unwrap();
        assert!(spool_to_disk(&path, b"payload").is_err());

        let missing_parent = tmp.path().join("no-such-dir").join("upload.bin");
        assert!(spool_to_disk(&missing_parent, b"payload").is_err());
        assert!(!missing_parent.exists());
    }

    #[test]
    fn error_statuses_follow_the_taxonomy() {
        let cases = [
            (PipelineError::EmptyContent, StatusCode::BAD_REQUEST),
            (
                PipelineError::UnsupportedFormat("gif".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                PipelineError::ExtractionFailed("bad pdf".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                PipelineError::DuplicateName("x".into()),
                StatusCode::CONFLICT,
            ),
            (PipelineError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (
                PipelineError::EmbeddingFailed {
                    chunk_index: 0,
                    reason: "down".into(),
                },
                StatusCode::BAD_GATEWAY,
            ),
            (
                PipelineError::IndexUnavailable("down".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];
        for (err, status) in cases {
            let api: ApiError = err.into();
            assert_eq!(api.status, status, "wrong status for {}", api.code);
        }
    }
}
