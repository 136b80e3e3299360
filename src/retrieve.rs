//! Query-time retrieval of grounding context.
//!
//! Retrieval is advisory: the chat-response generator works without it, so
//! embedding or index failures degrade to [`Retrieval::Unavailable`] with a
//! warning instead of failing the caller's turn. An empty snippet list is a
//! real "no matches" result and is kept distinct from the index being down.

use std::sync::Arc;

use tracing::warn;

use crate::embedding::{truncate_for_embedding, EmbeddingClient};
use crate::error::PipelineError;
use crate::index::VectorIndex;
use crate::models::RetrievedSnippet;

/// Outcome of a retrieval attempt.
#[derive(Debug, Clone)]
pub enum Retrieval {
    /// Ranked snippets, best first. May be empty (no matches).
    Snippets(Vec<RetrievedSnippet>),
    /// Index not configured/reachable or the query embedding failed.
    Unavailable,
}

pub struct Retriever {
    embedder: Arc<dyn EmbeddingClient>,
    index: Arc<dyn VectorIndex>,
    default_top_k: usize,
    max_embed_chars: usize,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        index: Arc<dyn VectorIndex>,
        default_top_k: usize,
        max_embed_chars: usize,
    ) -> Self {
        Self {
            embedder,
            index,
            default_top_k,
            max_embed_chars,
        }
    }

    /// Retrieve ranked context snippets for a question, restricted to one
    /// knowledge base. `top_k` falls back to the configured default.
    pub async fn retrieve(&self, kb_id: &str, query: &str, top_k: Option<usize>) -> Retrieval {
        if query.trim().is_empty() {
            return Retrieval::Snippets(Vec::new());
        }
        let top_k = top_k.unwrap_or(self.default_top_k);

        let (input, _) = truncate_for_embedding(query, self.max_embed_chars);
        let query_vec = match self.embedder.embed(input).await {
            Ok(v) => v,
            Err(e) => {
                warn!(kb = kb_id, error = %e, "query embedding failed, retrieval degraded");
                return Retrieval::Unavailable;
            }
        };

        match self.index.query(&query_vec, top_k, kb_id).await {
            Ok(matches) => Retrieval::Snippets(
                matches
                    .into_iter()
                    .map(|m| RetrievedSnippet {
                        text: m.text,
                        score: m.score,
                        filename: m.filename,
                        chunk_index: m.chunk_index,
                    })
                    .collect(),
            ),
            Err(PipelineError::IndexUnavailable(reason)) => {
                warn!(kb = kb_id, reason, "vector index unavailable, retrieval degraded");
                Retrieval::Unavailable
            }
            Err(e) => {
                warn!(kb = kb_id, error = %e, "vector query failed, retrieval degraded");
                Retrieval::Unavailable
            }
        }
    }
}
