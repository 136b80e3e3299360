//! # Tutor KB
//!
//! Knowledge-base ingestion and retrieval pipeline for an educational
//! tutoring service.
//!
//! Uploaded documents (PDF/TXT/DOCX) are parsed, normalized, split into
//! sentence-respecting chunks, embedded, and upserted into a vector index
//! under stable composite ids. At question time the pipeline embeds the
//! query and returns the top-K most similar chunks of one knowledge base
//! as grounding context for the chat-response generator.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────┐   ┌─────────────────────────┐   ┌──────────────┐
//! │ Upload │──▶│ Extract → Chunk → Embed │──▶│ VectorIndex   │
//! │ (HTTP) │   │      (fail-fast)        │   │ + Catalog     │
//! └────────┘   └─────────────────────────┘   └──────┬───────┘
//!                                                   │
//!                               ┌───────────────────┤
//!                               ▼                   ▼
//!                          ┌─────────┐       ┌───────────┐
//!                          │   CLI   │       │ Retrieval │
//!                          │  (tkb)  │       │  (top-K)  │
//!                          └─────────┘       └───────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Closed pipeline error taxonomy |
//! | [`models`] | Core data types |
//! | [`extract`] | Multi-format text extraction and normalization |
//! | [`chunk`] | Sentence-boundary chunking |
//! | [`embedding`] | Embedding client abstraction |
//! | [`index`] | Vector index abstraction (SQLite, in-memory) |
//! | [`catalog`] | Knowledge-base catalog and counters |
//! | [`ingest`] | Ingestion orchestration |
//! | [`retrieve`] | Query-time retrieval |
//! | [`server`] | HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod catalog;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod retrieve;
pub mod server;
