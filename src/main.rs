//! # Tutor KB CLI (`tkb`)
//!
//! The `tkb` binary drives the knowledge-base pipeline: database
//! initialization, file ingestion, knowledge-base administration,
//! retrieval queries, and the HTTP API server.
//!
//! ## Usage
//!
//! ```bash
//! tkb --config ./config/tkb.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `tkb init` | Create the SQLite database and run schema migrations |
//! | `tkb ingest <file>` | Ingest a PDF/TXT/DOCX into a knowledge base |
//! | `tkb list` | List knowledge bases with counters |
//! | `tkb delete <id>` | Delete a knowledge base and its vectors |
//! | `tkb query <id> "<question>"` | Retrieve ranked context snippets |
//! | `tkb serve` | Start the HTTP API server |
//!
//! ## Examples
//!
//! ```bash
//! tkb init --config ./config/tkb.toml
//! tkb ingest notes.pdf --name "IB Mathematics AA HL" --board IB --subject Mathematics --level HL
//! tkb ingest more-notes.pdf --kb <kb-id>
//! tkb query <kb-id> "derivative of x^2" --top-k 3
//! tkb serve
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

use tutor_kb::catalog::{Catalog, NewKnowledgeBase};
use tutor_kb::config::{load_config, Config};
use tutor_kb::embedding::create_embedder;
use tutor_kb::index::{SqliteVectorIndex, UnconfiguredIndex, VectorIndex};
use tutor_kb::ingest::{IngestTarget, Ingestor};
use tutor_kb::retrieve::{Retrieval, Retriever};
use tutor_kb::server::{run_server, AppState};
use tutor_kb::{db, migrate};

/// Tutor KB — knowledge-base ingestion and retrieval for an educational
/// tutoring service.
#[derive(Parser)]
#[command(
    name = "tkb",
    about = "Tutor KB — knowledge-base ingestion and retrieval pipeline",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/tkb.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Ingest a file into a knowledge base.
    ///
    /// Pass `--kb <id>` to append to an existing knowledge base, or
    /// `--name` (plus optional metadata) to create a new one.
    Ingest {
        /// Path to a .pdf, .txt, or .docx file.
        file: PathBuf,

        /// Existing knowledge-base id to append to.
        #[arg(long, conflicts_with = "name")]
        kb: Option<String>,

        /// Name for a new knowledge base.
        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        description: Option<String>,

        /// Educational board (e.g. IB, AQA).
        #[arg(long)]
        board: Option<String>,

        #[arg(long)]
        subject: Option<String>,

        /// Level tag (e.g. HL, SL, GCSE).
        #[arg(long)]
        level: Option<String>,
    },

    /// List all knowledge bases with their counters.
    List,

    /// Delete a knowledge base and all of its vectors.
    Delete {
        /// Knowledge-base id.
        id: String,
    },

    /// Retrieve ranked context snippets for a question.
    Query {
        /// Knowledge-base id.
        id: String,

        /// Natural-language question.
        question: String,

        /// Number of snippets to return.
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Start the HTTP API server.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tutor_kb=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&config.db.path).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("initialized {}", config.db.path.display());
        }
        Commands::Ingest {
            file,
            kb,
            name,
            description,
            board,
            subject,
            level,
        } => {
            let target = match (kb, name) {
                (Some(id), _) => IngestTarget::Existing(id),
                (None, Some(name)) => IngestTarget::Create(NewKnowledgeBase {
                    name,
                    description,
                    board,
                    subject,
                    level,
                }),
                (None, None) => anyhow::bail!("pass --kb <id> or --name <new name>"),
            };

            let original_name = file
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| anyhow::anyhow!("invalid file name: {}", file.display()))?
                .to_string();
            let bytes = std::fs::read(&file)?;

            let (ingestor, _, pool) = build_pipeline(&config).await?;
            let report = ingestor
                .ingest_file(target, &original_name, &bytes)
                .await?;
            pool.close().await;

            println!("ingested {}", original_name);
            println!("  knowledge base: {} ({})", report.knowledge_base.name, report.knowledge_base.id);
            println!("  chunks added: {}", report.file.chunk_count);
            println!("  tokens (approx): {}", report.file.token_count);
            println!("  total chunks: {}", report.knowledge_base.total_chunks);
            println!("  total tokens: {}", report.knowledge_base.total_tokens);
            println!("ok");
        }
        Commands::List => {
            let pool = db::connect(&config.db.path).await?;
            let catalog = Catalog::new(pool.clone());
            let kbs = catalog.list().await?;
            if kbs.is_empty() {
                println!("no knowledge bases");
            }
            for kb in kbs {
                println!("{} — {}", kb.id, kb.name);
                if let Some(subject) = &kb.subject {
                    println!("  subject: {}", subject);
                }
                println!("  files: {}", kb.files.len());
                println!("  chunks: {}  tokens: {}", kb.total_chunks, kb.total_tokens);
            }
            pool.close().await;
        }
        Commands::Delete { id } => {
            let (ingestor, _, pool) = build_pipeline(&config).await?;
            ingestor.delete_knowledge_base(&id).await?;
            pool.close().await;
            println!("deleted {}", id);
        }
        Commands::Query { id, question, top_k } => {
            let (_, retriever, pool) = build_pipeline(&config).await?;
            match retriever.retrieve(&id, &question, top_k).await {
                Retrieval::Unavailable => println!("retrieval unavailable (no index or embedder)"),
                Retrieval::Snippets(snippets) if snippets.is_empty() => println!("no matches"),
                Retrieval::Snippets(snippets) => {
                    for (i, s) in snippets.iter().enumerate() {
                        println!("{}. [{:.3}] {} #{}", i + 1, s.score, s.filename, s.chunk_index);
                        println!("    \"{}\"", s.text.replace('\n', " "));
                    }
                }
            }
            pool.close().await;
        }
        Commands::Serve => {
            let (ingestor, retriever, pool) = build_pipeline(&config).await?;
            let state = AppState {
                catalog: Catalog::new(pool.clone()),
                ingestor,
                retriever,
                max_file_bytes: config.upload.max_file_bytes,
            };
            run_server(&config, state).await?;
        }
    }

    Ok(())
}

/// Wires the embedder, index, and catalog into an ingestor/retriever pair.
async fn build_pipeline(
    config: &Config,
) -> Result<(Arc<Ingestor>, Arc<Retriever>, sqlx::SqlitePool)> {
    let pool = db::connect(&config.db.path).await?;
    migrate::run_migrations(&pool).await?;

    let embedder: Arc<dyn tutor_kb::embedding::EmbeddingClient> =
        Arc::from(create_embedder(&config.embedding)?);

    let index: Arc<dyn VectorIndex> = match config.index.backend.as_str() {
        "sqlite" => Arc::new(SqliteVectorIndex::new(
            pool.clone(),
            config.embedding.dims.unwrap_or(0),
        )),
        _ => Arc::new(UnconfiguredIndex),
    };

    let catalog = Catalog::new(pool.clone());

    let ingestor = Arc::new(Ingestor::new(
        embedder.clone(),
        index.clone(),
        catalog,
        config.chunking.max_chunk_chars,
        config.embedding.max_input_chars,
        config.retrieval.snippet_max_chars,
    ));
    let retriever = Arc::new(Retriever::new(
        embedder,
        index,
        config.retrieval.top_k,
        config.embedding.max_input_chars,
    ));

    Ok((ingestor, retriever, pool))
}
