use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};

use docsift_index::chunker::ChunkerConfig;
use docsift_index::engine::{EngineConfig, RagEngine};
use docsift_index::ingest::Ingestor;
use docsift_index::store::{IndexConfig, VectorIndex};
use docsift_llm::openai::OpenAiProvider;
use docsift_store::SqliteStore;
use docsift_store::types::DocumentRecord;

mod config;
mod loader;

use config::Config;

#[derive(Parser)]
#[command(name = "docsift", version, about = "Document Q&A with page-accurate citations")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, default_value = "config/default.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest one or more documents into the index.
    Ingest { files: Vec<PathBuf> },
    /// Ask a question against the indexed documents.
    Ask {
        question: String,
        /// Restrict retrieval to these document ids (repeatable).
        #[arg(long = "document")]
        documents: Vec<String>,
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Show ingested documents and index size.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    std::fs::create_dir_all(&config.data.dir).context("failed to create data directory")?;

    let api_key = std::env::var("OPENAI_API_KEY").ok();
    if api_key.is_none() {
        tracing::warn!("OPENAI_API_KEY not set, answers fall back to extractive mode");
    }
    let provider = Arc::new(OpenAiProvider::new(
        &config.llm.base_url,
        api_key,
        config.llm.model.clone(),
        config.llm.embedding_model.clone(),
    ));

    let store = Arc::new(SqliteStore::new(&config.data.sqlite_path).await?);
    let index = Arc::new(
        VectorIndex::open(
            Path::new(&config.data.dir),
            Arc::clone(&provider),
            IndexConfig {
                overfetch: config.retrieval.overfetch,
            },
        )
        .await?,
    );

    match cli.command {
        Command::Ingest { files } => ingest(&config, &store, &index, &files).await,
        Command::Ask {
            question,
            documents,
            top_k,
        } => {
            ask(
                &config,
                Arc::clone(&provider),
                Arc::clone(&index),
                &store,
                &question,
                &documents,
                top_k,
            )
            .await
        }
        Command::Status => status(&store, &index).await,
    }
}

async fn ingest(
    config: &Config,
    store: &Arc<SqliteStore>,
    index: &Arc<VectorIndex<OpenAiProvider>>,
    files: &[PathBuf],
) -> anyhow::Result<()> {
    anyhow::ensure!(!files.is_empty(), "no input files given");

    let ingestor = Ingestor::new(
        Arc::clone(store),
        Arc::clone(index),
        ChunkerConfig {
            max_chars: config.chunker.max_chars,
            overlap: config.chunker.overlap,
        },
    );

    for file in files {
        let pages = load_pages(file).await?;
        let document_id = uuid::Uuid::new_v4().to_string();
        let filename = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| document_id.clone());

        store
            .insert_document(&DocumentRecord {
                id: document_id.clone(),
                filename: filename.clone(),
                num_pages: u32::try_from(pages.len()).unwrap_or(u32::MAX),
            })
            .await?;

        let report = ingestor.ingest_pages(&document_id, &pages).await?;
        tracing::info!(
            document = %document_id,
            file = %filename,
            pages = report.pages,
            chunks = report.chunks_created,
            "document ingested"
        );
        println!("{document_id}  {filename}");
    }
    Ok(())
}

async fn load_pages(file: &Path) -> anyhow::Result<Vec<docsift_index::chunker::PageRecord>> {
    #[cfg(feature = "pdf")]
    if file.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("pdf")) {
        return loader::pages_from_pdf(file).await;
    }

    let text = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
    Ok(loader::pages_from_text(&text))
}

async fn ask(
    config: &Config,
    provider: Arc<OpenAiProvider>,
    index: Arc<VectorIndex<OpenAiProvider>>,
    store: &Arc<SqliteStore>,
    question: &str,
    documents: &[String],
    top_k: Option<usize>,
) -> anyhow::Result<()> {
    let engine = RagEngine::new(
        provider,
        index,
        (**store).clone(),
        EngineConfig {
            fallback_sentences: config.retrieval.fallback_sentences,
            backend_timeout: Duration::from_secs(config.retrieval.backend_timeout_secs),
            ..EngineConfig::default()
        },
    );

    let filter: Option<HashSet<String>> = if documents.is_empty() {
        None
    } else {
        Some(documents.iter().cloned().collect())
    };

    let answer = engine
        .answer(
            question,
            filter.as_ref(),
            top_k.unwrap_or(config.retrieval.top_k),
        )
        .await?;

    println!("{}", serde_json::to_string_pretty(&answer)?);
    Ok(())
}

async fn status(
    store: &Arc<SqliteStore>,
    index: &Arc<VectorIndex<OpenAiProvider>>,
) -> anyhow::Result<()> {
    let documents = store.list_documents().await?;
    println!(
        "{} document(s), {} stored chunk(s), {} indexed vector(s)",
        documents.len(),
        store.chunk_count().await?,
        index.len().await,
    );
    for document in documents {
        println!("{}  {}  {} page(s)", document.id, document.filename, document.num_pages);
    }
    Ok(())
}
