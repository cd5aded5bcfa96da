//! Legal QA CLI
//!
//! Builds the vector index from a reference corpus and answers single
//! multiple-choice questions against it.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use legal_qa_rag::{
    agent::{AnsweringAgent, Answerer, ClosedBookAgent, RagAgent},
    batch::{BatchOptions, BatchOrchestrator, OpenAiBatchApi},
    chunker::Chunker,
    config::Config,
    corpus::load_corpus,
    eval::QARecord,
    index::IndexArtifacts,
    indexer::{EMBEDDING_RUN, IndexBuilder},
    llm::{LlmClient, OpenAiEmbedder},
    retriever::Retriever,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Legal QA - retrieval-augmented multiple-choice answering
#[derive(Parser)]
#[command(name = "legal-qa")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a YAML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the vector index from a corpus file or directory
    Index {
        /// Path to a .jsonl/.txt file or a directory of them
        corpus: PathBuf,

        /// Call the embedding endpoint directly instead of using bulk jobs
        #[arg(long)]
        direct: bool,

        /// Resubmit parts whose bulk job failed or was cancelled
        #[arg(long)]
        retry_failed: bool,

        /// Bulk run name (one directory per run under the batch dir)
        #[arg(long, default_value = EMBEDDING_RUN)]
        run: String,
    },

    /// Answer a single multiple-choice question
    Ask {
        /// The question text
        question: String,

        #[arg(short = 'a', long = "option-a")]
        a: String,
        #[arg(short = 'b', long = "option-b")]
        b: String,
        #[arg(short = 'c', long = "option-c")]
        c: String,
        #[arg(short = 'd', long = "option-d")]
        d: String,

        /// Number of passages to retrieve
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Answer without retrieval
        #[arg(long)]
        closed_book: bool,
    },

    /// Show the passages retrieved for a query
    Search {
        /// The search query
        query: String,

        /// Number of passages to return
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// Cancel the live bulk jobs of a run
    Cancel {
        #[arg(default_value = EMBEDDING_RUN)]
        run: String,
    },

    /// Show information about the built index
    Info,

    /// Test LLM connection
    Test,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Index {
            corpus,
            direct,
            retry_failed,
            run,
        } => cmd_index(config_path, corpus, direct, retry_failed, run).await,
        Commands::Ask {
            question,
            a,
            b,
            c,
            d,
            top_k,
            closed_book,
        } => {
            let record = QARecord::new(question, [&a, &b, &c, &d].map(String::as_str), None);
            cmd_ask(config_path, record, top_k, closed_book).await
        }
        Commands::Search { query, top_k } => cmd_search(config_path, query, top_k).await,
        Commands::Cancel { run } => cmd_cancel(config_path, run).await,
        Commands::Info => cmd_info(config_path),
        Commands::Test => cmd_test(config_path).await,
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = Config::load(path).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn orchestrator(config: &Config, retry_failed: bool) -> BatchOrchestrator {
    let api = Arc::new(OpenAiBatchApi::new(
        &config.llm,
        config.batch.completion_window.clone(),
    ));
    let options = BatchOptions {
        retry_failed,
        ..BatchOptions::from(&config.batch)
    };
    BatchOrchestrator::new(api, config.paths.batch_dir(), options)
}

async fn cmd_index(
    config_path: Option<&Path>,
    corpus: PathBuf,
    direct: bool,
    retry_failed: bool,
    run: String,
) -> Result<()> {
    let config = load_config(config_path)?;
    info!("Indexing corpus {} with {}", corpus.display(), config.embedding.model);

    let start = Instant::now();

    let documents = load_corpus(&corpus).context("Failed to load corpus")?;
    let chunker = Chunker::from_config(&config.chunking).context("Invalid chunking settings")?;
    let builder = IndexBuilder::new(chunker, config.embedding.clone());
    let chunks = builder.chunk(&documents).context("Failed to chunk corpus")?;

    let embeddings = if direct {
        let embedder = OpenAiEmbedder::new(&config.llm, config.embedding.clone());
        builder
            .embed_direct(&embedder, &chunks, config.batch.max_batch_size)
            .await
            .context("Direct embedding failed")?
    } else {
        builder
            .embed_with_batch(&orchestrator(&config, retry_failed), &run, &chunks)
            .await
            .context("Bulk embedding failed")?
    };

    let artifacts = builder
        .assemble(builder.embedding_model(), chunks, embeddings)
        .context("Failed to build index")?;
    let index_dir = config.paths.index_dir();
    artifacts
        .save(&index_dir)
        .context("Failed to save index")?;

    println!("\nIndex Built:");
    println!("  Documents:   {}", documents.len());
    println!("  Chunks:      {}", artifacts.index.len());
    println!("  Dimension:   {}", artifacts.index.dimension());
    println!("  Build time:  {:.2?}", start.elapsed());
    println!("\nIndex saved to: {}", index_dir.display());

    Ok(())
}

async fn cmd_ask(
    config_path: Option<&Path>,
    record: QARecord,
    top_k: Option<usize>,
    closed_book: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let agent = AnsweringAgent::new(Arc::new(LlmClient::new(config.llm.clone())));

    let answerer: Box<dyn Answerer> = if closed_book {
        Box::new(ClosedBookAgent::new(agent))
    } else {
        let retriever = Retriever::open(&config).context("Failed to open index")?;
        let k = top_k.unwrap_or(config.retrieval.top_k);
        Box::new(RagAgent::new(retriever, agent, k))
    };

    let answer = answerer
        .answer_record(&record)
        .await
        .context("Failed to answer question")?;
    println!("{}", answer);

    Ok(())
}

async fn cmd_search(config_path: Option<&Path>, query: String, top_k: Option<usize>) -> Result<()> {
    let config = load_config(config_path)?;
    let retriever = Retriever::open(&config).context("Failed to open index")?;
    let k = top_k.unwrap_or(config.retrieval.top_k);

    let start = Instant::now();
    let passages = retriever
        .retrieve_scored(&query, k)
        .await
        .context("Search failed")?;

    println!("Results:");
    println!("{}", "─".repeat(60));
    for (i, passage) in passages.iter().enumerate() {
        println!(
            "{:>2}. chunk {} (score {:.4})",
            i + 1,
            passage.position,
            passage.score
        );
        let preview: String = passage.text.chars().take(200).collect();
        for line in preview.lines().take(3) {
            println!("      {}", line);
        }
        if passage.text.chars().count() > 200 {
            println!("      ...");
        }
        println!();
    }
    println!("{}", "─".repeat(60));
    println!("Found {} passages in {:.2?}", passages.len(), start.elapsed());

    Ok(())
}

async fn cmd_cancel(config_path: Option<&Path>, run: String) -> Result<()> {
    let config = load_config(config_path)?;
    let cancelled = orchestrator(&config, false)
        .cancel(&run)
        .await
        .with_context(|| format!("Failed to cancel run '{}'", run))?;
    println!("Cancelled {} job(s) in run '{}'", cancelled, run);
    Ok(())
}

fn cmd_info(config_path: Option<&Path>) -> Result<()> {
    let config = Config::load(config_path).context("Failed to load configuration")?;
    let index_dir = config.paths.index_dir();

    if !IndexArtifacts::exist(&index_dir) {
        anyhow::bail!(
            "Index not found at '{}'. Run 'index' command first.",
            index_dir.display()
        );
    }

    let artifacts = IndexArtifacts::load(&index_dir).context("Failed to load index")?;
    let size = std::fs::metadata(IndexArtifacts::index_path(&index_dir))
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Index Information");
    println!("{}", "─".repeat(40));
    println!("  Model:        {}", artifacts.index.model());
    println!("  Chunks:       {}", artifacts.index.len());
    println!("  Dimension:    {}", artifacts.index.dimension());
    println!("  File size:    {:.1} KB", size as f64 / 1024.0);
    println!("  Index path:   {}", index_dir.display());

    Ok(())
}

async fn cmd_test(config_path: Option<&Path>) -> Result<()> {
    println!("Testing LLM connection...\n");

    let config = Config::load(config_path).context("Failed to load configuration")?;

    println!("Configuration:");
    println!("  API Base:  {}", config.llm.api_base);
    println!("  Model:     {}", config.llm.model);
    println!("  Embedding: {}", config.embedding.model);
    let key_prefix: String = config.llm.api_key.chars().take(8).collect();
    println!("  API Key:   {}...", key_prefix);
    println!();

    config.validate().context("Invalid configuration")?;

    let client = LlmClient::new(config.llm);

    println!("Sending test request...");
    client
        .test_connection()
        .await
        .context("Connection failed")?;
    println!("Connection successful!");

    Ok(())
}
