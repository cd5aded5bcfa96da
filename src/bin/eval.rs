//! Evaluation CLI binary for measuring answer accuracy on a labeled test set.
//!
//! Usage:
//!   eval run <test-set>          # Answer each question synchronously
//!   eval batch <test-set>        # Answer through bulk completion jobs
//!   eval score <test-set>        # Score an already downloaded bulk output
//!   eval cancel                  # Cancel the live jobs of a bulk run
//!
//! Options:
//!   --max-items <N>              # Limit number of questions
//!   --top-k <N>                  # Passages retrieved per question
//!   --closed-book                # Answer without retrieval
//!   --score-file <path>          # Where to write the score summary

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use legal_qa_rag::{
    agent::{AnsweringAgent, Answerer, ClosedBookAgent, RagAgent},
    batch::{BatchEndpoint, BatchOptions, BatchOrchestrator, BatchOutputLine, OpenAiBatchApi},
    config::Config,
    eval::{
        EVAL_RUN, EvalReport, QARecord, build_batch_requests, evaluate, load_test_set,
        score_batch_output,
    },
    llm::LlmClient,
    persistence::read_jsonl,
    retriever::Retriever,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "eval")]
#[command(about = "Evaluate multiple-choice answer accuracy", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a YAML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Maximum number of questions to evaluate
    #[arg(long, global = true)]
    max_items: Option<usize>,

    /// Number of passages to retrieve (defaults to the configured top-k)
    #[arg(long, global = true)]
    top_k: Option<usize>,

    /// Answer without retrieval
    #[arg(long, global = true)]
    closed_book: bool,

    /// Bulk run name
    #[arg(long, global = true, default_value = EVAL_RUN)]
    run: String,

    /// Score summary path (defaults to <data dir>/score.txt)
    #[arg(long, global = true)]
    score_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer each question with a direct completion call
    Run {
        /// Test set (JSON array or JSON lines)
        test_set: PathBuf,
    },

    /// Answer all questions through bulk completion jobs, then score
    Batch {
        /// Test set (JSON array or JSON lines)
        test_set: PathBuf,

        /// Resubmit parts whose bulk job failed or was cancelled
        #[arg(long)]
        retry_failed: bool,
    },

    /// Score bulk completion output against the test set
    Score {
        /// Test set (JSON array or JSON lines)
        test_set: PathBuf,

        /// Downloaded output file; defaults to the outputs of the bulk run
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Cancel the live bulk jobs of the run
    Cancel,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

    let report = match &cli.command {
        Commands::Run { test_set } => {
            config.validate().context("Invalid configuration")?;
            let records = load_records(test_set, cli.max_items)?;
            run_sync(&cli, &config, &records).await?
        }
        Commands::Batch {
            test_set,
            retry_failed,
        } => {
            config.validate().context("Invalid configuration")?;
            let records = load_records(test_set, cli.max_items)?;
            run_batch(&cli, &config, &records, *retry_failed).await?
        }
        Commands::Score { test_set, output } => {
            let records = load_records(test_set, cli.max_items)?;
            let lines: Vec<BatchOutputLine> = match output {
                Some(path) => read_jsonl(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                None => orchestrator(&config, false)
                    .load_outputs(&cli.run)
                    .with_context(|| format!("Failed to load outputs of run '{}'", cli.run))?,
            };
            score_batch_output(&records, &lines)
        }
        Commands::Cancel => {
            config.validate().context("Invalid configuration")?;
            let cancelled = orchestrator(&config, false)
                .cancel(&cli.run)
                .await
                .with_context(|| format!("Failed to cancel run '{}'", cli.run))?;
            println!("Cancelled {} job(s) in run '{}'", cancelled, cli.run);
            return Ok(());
        }
    };

    report.print_summary();

    let score_file = cli
        .score_file
        .clone()
        .unwrap_or_else(|| config.paths.score_file());
    report
        .write_score(&score_file)
        .context("Failed to write score file")?;
    println!("Score saved to {}", score_file.display());

    Ok(())
}

fn load_records(path: &Path, max_items: Option<usize>) -> Result<Vec<QARecord>> {
    let mut records = load_test_set(path).context("Failed to load test set")?;
    if let Some(max) = max_items {
        records.truncate(max);
    }
    println!("Test set: {} ({} questions)", path.display(), records.len());
    Ok(records)
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

async fn run_sync(cli: &Cli, config: &Config, records: &[QARecord]) -> Result<EvalReport> {
    println!("LLM API Base: {}", config.llm.api_base);
    println!("LLM Model: {}", config.llm.model);

    let agent = AnsweringAgent::new(Arc::new(LlmClient::new(config.llm.clone())));
    let answerer: Box<dyn Answerer> = if cli.closed_book {
        Box::new(ClosedBookAgent::new(agent))
    } else {
        let retriever = Retriever::open(config).context("Failed to open index")?;
        let k = cli.top_k.unwrap_or(config.retrieval.top_k);
        Box::new(RagAgent::new(retriever, agent, k))
    };

    let start = Instant::now();
    let report = evaluate(records, answerer.as_ref())
        .await
        .context("Evaluation aborted")?;
    info!("Evaluated {} questions in {:.1?}", records.len(), start.elapsed());
    Ok(report)
}

async fn run_batch(
    cli: &Cli,
    config: &Config,
    records: &[QARecord],
    retry_failed: bool,
) -> Result<EvalReport> {
    let retriever = if cli.closed_book {
        None
    } else {
        Some(Retriever::open(config).context("Failed to open index")?)
    };
    let k = cli.top_k.unwrap_or(config.retrieval.top_k);

    let requests = build_batch_requests(records, retriever.as_ref(), k, &config.llm)
        .await
        .context("Failed to build completion requests")?;

    let start = Instant::now();
    let lines = orchestrator(config, retry_failed)
        .submit_and_wait(&cli.run, BatchEndpoint::ChatCompletions, &requests)
        .await
        .with_context(|| format!("Bulk run '{}' did not complete", cli.run))?;
    info!("Bulk run '{}' finished in {:.1?}", cli.run, start.elapsed());

    Ok(score_batch_output(records, &lines))
}
