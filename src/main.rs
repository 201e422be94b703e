//! # AI News Context
//!
//! Context analysis for an AI-news newsletter. Each newly collected article is
//! compared against the embeddings of everything published before, and an
//! LLM classifies the relationship to the closest prior coverage:
//!
//! - **SKIP**: same story, nothing new
//! - **UPDATE**: a follow-up to an earlier story, with references to it
//! - **KEEP**: an independent story
//!
//! ## Usage
//!
//! ```sh
//! ai_news_context analyze -i ./collected/articles.json -o ./reports
//! ai_news_context stats
//! ```
//!
//! ## Architecture
//!
//! 1. **Load**: read config, open the persisted vector index (or start empty)
//! 2. **Analyze**: search similar history and classify each article
//!    (parallel, bounded by `pipeline.max_concurrency`; see [`pipeline`])
//! 3. **Index**: add every non-SKIP article to the index and persist it once
//! 4. **Output**: write the JSON run report

use chrono::Utc;
use clap::Parser;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod cli;
mod config;
mod context;
mod embeddings;
mod error;
mod models;
mod outputs;
mod pipeline;
#[cfg(test)]
mod testing;
mod utils;

use api::ModelPool;
use cli::{Cli, Command};
use config::AppConfig;
use context::ContextAnalyzer;
use embeddings::{EmbeddingManager, OpenAiEmbedder, RetryingEmbedder};
use models::{Article, ContextReport};
use outputs::json;
use utils::ensure_writable_dir;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("ai_news_context starting up");

    let args = Cli::parse();
    debug!(config = %args.config, command = ?args.command, "Parsed CLI arguments");

    let mut config = AppConfig::load_or_default(&args.config)?;
    if let Some(key) = args.openai_api_key.as_ref().filter(|k| !k.trim().is_empty()) {
        config.embedding.api_key = Some(key.clone());
        config.llm.api_key = Some(key.clone());
    }

    let provider = RetryingEmbedder::new(
        OpenAiEmbedder::new(&config.embedding),
        config.embedding.max_retries,
        StdDuration::from_millis(500),
    );
    let manager = Arc::new(EmbeddingManager::load(&config.embedding, &config.index, Arc::new(provider)).await);

    match args.command {
        Command::Stats => {
            let stats = manager.stats().await;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Analyze {
            input,
            output_dir,
            no_index,
        } => {
            if let Err(e) = ensure_writable_dir(&output_dir).await {
                error!(
                    path = %output_dir,
                    error = %e,
                    "Output directory is not writable (fix perms or choose a different path)"
                );
                return Err(e);
            }
            run_analysis(&config, manager, &input, &output_dir, no_index).await?;
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    Ok(())
}

#[instrument(level = "info", skip(config, manager))]
async fn run_analysis(
    config: &AppConfig,
    manager: Arc<EmbeddingManager>,
    input: &str,
    output_dir: &str,
    no_index: bool,
) -> Result<(), Box<dyn Error>> {
    let raw = tokio::fs::read_to_string(input).await?;
    let articles: Vec<Article> = serde_json::from_str(&raw)?;
    info!(count = articles.len(), "Total articles to analyze");

    let models = ModelPool::from_config(&config.llm);
    info!(models = ?models.model_names(), "Model pool ready");
    let analyzer = Arc::new(ContextAnalyzer::new(
        Some(Arc::clone(&manager)),
        models,
        config.analysis.clone(),
    ));

    // ---- Analyze articles in parallel ----
    let concurrency = config.pipeline.max_concurrency;
    info!(concurrency, "Starting parallel context analysis");
    let results = pipeline::analyze_batch(analyzer, &articles, concurrency).await;

    // ---- Index everything that will be published ----
    let indexed = if no_index {
        info!("Indexing disabled; history left unchanged");
        0
    } else {
        pipeline::index_accepted(&manager, &articles, &results).await
    };

    let mut report = ContextReport::new(Utc::now(), results.into_iter().map(|(_, r)| r).collect());
    report.indexed = indexed;
    info!(
        kept = report.kept,
        updated = report.updated,
        skipped = report.skipped,
        indexed = report.indexed,
        relationships = report.relationships.len(),
        "Completed context analysis"
    );

    let path = json::write_report(&report, output_dir).await?;
    println!("{}", path.display());
    Ok(())
}
