//! sqlsight: ask analytics questions of a DuckDB database
//!
//! Answers one question given on the command line, or one question per line
//! read from stdin, printing each response as JSON.

use anyhow::Context;
use clap::Parser;
use sqlsight_duck::DuckExecutor;
use sqlsight_pipeline::{MemoryStore, Orchestrator, QueryService, ResponseCache};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};

mod config;
mod llm;
#[macro_use]
mod logging;

use config::Config;
use llm::OpenAiCompleter;

type Service = QueryService<OpenAiCompleter, Arc<DuckExecutor>, MemoryStore>;

/// Natural-language analytics over DuckDB
#[derive(Parser, Debug)]
#[command(name = "sqlsight", version, about, long_about = None)]
struct Cli {
    /// Path to config.yaml
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Skip the response cache
    #[arg(long)]
    no_cache: bool,

    /// Report database and cache health, then exit
    #[arg(long)]
    health: bool,

    /// Question to answer; read line by line from stdin when omitted
    question: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    config.apply_logging_env();
    logging::init()?;

    let executor = Arc::new(
        DuckExecutor::open_read_only(&config.database.path)
            .with_context(|| format!("opening database {}", config.database.path))?,
    );

    let schema_context = match executor.catalog() {
        Ok(catalog) if !catalog.is_empty() => {
            tracing::info!(tables = catalog.tables.len(), "Loaded schema catalog");
            catalog.to_prompt_context()
        }
        Ok(_) => {
            tracing::warn!("Database has no tables, using configured schema context");
            config.fallback_schema_context()
        }
        Err(e) => {
            tracing::warn!(error = %e, "Schema introspection failed, using configured schema context");
            config.fallback_schema_context()
        }
    };

    let api_key = match Config::get_openai_api_key() {
        Ok(key) => key,
        // health checks never call the completion endpoint
        Err(_) if cli.health => String::new(),
        Err(e) => return Err(e.into()),
    };
    let completer = OpenAiCompleter::new(api_key, &config.llm);
    tracing::info!(model = %config.llm.model, "Using completion model");

    let orchestrator = Orchestrator::new(completer, executor, config.pipeline_config(schema_context));
    let cache = config.cache.enabled.then(|| {
        ResponseCache::new(MemoryStore::new(config.cache.max_capacity), &config.cache)
    });
    let service: Service = QueryService::new(orchestrator, cache);

    if cli.health {
        let report = service.health().await;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let use_cache = !cli.no_cache;
    if !cli.question.is_empty() {
        return answer(&service, &cli.question.join(" "), use_cache).await;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let question = line.trim();
        if !question.is_empty() {
            answer(&service, question, use_cache).await?;
        }
    }
    Ok(())
}

async fn answer(service: &Service, question: &str, use_cache: bool) -> anyhow::Result<()> {
    let started = Instant::now();
    let response = service.run_query(question, use_cache).await;

    log_event!(
        level: tracing::Level::INFO,
        event: "query_answered",
        cached: response.cached,
        rows: response.result_summary.row_count,
        duration_ms: started.elapsed().as_millis()
    );

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
