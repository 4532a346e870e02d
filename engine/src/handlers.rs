//! Command handlers for CLI operations
//!
//! This module implements the handlers for the CLI commands:
//! - run: expand a job specification and run every interview
//! - example: write an example job specification
//! - cache show/export/import: inspect and move the model-call cache

use anyhow::{bail, Context, Result};
use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::cache::{jsonl, Cache, SqliteStore};
use crate::config::{Config, LimitsConfig, RunMode};
use crate::jobs::Jobs;
use crate::llm::openai::OpenAiClient;
use crate::llm::ModelClient;
use crate::runner::{InterviewRunner, RunOptions};

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// CLI overrides for one run
#[derive(Debug, Default)]
pub struct RunArgs {
    pub job: PathBuf,
    pub repetitions: Option<u32>,
    pub progress: bool,
    pub cache: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub dry_run: bool,
}

fn load_jobs(path: &Path) -> Result<Jobs> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read job file {}", path.display()))?;
    let jobs: Jobs = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse job file {}", path.display()))?;
    if jobs.survey.is_empty() {
        bail!("Job survey has no questions");
    }
    Ok(jobs)
}

/// Configured rate limits override whatever the job file carries. A job with
/// no models gets the default model, so the configured limits reach it too.
fn apply_limits(jobs: &mut Jobs, limits: &LimitsConfig) {
    let mut models = jobs.models_or_default();
    for model in &mut models {
        model.limits = limits.limits_for(&model.name);
    }
    jobs.models = models;
}

async fn open_cache(override_path: Option<&Path>, config: &Config) -> Result<Cache> {
    let path = override_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config.cache_path());
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    Cache::open_sqlite(&path, true)
        .await
        .with_context(|| format!("Failed to open cache at {}", path.display()))
}

/// Run a job specification to completion
pub async fn handle_run(args: RunArgs, config: &Config, format: OutputFormat) -> Result<()> {
    if config.run.mode == RunMode::Remote {
        bail!("Remote execution is not supported yet; set run.mode = \"local\"");
    }

    let mut jobs = load_jobs(&args.job)?;
    apply_limits(&mut jobs, &config.limits);

    if args.dry_run {
        let interviews = jobs.interview_count();
        let questions = jobs.total_questions();
        match format {
            OutputFormat::Json => println!(
                "{}",
                json!({
                    "interviews": interviews,
                    "questions": questions,
                    "models": jobs.models_or_default().iter().map(|m| m.name.clone()).collect::<Vec<_>>(),
                })
            ),
            OutputFormat::Text => {
                println!("Would run {} interview(s), {} question(s) total.", interviews, questions);
                for model in jobs.models_or_default() {
                    println!("  model: {}", model.name);
                }
            }
        }
        return Ok(());
    }

    let cache = open_cache(args.cache.as_deref(), config).await?;

    let mut clients: HashMap<String, Arc<dyn ModelClient>> = HashMap::new();
    for model in jobs.models_or_default() {
        let client = OpenAiClient::new(model.name.clone(), config.providers.openai.clone())
            .with_context(|| format!("Failed to build client for model '{}'", model.name))?;
        clients.insert(model.name.clone(), Arc::new(client));
    }

    let options = RunOptions {
        repetitions: args.repetitions.unwrap_or(config.run.repetitions),
        max_concurrent_interviews: config
            .run
            .max_concurrent_interviews
            .unwrap_or_else(|| RunOptions::default().max_concurrent_interviews),
        progress: args.progress || config.run.progress,
    };

    let runner = InterviewRunner::new(jobs);

    // Ctrl-C stops questions that have not started; in-flight calls finish
    // and cache their responses.
    let cancel = runner.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling remaining questions");
            cancel.store(true, Ordering::SeqCst);
        }
    });

    let results = runner
        .run(cache, &clients, config.run.retry_policy(), &options)
        .await?;

    if let Some(output) = &args.output {
        results.export_jsonl(output)?;
        tracing::info!("results written to {}", output.display());
    }

    let status = results.status();
    match format {
        OutputFormat::Json => println!(
            "{}",
            json!({
                "interviews": results.len(),
                "answered": status.answered,
                "failed": status.failed,
                "skipped": status.skipped,
                "cache_hits": status.cache_hits,
                "checksum": results.checksum(),
            })
        ),
        OutputFormat::Text => {
            println!("Completed {} interview(s).", results.len());
            println!("  answered:   {}", status.answered);
            println!("  failed:     {}", status.failed);
            println!("  skipped:    {}", status.skipped);
            println!("  cache hits: {}", status.cache_hits);
        }
    }

    if status.failed > 0 {
        bail!("{} question(s) failed", status.failed);
    }
    Ok(())
}

/// Write an example job specification
pub fn handle_example(output: Option<&Path>, format: OutputFormat) -> Result<()> {
    let jobs = Jobs::example().context("Failed to build example job")?;
    let text = serde_json::to_string_pretty(&jobs)?;
    match output {
        Some(path) => {
            std::fs::write(path, &text)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            if matches!(format, OutputFormat::Text) {
                println!("Example job written to {}", path.display());
            }
        }
        None => println!("{}", text),
    }
    Ok(())
}

/// Show cache location and entry count
pub async fn handle_cache_show(
    override_path: Option<&Path>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let path = override_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config.cache_path());
    if !path.exists() {
        match format {
            OutputFormat::Json => {
                println!("{}", json!({"path": path.display().to_string(), "entries": 0}))
            }
            OutputFormat::Text => println!("No cache at {}", path.display()),
        }
        return Ok(());
    }
    let store = SqliteStore::new(&path).await?;
    let count = store.len().await?;
    match format {
        OutputFormat::Json => println!(
            "{}",
            json!({"path": path.display().to_string(), "entries": count})
        ),
        OutputFormat::Text => println!("Cache at {}: {} entrie(s)", path.display(), count),
    }
    store.close().await?;
    Ok(())
}

/// Export cache entries to a JSONL file
pub async fn handle_cache_export(
    dest: &Path,
    override_path: Option<&Path>,
    config: &Config,
) -> Result<()> {
    let cache = open_cache(override_path, config).await?;
    cache.export_jsonl(dest)?;
    println!("Exported {} entrie(s) to {}", cache.len(), dest.display());
    Ok(())
}

/// Import cache entries from a JSONL file
pub async fn handle_cache_import(
    source: &Path,
    override_path: Option<&Path>,
    config: &Config,
) -> Result<()> {
    let entries = jsonl::read_jsonl(source)?;
    let count = entries.len();
    let path = override_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config.cache_path());
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let store = SqliteStore::new(&path).await?;
    store.put_many(&entries).await?;
    store.close().await?;
    println!("Imported {} entrie(s) into {}", count, path.display());
    Ok(())
}
