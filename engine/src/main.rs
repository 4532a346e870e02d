// Canvass Survey Engine
// Main entry point for the canvass binary

use clap::Parser;
use canvass_engine::cli::{CacheAction, Cli, Command};
use canvass_engine::config::Config;
use canvass_engine::handlers::{
    handle_cache_export, handle_cache_import, handle_cache_show, handle_example, handle_run,
    OutputFormat, RunArgs,
};
use canvass_engine::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Load configuration (or use custom path if provided)
    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // Log level priority: --log flag, then config (RUST_LOG overrides both);
    // the log format follows the report format
    let log_level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    init_telemetry(log_level, format);

    tracing::info!("Canvass Engine v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Run {
            job,
            repetitions,
            progress,
            cache,
            output,
            dry_run,
        } => {
            tracing::info!("Running job: {}", job.display());
            handle_run(
                RunArgs {
                    job,
                    repetitions,
                    progress,
                    cache,
                    output,
                    dry_run,
                },
                &config,
                format,
            )
            .await
        }

        Command::Example { output } => handle_example(output.as_deref(), format),

        Command::Cache { action } => match action {
            CacheAction::Show { cache } => {
                handle_cache_show(cache.as_deref(), &config, format).await
            }
            CacheAction::Export { path, cache } => {
                handle_cache_export(&path, cache.as_deref(), &config).await
            }
            CacheAction::Import { path, cache } => {
                handle_cache_import(&path, cache.as_deref(), &config).await
            }
        },
    }
}
