//! CLI interface for Canvass
//!
//! This module provides the command-line interface using clap's derive API.
//! It defines the commands and global flags for running jobs and managing
//! the model-call cache.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Canvass Survey Engine
///
/// Expands a job specification (survey x agents x scenarios x models) into
/// interviews, runs them concurrently against rate-limited model endpoints,
/// and memoizes every model call.
#[derive(Parser, Debug)]
#[command(name = "canvass")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a job specification
    Run {
        /// Path to the job specification (JSON)
        job: PathBuf,

        /// Repeat every interview this many times
        #[arg(short = 'n', long)]
        repetitions: Option<u32>,

        /// Log progress while running
        #[arg(long)]
        progress: bool,

        /// Alternate cache database path (default: from config)
        #[arg(long, value_name = "PATH")]
        cache: Option<PathBuf>,

        /// Write results as JSONL to this path
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Expand the job and show what would run, without calling models
        #[arg(long)]
        dry_run: bool,
    },

    /// Write an example job specification
    Example {
        /// Where to write the example (default: stdout)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// Manage the model-call cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

/// Cache management actions
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Show cache location and entry count
    Show {
        /// Alternate cache database path
        #[arg(long, value_name = "PATH")]
        cache: Option<PathBuf>,
    },

    /// Export cache entries to a JSONL file
    Export {
        /// Destination JSONL path
        path: PathBuf,

        /// Alternate cache database path
        #[arg(long, value_name = "PATH")]
        cache: Option<PathBuf>,
    },

    /// Import cache entries from a JSONL file
    Import {
        /// Source JSONL path
        path: PathBuf,

        /// Alternate cache database path
        #[arg(long, value_name = "PATH")]
        cache: Option<PathBuf>,
    },
}
