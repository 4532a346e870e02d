//! Configuration management
//!
//! This module handles loading, validation, and management of the Canvass
//! configuration. Configuration is stored in TOML format at
//! ~/.canvass/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Data directory, log level, cache filename
//! - **run**: Execution mode, repetitions, progress reporting, concurrency
//!   bound, retry policy
//! - **limits**: Default and per-model endpoint rate limits (RPM / TPM)
//! - **providers**: Model endpoint settings (base URL, API-key env var)
//!
//! # Path Expansion
//!
//! The configuration system automatically expands `~` to the user's home
//! directory and creates the data directory if it doesn't exist.
//!
//! # Examples
//!
//! ```no_run
//! use canvass_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load configuration from default location
//! let config = Config::load_or_create()?;
//!
//! println!("Data dir: {:?}", config.core.data_dir);
//! println!("Repetitions: {}", config.run.repetitions);
//! # Ok(())
//! # }
//! ```

use crate::llm::retry::RetryPolicy;
use sdk::errors::EngineError;
use sdk::types::RateLimits;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
///
/// Represents the complete Canvass configuration loaded from
/// ~/.canvass/config.toml. Every section has serde defaults so a partial file
/// is valid.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Core engine settings
    #[serde(default)]
    pub core: CoreConfig,

    /// Run parameters
    #[serde(default)]
    pub run: RunConfig,

    /// Endpoint rate limits
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Model provider settings
    #[serde(default)]
    pub providers: ProvidersConfig,
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Cache database filename, relative to the data directory
    #[serde(default = "default_cache_file")]
    pub cache_file: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
            cache_file: default_cache_file(),
        }
    }
}

/// Execution mode for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Conduct interviews in this process
    #[default]
    Local,
    /// Ship the job to a remote runner service
    Remote,
}

/// Run parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Execution mode (local or remote)
    #[serde(default)]
    pub mode: RunMode,

    /// How many times to run each interview
    #[serde(default = "default_repetitions")]
    pub repetitions: u32,

    /// Whether to log periodic progress snapshots
    #[serde(default)]
    pub progress: bool,

    /// Optional cap on concurrently running interviews (bounds memory; the
    /// buckets already bound call rate)
    #[serde(default)]
    pub max_concurrent_interviews: Option<usize>,

    /// Retry attempts per model call before the task fails
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial retry backoff in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Multiplier applied to the backoff after each failed attempt
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,

    /// Per-call timeout in seconds
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::Local,
            repetitions: default_repetitions(),
            progress: false,
            max_concurrent_interviews: None,
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            backoff_factor: default_backoff_factor(),
            call_timeout_secs: default_call_timeout_secs(),
        }
    }
}

impl RunConfig {
    /// Build the retry policy for model calls from the run parameters
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            backoff_factor: self.backoff_factor,
            call_timeout: Duration::from_secs(self.call_timeout_secs),
        }
    }
}

/// Endpoint rate limits: a default pair plus per-model overrides
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LimitsConfig {
    /// Limits applied to any model without an override
    #[serde(default)]
    pub default: RateLimits,

    /// Per-model overrides, keyed by model name
    #[serde(default)]
    pub models: BTreeMap<String, RateLimits>,
}

impl LimitsConfig {
    /// The rate limits for a model name
    pub fn limits_for(&self, model: &str) -> RateLimits {
        self.models.get(model).copied().unwrap_or(self.default)
    }
}

/// Model provider settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProvidersConfig {
    /// OpenAI-compatible endpoint settings
    #[serde(default)]
    pub openai: OpenAiConfig,
}

/// OpenAI-compatible endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// Base URL of the chat-completions API
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    /// Environment variable holding the API key
    #[serde(default = "default_openai_key_env")]
    pub api_key_env: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            api_key_env: default_openai_key_env(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.canvass")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_cache_file() -> String {
    "cache.db".to_string()
}

fn default_repetitions() -> u32 {
    1
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    1_000
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_call_timeout_secs() -> u64 {
    60
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

impl Config {
    /// Default configuration file path: ~/.canvass/config.toml
    pub fn default_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;
        Ok(home.join(".canvass").join("config.toml"))
    }

    /// Load configuration from the default location, writing a default file
    /// if none exists yet.
    pub fn load_or_create() -> Result<Self, EngineError> {
        let path = Self::default_path()?;
        if path.exists() {
            Self::load_from_path(&path)
        } else {
            let config = Config::default();
            config.save_to_path(&path)?;
            tracing::info!("Created default configuration at {}", path.display());
            Ok(config)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path).map_err(|e| {
            EngineError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| EngineError::Config(format!("Invalid TOML: {}", e)))?;
        config.core.data_dir = expand_tilde(&config.core.data_dir)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration to a specific path, creating parent
    /// directories as needed.
    pub fn save_to_path(&self, path: &Path) -> Result<(), EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Absolute path of the cache database
    pub fn cache_path(&self) -> PathBuf {
        self.core.data_dir.join(&self.core.cache_file)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), EngineError> {
        const LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];
        if !LEVELS.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}' (expected one of {:?})",
                self.core.log_level, LEVELS
            )));
        }
        if self.run.repetitions == 0 {
            return Err(EngineError::Config(
                "run.repetitions must be at least 1".to_string(),
            ));
        }
        if self.run.max_attempts == 0 {
            return Err(EngineError::Config(
                "run.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.run.backoff_factor < 1.0 {
            return Err(EngineError::Config(
                "run.backoff_factor must be >= 1.0".to_string(),
            ));
        }
        if self.limits.default.rpm <= 0.0 || self.limits.default.tpm <= 0.0 {
            return Err(EngineError::Config(
                "limits.default rates must be positive".to_string(),
            ));
        }
        for (model, limits) in &self.limits.models {
            if limits.rpm <= 0.0 || limits.tpm <= 0.0 {
                return Err(EngineError::Config(format!(
                    "limits.models.\"{}\" rates must be positive",
                    model
                )));
            }
        }
        Ok(())
    }
}

/// Expand a leading `~` to the user's home directory
fn expand_tilde(path: &Path) -> Result<PathBuf, EngineError> {
    let Some(s) = path.to_str() else {
        return Ok(path.to_path_buf());
    };
    if let Some(rest) = s.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;
        return Ok(home.join(rest));
    }
    if s == "~" {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;
        return Ok(home);
    }
    Ok(path.to_path_buf())
}
