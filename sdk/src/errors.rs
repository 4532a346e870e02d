//! Error types and handling
//!
//! This module provides the error types used throughout the Canvass engine.
//! All errors implement the `CanvassErrorExt` trait which provides
//! user-friendly hints and indicates whether errors are recoverable.
//!
//! Recoverable here means "the run can continue": a single failed model call
//! fails one question task; a memory-plan misuse is a caller bug and aborts
//! job construction.

use thiserror::Error;

/// Trait for Canvass error extensions
///
/// This trait provides additional context for errors, including user-friendly
/// hints and recoverability information. All engine errors implement this
/// trait.
pub trait CanvassErrorExt {
    /// Returns a user-friendly hint for the error
    ///
    /// The hint is safe to display to end users and does not contain raw
    /// internal detail (prompts, file paths, API responses).
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors fail a single task or entry and let the run
    /// continue. Non-recoverable errors indicate a misconstructed job or
    /// broken environment and should surface to the caller.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// This enum represents all possible errors that can occur in the Canvass
/// engine.
///
/// # Error Categories
///
/// - **Job construction**: memory-plan misuse, entity combination conflicts
/// - **Cache**: serialization and persistence failures
/// - **Buckets**: requests that can never be admitted
/// - **Configuration**: invalid or missing configuration
#[derive(Debug, Error)]
pub enum EngineError {
    // Memory-plan misuse (caller errors, never retried)
    #[error("Order violation: '{prior}' must come before '{focal}' in the survey")]
    OrderViolation { focal: String, prior: String },

    #[error("Unknown question: '{0}' is not in the survey")]
    UnknownQuestion(String),

    // Entity combination errors
    #[error("Agent combination error: overlapping trait '{0}'")]
    AgentCombination(String),

    #[error("Duplicate question name: '{0}'")]
    DuplicateQuestion(String),

    // Cache errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Cache store error: {0}")]
    CacheStore(String),

    // Admission control errors
    #[error("Requested {requested} tokens exceeds bucket capacity {capacity}; the request can never be admitted")]
    BucketRequestTooLarge { requested: f64, capacity: f64 },

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Job specification errors
    #[error("Job specification error: {0}")]
    JobSpec(String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CanvassErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            // Memory-plan misuse
            Self::OrderViolation { .. } => {
                "A question can only remember answers to questions that come before it"
            }
            Self::UnknownQuestion(_) => "Check the question names in your memory plan",

            // Entity combination errors
            Self::AgentCombination(_) => {
                "Agents combined with .by() must not share trait keys"
            }
            Self::DuplicateQuestion(_) => "Every survey question needs a unique name",

            // Cache errors
            Self::Serialization(_) => "The model response could not be serialized for caching",
            Self::CacheStore(_) => "Cache persistence failed. Check the cache file path",

            // Admission control errors
            Self::BucketRequestTooLarge { .. } => {
                "A single call exceeds the endpoint's rate-limit capacity"
            }

            // Configuration errors
            Self::Config(_) => "Check your config.toml file for errors",

            // Job specification errors
            Self::JobSpec(_) => "The job file could not be parsed. Check its structure",

            // Generic IO error
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            // Caller errors abort job construction
            Self::OrderViolation { .. }
            | Self::UnknownQuestion(_)
            | Self::AgentCombination(_)
            | Self::DuplicateQuestion(_)
            | Self::Config(_)
            | Self::JobSpec(_) => false,

            // Everything else fails one task or entry; the run continues
            _ => true,
        }
    }
}
