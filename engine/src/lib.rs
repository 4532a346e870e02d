//! Canvass Engine Library
//!
//! This library provides the core functionality of the Canvass engine: it
//! expands a job specification (survey x agents x scenarios x models) into
//! independent interviews, runs them concurrently against rate-limited model
//! endpoints, and memoizes every model call in a content-addressed cache.
//! It is used by both the main binary and integration tests.

/// Configuration management module
pub mod config;

/// Content-addressed model-call cache
pub mod cache;

/// Token-bucket admission control
pub mod buckets;

/// Surveys, questions and memory plans
pub mod surveys;

/// Model client abstraction layer
pub mod llm;

/// Interview task scheduling
pub mod interview;

/// Job specification and expansion
pub mod jobs;

/// Concurrent interview runner
pub mod runner;

/// Result assembly
pub mod results;

/// Logging setup for the binary
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
