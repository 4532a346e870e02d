//! Canvass SDK
//!
//! Shared library providing the entity vocabulary and error types used by the
//! Canvass engine. Agents, scenarios and model specifications live here so
//! that job specifications can be built, combined and serialized without
//! pulling in the engine itself.

/// Error types and handling
pub mod errors;

/// Agent, scenario and model specification types
pub mod types;

// Re-export commonly used types
pub use errors::{CanvassErrorExt, EngineError};
pub use types::{Agent, ModelSpec, RateLimits, Scenario};
