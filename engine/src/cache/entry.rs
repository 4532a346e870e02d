//! Cache entries and content-addressed keys
//!
//! A `CacheEntry` records one successful model call. Its identity is a hex
//! SHA-256 digest over the call inputs, so any two calls with the same model,
//! parameters, prompts and iteration share a key regardless of when or where
//! they ran.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One memoized model call. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheEntry {
    /// Model endpoint name
    pub model: String,

    /// Call parameters (temperature, max_tokens, ...)
    pub parameters: serde_json::Value,

    /// Rendered system prompt
    pub system_prompt: String,

    /// Rendered user prompt
    pub user_prompt: String,

    /// Repetition index; distinct iterations are distinct cache keys, which
    /// is how repeated runs of one interview avoid collapsing into one call
    pub iteration: u32,

    /// JSON-serialized raw model response
    pub output: String,

    /// Unix timestamp of entry creation, seconds
    pub timestamp: i64,
}

impl CacheEntry {
    /// Create an entry stamped with the current time
    pub fn new(
        model: impl Into<String>,
        parameters: serde_json::Value,
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
        iteration: u32,
        output: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            parameters,
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            iteration,
            output: output.into(),
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    /// The content-addressed key of this entry
    pub fn key(&self) -> String {
        gen_key(
            &self.model,
            &self.parameters,
            &self.system_prompt,
            &self.user_prompt,
            self.iteration,
        )
    }

    /// An example entry for docs and tests
    pub fn example() -> Self {
        Self {
            model: "gpt-4-1106-preview".to_string(),
            parameters: serde_json::json!({"temperature": 0.5}),
            system_prompt: "You are a helpful agent.".to_string(),
            user_prompt: "How are you?".to_string(),
            iteration: 0,
            output: r#"{"answer": "Great"}"#.to_string(),
            timestamp: 1_700_000_000,
        }
    }
}

/// Deterministic key over the call inputs.
///
/// The inputs are serialized as one JSON array and hashed with SHA-256.
/// `serde_json` maps are key-sorted, so parameter insertion order does not
/// change the key.
pub fn gen_key(
    model: &str,
    parameters: &serde_json::Value,
    system_prompt: &str,
    user_prompt: &str,
    iteration: u32,
) -> String {
    let canonical = serde_json::json!([model, parameters, system_prompt, user_prompt, iteration]);
    // Serialization of a just-built Value cannot fail
    let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
    let digest = Sha256::digest(&bytes);
    hex::encode(digest)
}
