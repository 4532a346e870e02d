//! Model client abstraction
//!
//! The interview scheduler talks to language models through the ModelClient
//! trait: one system prompt, one user prompt, one structured answer back.
//! The OpenAI-compatible HTTP client lives in `openai`; tests substitute
//! scripted implementations.

use async_trait::async_trait;
use std::time::Duration;

pub mod openai;
pub mod retry;

pub use retry::{call_with_retry, RetryPolicy};

/// Result type for model calls
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors a model call can produce
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("rate limited by provider")]
    RateLimited,

    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ModelError {
    /// Transient failures worth another attempt. Authentication and
    /// malformed responses fail the same way every time.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ModelError::Transport(_) | ModelError::RateLimited | ModelError::Timeout(_)
        )
    }
}

/// A language model endpoint the engine can pose questions to
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// The model name this client serves (matches `ModelSpec::name`)
    fn name(&self) -> &str;

    /// Pose one question. `parameters` carries sampling settings such as
    /// temperature, merged into the provider payload.
    async fn call(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        parameters: &serde_json::Value,
    ) -> Result<serde_json::Value>;
}

/// Pull the answer string out of a raw model response.
///
/// Accepts either the engine's canonical shape `{"answer": "..."}` or a
/// wrapped shape `{"message": "<json text>"}` where the message body itself
/// parses to an object with an `answer` key.
pub fn parse_answer(raw: &serde_json::Value) -> Result<String> {
    if let Some(answer) = raw.get("answer").and_then(|a| a.as_str()) {
        return Ok(answer.to_string());
    }
    if let Some(message) = raw.get("message").and_then(|m| m.as_str()) {
        let inner: serde_json::Value = serde_json::from_str(message)
            .map_err(|e| ModelError::InvalidResponse(format!("message is not JSON: {}", e)))?;
        if let Some(answer) = inner.get("answer").and_then(|a| a.as_str()) {
            return Ok(answer.to_string());
        }
        return Err(ModelError::InvalidResponse(
            "message JSON has no answer key".to_string(),
        ));
    }
    Err(ModelError::InvalidResponse(
        "no answer or message key in response".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_answer_direct() {
        let raw = json!({"answer": "yes"});
        assert_eq!(parse_answer(&raw).unwrap(), "yes");
    }

    #[test]
    fn test_parse_answer_wrapped_message() {
        let raw = json!({"message": r#"{"answer": "maybe"}"#});
        assert_eq!(parse_answer(&raw).unwrap(), "maybe");
    }

    #[test]
    fn test_parse_answer_rejects_missing_key() {
        let raw = json!({"content": "yes"});
        assert!(matches!(
            parse_answer(&raw),
            Err(ModelError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_parse_answer_rejects_non_json_message() {
        let raw = json!({"message": "not json at all"});
        assert!(matches!(
            parse_answer(&raw),
            Err(ModelError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(ModelError::Transport("reset".into()).is_retryable());
        assert!(ModelError::RateLimited.is_retryable());
        assert!(ModelError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(!ModelError::Authentication("bad key".into()).is_retryable());
        assert!(!ModelError::InvalidResponse("garbage".into()).is_retryable());
    }
}
