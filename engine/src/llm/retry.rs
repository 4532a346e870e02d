//! Retry with exponential backoff around model calls
//!
//! Each attempt runs under its own timeout. Transient failures (transport,
//! rate limit, timeout) back off and retry up to the configured attempt
//! count; everything else returns immediately.

use super::{ModelClient, ModelError};
use std::time::Duration;
use tracing::{debug, warn};

/// Attempt and backoff settings for one model call
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Sleep before the second attempt
    pub initial_backoff: Duration,
    /// Multiplier applied to the backoff after each failed attempt
    pub backoff_factor: f64,
    /// Per-attempt timeout
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            backoff_factor: 2.0,
            call_timeout: Duration::from_secs(60),
        }
    }
}

/// Call the model under the policy's timeout, retrying transient failures
/// with exponential backoff.
pub async fn call_with_retry(
    client: &dyn ModelClient,
    system_prompt: &str,
    user_prompt: &str,
    parameters: &serde_json::Value,
    policy: &RetryPolicy,
) -> super::Result<serde_json::Value> {
    let mut backoff = policy.initial_backoff;
    let mut attempt = 1;
    loop {
        let outcome = tokio::time::timeout(
            policy.call_timeout,
            client.call(system_prompt, user_prompt, parameters),
        )
        .await
        .unwrap_or(Err(ModelError::Timeout(policy.call_timeout)));

        match outcome {
            Ok(response) => return Ok(response),
            Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                warn!(
                    model = client.name(),
                    attempt,
                    "model call failed ({}), retrying in {:.1}s",
                    e,
                    backoff.as_secs_f64()
                );
                tokio::time::sleep(backoff).await;
                backoff = backoff.mul_f64(policy.backoff_factor);
                attempt += 1;
            }
            Err(e) => {
                debug!(model = client.name(), attempt, "model call failed: {}", e);
                return Err(e);
            }
        }
    }
}
