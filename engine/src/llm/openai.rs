//! OpenAI-compatible chat completions client

use super::{ModelClient, ModelError};
use crate::config::OpenAiConfig;
use async_trait::async_trait;
use serde_json::json;

/// Client for OpenAI-compatible `/chat/completions` endpoints
pub struct OpenAiClient {
    model: String,
    config: OpenAiConfig,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiClient {
    /// Build a client for one model, reading the API key from the env var
    /// named in the provider config.
    pub fn new(model: impl Into<String>, config: OpenAiConfig) -> super::Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            ModelError::Authentication(format!("{} is not set", config.api_key_env))
        })?;
        Ok(Self::with_api_key(model, config, api_key))
    }

    /// Build a client with an explicit API key (tests, alternate key stores)
    pub fn with_api_key(
        model: impl Into<String>,
        config: OpenAiConfig,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            config,
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ModelClient for OpenAiClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn call(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        parameters: &serde_json::Value,
    ) -> super::Result<serde_json::Value> {
        let url = format!("{}/chat/completions", self.config.base_url);

        let mut payload = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt},
            ],
        });
        if let (Some(body), Some(params)) = (payload.as_object_mut(), parameters.as_object()) {
            for (key, value) in params {
                body.insert(key.clone(), value.clone());
            }
        }

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| ModelError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();

            return match status.as_u16() {
                401 | 403 => Err(ModelError::Authentication(text)),
                429 => Err(ModelError::RateLimited),
                _ => Err(ModelError::Transport(format!("{}: {}", status, text))),
            };
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;

        let content = data
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .ok_or_else(|| {
                ModelError::InvalidResponse("no message content in response".to_string())
            })?;

        Ok(json!({"answer": content}))
    }
}
