//! Text-generation collaborator.
//!
//! The core consumes a single narrow contract: one system instruction, one
//! user text, one completion back. Transport errors are surfaced as-is and
//! never retried here — each call site decides whether a failure aborts its
//! stage or degrades.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;

use crate::config::LlmConfig;
use crate::error::LlmError;

/// Narrow completion contract used by every pipeline stage.
#[async_trait]
pub trait Completions: Send + Sync {
    /// Model identifier, for logging.
    fn model_name(&self) -> &str;

    /// Run one completion: system instructions plus user text in, text out.
    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError>;
}

/// Create the completion client from configuration.
pub fn create_completions(config: &LlmConfig) -> Result<Arc<dyn Completions>, LlmError> {
    let client = OpenAiCompletions::new(config)?;
    tracing::info!(model = %config.model, "Using OpenAI-compatible completions");
    Ok(Arc::new(client))
}

/// Client for any OpenAI-compatible chat-completions endpoint.
pub struct OpenAiCompletions {
    http: reqwest::Client,
    base_url: String,
    api_key: secrecy::SecretString,
    model: String,
}

impl OpenAiCompletions {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| LlmError::RequestFailed {
                provider: "openai".into(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[async_trait]
impl Completions for OpenAiCompletions {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: "openai".into(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(LlmError::RequestFailed {
                provider: "openai".into(),
                reason: format!("HTTP {status}: {detail}"),
            });
        }

        let parsed: ChatResponse =
            response.json().await.map_err(|e| LlmError::InvalidResponse {
                provider: "openai".into(),
                reason: format!("malformed completion body: {e}"),
            })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::InvalidResponse {
                provider: "openai".into(),
                reason: "completion had no choices".into(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    #[test]
    fn client_constructs_and_normalizes_base_url() {
        let config = LlmConfig {
            base_url: "https://api.openai.com/v1/".into(),
            api_key: SecretString::from("test-key"),
            model: "o4-mini".into(),
        };
        let client = OpenAiCompletions::new(&config).unwrap();
        assert_eq!(client.base_url, "https://api.openai.com/v1");
        assert_eq!(client.model_name(), "o4-mini");
    }

    #[test]
    fn chat_response_deserializes() {
        let raw = r#"{"choices": [{"message": {"role": "assistant", "content": "Accepted"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("Accepted"));
    }
}
