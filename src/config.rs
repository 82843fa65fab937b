//! Configuration types.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Top-level assistant configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the local libSQL database file.
    pub db_path: String,
    /// Maximum number of pooled database connections.
    pub pool_size: usize,
    /// LLM settings.
    pub llm: LlmConfig,
    /// Vector-similarity search endpoint (None → degrade to empty results).
    pub vector_endpoint: Option<String>,
    /// Number of reference threads to retrieve per query.
    pub top_k: usize,
    /// Document store settings (None → extraction degrades gracefully).
    pub docs: Option<DocsConfig>,
    /// Slack incoming-webhook URL for reviewer notifications.
    pub slack_webhook_url: Option<String>,
    /// Draft-artifact service endpoint and token.
    pub drafts: Option<DraftsConfig>,
    /// Skip Notify and CreateDraftArtifact stages entirely.
    pub quiet_mode: bool,
    /// Interval between inbound message scans.
    pub poll_interval: Duration,
}

/// Text-generation collaborator settings.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// OpenAI-compatible chat-completions base URL.
    pub base_url: String,
    pub api_key: SecretString,
    pub model: String,
}

/// Document store (client folder browsing) settings.
#[derive(Debug, Clone)]
pub struct DocsConfig {
    pub base_url: String,
    pub token: SecretString,
    /// Root folder holding one subfolder per client.
    pub root_folder_id: String,
}

/// Draft-artifact creation settings.
#[derive(Debug, Clone)]
pub struct DraftsConfig {
    pub base_url: String,
    pub token: SecretString,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: "./data/booking-assist.db".to_string(),
            pool_size: 5,
            llm: LlmConfig {
                base_url: "https://api.openai.com/v1".to_string(),
                api_key: SecretString::from(""),
                model: "o4-mini".to_string(),
            },
            vector_endpoint: None,
            top_k: 5,
            docs: None,
            slack_webhook_url: None,
            drafts: None,
            quiet_mode: false,
            poll_interval: Duration::from_secs(60),
        }
    }
}

impl Config {
    /// Build configuration from environment variables.
    ///
    /// `OPENAI_API_KEY` is required; every collaborator endpoint is optional
    /// and its absence degrades the matching pipeline stage.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("OPENAI_API_KEY".into()))?;

        let mut config = Self::default();
        config.llm.api_key = SecretString::from(api_key);

        if let Ok(model) = std::env::var("BOOKING_ASSIST_MODEL") {
            config.llm.model = model;
        }
        if let Ok(url) = std::env::var("BOOKING_ASSIST_LLM_URL") {
            config.llm.base_url = url;
        }
        if let Ok(path) = std::env::var("BOOKING_ASSIST_DB_PATH") {
            config.db_path = path;
        }
        if let Ok(size) = std::env::var("BOOKING_ASSIST_POOL_SIZE") {
            config.pool_size = size.parse().map_err(|_| ConfigError::InvalidValue {
                key: "BOOKING_ASSIST_POOL_SIZE".into(),
                message: format!("not a positive integer: {size}"),
            })?;
        }
        if let Ok(secs) = std::env::var("BOOKING_ASSIST_POLL_SECS") {
            let secs: u64 = secs.parse().map_err(|_| ConfigError::InvalidValue {
                key: "BOOKING_ASSIST_POLL_SECS".into(),
                message: format!("not a number of seconds: {secs}"),
            })?;
            config.poll_interval = Duration::from_secs(secs);
        }

        config.vector_endpoint = std::env::var("VECTOR_SEARCH_URL").ok();

        if let (Ok(base_url), Ok(token), Ok(root)) = (
            std::env::var("DOCS_API_URL"),
            std::env::var("DOCS_API_TOKEN"),
            std::env::var("CLIENT_ROOT_FOLDER_ID"),
        ) {
            config.docs = Some(DocsConfig {
                base_url,
                token: SecretString::from(token),
                root_folder_id: root,
            });
        }

        config.slack_webhook_url = std::env::var("SLACK_WEBHOOK_URL").ok();

        if let (Ok(base_url), Ok(token)) = (
            std::env::var("DRAFTS_API_URL"),
            std::env::var("DRAFTS_API_TOKEN"),
        ) {
            config.drafts = Some(DraftsConfig {
                base_url,
                token: SecretString::from(token),
            });
        }

        config.quiet_mode = std::env::var("QUIET_MODE")
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false);

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_quiet_about_collaborators() {
        let config = Config::default();
        assert!(config.vector_endpoint.is_none());
        assert!(config.docs.is_none());
        assert!(config.slack_webhook_url.is_none());
        assert!(!config.quiet_mode);
        assert_eq!(config.top_k, 5);
        assert_eq!(config.poll_interval, Duration::from_secs(60));
    }
}
