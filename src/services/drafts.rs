//! Draft-artifact creation collaborator.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;

use crate::config::DraftsConfig;
use crate::error::ServiceError;

/// Creates an outbound draft in the user's mail account.
#[async_trait]
pub trait DraftService: Send + Sync {
    /// Create a draft addressed to `to`; returns the service's status text.
    async fn create_draft(
        &self,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<String, ServiceError>;
}

/// HTTP client for a token-authenticated draft API.
pub struct HttpDraftService {
    http: reqwest::Client,
    base_url: String,
    token: secrecy::SecretString,
}

impl HttpDraftService {
    pub fn new(config: &DraftsConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DraftResponse {
    #[serde(default)]
    status: String,
}

#[async_trait]
impl DraftService for HttpDraftService {
    async fn create_draft(
        &self,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<String, ServiceError> {
        let payload = serde_json::json!({
            "to": to,
            "subject": subject,
            "body": body,
        });

        let response = self
            .http
            .post(format!("{}/drafts", self.base_url))
            .bearer_auth(self.token.expose_secret())
            .json(&payload)
            .send()
            .await
            .map_err(|e| ServiceError::DraftCreation(e.to_string()))?
            .error_for_status()
            .map_err(|e| ServiceError::DraftCreation(e.to_string()))?;

        let parsed: DraftResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::DraftCreation(format!("malformed response: {e}")))?;

        Ok(if parsed.status.is_empty() {
            "Draft created".to_string()
        } else {
            parsed.status
        })
    }
}

/// Fallback when no draft service is configured.
pub struct UnavailableDraftService;

#[async_trait]
impl DraftService for UnavailableDraftService {
    async fn create_draft(
        &self,
        _to: &str,
        _subject: &str,
        _body: &str,
    ) -> Result<String, ServiceError> {
        Err(ServiceError::NotConfigured("draft service".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unavailable_service_reports_not_configured() {
        let service = UnavailableDraftService;
        let err = service
            .create_draft("jane@show.example", "Re: Guest", "body")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotConfigured(_)));
    }

    #[test]
    fn empty_status_gets_default() {
        let parsed: DraftResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.status.is_empty());
    }
}
