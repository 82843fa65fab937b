//! Reviewer notification dispatch.

use async_trait::async_trait;

use crate::error::ServiceError;

/// Everything the reviewer needs to act on one processed email.
#[derive(Debug, Clone)]
pub struct NotifyRequest {
    /// Short human-readable summary (classification appended by the pipeline).
    pub summary: String,
    /// The final draft awaiting review.
    pub draft: String,
    pub recipient: String,
    pub subject: String,
    /// CRM record link, if one was discovered.
    pub crm_link: Option<String>,
    /// Client folder link, if document extraction found one.
    pub doc_link: Option<String>,
}

/// Outbound notification channel for the human reviewer.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Dispatch one notification; returns the channel's status code.
    async fn send(&self, request: &NotifyRequest) -> Result<u16, ServiceError>;
}

/// Slack incoming-webhook notifier.
///
/// Rich interactive layout is out of scope; the webhook gets a plain text
/// block with the summary, draft, and any discovered links.
pub struct SlackWebhookNotifier {
    http: reqwest::Client,
    webhook_url: String,
}

impl SlackWebhookNotifier {
    pub fn new(webhook_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            webhook_url,
        }
    }

    fn format_text(request: &NotifyRequest) -> String {
        let mut text = format!(
            "{}\n\n*Draft for {} (Re: {})*\n{}",
            request.summary, request.recipient, request.subject, request.draft
        );
        if let Some(ref crm) = request.crm_link {
            text.push_str(&format!("\nCRM: {crm}"));
        }
        if let Some(ref doc) = request.doc_link {
            text.push_str(&format!("\nDocs: {doc}"));
        }
        text
    }
}

#[async_trait]
impl Notifier for SlackWebhookNotifier {
    async fn send(&self, request: &NotifyRequest) -> Result<u16, ServiceError> {
        let body = serde_json::json!({ "text": Self::format_text(request) });

        let response = self
            .http
            .post(&self.webhook_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::Notify(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ServiceError::Notify(format!(
                "webhook returned HTTP {status}"
            )));
        }
        Ok(status.as_u16())
    }
}

/// Fallback when no webhook is configured.
pub struct UnavailableNotifier;

#[async_trait]
impl Notifier for UnavailableNotifier {
    async fn send(&self, _request: &NotifyRequest) -> Result<u16, ServiceError> {
        Err(ServiceError::NotConfigured("notifier".into()))
    }
}
