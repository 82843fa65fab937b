//! Inbound message source — the seam the background poller consumes.
//!
//! Mailbox protocol details (IMAP/Nylas/etc.) live behind this trait and are
//! deliberately out of the core's hands.

use async_trait::async_trait;

use crate::error::ServiceError;

/// One inbound email ready for the pipeline.
#[derive(Debug, Clone)]
pub struct InboundEmail {
    pub sender_email: String,
    pub sender_name: String,
    pub subject: String,
    /// Full message body; combined with the sender address it forms the
    /// session fingerprint.
    pub body: String,
}

/// Source of new inbound messages, scanned by the poller.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Fetch messages that have not been handed to the pipeline yet.
    async fn fetch_new(&self) -> Result<Vec<InboundEmail>, ServiceError>;
}

/// Fallback when no inbound channel is wired up; the poller idles.
pub struct IdleMessageSource;

#[async_trait]
impl MessageSource for IdleMessageSource {
    async fn fetch_new(&self) -> Result<Vec<InboundEmail>, ServiceError> {
        Ok(Vec::new())
    }
}
