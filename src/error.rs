//! Error types for the booking assistant.

/// Top-level error type for the assistant.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Coarse fault classification for persistence errors.
///
/// Consumed by the connection pool's release policy: Transient connections
/// are closed and never recycled; Fatal and Unknown errors roll back and
/// keep the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Infrastructure fault expected to clear on retry (dropped/reset connection).
    Transient,
    /// Caller error that no retry will fix (constraint violation, bad SQL).
    Fatal,
    /// Anything we can't place in the other two buckets.
    Unknown,
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Pool unavailable after {attempts} validation attempts: {reason}")]
    Unavailable { attempts: u32, reason: String },

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl DatabaseError {
    /// Classify this error for the pool's retry/close/keep policy.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Connection(_) | Self::Unavailable { .. } => ErrorClass::Transient,
            Self::Constraint(_) | Self::Migration(_) => ErrorClass::Fatal,
            Self::Query(_) | Self::Serialization(_) => ErrorClass::Unknown,
        }
    }
}

/// Text-generation collaborator errors. Never retried by the core.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors from the non-LLM external collaborators.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Vector search failed: {0}")]
    VectorSearch(String),

    #[error("Document store error: {0}")]
    DocumentStore(String),

    #[error("Notification dispatch failed: {0}")]
    Notify(String),

    #[error("Draft creation failed: {0}")]
    DraftCreation(String),

    #[error("Message fetch failed: {0}")]
    MessageFetch(String),

    #[error("Service not configured: {0}")]
    NotConfigured(String),
}

/// Pipeline-level errors. A stage error aborts only its own session.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Stage {stage} failed: {reason}")]
    Stage { stage: String, reason: String },

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl PipelineError {
    /// Wrap a stage failure with the name of the stage that raised it.
    pub fn stage(stage: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Stage {
            stage: stage.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type alias for the assistant.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_errors_classify_transient() {
        assert_eq!(
            DatabaseError::Connection("ssl closed".into()).class(),
            ErrorClass::Transient
        );
        assert_eq!(
            DatabaseError::Unavailable {
                attempts: 3,
                reason: "x".into()
            }
            .class(),
            ErrorClass::Transient
        );
    }

    #[test]
    fn constraint_errors_classify_fatal() {
        assert_eq!(
            DatabaseError::Constraint("UNIQUE failed".into()).class(),
            ErrorClass::Fatal
        );
    }

    #[test]
    fn query_errors_classify_unknown() {
        assert_eq!(
            DatabaseError::Query("syntax error".into()).class(),
            ErrorClass::Unknown
        );
    }
}
