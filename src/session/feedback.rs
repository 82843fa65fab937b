//! Human feedback ingestion for generated drafts.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::session::scoring;
use crate::store::SessionStore;

/// Reviewer feedback on one session's draft.
#[derive(Debug, Clone)]
pub struct HumanFeedback {
    /// What the reviewer did: "approved", "rejected", "rated".
    pub action: String,
    /// Optional 1-5 star rating.
    pub rating: Option<u8>,
    /// Character-level distance between the draft and what was sent.
    pub edit_distance: usize,
    pub notes: Option<String>,
}

/// Scores and persists human feedback against a session.
pub struct FeedbackSink {
    store: Arc<SessionStore>,
}

impl FeedbackSink {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self { store }
    }

    /// Derive the composite quality score and edit-type bucket, then persist.
    /// Returns the score that was recorded.
    pub async fn record(
        &self,
        session_id: Uuid,
        feedback: &HumanFeedback,
    ) -> Result<f64, DatabaseError> {
        let score = scoring::quality_score(&feedback.action, feedback.rating, feedback.edit_distance);
        let edit_type = scoring::edit_type(feedback.edit_distance);

        self.store
            .insert_feedback(
                session_id,
                &feedback.action,
                feedback.rating.map(i64::from),
                feedback.edit_distance as i64,
                edit_type,
                feedback.notes.as_deref(),
                score,
            )
            .await?;

        info!(session = %session_id, action = feedback.action.as_str(), score,
            "Recorded human feedback");
        Ok(score)
    }
}
