//! Session recorder — fingerprint-keyed session lifecycle and stage timing.
//!
//! One session tracks a single email's traversal of the stage graph. The
//! recorder owns the idempotence contract: a completed fingerprint is never
//! reprocessed, a failed or stuck one is resumed in place.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::services::InboundEmail;
use crate::session::scoring;
use crate::store::{DraftMetrics, SessionStatus, SessionStore, StageExecutionRecord};

/// Stable deduplication key: sha256 over message body and sender address.
pub fn fingerprint(body: &str, sender_email: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    hasher.update(b"|");
    hasher.update(sender_email.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Live handle for one processing session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub id: Uuid,
    pub fingerprint: String,
    pub started_at: DateTime<Utc>,
}

/// Result of `SessionRecorder::start`.
#[derive(Debug)]
pub enum StartOutcome {
    /// The fingerprint already completed; caller must not re-run.
    Skipped,
    /// Fresh session inserted.
    Started(SessionHandle),
    /// Prior failed/processing session reset and reused.
    Resumed(SessionHandle),
}

impl StartOutcome {
    /// The handle, unless the session was skipped.
    pub fn handle(&self) -> Option<&SessionHandle> {
        match self {
            Self::Skipped => None,
            Self::Started(h) | Self::Resumed(h) => Some(h),
        }
    }
}

/// A pending stage timer (wall-clock start plus monotonic instant).
struct PendingStage {
    started_at: DateTime<Utc>,
    instant: Instant,
}

/// Outcome passed to `end_stage`.
#[derive(Debug, Default)]
pub struct StageOutcome {
    pub success: bool,
    pub error: Option<String>,
    pub input_snapshot: Option<serde_json::Value>,
    pub output_snapshot: Option<serde_json::Value>,
}

impl StageOutcome {
    pub fn ok(output_snapshot: Option<serde_json::Value>) -> Self {
        Self {
            success: true,
            output_snapshot,
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// Records session lifecycle, stage timings, and per-stage outcomes.
///
/// Safe to share across concurrently running sessions; timers are keyed by
/// (session, stage) so sessions never interfere with each other.
pub struct SessionRecorder {
    store: Arc<SessionStore>,
    timers: Mutex<HashMap<(Uuid, String), PendingStage>>,
}

impl SessionRecorder {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self {
            store,
            timers: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Start (or resume) the session for one inbound email.
    ///
    /// Completed fingerprint → `Skipped`. Failed/processing fingerprint →
    /// status reset to processing, timers restarted, existing row reused.
    /// Unknown fingerprint → fresh row.
    ///
    /// Two concurrent starts for the same new fingerprint may race; the
    /// UNIQUE constraint on the fingerprint column makes the loser surface
    /// a database error rather than creating a duplicate row.
    pub async fn start(&self, email: &InboundEmail) -> Result<StartOutcome, DatabaseError> {
        let fp = fingerprint(&email.body, &email.sender_email);
        let now = Utc::now();

        if let Some(existing) = self.store.find_by_fingerprint(&fp).await? {
            match existing.status {
                SessionStatus::Completed => {
                    info!(session = %existing.id, "Email already processed, skipping");
                    return Ok(StartOutcome::Skipped);
                }
                SessionStatus::Failed | SessionStatus::Processing => {
                    info!(session = %existing.id, status = existing.status.as_str(),
                        "Resuming previous session");
                    self.store.resume_session(existing.id, now).await?;
                    return Ok(StartOutcome::Resumed(SessionHandle {
                        id: existing.id,
                        fingerprint: fp,
                        started_at: now,
                    }));
                }
            }
        }

        let id = Uuid::new_v4();
        self.store
            .insert_session(
                id,
                &fp,
                &email.sender_email,
                &email.sender_name,
                &email.subject,
                now,
            )
            .await?;
        debug!(session = %id, "Started new session");

        Ok(StartOutcome::Started(SessionHandle {
            id,
            fingerprint: fp,
            started_at: now,
        }))
    }

    /// Open a stage timer. Starting the same stage again before `end_stage`
    /// overwrites the pending start (last-writer-wins).
    pub async fn start_stage(&self, handle: &SessionHandle, stage: &str) {
        let mut timers = self.timers.lock().await;
        timers.insert(
            (handle.id, stage.to_string()),
            PendingStage {
                started_at: Utc::now(),
                instant: Instant::now(),
            },
        );
    }

    /// Close a stage timer and persist exactly one execution record.
    /// A stop without a matching start is a no-op.
    pub async fn end_stage(
        &self,
        handle: &SessionHandle,
        stage: &str,
        outcome: StageOutcome,
    ) -> Result<(), DatabaseError> {
        let pending = {
            let mut timers = self.timers.lock().await;
            timers.remove(&(handle.id, stage.to_string()))
        };

        let Some(pending) = pending else {
            warn!(session = %handle.id, stage, "end_stage without start_stage, ignoring");
            return Ok(());
        };

        let duration_ms = pending.instant.elapsed().as_millis() as i64;
        let completed_at = Utc::now();

        self.store
            .insert_stage_execution(&StageExecutionRecord {
                session_id: handle.id,
                stage: stage.to_string(),
                started_at: pending.started_at,
                completed_at,
                duration_ms,
                success: outcome.success,
                error_message: outcome.error,
                input_snapshot: outcome.input_snapshot,
                output_snapshot: outcome.output_snapshot,
            })
            .await
    }

    /// Record the classification outcome for this session.
    pub async fn log_classification(
        &self,
        handle: &SessionHandle,
        label: &str,
        confidence: Option<f64>,
    ) -> Result<(), DatabaseError> {
        self.store
            .insert_classification(handle.id, label, confidence)
            .await
    }

    /// Record the rejection analysis outcome.
    pub async fn log_rejection(
        &self,
        handle: &SessionHandle,
        rejection_type: &str,
        challenge_angles: &[String],
    ) -> Result<(), DatabaseError> {
        self.store
            .insert_rejection_context(handle.id, rejection_type, challenge_angles)
            .await
    }

    /// Record a generated draft; derives the template adherence score from
    /// the final length when available, the raw length otherwise.
    pub async fn log_draft(
        &self,
        handle: &SessionHandle,
        mut metrics: DraftMetrics,
    ) -> Result<(), DatabaseError> {
        let scored_length = metrics.final_draft_length.unwrap_or(metrics.draft_length);
        metrics.template_adherence_score = scoring::template_adherence_score(scored_length);
        self.store.insert_draft(handle.id, &metrics).await
    }

    /// Finalize the session: terminal status, total duration, optional
    /// classification and error text. Drops any leftover stage timers.
    pub async fn complete(
        &self,
        handle: &SessionHandle,
        status: SessionStatus,
        classification: Option<&str>,
        error: Option<&str>,
    ) -> Result<(), DatabaseError> {
        let completed_at = Utc::now();
        let total_duration_ms = (completed_at - handle.started_at).num_milliseconds().max(0);

        {
            let mut timers = self.timers.lock().await;
            timers.retain(|(session, _), _| *session != handle.id);
        }

        self.store
            .complete_session(
                handle.id,
                status,
                completed_at,
                total_duration_ms,
                classification,
                error,
            )
            .await
    }
}
