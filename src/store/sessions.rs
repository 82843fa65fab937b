//! Session store — all SQL behind the session recorder.
//!
//! Every call is one acquire → execute → classified release cycle through
//! the pool; parameterized statements only.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::store::pool::{ConnectionPool, OwnedRow};

/// Terminal and in-flight session states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Processing,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            _ => Self::Processing,
        }
    }
}

/// A persisted session row.
#[derive(Debug, Clone)]
pub struct SessionRow {
    pub id: Uuid,
    pub fingerprint: String,
    pub sender_email: String,
    pub sender_name: String,
    pub subject: String,
    pub classification: Option<String>,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_duration_ms: Option<i64>,
    pub error_message: Option<String>,
}

/// One closed stage-execution record ready to persist.
#[derive(Debug, Clone)]
pub struct StageExecutionRecord {
    pub session_id: Uuid,
    pub stage: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub success: bool,
    pub error_message: Option<String>,
    pub input_snapshot: Option<serde_json::Value>,
    pub output_snapshot: Option<serde_json::Value>,
}

/// A persisted stage-execution row (read back for inspection/tests).
#[derive(Debug, Clone)]
pub struct StageExecutionRow {
    pub stage: String,
    pub duration_ms: i64,
    pub success: bool,
    pub error_message: Option<String>,
}

/// Context-usage metrics for one generated draft.
#[derive(Debug, Clone, Default)]
pub struct DraftMetrics {
    pub draft_length: usize,
    pub final_draft_length: Option<usize>,
    pub context_used: bool,
    pub context_length: usize,
    pub reference_threads_used: usize,
    pub placeholders_count: usize,
    pub template_adherence_score: f64,
    pub draft_content: Option<String>,
    pub final_content: Option<String>,
}

/// SQL layer for sessions and their per-stage records.
pub struct SessionStore {
    pool: ConnectionPool,
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| DateTime::<Utc>::MIN_UTC)
}

fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

fn opt_int(i: Option<i64>) -> libsql::Value {
    match i {
        Some(i) => libsql::Value::Integer(i),
        None => libsql::Value::Null,
    }
}

fn opt_real(r: Option<f64>) -> libsql::Value {
    match r {
        Some(r) => libsql::Value::Real(r),
        None => libsql::Value::Null,
    }
}

fn row_to_session(row: &OwnedRow) -> Result<SessionRow, DatabaseError> {
    let id_str: String = row
        .get(0)
        .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
    let status_str: String = row
        .get(6)
        .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
    let started_str: String = row
        .get(7)
        .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
    let completed_str: Option<String> = row.get(8).ok();

    Ok(SessionRow {
        id: Uuid::parse_str(&id_str)
            .map_err(|e| DatabaseError::Serialization(format!("bad session id: {e}")))?,
        fingerprint: row
            .get(1)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?,
        sender_email: row
            .get(2)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?,
        sender_name: row.get(3).unwrap_or_default(),
        subject: row.get(4).unwrap_or_default(),
        classification: row.get(5).ok(),
        status: SessionStatus::parse(&status_str),
        started_at: parse_datetime(&started_str),
        completed_at: completed_str.as_deref().map(parse_datetime),
        total_duration_ms: row.get(9).ok(),
        error_message: row.get(10).ok(),
    })
}

const SESSION_COLUMNS: &str = "id, fingerprint, sender_email, sender_name, subject, \
     classification, status, started_at, completed_at, total_duration_ms, error_message";

impl SessionStore {
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Look up a session by its content fingerprint.
    pub async fn find_by_fingerprint(
        &self,
        fingerprint: &str,
    ) -> Result<Option<SessionRow>, DatabaseError> {
        let rows = self
            .pool
            .query(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE fingerprint = ?1"),
                libsql::params![fingerprint],
            )
            .await?;
        rows.first().map(row_to_session).transpose()
    }

    /// Fetch a session by id.
    pub async fn get_session(&self, id: Uuid) -> Result<Option<SessionRow>, DatabaseError> {
        let rows = self
            .pool
            .query(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"),
                libsql::params![id.to_string()],
            )
            .await?;
        rows.first().map(row_to_session).transpose()
    }

    /// Insert a fresh session in `processing` state.
    #[allow(clippy::too_many_arguments)]
    pub async fn insert_session(
        &self,
        id: Uuid,
        fingerprint: &str,
        sender_email: &str,
        sender_name: &str,
        subject: &str,
        started_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        self.pool
            .execute(
                "INSERT INTO sessions
                 (id, fingerprint, sender_email, sender_name, subject, status, started_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 'processing', ?6)",
                libsql::params![
                    id.to_string(),
                    fingerprint,
                    sender_email,
                    sender_name,
                    subject,
                    started_at.to_rfc3339()
                ],
            )
            .await?;
        Ok(())
    }

    /// Reset a failed/processing session for another attempt.
    pub async fn resume_session(
        &self,
        id: Uuid,
        started_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        self.pool
            .execute(
                "UPDATE sessions
                 SET status = 'processing', started_at = ?1, completed_at = NULL,
                     total_duration_ms = NULL, error_message = NULL,
                     updated_at = datetime('now')
                 WHERE id = ?2",
                libsql::params![started_at.to_rfc3339(), id.to_string()],
            )
            .await?;
        Ok(())
    }

    /// Finalize a session with its terminal status.
    pub async fn complete_session(
        &self,
        id: Uuid,
        status: SessionStatus,
        completed_at: DateTime<Utc>,
        total_duration_ms: i64,
        classification: Option<&str>,
        error_message: Option<&str>,
    ) -> Result<(), DatabaseError> {
        self.pool
            .execute(
                "UPDATE sessions
                 SET status = ?1, completed_at = ?2, total_duration_ms = ?3,
                     classification = COALESCE(?4, classification), error_message = ?5,
                     updated_at = datetime('now')
                 WHERE id = ?6",
                libsql::params![
                    status.as_str(),
                    completed_at.to_rfc3339(),
                    total_duration_ms,
                    opt_text(classification),
                    opt_text(error_message),
                    id.to_string()
                ],
            )
            .await?;
        Ok(())
    }

    /// Persist one closed stage-execution record.
    pub async fn insert_stage_execution(
        &self,
        record: &StageExecutionRecord,
    ) -> Result<(), DatabaseError> {
        let input = record
            .input_snapshot
            .as_ref()
            .map(|v| v.to_string());
        let output = record
            .output_snapshot
            .as_ref()
            .map(|v| v.to_string());

        self.pool
            .execute(
                "INSERT INTO stage_executions
                 (id, session_id, stage, started_at, completed_at, duration_ms,
                  success, error_message, input_snapshot, output_snapshot)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                libsql::params![
                    Uuid::new_v4().to_string(),
                    record.session_id.to_string(),
                    record.stage.as_str(),
                    record.started_at.to_rfc3339(),
                    record.completed_at.to_rfc3339(),
                    record.duration_ms,
                    record.success as i64,
                    opt_text(record.error_message.as_deref()),
                    opt_text(input.as_deref()),
                    opt_text(output.as_deref())
                ],
            )
            .await?;
        Ok(())
    }

    /// Stage executions for one session, in insertion order.
    pub async fn stage_executions(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<StageExecutionRow>, DatabaseError> {
        let rows = self
            .pool
            .query(
                "SELECT stage, duration_ms, success, error_message
                 FROM stage_executions WHERE session_id = ?1 ORDER BY rowid",
                libsql::params![session_id.to_string()],
            )
            .await?;

        rows.iter()
            .map(|row| {
                Ok(StageExecutionRow {
                    stage: row
                        .get(0)
                        .map_err(|e| DatabaseError::Serialization(e.to_string()))?,
                    duration_ms: row
                        .get(1)
                        .map_err(|e| DatabaseError::Serialization(e.to_string()))?,
                    success: row
                        .get::<i64>(2)
                        .map_err(|e| DatabaseError::Serialization(e.to_string()))?
                        != 0,
                    error_message: row.get(3).ok(),
                })
            })
            .collect()
    }

    /// Record the classification outcome (written once per session).
    pub async fn insert_classification(
        &self,
        session_id: Uuid,
        predicted_label: &str,
        confidence: Option<f64>,
    ) -> Result<(), DatabaseError> {
        self.pool
            .execute(
                "INSERT INTO classification_results
                 (id, session_id, predicted_label, confidence)
                 VALUES (?1, ?2, ?3, ?4)",
                libsql::params![
                    Uuid::new_v4().to_string(),
                    session_id.to_string(),
                    predicted_label,
                    opt_real(confidence)
                ],
            )
            .await?;
        Ok(())
    }

    /// Record a rejection analysis outcome.
    pub async fn insert_rejection_context(
        &self,
        session_id: Uuid,
        rejection_type: &str,
        challenge_angles: &[String],
    ) -> Result<(), DatabaseError> {
        let angles = serde_json::to_string(challenge_angles)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        self.pool
            .execute(
                "INSERT INTO rejection_contexts
                 (id, session_id, rejection_type, challenge_angles)
                 VALUES (?1, ?2, ?3, ?4)",
                libsql::params![
                    Uuid::new_v4().to_string(),
                    session_id.to_string(),
                    rejection_type,
                    angles
                ],
            )
            .await?;
        Ok(())
    }

    /// Record a generated draft with its context-usage metrics.
    pub async fn insert_draft(
        &self,
        session_id: Uuid,
        metrics: &DraftMetrics,
    ) -> Result<(), DatabaseError> {
        self.pool
            .execute(
                "INSERT INTO draft_generations
                 (id, session_id, draft_length, final_draft_length, context_used,
                  context_length, reference_threads_used, placeholders_count,
                  template_adherence_score, draft_content, final_content)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                libsql::params![
                    Uuid::new_v4().to_string(),
                    session_id.to_string(),
                    metrics.draft_length as i64,
                    opt_int(metrics.final_draft_length.map(|l| l as i64)),
                    metrics.context_used as i64,
                    metrics.context_length as i64,
                    metrics.reference_threads_used as i64,
                    metrics.placeholders_count as i64,
                    metrics.template_adherence_score,
                    opt_text(metrics.draft_content.as_deref()),
                    opt_text(metrics.final_content.as_deref())
                ],
            )
            .await?;
        Ok(())
    }

    /// Number of draft records for one session (used by tests and dashboards).
    pub async fn draft_count(&self, session_id: Uuid) -> Result<i64, DatabaseError> {
        let rows = self
            .pool
            .query(
                "SELECT COUNT(*) FROM draft_generations WHERE session_id = ?1",
                libsql::params![session_id.to_string()],
            )
            .await?;
        rows.first()
            .map(|row| {
                row.get::<i64>(0)
                    .map_err(|e| DatabaseError::Serialization(e.to_string()))
            })
            .unwrap_or(Ok(0))
    }

    /// Write one human quality-feedback record.
    #[allow(clippy::too_many_arguments)]
    pub async fn insert_feedback(
        &self,
        session_id: Uuid,
        human_action: &str,
        human_rating: Option<i64>,
        edit_distance: i64,
        edit_type: Option<&str>,
        feedback_notes: Option<&str>,
        final_quality_score: f64,
    ) -> Result<(), DatabaseError> {
        self.pool
            .execute(
                "INSERT INTO quality_feedback
                 (id, session_id, human_action, human_rating, edit_distance,
                  edit_type, feedback_notes, final_quality_score)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                libsql::params![
                    Uuid::new_v4().to_string(),
                    session_id.to_string(),
                    human_action,
                    opt_int(human_rating),
                    edit_distance,
                    opt_text(edit_type),
                    opt_text(feedback_notes),
                    final_quality_score
                ],
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::migrations;

    async fn test_store() -> (tempfile::TempDir, SessionStore) {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sessions.db");
        let pool = ConnectionPool::open_local(path.to_str().unwrap(), 2)
            .await
            .unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        (tmp, SessionStore::new(pool))
    }

    async fn insert_test_session(store: &SessionStore, fingerprint: &str) -> Uuid {
        let id = Uuid::new_v4();
        store
            .insert_session(
                id,
                fingerprint,
                "jane@show.example",
                "Jane Doe",
                "Re: Podcast Guest",
                Utc::now(),
            )
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn insert_and_find_by_fingerprint() {
        let (_tmp, store) = test_store().await;
        let id = insert_test_session(&store, "fp-abc").await;

        let found = store.find_by_fingerprint("fp-abc").await.unwrap().unwrap();
        assert_eq!(found.id, id);
        assert_eq!(found.status, SessionStatus::Processing);
        assert_eq!(found.sender_email, "jane@show.example");

        assert!(store.find_by_fingerprint("fp-other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_fingerprint_rejected() {
        let (_tmp, store) = test_store().await;
        insert_test_session(&store, "fp-dup").await;

        let err = store
            .insert_session(
                Uuid::new_v4(),
                "fp-dup",
                "other@x.y",
                "",
                "",
                Utc::now(),
            )
            .await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn complete_session_writes_terminal_state() {
        let (_tmp, store) = test_store().await;
        let id = insert_test_session(&store, "fp-1").await;

        store
            .complete_session(
                id,
                SessionStatus::Completed,
                Utc::now(),
                1234,
                Some("Accepted"),
                None,
            )
            .await
            .unwrap();

        let session = store.get_session(id).await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.total_duration_ms, Some(1234));
        assert_eq!(session.classification.as_deref(), Some("Accepted"));
        assert!(session.completed_at.is_some());
    }

    #[tokio::test]
    async fn resume_clears_failure_fields() {
        let (_tmp, store) = test_store().await;
        let id = insert_test_session(&store, "fp-2").await;
        store
            .complete_session(
                id,
                SessionStatus::Failed,
                Utc::now(),
                10,
                None,
                Some("boom"),
            )
            .await
            .unwrap();

        store.resume_session(id, Utc::now()).await.unwrap();

        let session = store.get_session(id).await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Processing);
        assert!(session.completed_at.is_none());
        assert!(session.error_message.is_none());
    }

    #[tokio::test]
    async fn stage_execution_round_trip() {
        let (_tmp, store) = test_store().await;
        let id = insert_test_session(&store, "fp-3").await;

        let now = Utc::now();
        store
            .insert_stage_execution(&StageExecutionRecord {
                session_id: id,
                stage: "classify".into(),
                started_at: now,
                completed_at: now,
                duration_ms: 42,
                success: true,
                error_message: None,
                input_snapshot: None,
                output_snapshot: Some(serde_json::json!({"label": "Accepted"})),
            })
            .await
            .unwrap();

        let executions = store.stage_executions(id).await.unwrap();
        assert_eq!(executions.len(), 1);
        assert_eq!(executions[0].stage, "classify");
        assert_eq!(executions[0].duration_ms, 42);
        assert!(executions[0].success);
    }

    #[tokio::test]
    async fn rejection_context_and_draft_persist() {
        let (_tmp, store) = test_store().await;
        let id = insert_test_session(&store, "fp-4").await;

        store
            .insert_rejection_context(id, "Soft Rejection", &["angle one".into()])
            .await
            .unwrap();

        store
            .insert_draft(
                id,
                &DraftMetrics {
                    draft_length: 300,
                    final_draft_length: Some(280),
                    context_used: true,
                    context_length: 1500,
                    reference_threads_used: 5,
                    placeholders_count: 2,
                    template_adherence_score: 1.0,
                    draft_content: Some("draft".into()),
                    final_content: Some("final".into()),
                },
            )
            .await
            .unwrap();

        assert_eq!(store.draft_count(id).await.unwrap(), 1);
    }
}
