//! Version-tracked database migrations.
//!
//! Each migration has a version number and SQL. `run_migrations()` checks
//! the current version and applies only the new ones sequentially.

use crate::error::DatabaseError;
use crate::store::pool::ConnectionPool;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "initial_schema",
    sql: r#"
        CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            fingerprint TEXT NOT NULL UNIQUE,
            sender_email TEXT NOT NULL,
            sender_name TEXT NOT NULL DEFAULT '',
            subject TEXT NOT NULL DEFAULT '',
            classification TEXT,
            status TEXT NOT NULL DEFAULT 'processing',
            started_at TEXT NOT NULL,
            completed_at TEXT,
            total_duration_ms INTEGER,
            error_message TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_sessions_fingerprint ON sessions(fingerprint);
        CREATE INDEX IF NOT EXISTS idx_sessions_status ON sessions(status);

        CREATE TABLE IF NOT EXISTS stage_executions (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
            stage TEXT NOT NULL,
            started_at TEXT NOT NULL,
            completed_at TEXT NOT NULL,
            duration_ms INTEGER NOT NULL,
            success INTEGER NOT NULL,
            error_message TEXT,
            input_snapshot TEXT,
            output_snapshot TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_stage_executions_session
            ON stage_executions(session_id);

        CREATE TABLE IF NOT EXISTS classification_results (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
            predicted_label TEXT NOT NULL,
            confidence REAL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_classification_results_session
            ON classification_results(session_id);

        CREATE TABLE IF NOT EXISTS rejection_contexts (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
            rejection_type TEXT NOT NULL,
            challenge_angles TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_rejection_contexts_session
            ON rejection_contexts(session_id);

        CREATE TABLE IF NOT EXISTS draft_generations (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
            draft_length INTEGER NOT NULL,
            final_draft_length INTEGER,
            context_used INTEGER NOT NULL DEFAULT 0,
            context_length INTEGER NOT NULL DEFAULT 0,
            reference_threads_used INTEGER NOT NULL DEFAULT 0,
            placeholders_count INTEGER NOT NULL DEFAULT 0,
            template_adherence_score REAL,
            draft_content TEXT,
            final_content TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_draft_generations_session
            ON draft_generations(session_id);

        CREATE TABLE IF NOT EXISTS quality_feedback (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
            human_action TEXT NOT NULL,
            human_rating INTEGER,
            edit_distance INTEGER NOT NULL DEFAULT 0,
            edit_type TEXT,
            feedback_notes TEXT,
            final_quality_score REAL NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_quality_feedback_session
            ON quality_feedback(session_id);
    "#,
}];

/// Run all pending migrations through the pool.
pub async fn run_migrations(pool: &ConnectionPool) -> Result<(), DatabaseError> {
    pool.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("failed to create _migrations table: {e}")))?;

    let current_version = get_current_version(pool).await?;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            apply_batch(pool, migration.sql).await.map_err(|e| {
                DatabaseError::Migration(format!(
                    "migration V{} ({}) failed: {e}",
                    migration.version, migration.name
                ))
            })?;
            pool.execute(
                "INSERT INTO _migrations (version, name) VALUES (?1, ?2)",
                libsql::params![migration.version, migration.name],
            )
            .await
            .map_err(|e| DatabaseError::Migration(format!("failed to record version: {e}")))?;
        }
    }

    tracing::info!("Database migrations complete");
    Ok(())
}

async fn get_current_version(pool: &ConnectionPool) -> Result<i64, DatabaseError> {
    let rows = pool
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("failed to read version: {e}")))?;
    match rows.first() {
        Some(row) => row
            .get::<i64>(0)
            .map_err(|e| DatabaseError::Migration(format!("bad version column: {e}"))),
        None => Ok(0),
    }
}

/// Run each statement of a `;`-separated DDL batch on one pooled connection.
async fn apply_batch(pool: &ConnectionPool, sql: &str) -> Result<(), DatabaseError> {
    let pooled = pool.acquire().await?;
    let result = pooled
        .conn()
        .execute_batch(sql)
        .await
        .map_err(|e| DatabaseError::Migration(e.to_string()));
    match result {
        Ok(_) => {
            pool.release(pooled, Ok(())).await;
            Ok(())
        }
        Err(e) => {
            pool.release(pooled, Err(&e)).await;
            Err(e)
        }
    }
}
