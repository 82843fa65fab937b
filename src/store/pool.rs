//! Resilient libSQL connection pool.
//!
//! Every checkout is validated with a `SELECT 1` round-trip before the
//! connection is handed out; a connection that fails validation is discarded
//! (never recycled) and the acquire retries with increasing backoff. Release
//! consults the typed `ErrorClass` taxonomy: transient faults close the
//! connection, anything else rolls back and recycles if the connection still
//! answers a liveness probe.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use libsql::Connection;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

use crate::error::{DatabaseError, ErrorClass};

/// Validation attempts before `acquire` reports the pool unavailable.
const ACQUIRE_ATTEMPTS: u32 = 3;

/// Backoff step between validation attempts (multiplied by attempt number).
const BACKOFF_STEP: Duration = Duration::from_millis(500);

/// A checked-out connection. Holds a pool permit for its lifetime; dropping
/// it without calling `release` discards the connection.
#[derive(Debug)]
pub struct PooledConnection {
    conn: Connection,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    /// Access the underlying connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}

/// Bounded pool of validated libSQL connections.
pub struct ConnectionPool {
    db: libsql::Database,
    idle: Mutex<Vec<Connection>>,
    permits: Arc<Semaphore>,
    discarded: AtomicU64,
    #[cfg(test)]
    inject_validation_failures: AtomicU64,
}

impl ConnectionPool {
    /// Open (or create) a local database file and wrap it in a pool of
    /// at most `size` concurrent connections.
    pub async fn open_local(path: &str, size: usize) -> Result<Self, DatabaseError> {
        if let Some(parent) = std::path::Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Connection(format!("failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Connection(format!("failed to open database: {e}")))?;

        Ok(Self::new(db, size))
    }

    /// In-memory pool (for tests).
    pub async fn open_memory(size: usize) -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Connection(format!("failed to create in-memory database: {e}"))
            })?;
        Ok(Self::new(db, size))
    }

    fn new(db: libsql::Database, size: usize) -> Self {
        Self {
            db,
            idle: Mutex::new(Vec::with_capacity(size)),
            permits: Arc::new(Semaphore::new(size.max(1))),
            discarded: AtomicU64::new(0),
            #[cfg(test)]
            inject_validation_failures: AtomicU64::new(0),
        }
    }

    /// Number of connections the pool has discarded as unhealthy.
    pub fn discarded_count(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }

    /// Check out a validated connection.
    ///
    /// Retries up to three times with increasing backoff, discarding every
    /// connection that fails its validation round-trip. Exhaustion returns
    /// `DatabaseError::Unavailable`.
    pub async fn acquire(&self) -> Result<PooledConnection, DatabaseError> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| DatabaseError::Connection("pool closed".into()))?;

        let mut last_error = String::new();
        for attempt in 1..=ACQUIRE_ATTEMPTS {
            match self.checkout().await {
                Ok(conn) => match self.validate(&conn).await {
                    Ok(()) => {
                        return Ok(PooledConnection {
                            conn,
                            _permit: permit,
                        });
                    }
                    Err(e) => {
                        warn!(attempt, error = %e, "Connection failed validation, discarding");
                        self.discard(conn);
                        last_error = e;
                    }
                },
                Err(e) => {
                    warn!(attempt, error = %e, "Failed to open connection");
                    last_error = e.to_string();
                }
            }

            if attempt < ACQUIRE_ATTEMPTS {
                tokio::time::sleep(BACKOFF_STEP * attempt).await;
            }
        }

        Err(DatabaseError::Unavailable {
            attempts: ACQUIRE_ATTEMPTS,
            reason: last_error,
        })
    }

    /// Return a connection after use.
    ///
    /// `outcome` is the result of whatever query ran on it. Success returns
    /// the connection to the idle list. A transient failure closes it. Other
    /// failures roll back, then a liveness probe decides recycle vs. close.
    pub async fn release(&self, pooled: PooledConnection, outcome: Result<(), &DatabaseError>) {
        let PooledConnection { conn, _permit } = pooled;

        match outcome {
            Ok(()) => {
                self.idle.lock().await.push(conn);
            }
            Err(e) if e.class() == ErrorClass::Transient => {
                debug!(error = %e, "Transient failure, closing connection");
                self.discard(conn);
            }
            Err(e) => {
                // Best-effort rollback; the connection may not be in a
                // transaction at all.
                let _ = conn.execute("ROLLBACK", ()).await;
                match self.validate(&conn).await {
                    Ok(()) => self.idle.lock().await.push(conn),
                    Err(probe) => {
                        debug!(error = %e, probe = %probe, "Connection failed liveness probe, closing");
                        self.discard(conn);
                    }
                }
            }
        }
    }

    async fn checkout(&self) -> Result<Connection, DatabaseError> {
        if let Some(conn) = self.idle.lock().await.pop() {
            return Ok(conn);
        }

        let conn = self
            .db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("failed to connect: {e}")))?;

        conn.execute("PRAGMA foreign_keys = ON", ())
            .await
            .map_err(|e| DatabaseError::Connection(format!("failed to enable FKs: {e}")))?;
        Ok(conn)
    }

    /// Trivial round-trip proving the connection answers queries.
    async fn validate(&self, conn: &Connection) -> Result<(), String> {
        #[cfg(test)]
        {
            let pending = self.inject_validation_failures.load(Ordering::Relaxed);
            if pending > 0 {
                self.inject_validation_failures
                    .store(pending - 1, Ordering::Relaxed);
                return Err("connection closed (injected)".into());
            }
        }

        let mut rows = conn
            .query("SELECT 1", ())
            .await
            .map_err(|e| format!("validation query failed: {e}"))?;
        rows.next()
            .await
            .map_err(|e| format!("validation fetch failed: {e}"))?
            .ok_or_else(|| "validation query returned no row".to_string())?;
        Ok(())
    }

    fn discard(&self, conn: Connection) {
        self.discarded.fetch_add(1, Ordering::Relaxed);
        drop(conn);
    }

    #[cfg(test)]
    fn inject_validation_failures(&self, count: u64) {
        self.inject_validation_failures
            .store(count, Ordering::Relaxed);
    }

    // ── Query helpers ───────────────────────────────────────────────
    //
    // All consumers go through these; each call is one acquire → execute →
    // classified release cycle, so no caller ever holds a connection across
    // an external collaborator call.

    /// Execute a parameterized statement; returns affected row count.
    pub async fn execute(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<u64, DatabaseError> {
        let pooled = self.acquire().await?;
        let result = pooled
            .conn()
            .execute(sql, params)
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()));
        match result {
            Ok(count) => {
                self.release(pooled, Ok(())).await;
                Ok(count)
            }
            Err(e) => {
                self.release(pooled, Err(&e)).await;
                Err(e)
            }
        }
    }

    /// Run a parameterized query and collect all rows.
    pub async fn query(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<OwnedRow>, DatabaseError> {
        let pooled = self.acquire().await?;
        let result = Self::collect_rows(pooled.conn(), sql, params).await;
        match result {
            Ok(rows) => {
                self.release(pooled, Ok(())).await;
                Ok(rows)
            }
            Err(e) => {
                self.release(pooled, Err(&e)).await;
                Err(e)
            }
        }
    }

    async fn collect_rows(
        conn: &Connection,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<OwnedRow>, DatabaseError> {
        let mut rows = conn
            .query(sql, params)
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;

        // libsql's `Row` is a view over the statement's current cursor
        // position, so its values must be copied out before the next step
        // invalidates them.
        let column_count = rows.column_count();
        let mut collected = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?
        {
            let mut values = Vec::with_capacity(column_count as usize);
            for idx in 0..column_count {
                values.push(
                    row.get_value(idx)
                        .map_err(|e| DatabaseError::Query(e.to_string()))?,
                );
            }
            collected.push(OwnedRow { values });
        }
        Ok(collected)
    }
}

/// A row whose values have been copied out of the statement cursor, so it
/// stays readable after the cursor advances or the connection is released.
#[derive(Debug, Clone)]
pub struct OwnedRow {
    values: Vec<libsql::Value>,
}

impl OwnedRow {
    /// Fetch the value at the provided column index and convert it to `T`
    /// (mirrors `libsql::Row::get`).
    pub fn get<T>(&self, idx: i32) -> libsql::Result<T>
    where
        T: FromSqlValue,
    {
        let value = self
            .values
            .get(idx as usize)
            .ok_or(libsql::Error::InvalidColumnIndex)?;
        T::from_sql_value(value.clone())
    }
}

/// Conversion from a SQL value, matching `libsql::Row::get` semantics:
/// `Null` is `Error::NullValue`, a type mismatch is `InvalidColumnType`.
pub trait FromSqlValue: Sized {
    fn from_sql_value(value: libsql::Value) -> libsql::Result<Self>;
}

impl FromSqlValue for i64 {
    fn from_sql_value(value: libsql::Value) -> libsql::Result<Self> {
        match value {
            libsql::Value::Null => Err(libsql::Error::NullValue),
            libsql::Value::Integer(i) => Ok(i),
            _ => Err(libsql::Error::InvalidColumnType),
        }
    }
}

impl FromSqlValue for f64 {
    fn from_sql_value(value: libsql::Value) -> libsql::Result<Self> {
        match value {
            libsql::Value::Null => Err(libsql::Error::NullValue),
            libsql::Value::Real(f) => Ok(f),
            _ => Err(libsql::Error::InvalidColumnType),
        }
    }
}

impl FromSqlValue for String {
    fn from_sql_value(value: libsql::Value) -> libsql::Result<Self> {
        match value {
            libsql::Value::Null => Err(libsql::Error::NullValue),
            libsql::Value::Text(s) => Ok(s),
            _ => Err(libsql::Error::InvalidColumnType),
        }
    }
}
