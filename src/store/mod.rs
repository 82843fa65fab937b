//! Persistence layer — resilient libSQL connection pool, migrations, and
//! the session store all recorder writes go through.

pub mod migrations;
pub mod pool;
pub mod sessions;

pub use pool::{ConnectionPool, PooledConnection};
pub use sessions::{
    DraftMetrics, SessionRow, SessionStatus, SessionStore, StageExecutionRecord,
    StageExecutionRow,
};
