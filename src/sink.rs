//! # Transaction Session Boundary
//!
//! The engine never talks to a database directly. It goes through two small
//! traits: a [`Sink`] opens one transaction with a prepared insert, and the
//! resulting [`SinkSession`] accepts row executions until it is handed off
//! for commit. Exactly one session is "current" for an engine at any
//! instant; older sessions may still be committing on blocking tasks while
//! the current one accepts new rows.
//!
//! Keeping this boundary a trait does two things:
//! - the engine stays generic over the actual store, and
//! - tests can drive the engine with in-process fakes, including fakes that
//!   fail commits on demand.
//!
//! [`SqliteSink`] is the production implementation. It opens a dedicated
//! connection per session against a shared database file, so a committing
//! session never blocks the connection the new epoch is writing through.

use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use rusqlite::{params_from_iter, Connection};

use crate::error::Result;

pub use rusqlite::types::Value;

/// How long a session waits on SQLite's write lock before giving up.
///
/// With one connection per epoch, the new epoch's first insert can arrive
/// while the previous epoch is still committing; the busy timeout makes it
/// wait instead of failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// Traits
// =============================================================================

/// A single open transaction with a prepared insert statement.
///
/// `execute` may be called many times, in row-arrival order, by the
/// engine's drain loop. `commit` consumes the session; ownership transfers
/// to the asynchronous commit task exclusively, so a committed session is
/// never touched again.
pub trait SinkSession: Send + Sync {
    /// Executes one row. The values must match the insert statement's
    /// placeholder order.
    fn execute(&self, values: &[Value]) -> Result<()>;

    /// Commits the transaction, consuming the session.
    fn commit(self: Box<Self>) -> Result<()>;
}

/// Factory for transaction sessions.
pub trait Sink: Send + Sync {
    /// Opens a new transaction and prepares `insert_sql` against it.
    fn begin(&self, insert_sql: &str) -> Result<Box<dyn SinkSession>>;
}

// =============================================================================
// SQLite implementation
// =============================================================================

/// SQLite-backed sink. One connection is opened per session so that
/// commits of old epochs and executions against the current epoch can
/// overlap (serialized only by SQLite's own write lock).
#[derive(Debug, Clone)]
pub struct SqliteSink {
    path: PathBuf,
}

impl SqliteSink {
    /// Creates a sink against a database file. The schema must already be
    /// initialized (see [`crate::schema::Database`]).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Sink for SqliteSink {
    fn begin(&self, insert_sql: &str) -> Result<Box<dyn SinkSession>> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        // WAL so readers and the committing previous epoch don't block row
        // execution on this connection.
        conn.execute_batch("PRAGMA journal_mode = WAL")?;
        conn.execute_batch("PRAGMA synchronous = NORMAL")?;
        conn.execute_batch("BEGIN")?;

        Ok(Box::new(SqliteSession {
            conn: Mutex::new(conn),
            insert_sql: insert_sql.to_string(),
        }))
    }
}

/// One SQLite transaction. Dropping the session without committing closes
/// the connection, which rolls the transaction back.
struct SqliteSession {
    // The engine executes rows from a single drain task, but the session
    // sits behind a shared epoch lock, so interior mutability is needed to
    // satisfy Sync. Contention on this mutex is nil in practice.
    conn: Mutex<Connection>,
    insert_sql: String,
}

impl SinkSession for SqliteSession {
    fn execute(&self, values: &[Value]) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut stmt = conn.prepare_cached(&self.insert_sql)?;
        stmt.execute(params_from_iter(values.iter()))?;
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<()> {
        let conn = self
            .conn
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        conn.execute_batch("COMMIT")?;
        Ok(())
    }
}
