//! # Persisted State Layout
//!
//! One append-only raw table per payload type, columns matching the
//! corresponding adapter's insert statement. The engine owns no other
//! persisted state: group counters are volatile and lost on restart, which
//! can under-acknowledge after a crash but never over-acknowledge, since
//! settlement fires only after a successful commit.
//!
//! There is no migration machinery here; table creation is idempotent and
//! guarded by a stored schema version.

use rusqlite::Connection;

use crate::error::{Error, Result};

/// Current schema version. Incremented on breaking layout changes; a
/// mismatch on open is an error rather than a migration.
const SCHEMA_VERSION: i32 = 1;

/// Raw DAO lifecycle events (`dao_created`, `dao_updated`).
///
/// `strategies` and `categories` hold JSON-encoded arrays; `created_at` is
/// the ingestion timestamp in unix seconds.
const CREATE_DAOS_RAW: &str = r#"
CREATE TABLE IF NOT EXISTS daos_raw (
    dao_id          TEXT NOT NULL,
    event_type      TEXT NOT NULL,
    created_at      INTEGER NOT NULL,
    network         TEXT NOT NULL,
    strategies      TEXT NOT NULL,
    categories      TEXT NOT NULL,
    followers_count INTEGER NOT NULL,
    proposals_count INTEGER NOT NULL
)
"#;

/// Raw proposal lifecycle events. `created_at` comes from the payload's own
/// creation timestamp; `choices` and `scores` are JSON-encoded arrays.
const CREATE_PROPOSALS_RAW: &str = r#"
CREATE TABLE IF NOT EXISTS proposals_raw (
    dao_id         TEXT NOT NULL,
    event_type     TEXT NOT NULL,
    created_at     INTEGER NOT NULL,
    proposal_id    TEXT NOT NULL,
    network        TEXT NOT NULL,
    strategies     TEXT NOT NULL,
    author         TEXT,
    kind           TEXT NOT NULL,
    title          TEXT,
    body           TEXT,
    choices        TEXT NOT NULL,
    start          INTEGER NOT NULL,
    end            INTEGER NOT NULL,
    quorum         REAL NOT NULL,
    state          TEXT NOT NULL,
    scores         TEXT NOT NULL,
    scores_state   TEXT NOT NULL,
    scores_total   REAL NOT NULL,
    scores_updated INTEGER NOT NULL,
    votes          INTEGER NOT NULL,
    spam           INTEGER NOT NULL DEFAULT 0
)
"#;

/// Raw votes. `choice` is JSON-encoded: snapshot-style voting allows
/// numbers, arrays, and maps depending on the voting system.
const CREATE_VOTES_RAW: &str = r#"
CREATE TABLE IF NOT EXISTS votes_raw (
    dao_id         TEXT NOT NULL,
    proposal_id    TEXT NOT NULL,
    created_at     INTEGER NOT NULL,
    voter          TEXT NOT NULL,
    app            TEXT NOT NULL,
    choice         TEXT NOT NULL,
    vp             REAL NOT NULL,
    vp_by_strategy TEXT NOT NULL,
    vp_state       TEXT NOT NULL
)
"#;

/// Governance token price points, one row per observation.
const CREATE_TOKEN_PRICES: &str = r#"
CREATE TABLE IF NOT EXISTS token_prices (
    dao_id     TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    price      REAL NOT NULL
)
"#;

const CREATE_METADATA: &str = r#"
CREATE TABLE IF NOT EXISTS govsink_metadata (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
"#;

/// A wrapper around a SQLite connection with the govsink schema.
///
/// Opening a `Database` creates the tables if needed and verifies the
/// schema version. Engines do not hold a `Database`; they go through
/// [`crate::sink::SqliteSink`], which opens its own connections against the
/// same file. This type exists for initialization and for read-side tools.
#[derive(Debug)]
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Opens a database file, creating and initializing it if necessary.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        let mut db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Creates an in-memory database. Useful only for schema-level tests;
    /// engines need a file-backed database because each session opens its
    /// own connection.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let mut db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    fn initialize(&mut self) -> Result<()> {
        // WAL lets the committing previous epoch overlap with the current
        // epoch's executions on separate connections.
        self.conn.execute_batch("PRAGMA journal_mode = WAL")?;
        self.conn.execute_batch("PRAGMA synchronous = NORMAL")?;

        self.conn.execute_batch(CREATE_METADATA)?;
        self.conn.execute_batch(CREATE_DAOS_RAW)?;
        self.conn.execute_batch(CREATE_PROPOSALS_RAW)?;
        self.conn.execute_batch(CREATE_VOTES_RAW)?;
        self.conn.execute_batch(CREATE_TOKEN_PRICES)?;

        self.verify_or_set_version()
    }

    fn verify_or_set_version(&mut self) -> Result<()> {
        let existing: Option<i32> = self
            .conn
            .query_row(
                "SELECT value FROM govsink_metadata WHERE key = 'schema_version'",
                [],
                |row| {
                    let s: String = row.get(0)?;
                    Ok(s.parse().unwrap_or(0))
                },
            )
            .ok();

        match existing {
            None => {
                self.conn.execute(
                    "INSERT INTO govsink_metadata (key, value) VALUES ('schema_version', ?)",
                    [SCHEMA_VERSION.to_string()],
                )?;
                Ok(())
            }
            Some(v) if v == SCHEMA_VERSION => Ok(()),
            Some(v) => Err(Error::Schema(format!(
                "schema version mismatch: database has version {v}, this govsink version requires {SCHEMA_VERSION}"
            ))),
        }
    }

    /// Returns the underlying connection for read-side access.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}
