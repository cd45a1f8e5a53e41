//! Error types for govsink operations.
//!
//! A single crate-wide error enum keeps the API surface small: every
//! fallible operation returns [`Result`], and callers can match on the
//! variant when they care about the failure mode.
//!
//! Note that row-level and batch-level storage failures are deliberately
//! *not* part of this type's flow: they are absorbed by the engine and
//! surface only through the settlement callbacks (see [`crate::engine`]).

use thiserror::Error;

/// All errors that can occur in govsink operations.
#[derive(Error, Debug)]
pub enum Error {
    /// SQLite operation failed.
    ///
    /// Wraps any error from the `rusqlite` crate: a locked database file,
    /// a full disk, or a malformed statement (the latter indicates a bug
    /// in an adapter's `insert_sql`).
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// `store` was called on an engine that has not been started or has
    /// already begun shutting down.
    ///
    /// Callers must not retry against the same engine instance; the
    /// upstream consumer should stop acknowledging and let its own
    /// redelivery policy take over.
    #[error("storage engine is not active")]
    WorkerNotActive,

    /// Schema mismatch or corruption detected while opening the database.
    #[error("schema error: {0}")]
    Schema(String),

    /// Internal invariant violation or runtime failure (for example, a
    /// panicked background task).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A `Result` type alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;
