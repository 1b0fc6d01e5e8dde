use std::path::PathBuf;

/// Result type for database handle operations
pub type Result<T> = std::result::Result<T, DatabaseError>;

/// Errors returned by [`crate::Database`]
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("error connecting to database {}: {source}", path.display())]
    Connection {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("there is an active transaction already")]
    AlreadyActive,

    #[error("there is no active transaction")]
    NoActiveTransaction,

    /// SQLite ended the transaction itself; the slot has been cleared and
    /// nothing run inside the transaction was kept.
    #[error("the active transaction was aborted by SQLite")]
    TransactionAborted {
        #[source]
        source: Option<rusqlite::Error>,
    },

    #[error("database connection is closed")]
    Closed,

    /// The existence check on the database file failed
    #[error("filesystem error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The database file exists but could not be deleted
    #[error("error removing {}: {source}", path.display())]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}
