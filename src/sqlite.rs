use crate::config::{ClosePolicy, SqliteConfig};
use crate::error::{DatabaseError, Result};
use rusqlite::{CachedStatement, Connection, Params};
use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Outcome of a statement run through [`Database::execute`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecOutcome {
    pub rows_affected: usize,
    /// Rowid of the most recent successful INSERT on this connection
    pub last_insert_id: i64,
}

/// Contents of the transaction slot
#[derive(Debug, Clone, Copy)]
struct ActiveTransaction {
    started: Instant,
}

/// Handle over a SQLite connection with at most one open transaction.
///
/// SQLite transactions belong to the connection, so every statement run
/// through the handle while the slot is populated is part of that
/// transaction. Opening and finishing a transaction takes `&mut self`.
///
/// SQLite may end a transaction on its own (`INSERT OR ROLLBACK`, some
/// BUSY, IO and FULL errors). The handle notices this on the failing call,
/// or on the next call when the statement ran through a prepared statement,
/// clears the slot and reports [`DatabaseError::TransactionAborted`].
#[derive(Debug)]
pub struct Database {
    config: SqliteConfig,
    path: PathBuf,
    connection: Option<Connection>,
    transaction: Cell<Option<ActiveTransaction>>,
}

impl Database {
    /// Open or create `<directory>/<executable-name>.db`
    pub fn open(directory: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(SqliteConfig::new(directory.as_ref()))
    }

    /// Open or create the database described by `config`.
    ///
    /// The connection is pinged before it is handed out; a failure at either
    /// step releases the connection and returns [`DatabaseError::Connection`].
    pub fn open_with(config: SqliteConfig) -> Result<Self> {
        let path = config.database_path();
        let connection = Connection::open(&path).map_err(|source| {
            log::error!("error loading database driver for {}: {source}", path.display());
            DatabaseError::Connection {
                path: path.clone(),
                source,
            }
        })?;
        log::debug!("database driver loaded for {}", path.display());

        let ready = match config.busy_timeout() {
            Some(timeout) => connection.busy_timeout(timeout),
            None => Ok(()),
        }
        .and_then(|()| ping(&connection));
        if let Err(source) = ready {
            log::error!("error connecting to database {}: {source}", path.display());
            drop(connection);
            return Err(DatabaseError::Connection { path, source });
        }
        log::debug!("database connection open");

        Ok(Self {
            config,
            path,
            connection: Some(connection),
            transaction: Cell::new(None),
        })
    }

    /// Delete `<directory>/<executable-name>.db` if it exists.
    ///
    /// Returns whether the file was there. A file that exists but cannot be
    /// deleted is reported as [`DatabaseError::Remove`].
    pub fn remove(directory: impl AsRef<Path>) -> Result<bool> {
        Self::remove_with(&SqliteConfig::new(directory.as_ref()))
    }

    pub fn remove_with(config: &SqliteConfig) -> Result<bool> {
        let path = config.database_path();
        match path.try_exists() {
            Ok(true) => {
                log::debug!("file {} exists", path.display());
                std::fs::remove_file(&path).map_err(|source| {
                    log::error!("error removing file {}: {source}", path.display());
                    DatabaseError::Remove {
                        path: path.clone(),
                        source,
                    }
                })?;
                Ok(true)
            }
            Ok(false) => {
                log::debug!("file {} does not exist", path.display());
                Ok(false)
            }
            Err(source) => {
                log::error!("error checking if file {} exists: {source}", path.display());
                Err(DatabaseError::Io { path, source })
            }
        }
    }

    /// Path of the database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.connection.is_none()
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction.get().is_some()
    }

    /// Raw connection, for reads such as `query_row` and `query_map`
    pub fn connection(&self) -> Result<&Connection> {
        self.connection.as_ref().ok_or_else(|| {
            log::error!("database {} is closed", self.path.display());
            DatabaseError::Closed
        })
    }

    /// Run a single statement, inside the active transaction if there is one
    pub fn execute<P: Params>(&self, sql: &str, params: P) -> Result<ExecOutcome> {
        let connection = self.checked_connection()?;
        match connection.execute(sql, params) {
            Ok(rows_affected) => Ok(ExecOutcome {
                rows_affected,
                last_insert_id: connection.last_insert_rowid(),
            }),
            Err(err) => {
                log::error!("error executing statement: {err}");
                Err(self.classify_failure(connection, err))
            }
        }
    }

    /// Run several `;`-separated statements without parameters
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        let connection = self.checked_connection()?;
        connection.execute_batch(sql).map_err(|err| {
            log::error!("error executing batch: {err}");
            self.classify_failure(connection, err)
        })
    }

    /// Prepare a statement on the active transaction, or on the raw connection.
    ///
    /// Statements are cached per connection and returned to the cache on drop.
    pub fn prepare(&self, sql: &str) -> Result<CachedStatement<'_>> {
        let connection = self.checked_connection()?;
        if self.in_transaction() {
            log::debug!("preparing statement on existing transaction");
        } else {
            log::debug!("preparing statement on raw connection");
        }
        connection.prepare_cached(sql).map_err(|err| {
            log::error!("error preparing statement: {err}");
            err.into()
        })
    }

    /// Begin a transaction using the configured [`crate::BeginMode`]
    pub fn open_transaction(&mut self) -> Result<()> {
        let connection = self.checked_connection()?;
        if self.in_transaction() {
            log::error!("there is an active transaction already");
            return Err(DatabaseError::AlreadyActive);
        }
        connection
            .execute_batch(self.config.begin_mode.statement())
            .map_err(|err| {
                log::error!("error opening transaction: {err}");
                DatabaseError::from(err)
            })?;
        log::debug!("transaction opened ({:?})", self.config.begin_mode);
        self.transaction.set(Some(ActiveTransaction {
            started: Instant::now(),
        }));
        Ok(())
    }

    /// Commit the active transaction; the slot is empty afterwards either way
    pub fn commit(&mut self) -> Result<()> {
        self.finish(Finish::Commit)
    }

    /// Roll back the active transaction; the slot is empty afterwards either way
    pub fn rollback(&mut self) -> Result<()> {
        self.finish(Finish::Rollback)
    }

    /// Run `f` inside a fresh transaction.
    ///
    /// Commits when `f` returns `Ok` and rolls back when it returns `Err`,
    /// in which case the closure's error is returned. `f` must not finish
    /// the transaction itself. If `f` panics, dropping the handle during
    /// unwinding rolls the transaction back.
    pub fn with_transaction<T, E, F>(&mut self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut Self) -> std::result::Result<T, E>,
        E: From<DatabaseError>,
    {
        self.open_transaction()?;
        match f(self) {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(err) => {
                if self.in_transaction() {
                    if let Err(rollback_err) = self.rollback() {
                        log::error!(
                            "error rolling back after failed transaction body: {rollback_err}"
                        );
                    }
                }
                Err(err)
            }
        }
    }

    /// Settle any pending transaction per the [`ClosePolicy`] and release the
    /// connection. Closing an already closed handle does nothing.
    pub fn close(&mut self) -> Result<()> {
        self.close_with(self.config.close_policy)
    }

    fn close_with(&mut self, policy: ClosePolicy) -> Result<()> {
        let Some(connection) = self.connection.take() else {
            return Ok(());
        };

        let mut pending_err = None;
        if let Some(active) = self.transaction.take() {
            if connection.is_autocommit() {
                log::error!("pending transaction was already ended by SQLite, nothing to settle");
            } else {
                let statement = match policy {
                    ClosePolicy::Commit => "COMMIT",
                    ClosePolicy::Rollback => "ROLLBACK",
                };
                log::debug!(
                    "settling pending transaction on close with {statement} after {:?}",
                    active.started.elapsed()
                );
                if let Err(err) = connection.execute_batch(statement) {
                    log::error!("error settling pending transaction on close: {err}");
                    pending_err = Some(DatabaseError::from(err));
                }
            }
        }

        // A failed close still drops the connection, which releases it.
        if let Err((_, err)) = connection.close() {
            log::error!("error closing database {}: {err}", self.path.display());
            return Err(err.into());
        }
        log::debug!("database {} closed", self.path.display());

        match pending_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn finish(&mut self, finish: Finish) -> Result<()> {
        let connection = self.checked_connection()?;
        let Some(active) = self.transaction.take() else {
            log::error!("there is no transaction to {}", finish.verb());
            return Err(DatabaseError::NoActiveTransaction);
        };

        let result = connection.execute_batch(finish.statement());
        if let Err(err) = &result {
            log::error!("error trying to {} transaction: {err}", finish.verb());
            // Keep the connection in step with the cleared slot.
            if !connection.is_autocommit() {
                if let Err(rollback_err) = connection.execute_batch("ROLLBACK") {
                    log::error!("error rolling back unfinished transaction: {rollback_err}");
                }
            }
        } else {
            log::debug!(
                "transaction {} after {:?}",
                finish.past_tense(),
                active.started.elapsed()
            );
        }
        result.map_err(DatabaseError::from)
    }

    /// Live connection whose autocommit state agrees with the slot.
    ///
    /// A populated slot over a connection back in autocommit mode means SQLite
    /// ended the transaction behind our back; the slot is cleared and the
    /// caller gets [`DatabaseError::TransactionAborted`].
    fn checked_connection(&self) -> Result<&Connection> {
        let connection = self.connection()?;
        if self.in_transaction() && connection.is_autocommit() {
            self.transaction.set(None);
            log::error!("active transaction was aborted by SQLite");
            return Err(DatabaseError::TransactionAborted { source: None });
        }
        Ok(connection)
    }

    fn classify_failure(&self, connection: &Connection, err: rusqlite::Error) -> DatabaseError {
        if self.in_transaction() && connection.is_autocommit() {
            self.transaction.set(None);
            log::error!("statement failure aborted the active transaction");
            return DatabaseError::TransactionAborted { source: Some(err) };
        }
        err.into()
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        // Never commit work left half-done by a panic.
        let policy = if std::thread::panicking() {
            ClosePolicy::Rollback
        } else {
            self.config.close_policy
        };
        if let Err(err) = self.close_with(policy) {
            log::error!("error closing database on drop: {err}");
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Finish {
    Commit,
    Rollback,
}

impl Finish {
    fn statement(self) -> &'static str {
        match self {
            Finish::Commit => "COMMIT",
            Finish::Rollback => "ROLLBACK",
        }
    }

    fn verb(self) -> &'static str {
        match self {
            Finish::Commit => "commit",
            Finish::Rollback => "rollback",
        }
    }

    fn past_tense(self) -> &'static str {
        match self {
            Finish::Commit => "committed",
            Finish::Rollback => "rolled back",
        }
    }
}

// Reading the schema version forces SQLite to touch the file.
fn ping(connection: &Connection) -> rusqlite::Result<()> {
    connection.query_row("PRAGMA schema_version", [], |row| row.get::<_, i64>(0))?;
    Ok(())
}
