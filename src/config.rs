use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name used when the executable name cannot be determined
pub const FALLBACK_FILE_NAME: &str = "database.db";

/// How `BEGIN` acquires its locks
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BeginMode {
    #[default]
    Deferred,
    Immediate,
    Exclusive,
}

impl BeginMode {
    pub(crate) fn statement(self) -> &'static str {
        match self {
            BeginMode::Deferred => "BEGIN DEFERRED",
            BeginMode::Immediate => "BEGIN IMMEDIATE",
            BeginMode::Exclusive => "BEGIN EXCLUSIVE",
        }
    }
}

/// What `close` does with a transaction that is still open
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClosePolicy {
    #[default]
    Commit,
    Rollback,
}

/// Database handle configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqliteConfig {
    /// Directory holding the database file; never created by the handle
    pub directory: PathBuf,
    /// Name of the database file inside `directory`
    #[serde(default = "executable_file_name")]
    pub file_name: String,
    #[serde(default)]
    pub begin_mode: BeginMode,
    #[serde(default)]
    pub close_policy: ClosePolicy,
    /// SQLite busy timeout in milliseconds
    #[serde(default)]
    pub busy_timeout_ms: Option<u64>,
}

impl SqliteConfig {
    /// Config for `<directory>/<executable-name>.db` with default policies
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            file_name: executable_file_name(),
            begin_mode: BeginMode::default(),
            close_policy: ClosePolicy::default(),
            busy_timeout_ms: None,
        }
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }

    pub fn with_begin_mode(mut self, mode: BeginMode) -> Self {
        self.begin_mode = mode;
        self
    }

    pub fn with_close_policy(mut self, policy: ClosePolicy) -> Self {
        self.close_policy = policy;
        self
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Full path of the database file
    pub fn database_path(&self) -> PathBuf {
        self.directory.join(&self.file_name)
    }

    pub(crate) fn busy_timeout(&self) -> Option<Duration> {
        self.busy_timeout_ms.map(Duration::from_millis)
    }
}

/// `<stem>.db` for the running executable, e.g. `backup.db` for `/usr/bin/backup`
pub fn executable_file_name() -> String {
    std::env::current_exe()
        .ok()
        .as_deref()
        .and_then(Path::file_stem)
        .map(|stem| format!("{}.db", stem.to_string_lossy()))
        .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string())
}
