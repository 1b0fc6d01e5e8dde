//! SQLite database handle with a single transaction slot.
//!
//! # Intention
//!
//! - Open (or create) a database file named after the running executable.
//! - Run statements and prepare queries, always inside the active transaction
//!   when there is one.
//! - Allow at most one transaction per handle; misuse is an error, not a panic.
//!
//! # Architectural Boundaries
//!
//! - Only SQLite/database code belongs here.
//! - No pooling, query building or schema migration.

pub mod config;
pub mod error;
pub mod sqlite;

pub use config::{BeginMode, ClosePolicy, SqliteConfig};
pub use error::{DatabaseError, Result};
pub use sqlite::{Database, ExecOutcome};
