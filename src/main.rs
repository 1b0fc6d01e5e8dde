use anyhow::{Context, Result};
use clap::Parser;
use sqlite_handle::Database;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "sqlite_handle",
    version,
    about = "Open the executable's SQLite database and record a run in it"
)]
struct Cli {
    /// Directory holding the database file
    #[arg(long, default_value = ".", value_name = "DIR")]
    dir: PathBuf,
    /// Log level (error, warn, info, debug, trace); RUST_LOG takes precedence
    #[arg(long, default_value = "info", value_name = "LEVEL")]
    log_level: String,
    /// Delete the database file before opening it
    #[arg(long)]
    remove: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(cli.log_level.as_str()),
    )
    .init();

    if cli.remove {
        let existed = Database::remove(&cli.dir).context("removing database")?;
        log::info!("previous database removed: {existed}");
    }

    let mut db = Database::open(&cli.dir).context("opening database")?;
    log::info!("using database at {}", db.path().display());

    db.execute_batch(
        "CREATE TABLE IF NOT EXISTS runs (
            id INTEGER PRIMARY KEY,
            note TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );",
    )?;

    let id = db.with_transaction(|db| -> Result<i64> {
        let outcome = db.execute("INSERT INTO runs (note) VALUES (?1)", ["demo run"])?;
        Ok(outcome.last_insert_id)
    })?;
    log::info!("recorded run {id}");

    let total: i64 = {
        let mut statement = db.prepare("SELECT COUNT(*) FROM runs")?;
        statement.query_row([], |row| row.get(0))?
    };
    log::info!("{total} run(s) recorded so far");

    db.close().context("closing database")?;
    Ok(())
}
