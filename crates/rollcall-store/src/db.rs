//! SQLite connection bootstrap and schema migrations.
//!
//! Returned connections have `foreign_keys=ON` and every migration applied.
//! The schema version is tracked in `PRAGMA user_version`.

use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("database schema version {db_version} is newer than supported {latest_supported}")]
    UnsupportedSchemaVersion { db_version: u32, latest_supported: u32 },
}

struct Migration {
    version: u32,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        sql: include_str!("migrations/0001_roster.sql"),
    },
    Migration {
        version: 2,
        sql: include_str!("migrations/0002_attendance.sql"),
    },
];

/// Latest schema version this build knows about.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |m| m.version)
}

/// Open (or create) a database file and migrate it.
pub fn open_db(path: impl AsRef<Path>) -> Result<Connection, DbError> {
    let path = path.as_ref();
    let started_at = Instant::now();
    let mut conn = Connection::open(path)?;
    bootstrap(&mut conn)?;
    tracing::info!(
        path = %path.display(),
        duration_ms = started_at.elapsed().as_millis() as u64,
        "database opened"
    );
    Ok(conn)
}

/// Open a private in-memory database and migrate it.
pub fn open_db_in_memory() -> Result<Connection, DbError> {
    let mut conn = Connection::open_in_memory()?;
    bootstrap(&mut conn)?;
    Ok(conn)
}

fn bootstrap(conn: &mut Connection) -> Result<(), DbError> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_secs(5))?;
    apply_migrations(conn)
}

fn apply_migrations(conn: &mut Connection) -> Result<(), DbError> {
    let current: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    let latest = latest_version();

    if current > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: current,
            latest_supported: latest,
        });
    }
    if current == latest {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        tx.execute_batch(migration.sql)?;
        tx.execute_batch(&format!("PRAGMA user_version = {};", migration.version))?;
        tracing::info!(version = migration.version, "schema migration applied");
    }
    tx.commit()?;

    Ok(())
}
