//! Connection bootstrap for worker processes.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections.
//! - Configure pragmas needed when several workers share one database file.
//! - Run migrations before handing the connection to stores.
//!
//! # Invariants
//! - Returned connections have `foreign_keys=ON` and a busy timeout, so
//!   concurrent idempotent writers wait instead of failing fast.
//! - Returned connections have migrations fully applied.

use super::migrations::apply_migrations;
use super::{DbError, DbResult};
use log::{error, info, warn};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens a database file shared with other workers and applies pending migrations.
///
/// # Side effects
/// - Switches the file to WAL journaling so readers do not block the writer.
/// - Emits `db_open` events with duration and status.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    open_with("file", || Connection::open(path), true)
}

/// Opens a private in-memory database with all migrations applied.
///
/// Used by tests and single-process tooling.
pub fn open_db_in_memory() -> DbResult<Connection> {
    open_with("memory", Connection::open_in_memory, false)
}

fn open_with<F>(mode: &str, connect: F, shared_file: bool) -> DbResult<Connection>
where
    F: FnOnce() -> rusqlite::Result<Connection>,
{
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode={mode}");

    let result = connect()
        .map_err(DbError::from)
        .and_then(|mut conn| bootstrap_connection(&mut conn, shared_file).map(|()| conn));

    match &result {
        Ok(_) => info!(
            "event=db_open module=db status=ok mode={mode} duration_ms={}",
            started_at.elapsed().as_millis()
        ),
        Err(err) => error!(
            "event=db_open module=db status=error mode={mode} duration_ms={} error={}",
            started_at.elapsed().as_millis(),
            err
        ),
    }
    result
}

fn bootstrap_connection(conn: &mut Connection, shared_file: bool) -> DbResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    if shared_file {
        enable_wal(conn)?;
    }
    apply_migrations(conn)?;
    Ok(())
}

/// Switches to WAL journaling. Returns `false` and logs a warning when SQLite
/// keeps another mode, e.g. for in-memory or read-only databases.
fn enable_wal(conn: &Connection) -> DbResult<bool> {
    // journal_mode returns the resulting mode as a row.
    let mode: String = conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
    if mode.eq_ignore_ascii_case("wal") {
        return Ok(true);
    }
    warn!("event=db_open module=db status=degraded journal_mode={mode} reason=wal_refused");
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::enable_wal;
    use rusqlite::Connection;

    #[test]
    fn enable_wal_reports_refused_mode() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(!enable_wal(&conn).unwrap());
    }

    #[test]
    fn enable_wal_accepts_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let conn = Connection::open(dir.path().join("wal.db")).unwrap();
        assert!(enable_wal(&conn).unwrap());
    }
}
