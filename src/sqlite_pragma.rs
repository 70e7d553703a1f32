//! Shared SQLite connection tuning

use rusqlite::Connection;
use std::time::Duration;

/// Pages written before SQLite checkpoints the WAL back into the main file
pub const WAL_AUTOCHECKPOINT_PAGES: i64 = 1000;

/// Apply the PRAGMAs every hexflow connection runs with
///
/// - WAL journal (readers never block the writer)
/// - synchronous NORMAL (safe under WAL)
/// - in-memory temp store
/// - 64MB page cache
/// - autocheckpoint every 1000 pages
/// - 5s busy timeout so concurrent connections wait instead of failing
pub fn apply_optimized_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    let journal_mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    log::debug!("SQLite journal_mode={}", journal_mode);

    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    conn.pragma_update(None, "cache_size", -64_000i64)?;
    conn.pragma_update(None, "wal_autocheckpoint", WAL_AUTOCHECKPOINT_PAGES)?;
    conn.busy_timeout(Duration::from_secs(5))?;

    Ok(())
}
