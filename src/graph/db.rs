//! SQLite schema and connection setup
//!
//! Tables:
//! - `h3_nodes` - append-only observation log, keyed by UUID
//! - `h3_aggregated_edges` - one row per `(from_cell, to_cell, motion)` triple
//!
//! Timestamps are stored as Unix milliseconds.

use super::error::{GraphError, GraphResult};
use crate::sqlite_pragma::apply_optimized_pragmas;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::Path;

/// Idempotent schema (every statement uses IF NOT EXISTS)
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS h3_nodes (
    id                  TEXT PRIMARY KEY,
    cell_index          INTEGER NOT NULL,
    resolution          INTEGER NOT NULL,
    motion              INTEGER NOT NULL DEFAULT 0,
    captured_at         INTEGER NOT NULL,
    horizontal_accuracy REAL,
    altitude            REAL,
    vertical_accuracy   REAL,
    speed               REAL,
    speed_accuracy      REAL,
    course              REAL,
    course_accuracy     REAL,
    created_at          INTEGER NOT NULL,
    updated_at          INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_nodes_captured_at ON h3_nodes(captured_at DESC);
CREATE INDEX IF NOT EXISTS idx_nodes_cell ON h3_nodes(cell_index, captured_at DESC);

CREATE TABLE IF NOT EXISTS h3_aggregated_edges (
    from_cell           INTEGER NOT NULL,
    to_cell             INTEGER NOT NULL,
    motion              INTEGER NOT NULL,
    id                  TEXT NOT NULL UNIQUE,
    traverse_count      INTEGER NOT NULL CHECK (traverse_count >= 1),
    sum_time            REAL NOT NULL,
    min_time            REAL NOT NULL,
    max_time            REAL NOT NULL,
    sum_distance        REAL NOT NULL,
    min_distance        REAL NOT NULL,
    max_distance        REAL NOT NULL,
    sum_elevation_delta REAL,
    min_elevation_delta REAL,
    max_elevation_delta REAL,
    elevation_samples   INTEGER NOT NULL DEFAULT 0,
    first_traversed_at  INTEGER NOT NULL,
    last_traversed_at   INTEGER NOT NULL,
    created_at          INTEGER NOT NULL,
    updated_at          INTEGER NOT NULL,
    PRIMARY KEY (from_cell, to_cell, motion)
);

CREATE INDEX IF NOT EXISTS idx_edges_last_traversed ON h3_aggregated_edges(last_traversed_at DESC);
CREATE INDEX IF NOT EXISTS idx_edges_motion ON h3_aggregated_edges(motion, last_traversed_at DESC);
"#;

/// Open (or create) a hexflow database with pragmas and schema applied
pub fn open_database(db_path: impl AsRef<Path>) -> GraphResult<Connection> {
    let db_path = db_path.as_ref();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let conn = Connection::open(db_path)?;
    apply_optimized_pragmas(&conn)?;
    run_schema(&conn)?;

    log::info!("✅ SQLite database ready: {}", db_path.display());
    Ok(conn)
}

pub fn run_schema(conn: &Connection) -> GraphResult<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn from_millis(millis: i64) -> GraphResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| GraphError::StorageFault(format!("timestamp out of range: {}", millis)))
}

/// Convert a stored INTEGER count back to u64
pub(crate) fn to_count(value: i64, column: &str) -> GraphResult<u64> {
    u64::try_from(value)
        .map_err(|_| GraphError::StorageFault(format!("negative {}: {}", column, value)))
}

/// SQLite treats a negative LIMIT as "no limit"
pub(crate) fn sql_limit(limit: Option<usize>) -> i64 {
    limit
        .map(|l| i64::try_from(l).unwrap_or(i64::MAX))
        .unwrap_or(-1)
}
