//! Aggregated edge storage
//!
//! `EdgeStore` is the persistence seam for the aggregator. Implementations only
//! load and save whole rows; find-or-create and the fold itself live in
//! `EdgeAggregator`, which serializes writers per key.
//!
//! - `SqliteEdgeStore` - `h3_aggregated_edges` table, UPSERT on the key triple
//! - `MemoryEdgeStore` - HashMap behind a tokio RwLock (tests, ephemeral graphs)

use super::db::{from_millis, open_database, to_count, to_millis};
use super::error::{GraphError, GraphResult};
use super::types::{AggregatedEdge, EdgeKey, ElevationStats, MotionType};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::RwLock;

#[async_trait]
pub trait EdgeStore: Send + Sync {
    /// Fetch the edge for an exact triple
    async fn load(&self, key: &EdgeKey) -> GraphResult<Option<AggregatedEdge>>;

    /// Persist a whole edge atomically (insert or replace its statistics)
    async fn save(&self, edge: &AggregatedEdge) -> GraphResult<()>;

    /// All edges, optionally filtered by motion, newest traversal first
    async fn list(&self, motion: Option<MotionType>) -> GraphResult<Vec<AggregatedEdge>>;

    async fn count(&self) -> GraphResult<u64>;

    /// Get backend type for logging
    fn backend_type(&self) -> &'static str;
}

const EDGE_COLUMNS: &str = "from_cell, to_cell, motion, id, traverse_count,
    sum_time, min_time, max_time, sum_distance, min_distance, max_distance,
    sum_elevation_delta, min_elevation_delta, max_elevation_delta, elevation_samples,
    first_traversed_at, last_traversed_at, created_at, updated_at";

/// Raw column values of one `h3_aggregated_edges` row
struct EdgeRow {
    from_cell: i64,
    to_cell: i64,
    motion: i16,
    id: String,
    traverse_count: i64,
    sum_time: f64,
    min_time: f64,
    max_time: f64,
    sum_distance: f64,
    min_distance: f64,
    max_distance: f64,
    sum_elevation_delta: Option<f64>,
    min_elevation_delta: Option<f64>,
    max_elevation_delta: Option<f64>,
    elevation_samples: i64,
    first_traversed_at: i64,
    last_traversed_at: i64,
    created_at: i64,
    updated_at: i64,
}

impl EdgeRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            from_cell: row.get(0)?,
            to_cell: row.get(1)?,
            motion: row.get(2)?,
            id: row.get(3)?,
            traverse_count: row.get(4)?,
            sum_time: row.get(5)?,
            min_time: row.get(6)?,
            max_time: row.get(7)?,
            sum_distance: row.get(8)?,
            min_distance: row.get(9)?,
            max_distance: row.get(10)?,
            sum_elevation_delta: row.get(11)?,
            min_elevation_delta: row.get(12)?,
            max_elevation_delta: row.get(13)?,
            elevation_samples: row.get(14)?,
            first_traversed_at: row.get(15)?,
            last_traversed_at: row.get(16)?,
            created_at: row.get(17)?,
            updated_at: row.get(18)?,
        })
    }
}

impl TryFrom<EdgeRow> for AggregatedEdge {
    type Error = GraphError;

    fn try_from(row: EdgeRow) -> GraphResult<Self> {
        let motion = MotionType::from_raw(row.motion).map_err(|_| {
            GraphError::StorageFault(format!("edge {} has undefined motion {}", row.id, row.motion))
        })?;

        Ok(AggregatedEdge {
            key: EdgeKey::new(row.from_cell, row.to_cell, motion),
            traverse_count: to_count(row.traverse_count, "traverse_count")?,
            sum_time: row.sum_time,
            min_time: row.min_time,
            max_time: row.max_time,
            sum_distance: row.sum_distance,
            min_distance: row.min_distance,
            max_distance: row.max_distance,
            elevation: ElevationStats::from_columns(
                row.sum_elevation_delta,
                row.min_elevation_delta,
                row.max_elevation_delta,
            )?,
            elevation_samples: to_count(row.elevation_samples, "elevation_samples")?,
            first_traversed_at: from_millis(row.first_traversed_at)?,
            last_traversed_at: from_millis(row.last_traversed_at)?,
            created_at: from_millis(row.created_at)?,
            updated_at: from_millis(row.updated_at)?,
            id: row.id,
        })
    }
}

/// SQLite implementation of EdgeStore
///
/// Each operation is a single statement, so readers on other connections
/// always see whole rows.
pub struct SqliteEdgeStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteEdgeStore {
    /// Open the database at `db_path`, creating schema if needed
    pub fn open(db_path: impl AsRef<Path>) -> GraphResult<Self> {
        let conn = open_database(db_path)?;
        log::info!("✅ SQLite edge store initialized");
        Ok(Self::new(conn))
    }

    /// Wrap an existing connection (schema must already exist)
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    fn conn(&self) -> GraphResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| GraphError::StorageFault("edge store connection poisoned".to_string()))
    }
}

#[async_trait]
impl EdgeStore for SqliteEdgeStore {
    async fn load(&self, key: &EdgeKey) -> GraphResult<Option<AggregatedEdge>> {
        let conn = self.conn()?;

        let row = conn
            .query_row(
                &format!(
                    "SELECT {} FROM h3_aggregated_edges
                     WHERE from_cell = ?1 AND to_cell = ?2 AND motion = ?3",
                    EDGE_COLUMNS
                ),
                params![key.from, key.to, key.motion.raw()],
                EdgeRow::from_row,
            )
            .optional()?;

        row.map(AggregatedEdge::try_from).transpose()
    }

    /// UPSERT on the key triple; `created_at` and `first_traversed_at` keep
    /// their original values on conflict
    async fn save(&self, edge: &AggregatedEdge) -> GraphResult<()> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO h3_aggregated_edges (
                from_cell, to_cell, motion, id, traverse_count,
                sum_time, min_time, max_time,
                sum_distance, min_distance, max_distance,
                sum_elevation_delta, min_elevation_delta, max_elevation_delta, elevation_samples,
                first_traversed_at, last_traversed_at, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
            ON CONFLICT(from_cell, to_cell, motion) DO UPDATE SET
                traverse_count = excluded.traverse_count,
                sum_time = excluded.sum_time,
                min_time = excluded.min_time,
                max_time = excluded.max_time,
                sum_distance = excluded.sum_distance,
                min_distance = excluded.min_distance,
                max_distance = excluded.max_distance,
                sum_elevation_delta = excluded.sum_elevation_delta,
                min_elevation_delta = excluded.min_elevation_delta,
                max_elevation_delta = excluded.max_elevation_delta,
                elevation_samples = excluded.elevation_samples,
                first_traversed_at = MIN(first_traversed_at, excluded.first_traversed_at),
                last_traversed_at = excluded.last_traversed_at,
                updated_at = excluded.updated_at
            "#,
            params![
                edge.key.from,
                edge.key.to,
                edge.key.motion.raw(),
                edge.id,
                edge.traverse_count as i64,
                edge.sum_time,
                edge.min_time,
                edge.max_time,
                edge.sum_distance,
                edge.min_distance,
                edge.max_distance,
                edge.elevation.sum(),
                edge.elevation.min(),
                edge.elevation.max(),
                edge.elevation_samples as i64,
                to_millis(edge.first_traversed_at),
                to_millis(edge.last_traversed_at),
                to_millis(edge.created_at),
                to_millis(edge.updated_at),
            ],
        )?;

        log::debug!(
            "✅ Edge saved: {} (count: {})",
            edge.id,
            edge.traverse_count
        );

        Ok(())
    }

    async fn list(&self, motion: Option<MotionType>) -> GraphResult<Vec<AggregatedEdge>> {
        let conn = self.conn()?;

        let rows: Vec<EdgeRow> = match motion {
            Some(motion) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM h3_aggregated_edges
                     WHERE motion = ?1
                     ORDER BY last_traversed_at DESC, id ASC",
                    EDGE_COLUMNS
                ))?;
                let rows = stmt
                    .query_map([motion.raw()], EdgeRow::from_row)?
                    .collect::<rusqlite::Result<_>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM h3_aggregated_edges
                     ORDER BY last_traversed_at DESC, id ASC",
                    EDGE_COLUMNS
                ))?;
                let rows = stmt
                    .query_map([], EdgeRow::from_row)?
                    .collect::<rusqlite::Result<_>>()?;
                rows
            }
        };

        rows.into_iter().map(AggregatedEdge::try_from).collect()
    }

    async fn count(&self) -> GraphResult<u64> {
        let conn = self.conn()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM h3_aggregated_edges", [], |row| row.get(0))?;
        to_count(count, "edge count")
    }

    fn backend_type(&self) -> &'static str {
        "SQLite"
    }
}

/// In-memory implementation of EdgeStore
///
/// Readers receive clones, so they never observe an edge mid-fold.
#[derive(Default)]
pub struct MemoryEdgeStore {
    edges: RwLock<HashMap<EdgeKey, AggregatedEdge>>,
}

impl MemoryEdgeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EdgeStore for MemoryEdgeStore {
    async fn load(&self, key: &EdgeKey) -> GraphResult<Option<AggregatedEdge>> {
        Ok(self.edges.read().await.get(key).cloned())
    }

    async fn save(&self, edge: &AggregatedEdge) -> GraphResult<()> {
        self.edges.write().await.insert(edge.key, edge.clone());
        Ok(())
    }

    async fn list(&self, motion: Option<MotionType>) -> GraphResult<Vec<AggregatedEdge>> {
        let edges = self.edges.read().await;

        let mut listed: Vec<AggregatedEdge> = edges
            .values()
            .filter(|edge| motion.map_or(true, |m| edge.key.motion == m))
            .cloned()
            .collect();

        listed.sort_by(|a, b| {
            b.last_traversed_at
                .cmp(&a.last_traversed_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        Ok(listed)
    }

    async fn count(&self) -> GraphResult<u64> {
        Ok(self.edges.read().await.len() as u64)
    }

    fn backend_type(&self) -> &'static str {
        "Memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::types::EdgeObservation;
    use chrono::{DateTime, TimeZone, Utc};
    use tempfile::{tempdir, TempDir};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn make_edge(from: i64, to: i64, motion: MotionType, last_secs: i64, elevation: Option<f64>) -> AggregatedEdge {
        let key = EdgeKey::new(from, to, motion);
        let mut edge = AggregatedEdge::seed(key, at(last_secs - 100));
        edge.fold(&EdgeObservation {
            from,
            to,
            motion,
            delta_time: 60.0,
            delta_distance: 50.0,
            delta_elevation: elevation,
            observed_at: at(last_secs),
        });
        edge
    }

    fn create_test_store() -> (TempDir, SqliteEdgeStore) {
        let dir = tempdir().unwrap();
        let store = SqliteEdgeStore::open(dir.path().join("edges.db")).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_sqlite_save_and_load() {
        let (_dir, store) = create_test_store();
        let edge = make_edge(100, 200, MotionType::Walking, 1_700_000_000, Some(2.0));

        store.save(&edge).await.unwrap();

        let loaded = store.load(&edge.key).await.unwrap().unwrap();
        assert_eq!(loaded, edge);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sqlite_load_missing_is_none() {
        let (_dir, store) = create_test_store();
        let key = EdgeKey::new(1, 2, MotionType::Driving);
        assert!(store.load(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sqlite_absent_elevation_stored_as_nulls() {
        let (_dir, store) = create_test_store();
        let edge = make_edge(1, 2, MotionType::Cycling, 1_700_000_000, None);

        store.save(&edge).await.unwrap();

        let conn = store.conn().unwrap();
        let columns: (Option<f64>, Option<f64>, Option<f64>, i64) = conn
            .query_row(
                "SELECT sum_elevation_delta, min_elevation_delta, max_elevation_delta, elevation_samples
                 FROM h3_aggregated_edges WHERE id = ?1",
                [edge.id.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .unwrap();

        assert_eq!(columns, (None, None, None, 0));
        drop(conn);

        let loaded = store.load(&edge.key).await.unwrap().unwrap();
        assert_eq!(loaded.elevation, ElevationStats::Absent);
    }

    #[tokio::test]
    async fn test_sqlite_upsert_preserves_created_at() {
        let (_dir, store) = create_test_store();
        let mut edge = make_edge(100, 200, MotionType::Walking, 1_700_000_000, Some(2.0));
        store.save(&edge).await.unwrap();
        let created_at = edge.created_at;

        edge.fold(&EdgeObservation {
            from: 100,
            to: 200,
            motion: MotionType::Walking,
            delta_time: 30.0,
            delta_distance: 80.0,
            delta_elevation: Some(-1.0),
            observed_at: at(1_700_000_300),
        });
        // A stale copy must not rewrite the creation time
        edge.created_at = at(1_800_000_000);
        store.save(&edge).await.unwrap();

        let loaded = store.load(&edge.key).await.unwrap().unwrap();
        assert_eq!(loaded.traverse_count, 2);
        assert_eq!(loaded.sum_time, 90.0);
        assert_eq!(loaded.created_at, created_at);
        assert_eq!(loaded.last_traversed_at, at(1_700_000_300));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sqlite_list_sorted_and_filtered() {
        let (_dir, store) = create_test_store();

        store.save(&make_edge(1, 2, MotionType::Walking, 1_000, None)).await.unwrap();
        store.save(&make_edge(2, 3, MotionType::Driving, 3_000, None)).await.unwrap();
        store.save(&make_edge(3, 4, MotionType::Walking, 2_000, None)).await.unwrap();

        let all = store.list(None).await.unwrap();
        let ids: Vec<&str> = all.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["2-3-5", "3-4-2", "1-2-2"]);

        let walking = store.list(Some(MotionType::Walking)).await.unwrap();
        let ids: Vec<&str> = walking.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["3-4-2", "1-2-2"]);

        assert!(store.list(Some(MotionType::Flying)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sqlite_corrupt_elevation_is_storage_fault() {
        let (_dir, store) = create_test_store();
        let edge = make_edge(1, 2, MotionType::Walking, 1_000, Some(4.0));
        store.save(&edge).await.unwrap();

        {
            let conn = store.conn().unwrap();
            conn.execute(
                "UPDATE h3_aggregated_edges SET min_elevation_delta = NULL WHERE id = ?1",
                [edge.id.as_str()],
            )
            .unwrap();
        }

        let err = store.load(&edge.key).await.unwrap_err();
        assert!(err.is_storage_fault());
    }

    #[tokio::test]
    async fn test_memory_store_matches_sqlite_ordering() {
        let store = MemoryEdgeStore::new();

        store.save(&make_edge(1, 2, MotionType::Walking, 1_000, None)).await.unwrap();
        store.save(&make_edge(2, 3, MotionType::Driving, 3_000, None)).await.unwrap();
        store.save(&make_edge(3, 4, MotionType::Walking, 3_000, None)).await.unwrap();

        let ids: Vec<String> = store
            .list(None)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        // Equal timestamps fall back to id order
        assert_eq!(ids, vec!["2-3-5", "3-4-2", "1-2-2"]);

        assert_eq!(store.list(Some(MotionType::Driving)).await.unwrap().len(), 1);
        assert_eq!(store.count().await.unwrap(), 3);
        assert_eq!(store.backend_type(), "Memory");
    }
}
