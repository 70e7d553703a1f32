//! Spatial observation log (`h3_nodes`)
//!
//! Append-only: rows are inserted once and only ever removed by
//! `delete_older_than`. Every query returns observations newest first.

use super::db::{from_millis, open_database, sql_limit, to_count, to_millis};
use super::error::{GraphError, GraphResult};
use super::locator::{clamp_resolution, CellLocator, LocationSample, DEFAULT_RESOLUTION};
use super::types::{CellIndex, Kinematics, MotionType, SpatialObservation};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::ops::RangeInclusive;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

#[async_trait]
pub trait NodeRecorder: Send + Sync {
    /// Append a prepared observation
    async fn record_observation(&self, observation: SpatialObservation) -> GraphResult<SpatialObservation>;

    /// Append a visit to `cell_index` at the default resolution
    async fn record(
        &self,
        cell_index: CellIndex,
        motion: MotionType,
        captured_at: DateTime<Utc>,
    ) -> GraphResult<SpatialObservation> {
        let observation = SpatialObservation::new(
            cell_index,
            DEFAULT_RESOLUTION,
            motion,
            captured_at,
            Kinematics::default(),
        );
        self.record_observation(observation).await
    }

    /// Snap a raw location fix to its cell and append it
    async fn record_sample(
        &self,
        sample: &LocationSample,
        motion: MotionType,
        locator: &dyn CellLocator,
        resolution: i16,
    ) -> GraphResult<SpatialObservation> {
        sample.validate()?;

        let resolution = clamp_resolution(resolution);
        let cell_index = locator.locate(sample.latitude, sample.longitude, resolution);

        let observation = SpatialObservation::new(
            cell_index,
            resolution,
            motion,
            sample.timestamp,
            sample.kinematics,
        );
        self.record_observation(observation).await
    }

    /// Observations with `captured_at` inside `range` (bounds inclusive); every observation when None
    async fn fetch_range(
        &self,
        range: Option<RangeInclusive<DateTime<Utc>>>,
        limit: Option<usize>,
    ) -> GraphResult<Vec<SpatialObservation>>;

    async fn fetch_at_cell(
        &self,
        cell_index: CellIndex,
        limit: Option<usize>,
    ) -> GraphResult<Vec<SpatialObservation>>;

    async fn fetch_recent(&self, limit: usize) -> GraphResult<Vec<SpatialObservation>>;

    async fn count(&self) -> GraphResult<u64>;

    /// Remove observations captured strictly before `cutoff`; returns how many
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> GraphResult<u64>;

    fn backend_type(&self) -> &'static str;
}

const NODE_COLUMNS: &str = "id, cell_index, resolution, motion, captured_at,
    horizontal_accuracy, altitude, vertical_accuracy, speed, speed_accuracy,
    course, course_accuracy, created_at, updated_at";

/// id, cell, resolution, motion, captured_at, kinematics, created_at, updated_at
type NodeRow = (String, i64, i16, i16, i64, Kinematics, i64, i64);

fn decode_node(row: &Row<'_>) -> rusqlite::Result<NodeRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        Kinematics {
            horizontal_accuracy: row.get(5)?,
            altitude: row.get(6)?,
            vertical_accuracy: row.get(7)?,
            speed: row.get(8)?,
            speed_accuracy: row.get(9)?,
            course: row.get(10)?,
            course_accuracy: row.get(11)?,
        },
        row.get(12)?,
        row.get(13)?,
    ))
}

fn into_observation(row: NodeRow) -> GraphResult<SpatialObservation> {
    let (id, cell_index, resolution, motion, captured_at, kinematics, created_at, updated_at) = row;

    let record_id = Uuid::parse_str(&id)
        .map_err(|e| GraphError::StorageFault(format!("invalid node id {:?}: {}", id, e)))?;
    let motion = MotionType::from_raw(motion)
        .map_err(|_| GraphError::StorageFault(format!("node {} has undefined motion {}", id, motion)))?;

    Ok(SpatialObservation {
        record_id,
        cell_index,
        resolution,
        motion,
        captured_at: from_millis(captured_at)?,
        kinematics,
        created_at: from_millis(created_at)?,
        updated_at: from_millis(updated_at)?,
    })
}

/// SQLite implementation of NodeRecorder
pub struct SqliteNodeRecorder {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteNodeRecorder {
    pub fn open(db_path: impl AsRef<Path>) -> GraphResult<Self> {
        let conn = open_database(db_path)?;
        log::info!("✅ SQLite node recorder initialized");
        Ok(Self::new(conn))
    }

    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    fn conn(&self) -> GraphResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| GraphError::StorageFault("node recorder connection poisoned".to_string()))
    }

    fn query_nodes<P: rusqlite::Params>(&self, sql: &str, params: P) -> GraphResult<Vec<SpatialObservation>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, decode_node)?
            .collect::<rusqlite::Result<Vec<NodeRow>>>()?;

        rows.into_iter().map(into_observation).collect()
    }
}

#[async_trait]
impl NodeRecorder for SqliteNodeRecorder {
    async fn record_observation(&self, observation: SpatialObservation) -> GraphResult<SpatialObservation> {
        let conn = self.conn()?;
        let k = &observation.kinematics;

        conn.execute(
            &format!(
                "INSERT INTO h3_nodes ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                NODE_COLUMNS
            ),
            params![
                observation.record_id.to_string(),
                observation.cell_index,
                observation.resolution,
                observation.motion.raw(),
                to_millis(observation.captured_at),
                k.horizontal_accuracy,
                k.altitude,
                k.vertical_accuracy,
                k.speed,
                k.speed_accuracy,
                k.course,
                k.course_accuracy,
                to_millis(observation.created_at),
                to_millis(observation.updated_at),
            ],
        )?;

        log::debug!(
            "📍 Node recorded: cell {} ({}) at {}",
            observation.cell_index,
            observation.motion,
            observation.captured_at
        );

        Ok(observation)
    }

    async fn fetch_range(
        &self,
        range: Option<RangeInclusive<DateTime<Utc>>>,
        limit: Option<usize>,
    ) -> GraphResult<Vec<SpatialObservation>> {
        let (start, end) = match range {
            Some(range) => (Some(to_millis(*range.start())), Some(to_millis(*range.end()))),
            None => (None, None),
        };

        self.query_nodes(
            &format!(
                "SELECT {} FROM h3_nodes
                 WHERE (?1 IS NULL OR captured_at >= ?1) AND (?2 IS NULL OR captured_at <= ?2)
                 ORDER BY captured_at DESC, id ASC
                 LIMIT ?3",
                NODE_COLUMNS
            ),
            params![start, end, sql_limit(limit)],
        )
    }

    async fn fetch_at_cell(
        &self,
        cell_index: CellIndex,
        limit: Option<usize>,
    ) -> GraphResult<Vec<SpatialObservation>> {
        self.query_nodes(
            &format!(
                "SELECT {} FROM h3_nodes
                 WHERE cell_index = ?1
                 ORDER BY captured_at DESC, id ASC
                 LIMIT ?2",
                NODE_COLUMNS
            ),
            params![cell_index, sql_limit(limit)],
        )
    }

    async fn fetch_recent(&self, limit: usize) -> GraphResult<Vec<SpatialObservation>> {
        self.query_nodes(
            &format!(
                "SELECT {} FROM h3_nodes
                 ORDER BY captured_at DESC, id ASC
                 LIMIT ?1",
                NODE_COLUMNS
            ),
            params![sql_limit(Some(limit))],
        )
    }

    async fn count(&self) -> GraphResult<u64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM h3_nodes", [], |row| row.get(0))?;
        to_count(count, "node count")
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> GraphResult<u64> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM h3_nodes WHERE captured_at < ?1",
            params![to_millis(cutoff)],
        )?;
        Ok(deleted as u64)
    }

    fn backend_type(&self) -> &'static str {
        "SQLite"
    }
}
