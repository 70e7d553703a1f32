//! Core data types for the movement graph
//!
//! - `MotionType` - coarse travel-mode classification (stored as its i16 raw value)
//! - `EdgeKey` - the `(from, to, motion)` triple identifying one aggregated edge
//! - `EdgeObservation` - one transition emitted by trip segmentation
//! - `ElevationStats` - elevation accumulators, either all absent or all present
//! - `AggregatedEdge` - running statistics for one edge (fold logic lives in `fold.rs`)
//! - `SpatialObservation` - one timestamped visit to a cell (append-only log entry)

use super::error::{GraphError, GraphResult};
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque hexagonal cell identifier (H3 index), computed outside this crate
pub type CellIndex = i64;

/// Travel mode attached to an observation or edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(i16)]
pub enum MotionType {
    #[default]
    Unknown = 0,
    Stationary = 1,
    Walking = 2,
    Running = 3,
    Cycling = 4,
    Driving = 5,
    Flying = 6,
    Transit = 7,
}

impl MotionType {
    pub fn all() -> [MotionType; 8] {
        [
            MotionType::Unknown,
            MotionType::Stationary,
            MotionType::Walking,
            MotionType::Running,
            MotionType::Cycling,
            MotionType::Driving,
            MotionType::Flying,
            MotionType::Transit,
        ]
    }

    pub fn raw(self) -> i16 {
        self as i16
    }

    /// Decode a stored raw value; undefined values are rejected
    pub fn from_raw(raw: i16) -> GraphResult<Self> {
        Self::all()
            .into_iter()
            .find(|motion| motion.raw() == raw)
            .ok_or_else(|| GraphError::invalid(format!("undefined motion type: {}", raw)))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MotionType::Unknown => "unknown",
            MotionType::Stationary => "stationary",
            MotionType::Walking => "walking",
            MotionType::Running => "running",
            MotionType::Cycling => "cycling",
            MotionType::Driving => "driving",
            MotionType::Flying => "flying",
            MotionType::Transit => "transit",
        }
    }
}

impl fmt::Display for MotionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MotionType {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Self::all()
            .into_iter()
            .find(|motion| motion.as_str() == needle)
            .ok_or_else(|| GraphError::invalid(format!("undefined motion type: {}", s)))
    }
}

/// Business key of an aggregated edge
///
/// The derived id `"{from}-{to}-{motion_raw}"` is used for external addressing.
/// Cell indexes may be negative, so the id grammar is `-?\d+ '-' -?\d+ '-' \d+`,
/// which has exactly one parse per string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeKey {
    pub from: CellIndex,
    pub to: CellIndex,
    pub motion: MotionType,
}

impl EdgeKey {
    pub fn new(from: CellIndex, to: CellIndex, motion: MotionType) -> Self {
        Self { from, to, motion }
    }

    pub fn id(&self) -> String {
        format!("{}-{}-{}", self.from, self.to, self.motion.raw())
    }

    /// Inverse of `id()`; returns None for anything `id()` could not have produced
    pub fn parse_id(id: &str) -> Option<Self> {
        let (from, rest) = take_int(id)?;
        let (to, rest) = take_int(rest.strip_prefix('-')?)?;
        let (raw, rest) = take_int(rest.strip_prefix('-')?)?;
        if !rest.is_empty() {
            return None;
        }

        let motion = MotionType::from_raw(i16::try_from(raw).ok()?).ok()?;
        let key = Self::new(from, to, motion);

        // Reject non-canonical spellings ("007", "-0") so one edge has one id
        (key.id() == id).then_some(key)
    }
}

impl fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{} ({})", self.from, self.to, self.motion)
    }
}

/// Parse an optionally negative integer prefix, returning the remainder
fn take_int(s: &str) -> Option<(i64, &str)> {
    let sign_len = usize::from(s.starts_with('-'));
    let digits = s[sign_len..].bytes().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }

    let end = sign_len + digits;
    let value = s[..end].parse().ok()?;
    Some((value, &s[end..]))
}

/// One observed transition between two cells
///
/// Produced upstream by trip segmentation. `delta_elevation` is None when the
/// altitude was not measured for either endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeObservation {
    pub from: CellIndex,
    pub to: CellIndex,
    #[serde(default)]
    pub motion: MotionType,
    /// Seconds
    pub delta_time: f64,
    /// Meters
    pub delta_distance: f64,
    /// Meters
    #[serde(default)]
    pub delta_elevation: Option<f64>,
    pub observed_at: DateTime<Utc>,
}

impl EdgeObservation {
    pub fn key(&self) -> EdgeKey {
        EdgeKey::new(self.from, self.to, self.motion)
    }

    /// Reject malformed inputs before they reach the fold
    pub fn validate(&self) -> GraphResult<()> {
        // `!(x >= 0.0)` also catches NaN
        if !(self.delta_time >= 0.0) || !self.delta_time.is_finite() {
            return Err(GraphError::invalid(format!(
                "delta_time must be a finite value >= 0 (got {})",
                self.delta_time
            )));
        }

        if !(self.delta_distance >= 0.0) || !self.delta_distance.is_finite() {
            return Err(GraphError::invalid(format!(
                "delta_distance must be a finite value >= 0 (got {})",
                self.delta_distance
            )));
        }

        if let Some(delta) = self.delta_elevation {
            if !delta.is_finite() {
                return Err(GraphError::invalid(format!(
                    "delta_elevation must be finite (got {})",
                    delta
                )));
            }
        }

        Ok(())
    }

    /// Decode one JSON line from the upstream stream
    ///
    /// Undecodable JSON is a `Serialization` error. A well-formed line naming
    /// an undefined motion is an `InvalidObservation`, like any other bad value.
    pub fn from_json_line(line: &str) -> GraphResult<Self> {
        let wire: WireObservation = serde_json::from_str(line)?;
        let motion = match wire.motion.as_deref() {
            Some(name) => name.parse()?,
            None => MotionType::Unknown,
        };

        Ok(Self {
            from: wire.from,
            to: wire.to,
            motion,
            delta_time: wire.delta_time,
            delta_distance: wire.delta_distance,
            delta_elevation: wire.delta_elevation,
            observed_at: wire.observed_at,
        })
    }
}

/// Line format read by `EdgeObservation::from_json_line`
#[derive(Deserialize)]
struct WireObservation {
    from: CellIndex,
    to: CellIndex,
    #[serde(default)]
    motion: Option<String>,
    delta_time: f64,
    delta_distance: f64,
    #[serde(default)]
    delta_elevation: Option<f64>,
    observed_at: DateTime<Utc>,
}

/// Elevation accumulators of an edge
///
/// A tagged variant so "all absent or all present" holds by construction.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum ElevationStats {
    #[default]
    Absent,
    Present { sum: f64, min: f64, max: f64 },
}

impl ElevationStats {
    pub fn is_present(&self) -> bool {
        matches!(self, ElevationStats::Present { .. })
    }

    pub fn sum(&self) -> Option<f64> {
        match self {
            ElevationStats::Absent => None,
            ElevationStats::Present { sum, .. } => Some(*sum),
        }
    }

    pub fn min(&self) -> Option<f64> {
        match self {
            ElevationStats::Absent => None,
            ElevationStats::Present { min, .. } => Some(*min),
        }
    }

    pub fn max(&self) -> Option<f64> {
        match self {
            ElevationStats::Absent => None,
            ElevationStats::Present { max, .. } => Some(*max),
        }
    }

    /// Rebuild from three nullable storage columns
    ///
    /// A half-populated triad means the row was corrupted outside this crate.
    pub fn from_columns(sum: Option<f64>, min: Option<f64>, max: Option<f64>) -> GraphResult<Self> {
        match (sum, min, max) {
            (None, None, None) => Ok(ElevationStats::Absent),
            (Some(sum), Some(min), Some(max)) => Ok(ElevationStats::Present { sum, min, max }),
            _ => Err(GraphError::StorageFault(
                "elevation accumulators partially present".to_string(),
            )),
        }
    }
}

/// Running statistics of one directed, motion-typed transition
///
/// Means are derived on read (`average_time`, `average_distance`, ...) rather
/// than stored, so they never drift from the sums.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedEdge {
    pub id: String,
    #[serde(flatten)]
    pub key: EdgeKey,

    pub traverse_count: u64,

    pub sum_time: f64,
    pub min_time: f64,
    pub max_time: f64,

    pub sum_distance: f64,
    pub min_distance: f64,
    pub max_distance: f64,

    pub elevation: ElevationStats,
    pub elevation_samples: u64,

    pub first_traversed_at: DateTime<Utc>,
    pub last_traversed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Optional sensor readings captured alongside a sample
///
/// Negative readings mean "invalid" on the capturing device and are kept as None.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Kinematics {
    pub horizontal_accuracy: Option<f64>,
    pub altitude: Option<f64>,
    pub vertical_accuracy: Option<f64>,
    pub speed: Option<f64>,
    pub speed_accuracy: Option<f64>,
    pub course: Option<f64>,
    pub course_accuracy: Option<f64>,
}

impl Kinematics {
    /// Drop negative and non-finite readings
    pub fn sanitized(self) -> Self {
        fn valid(reading: Option<f64>) -> Option<f64> {
            reading.filter(|v| v.is_finite() && *v >= 0.0)
        }

        Self {
            horizontal_accuracy: valid(self.horizontal_accuracy),
            altitude: valid(self.altitude),
            vertical_accuracy: valid(self.vertical_accuracy),
            speed: valid(self.speed),
            speed_accuracy: valid(self.speed_accuracy),
            course: valid(self.course),
            course_accuracy: valid(self.course_accuracy),
        }
    }
}

/// One timestamped visit to a cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialObservation {
    pub record_id: Uuid,
    pub cell_index: CellIndex,
    pub resolution: i16,
    pub motion: MotionType,
    pub captured_at: DateTime<Utc>,
    #[serde(flatten)]
    pub kinematics: Kinematics,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SpatialObservation {
    /// Fresh observation with a new record id
    ///
    /// Timestamps are truncated to milliseconds, the precision they are stored at.
    pub fn new(
        cell_index: CellIndex,
        resolution: i16,
        motion: MotionType,
        captured_at: DateTime<Utc>,
        kinematics: Kinematics,
    ) -> Self {
        let now = Utc::now().trunc_subsecs(3);
        Self {
            record_id: Uuid::new_v4(),
            cell_index,
            resolution,
            motion,
            captured_at: captured_at.trunc_subsecs(3),
            kinematics: kinematics.sanitized(),
            created_at: now,
            updated_at: now,
        }
    }
}
