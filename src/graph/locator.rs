//! Coordinate to cell mapping seam
//!
//! The hexagonal indexing itself is provided by the host application; this
//! crate only needs `coordinate + resolution -> cell`.

use super::error::{GraphError, GraphResult};
use super::types::{CellIndex, Kinematics};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MIN_RESOLUTION: i16 = 0;
pub const MAX_RESOLUTION: i16 = 15;

/// Resolution used when the caller does not pick one (~300m² cells)
pub const DEFAULT_RESOLUTION: i16 = 12;

pub trait CellLocator: Send + Sync {
    /// Cell containing the coordinate at `resolution` (already clamped)
    fn locate(&self, latitude: f64, longitude: f64, resolution: i16) -> CellIndex;
}

/// One raw location fix from the device
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kinematics: Kinematics,
}

impl LocationSample {
    pub fn validate(&self) -> GraphResult<()> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(GraphError::invalid(format!(
                "latitude out of range: {}",
                self.latitude
            )));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(GraphError::invalid(format!(
                "longitude out of range: {}",
                self.longitude
            )));
        }
        Ok(())
    }
}

pub fn clamp_resolution(resolution: i16) -> i16 {
    resolution.clamp(MIN_RESOLUTION, MAX_RESOLUTION)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;

    /// Deterministic grid locator for tests: packs resolution and a
    /// rounded coordinate into one integer
    pub(crate) struct GridLocator;

    impl CellLocator for GridLocator {
        fn locate(&self, latitude: f64, longitude: f64, resolution: i16) -> CellIndex {
            let lat = ((latitude + 90.0) * 100.0).round() as i64;
            let lon = ((longitude + 180.0) * 100.0).round() as i64;
            (resolution as i64) * 10_000_000_000 + lat * 100_000 + lon
        }
    }

    fn sample(latitude: f64, longitude: f64) -> LocationSample {
        LocationSample {
            latitude,
            longitude,
            timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            kinematics: Kinematics::default(),
        }
    }

    #[test]
    fn test_clamp_resolution() {
        assert_eq!(clamp_resolution(-3), 0);
        assert_eq!(clamp_resolution(9), 9);
        assert_eq!(clamp_resolution(40), 15);
    }

    #[test]
    fn test_sample_validation() {
        assert!(sample(52.52, 13.40).validate().is_ok());
        assert!(sample(-90.0, 180.0).validate().is_ok());
        assert!(sample(91.0, 0.0).validate().unwrap_err().is_invalid_observation());
        assert!(sample(0.0, -180.5).validate().is_err());
        assert!(sample(f64::NAN, 0.0).validate().is_err());
    }

    #[test]
    fn test_grid_locator_is_deterministic() {
        let a = GridLocator.locate(52.52, 13.40, 12);
        let b = GridLocator.locate(52.52, 13.40, 12);
        let c = GridLocator.locate(52.52, 13.40, 9);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_sample_json_flattens_kinematics() {
        let json = r#"{"latitude":1.0,"longitude":2.0,"timestamp":"2023-11-14T22:13:20Z","speed":1.5}"#;
        let parsed: LocationSample = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.kinematics.speed, Some(1.5));
        assert_eq!(parsed.kinematics.altitude, None);
    }
}
