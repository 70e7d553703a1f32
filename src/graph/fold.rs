//! Statistical fold for aggregated edges
//!
//! An edge is seeded with the identity elements of each running statistic
//! (0 for sums and maxima, +inf for minima, elevation absent) and every
//! observation is folded into it. Seeded edges are never persisted: the
//! aggregator always folds before it saves, so a stored edge has
//! `traverse_count >= 1`.

use super::types::{AggregatedEdge, EdgeKey, EdgeObservation, ElevationStats};
use chrono::{DateTime, Utc};

impl ElevationStats {
    /// Fold one elevation delta
    ///
    /// Min/max follow the running cumulative sum, not the individual deltas.
    /// This matches the behavior of the stored graphs already on devices, so it
    /// must not be changed to per-delta extrema without migrating them.
    pub fn fold(self, delta: f64) -> Self {
        match self {
            ElevationStats::Absent => ElevationStats::Present {
                sum: delta,
                min: delta,
                max: delta,
            },
            ElevationStats::Present { sum, min, max } => {
                let sum = sum + delta;
                ElevationStats::Present {
                    sum,
                    min: min.min(sum),
                    max: max.max(sum),
                }
            }
        }
    }
}

impl AggregatedEdge {
    /// Empty edge for a triple that has never been traversed
    pub(crate) fn seed(key: EdgeKey, now: DateTime<Utc>) -> Self {
        Self {
            id: key.id(),
            key,
            traverse_count: 0,
            sum_time: 0.0,
            min_time: f64::INFINITY,
            max_time: 0.0,
            sum_distance: 0.0,
            min_distance: f64::INFINITY,
            max_distance: 0.0,
            elevation: ElevationStats::Absent,
            elevation_samples: 0,
            first_traversed_at: now,
            last_traversed_at: now,
            created_at: now,
            updated_at: now,
        }
    }

    /// Fold one validated observation into the running statistics
    ///
    /// Callers validate first (`EdgeObservation::validate`) and hold the
    /// per-key lock for the edge.
    pub(crate) fn fold(&mut self, observation: &EdgeObservation) {
        let now = observation.observed_at;

        self.traverse_count += 1;

        self.sum_time += observation.delta_time;
        self.max_time = self.max_time.max(observation.delta_time);
        self.min_time = self.min_time.min(observation.delta_time);

        self.sum_distance += observation.delta_distance;
        self.max_distance = self.max_distance.max(observation.delta_distance);
        self.min_distance = self.min_distance.min(observation.delta_distance);

        if let Some(delta) = observation.delta_elevation {
            self.elevation = self.elevation.fold(delta);
            self.elevation_samples += 1;
        }

        // Out-of-order deliveries widen the traversal window instead of shrinking it
        self.first_traversed_at = self.first_traversed_at.min(now);
        self.last_traversed_at = self.last_traversed_at.max(now);
        self.updated_at = now;
    }

    pub fn average_time(&self) -> Option<f64> {
        (self.traverse_count > 0).then(|| self.sum_time / self.traverse_count as f64)
    }

    pub fn average_distance(&self) -> Option<f64> {
        (self.traverse_count > 0).then(|| self.sum_distance / self.traverse_count as f64)
    }

    /// Meters per second across all traversals
    pub fn average_speed(&self) -> Option<f64> {
        (self.sum_time > 0.0).then(|| self.sum_distance / self.sum_time)
    }

    pub fn average_elevation_delta(&self) -> Option<f64> {
        match self.elevation {
            ElevationStats::Present { sum, .. } if self.elevation_samples > 0 => {
                Some(sum / self.elevation_samples as f64)
            }
            _ => None,
        }
    }
}
