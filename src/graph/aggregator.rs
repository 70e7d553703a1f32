//! Edge aggregation: find-or-create, fold, persist
//!
//! Each upsert holds the lock for its `(from, to, motion)` triple from the
//! lookup until the persisted row is written, so concurrent upserts on one
//! triple are applied one after another and none is lost. Upserts on other
//! triples take other locks and run in parallel.
//!
//! The fold is applied to an in-memory copy. If validation or the save fails,
//! the stored edge is left exactly as it was.

use super::edge_store::EdgeStore;
use super::error::GraphResult;
use super::locks::KeyedLocks;
use super::types::{AggregatedEdge, CellIndex, EdgeKey, EdgeObservation, MotionType};
use chrono::{DateTime, SubsecRound, Utc};
use std::sync::Arc;

pub struct EdgeAggregator {
    store: Arc<dyn EdgeStore>,
    locks: KeyedLocks<EdgeKey>,
}

impl EdgeAggregator {
    pub fn new(store: Arc<dyn EdgeStore>) -> Self {
        log::info!("🔧 Edge aggregator using {} store", store.backend_type());
        Self {
            store,
            locks: KeyedLocks::new(),
        }
    }

    /// Fold one traversal with a measured elevation change
    #[allow(clippy::too_many_arguments)]
    pub async fn upsert(
        &self,
        from: CellIndex,
        to: CellIndex,
        motion: MotionType,
        delta_time: f64,
        delta_distance: f64,
        delta_elevation: f64,
        now: DateTime<Utc>,
    ) -> GraphResult<AggregatedEdge> {
        self.upsert_observation(EdgeObservation {
            from,
            to,
            motion,
            delta_time,
            delta_distance,
            delta_elevation: Some(delta_elevation),
            observed_at: now,
        })
        .await
    }

    /// Fold one traversal; returns the edge as persisted
    pub async fn upsert_observation(&self, observation: EdgeObservation) -> GraphResult<AggregatedEdge> {
        observation.validate()?;

        // Stored timestamps carry millisecond precision
        let observation = EdgeObservation {
            observed_at: observation.observed_at.trunc_subsecs(3),
            ..observation
        };
        let key = observation.key();

        let _guard = self.locks.lock(key).await;

        let mut edge = match self.store.load(&key).await? {
            Some(edge) => edge,
            None => {
                log::debug!("🆕 New edge {}", key);
                AggregatedEdge::seed(key, observation.observed_at)
            }
        };

        edge.fold(&observation);
        self.store.save(&edge).await?;

        Ok(edge)
    }

    /// Number of triples with an upsert currently running or waiting
    pub fn in_flight_keys(&self) -> usize {
        self.locks.active_keys()
    }
}
