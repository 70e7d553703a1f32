//! # Movement Graph
//!
//! Turns a stream of location samples into two persisted structures:
//!
//! 1. **Observation log** (`h3_nodes`): one row per visit to a hexagonal cell,
//!    append-only, pruned by age.
//! 2. **Aggregated edges** (`h3_aggregated_edges`): one row per directed
//!    `(from_cell, to_cell, motion)` transition, holding running statistics
//!    (count, sums, minima, maxima) rather than the raw transitions.
//!
//! ## Flow
//!
//! ```text
//! LocationSample -> CellLocator -> NodeRecorder
//! EdgeObservation -> mpsc -> ingestion -> EdgeAggregator -> EdgeStore
//!                                                          -> GraphQueryService
//! ```
//!
//! Segmentation of samples into transitions and motion classification happen
//! upstream; this module receives their results.
//!
//! ## Module Organization
//!
//! - `types` - Core data structures (EdgeKey, AggregatedEdge, SpatialObservation)
//! - `error` - GraphError and GraphResult
//! - `db` - SQLite schema and connection setup
//! - `edge_store` - EdgeStore trait with SQLite and in-memory backends
//! - `node_store` - NodeRecorder trait with the SQLite backend
//! - `aggregator` - per-key serialized find-or-create-then-fold upsert
//! - `locks` - keyed async lock table used by the aggregator
//! - `query` - read-side edge lookups
//! - `ingestion` - channel consumer feeding the aggregator through per-triple ordered shards
//! - `retention` - periodic pruning of the observation log
//! - `locator` - coordinate to cell seam
//! - `features` - time-of-day features for observations

pub mod aggregator;
pub mod db;
pub mod edge_store;
pub mod error;
pub mod features;
mod fold;
pub mod ingestion;
pub mod locator;
pub mod locks;
pub mod node_store;
pub mod query;
pub mod retention;
pub mod types;

pub use aggregator::EdgeAggregator;
pub use edge_store::{EdgeStore, MemoryEdgeStore, SqliteEdgeStore};
pub use error::{GraphError, GraphResult};
pub use locator::{CellLocator, LocationSample};
pub use node_store::{NodeRecorder, SqliteNodeRecorder};
pub use query::GraphQueryService;
pub use types::{
    AggregatedEdge, CellIndex, EdgeKey, EdgeObservation, ElevationStats, Kinematics, MotionType,
    SpatialObservation,
};
