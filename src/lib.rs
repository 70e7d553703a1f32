//! hexflow - hexagonal-grid movement graph aggregator
//!
//! Location samples snapped to H3 cells are appended to an observation log,
//! and cell-to-cell transitions are folded into a directed graph of
//! aggregated edges with running statistics.

pub mod config;
pub mod graph;
pub mod sqlite_pragma;
