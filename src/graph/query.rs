//! Read-side access to the aggregated graph

use super::edge_store::EdgeStore;
use super::error::GraphResult;
use super::types::{AggregatedEdge, EdgeKey, MotionType};
use std::sync::Arc;

pub struct GraphQueryService {
    store: Arc<dyn EdgeStore>,
}

impl GraphQueryService {
    pub fn new(store: Arc<dyn EdgeStore>) -> Self {
        Self { store }
    }

    /// Every edge (optionally of one motion), most recently traversed first
    pub async fn list_edges(&self, motion: Option<MotionType>) -> GraphResult<Vec<AggregatedEdge>> {
        self.store.list(motion).await
    }

    /// Look up an edge by its external id
    ///
    /// Ids that do not parse to a known triple yield `Ok(None)`, the same as a
    /// well-formed id with no stored edge.
    pub async fn get_edge(&self, id: &str) -> GraphResult<Option<AggregatedEdge>> {
        match EdgeKey::parse_id(id) {
            Some(key) => self.store.load(&key).await,
            None => {
                log::debug!("🔍 Unparseable edge id: {:?}", id);
                Ok(None)
            }
        }
    }

    pub async fn edge_count(&self) -> GraphResult<u64> {
        self.store.count().await
    }
}
