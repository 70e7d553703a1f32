//! Error taxonomy for the movement graph
//!
//! - `InvalidObservation`: rejected before any shared state is touched, never retried
//! - `StorageFault` / `Io`: the storage medium failed; surfaced unmodified to the caller
//! - `Serialization`: malformed wire input (JSONL transitions)
//!
//! Lookups that find nothing return `Ok(None)`, not an error.

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Invalid observation: {0}")]
    InvalidObservation(String),

    #[error("Storage fault: {0}")]
    StorageFault(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for GraphError {
    fn from(err: rusqlite::Error) -> Self {
        GraphError::StorageFault(err.to_string())
    }
}

impl GraphError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        GraphError::InvalidObservation(reason.into())
    }

    pub fn is_invalid_observation(&self) -> bool {
        matches!(self, GraphError::InvalidObservation(_))
    }

    /// True for faults of the underlying storage medium
    pub fn is_storage_fault(&self) -> bool {
        matches!(self, GraphError::StorageFault(_) | GraphError::Io(_))
    }
}

pub type GraphResult<T> = Result<T, GraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rusqlite_error_maps_to_storage_fault() {
        let err: GraphError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(err.is_storage_fault());
        assert!(!err.is_invalid_observation());
        assert!(err.to_string().starts_with("Storage fault:"));
    }

    #[test]
    fn test_invalid_observation_display() {
        let err = GraphError::invalid("delta_time must be >= 0 (got -1)");
        assert!(err.is_invalid_observation());
        assert_eq!(
            err.to_string(),
            "Invalid observation: delta_time must be >= 0 (got -1)"
        );
    }
}
