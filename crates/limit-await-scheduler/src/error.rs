//! Error types for the scheduler crate.

use limit_await_core::{CoreError, NodeName};
use thiserror::Error;

/// Errors that can occur in the permit plugin and its collaborators.
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// Kubernetes API error.
    #[error("Kubernetes API error: {0}")]
    KubeApi(#[from] kube::Error),

    /// A cluster cache could not produce a snapshot.
    #[error("Snapshot unavailable: {0}")]
    SnapshotUnavailable(String),

    /// Node aggregation hit an invariant violation.
    #[error("Aggregation failed: {0}")]
    Aggregation(#[from] AggregationError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// No plugin is registered under the requested name.
    #[error("Unknown plugin: {0}")]
    UnknownPlugin(String),

    /// Plugin arguments could not be decoded.
    #[error("Invalid plugin arguments: {0}")]
    InvalidArgs(#[from] serde_json::Error),

    /// Core type error.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl SchedulerError {
    /// Check if this error is retriable.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::KubeApi(_) | Self::SnapshotUnavailable(_))
    }

    /// Check if this error indicates a programming defect.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Aggregation(_))
    }
}

/// Invariant violations raised while grouping pods by node.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AggregationError {
    /// Two nodes in one snapshot claimed the same aggregate.
    #[error("node {0} already attached to its aggregate")]
    DuplicateNode(NodeName),
}

/// A specialized Result type for scheduler operations.
pub type Result<T> = std::result::Result<T, SchedulerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        let snapshot = SchedulerError::SnapshotUnavailable("pods".to_string());
        assert!(snapshot.is_retriable());
        assert!(!snapshot.is_fatal());

        let node = NodeName::new("worker-1").unwrap();
        let aggregation = SchedulerError::from(AggregationError::DuplicateNode(node));
        assert!(aggregation.is_fatal());
        assert!(!aggregation.is_retriable());

        assert!(!SchedulerError::Config("bad".to_string()).is_retriable());
    }
}
