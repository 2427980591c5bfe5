//! Seams between the admission logic and the hosting scheduler framework.
//!
//! The framework owns the cluster caches and the waiting-pod registry. The
//! plugin only reads the caches, and only queries and releases entries in
//! the registry.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use limit_await_core::{Node, NodeName, PodUid, WorkloadUnit};

use crate::Result;

/// Read access to the pod cache.
pub trait PodLister: Send + Sync {
    /// List every pod currently in the cache.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotUnavailable` if the cache cannot serve a snapshot.
    fn list_pods(&self) -> Result<Vec<WorkloadUnit>>;
}

/// Read access to the node cache.
pub trait NodeLister: Send + Sync {
    /// List every node currently in the cache.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotUnavailable` if the cache cannot serve a snapshot.
    fn list_nodes(&self) -> Result<Vec<Node>>;

    /// Look up a single node by name.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotUnavailable` if the cache cannot serve a snapshot.
    fn get(&self, name: &NodeName) -> Result<Option<Node>> {
        Ok(self.list_nodes()?.into_iter().find(|n| &n.name == name))
    }
}

/// A pod parked in the permit phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WaitingUnit {
    /// The parked pod.
    pub pod: WorkloadUnit,
    /// Node the pod was permitted against.
    pub node: NodeName,
    /// When the pod was parked.
    pub enqueued_at: DateTime<Utc>,
    /// When the framework will give up waiting.
    pub deadline: DateTime<Utc>,
}

/// The framework's registry of waiting pods.
///
/// Implementations synchronize internally. Enumeration and release must be
/// race-free against concurrent parking and timeouts.
pub trait WaitingRegistry: Send + Sync {
    /// Snapshot of every pod currently waiting.
    fn waiting_units(&self) -> Vec<WaitingUnit>;

    /// Whether the pod with this UID is currently waiting.
    fn is_waiting(&self, uid: &PodUid) -> bool;

    /// Let a waiting pod proceed. Returns `false` if it was no longer waiting.
    fn allow(&self, uid: &PodUid, plugin: &str) -> bool;

    /// Fail a waiting pod's attempt. Returns `false` if it was no longer waiting.
    fn reject(&self, uid: &PodUid, plugin: &str, message: &str) -> bool;
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Everything a plugin may use from the framework.
#[derive(Clone)]
pub struct FrameworkHandle {
    /// Pod cache.
    pub pods: Arc<dyn PodLister>,
    /// Node cache.
    pub nodes: Arc<dyn NodeLister>,
    /// Waiting-pod registry.
    pub waiting: Arc<dyn WaitingRegistry>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
}

impl FrameworkHandle {
    /// Bundle the framework collaborators, using the system clock.
    #[must_use]
    pub fn new(
        pods: Arc<dyn PodLister>,
        nodes: Arc<dyn NodeLister>,
        waiting: Arc<dyn WaitingRegistry>,
    ) -> Self {
        Self {
            pods,
            nodes,
            waiting,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Result of a permit call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermitDecision {
    /// Let the scheduling attempt proceed to binding.
    Proceed,
    /// Park the pod until it is allowed, rejected, or `timeout` elapses.
    Wait {
        /// Maximum time to wait.
        timeout: Duration,
    },
    /// Fail this scheduling attempt.
    Error {
        /// Why the attempt failed.
        message: String,
    },
}

impl PermitDecision {
    /// The wait duration the framework should apply; zero unless waiting.
    #[must_use]
    pub const fn wait_duration(&self) -> Duration {
        match self {
            Self::Wait { timeout } => *timeout,
            Self::Proceed | Self::Error { .. } => Duration::ZERO,
        }
    }

    /// Short label for logs and API responses.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Proceed => "proceed",
            Self::Wait { .. } => "wait",
            Self::Error { .. } => "error",
        }
    }
}

/// A plugin invoked in the permit phase.
#[async_trait]
pub trait PermitPlugin: Send + Sync {
    /// Registered plugin name.
    fn name(&self) -> &str;

    /// Decide whether the pod may bind to `node` now.
    fn permit(&self, pod: &WorkloadUnit, node: &NodeName) -> PermitDecision;

    /// Stop any background work owned by the plugin.
    async fn shutdown(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_duration_is_zero_unless_waiting() {
        assert_eq!(PermitDecision::Proceed.wait_duration(), Duration::ZERO);
        assert_eq!(
            PermitDecision::Error {
                message: "boom".to_string()
            }
            .wait_duration(),
            Duration::ZERO
        );
        assert_eq!(
            PermitDecision::Wait {
                timeout: Duration::from_secs(600)
            }
            .wait_duration(),
            Duration::from_secs(600)
        );
    }
}
