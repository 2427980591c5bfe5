//! In-memory cluster caches for testing without a Kubernetes cluster.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use limit_await_core::{Node, NodeName, PodUid, WorkloadUnit};

use crate::framework::{Clock, NodeLister, PodLister};
use crate::{Result, SchedulerError};

/// A mock cluster that serves pods and nodes from memory.
#[derive(Default)]
pub struct MockCluster {
    pods: Mutex<Vec<WorkloadUnit>>,
    nodes: Mutex<Vec<Node>>,
    failing: Mutex<bool>,
}

impl MockCluster {
    /// Create an empty mock cluster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node.
    pub fn add_node(&self, name: &NodeName) {
        self.nodes.lock().push(Node::new(name.clone()));
    }

    /// Remove a node by name. Pods bound to it are kept.
    pub fn remove_node(&self, name: &NodeName) {
        self.nodes.lock().retain(|n| &n.name != name);
    }

    /// Insert a pod, replacing any pod with the same UID.
    pub fn upsert_pod(&self, pod: WorkloadUnit) {
        let mut pods = self.pods.lock();
        if let Some(existing) = pods.iter_mut().find(|p| p.uid == pod.uid) {
            *existing = pod;
        } else {
            pods.push(pod);
        }
    }

    /// Remove a pod by UID.
    pub fn remove_pod(&self, uid: &PodUid) {
        self.pods.lock().retain(|p| &p.uid != uid);
    }

    /// Make every subsequent listing fail until cleared.
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }

    fn check(&self, what: &str) -> Result<()> {
        if *self.failing.lock() {
            return Err(SchedulerError::SnapshotUnavailable(format!(
                "mock {what} cache unavailable"
            )));
        }
        Ok(())
    }
}

impl PodLister for MockCluster {
    fn list_pods(&self) -> Result<Vec<WorkloadUnit>> {
        self.check("pod")?;
        Ok(self.pods.lock().clone())
    }
}

impl NodeLister for MockCluster {
    fn list_nodes(&self) -> Result<Vec<Node>> {
        self.check("node")?;
        Ok(self.nodes.lock().clone())
    }
}

/// A clock frozen at a settable instant.
pub struct FixedClock(Mutex<DateTime<Utc>>);

impl FixedClock {
    /// Create a clock reading `at`.
    #[must_use]
    pub fn new(at: DateTime<Utc>) -> Self {
        Self(Mutex::new(at))
    }

    /// Move the clock to `at`.
    pub fn set(&self, at: DateTime<Utc>) {
        *self.0.lock() = at;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock()
    }
}
