//! Free admission slots per node.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use limit_await_core::NodeName;

use crate::framework::FrameworkHandle;
use crate::index::aggregate;
use crate::predicate::{NotReady, NotWaiting};
use crate::{Result, SchedulerError};

/// Free slots for a pod count against a cap, saturating at zero.
#[must_use]
pub fn free_slots_for(parallelism: u32, occupied: usize) -> u32 {
    parallelism.saturating_sub(u32::try_from(occupied).unwrap_or(u32::MAX))
}

/// Free slots per node for one reconciliation tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapacityTable(BTreeMap<NodeName, u32>);

impl CapacityTable {
    /// Free slots on `node`, or `None` if the node is unknown.
    #[must_use]
    pub fn get(&self, node: &NodeName) -> Option<u32> {
        self.0.get(node).copied()
    }

    /// Consume one slot on `node`. Returns `false` if none is free.
    pub fn try_take(&mut self, node: &NodeName) -> bool {
        match self.0.get_mut(node) {
            Some(free) if *free > 0 => {
                *free -= 1;
                true
            }
            _ => false,
        }
    }

    /// Number of nodes in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the table has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over `(node, free slots)` in node-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&NodeName, u32)> {
        self.0.iter().map(|(n, f)| (n, *f))
    }
}

impl FromIterator<(NodeName, u32)> for CapacityTable {
    fn from_iter<I: IntoIterator<Item = (NodeName, u32)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Computes free slots from the current cluster snapshot.
#[derive(Clone)]
pub struct CapacityEstimator {
    handle: FrameworkHandle,
    parallelism: u32,
    min_ready_seconds: u32,
}

impl CapacityEstimator {
    /// Create an estimator capping each node at `parallelism` not-ready pods.
    #[must_use]
    pub fn new(handle: FrameworkHandle, parallelism: u32, min_ready_seconds: u32) -> Self {
        Self {
            handle,
            parallelism,
            min_ready_seconds,
        }
    }

    /// The per-node cap.
    #[must_use]
    pub const fn parallelism(&self) -> u32 {
        self.parallelism
    }

    /// Compute free slots for every known node.
    ///
    /// A pod occupies a slot while it is not ready and not parked in the
    /// waiting registry.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotUnavailable` if either cache read fails, or an
    /// aggregation error if the node snapshot violates its invariants.
    pub fn free_slots(&self) -> Result<CapacityTable> {
        let pods = self.handle.pods.list_pods().map_err(as_snapshot_error)?;
        let nodes = self.handle.nodes.list_nodes().map_err(as_snapshot_error)?;

        let not_ready = NotReady::new(self.min_ready_seconds, self.handle.clock.now());
        let not_waiting = NotWaiting::new(Arc::clone(&self.handle.waiting));
        let aggregates = aggregate(&pods, &nodes, &[&not_ready, &not_waiting])?;

        Ok(aggregates
            .into_iter()
            .map(|(name, agg)| {
                let free = free_slots_for(self.parallelism, agg.pods.len());
                debug!(
                    node = %name,
                    occupied = agg.pods.len(),
                    free_slots = free,
                    "Computed node capacity"
                );
                (name, free)
            })
            .collect())
    }
}

fn as_snapshot_error(err: SchedulerError) -> SchedulerError {
    match err {
        SchedulerError::SnapshotUnavailable(_) => err,
        other => SchedulerError::SnapshotUnavailable(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockCluster;
    use crate::waiting::WaitingPodMap;
    use chrono::Utc;
    use limit_await_core::{PodPhase, PodUid, ReadyCondition, WorkloadUnit};
    use std::time::Duration;

    fn worker() -> NodeName {
        NodeName::new("worker-1").unwrap()
    }

    fn pod(uid: &str, phase: PodPhase) -> WorkloadUnit {
        WorkloadUnit::new(PodUid::new(uid).unwrap(), uid, "default")
            .with_phase(phase)
            .with_node(worker())
    }

    fn setup() -> (Arc<MockCluster>, Arc<WaitingPodMap>, FrameworkHandle) {
        let cluster = Arc::new(MockCluster::new());
        cluster.add_node(&worker());
        let waiting = Arc::new(WaitingPodMap::new());
        let handle = FrameworkHandle::new(cluster.clone(), cluster.clone(), waiting.clone());
        (cluster, waiting, handle)
    }

    #[test]
    fn free_slots_saturate() {
        assert_eq!(free_slots_for(4, 1), 3);
        assert_eq!(free_slots_for(4, 4), 0);
        assert_eq!(free_slots_for(2, 7), 0);
        assert_eq!(free_slots_for(4, 0), 4);
    }

    #[test]
    fn table_take_decrements_until_empty() {
        let mut table: CapacityTable = [(worker(), 1)].into_iter().collect();
        assert!(table.try_take(&worker()));
        assert!(!table.try_take(&worker()));
        assert_eq!(table.get(&worker()), Some(0));

        let other = NodeName::new("worker-9").unwrap();
        assert!(!table.try_take(&other));
        assert_eq!(table.get(&other), None);
    }

    #[test]
    fn ready_pod_does_not_occupy() {
        let (cluster, _waiting, handle) = setup();
        cluster.upsert_pod(pod("pending", PodPhase::Pending));
        cluster.upsert_pod(pod("starting", PodPhase::Running).with_ready(ReadyCondition::not_ready()));
        cluster.upsert_pod(
            pod("serving", PodPhase::Running).with_ready(ReadyCondition::ready_since(Utc::now())),
        );

        let table = CapacityEstimator::new(handle, 2, 0).free_slots().unwrap();
        assert_eq!(table.get(&worker()), Some(0));
    }

    #[test]
    fn waiting_pod_does_not_occupy() {
        let (cluster, waiting, handle) = setup();
        let parked = pod("parked", PodPhase::Pending);
        cluster.upsert_pod(parked.clone());
        cluster.upsert_pod(pod("starting", PodPhase::Running));
        let _handle = waiting.park(parked, worker(), Duration::from_secs(60));

        let table = CapacityEstimator::new(handle, 4, 0).free_slots().unwrap();
        assert_eq!(table.get(&worker()), Some(3));
    }

    #[test]
    fn empty_node_reports_full_capacity() {
        let (cluster, _waiting, handle) = setup();
        cluster.upsert_pod(pod("done", PodPhase::Succeeded));
        cluster.upsert_pod(pod("crashed", PodPhase::Failed));

        let table = CapacityEstimator::new(handle, 4, 0).free_slots().unwrap();
        assert_eq!(table.get(&worker()), Some(4));
    }

    #[test]
    fn overcommitted_node_never_exceeds_parallelism() {
        let (cluster, _waiting, handle) = setup();
        let idle = NodeName::new("worker-2").unwrap();
        cluster.add_node(&idle);
        for i in 0..5 {
            cluster.upsert_pod(pod(&format!("starting-{i}"), PodPhase::Pending));
        }

        let table = CapacityEstimator::new(handle, 2, 0).free_slots().unwrap();
        assert_eq!(table.get(&worker()), Some(0));
        assert_eq!(table.get(&idle), Some(2));
        assert!(table.iter().all(|(_, free)| free <= 2));
    }

    #[test]
    fn deleted_pod_frees_its_slot() {
        let (cluster, _waiting, handle) = setup();
        cluster.upsert_pod(pod("a", PodPhase::Pending));
        cluster.upsert_pod(pod("b", PodPhase::Pending));
        let estimator = CapacityEstimator::new(handle, 2, 0);
        assert_eq!(estimator.free_slots().unwrap().get(&worker()), Some(0));

        cluster.remove_pod(&PodUid::new("a").unwrap());
        assert_eq!(estimator.free_slots().unwrap().get(&worker()), Some(1));
    }

    #[test]
    fn estimation_is_idempotent() {
        let (cluster, _waiting, handle) = setup();
        cluster.add_node(&NodeName::new("worker-2").unwrap());
        cluster.upsert_pod(pod("a", PodPhase::Pending));

        let estimator = CapacityEstimator::new(handle, 4, 0);
        let first = estimator.free_slots().unwrap();
        let second = estimator.free_slots().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        assert!(first.iter().all(|(_, free)| free <= 4));
    }

    #[test]
    fn listing_failure_is_snapshot_unavailable() {
        let (cluster, _waiting, handle) = setup();
        cluster.set_failing(true);

        let err = CapacityEstimator::new(handle, 4, 0).free_slots().unwrap_err();
        assert!(matches!(err, SchedulerError::SnapshotUnavailable(_)));
    }
}
