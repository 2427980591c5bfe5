//! Per-node grouping of pods.
//!
//! [`aggregate`] turns flat pod and node snapshots into one entry per node
//! holding the pods assigned to it that pass every filter. It performs no
//! cache access of its own.

use std::collections::BTreeMap;

use tracing::debug;

use limit_await_core::{Node, NodeName, WorkloadUnit};

use crate::error::AggregationError;
use crate::predicate::{all_match, PodPredicate};

/// A node together with the matching pods assigned to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeAggregate {
    /// The node.
    pub node: Node,
    /// Pods on the node that passed every filter.
    pub pods: Vec<WorkloadUnit>,
}

/// Group `pods` by assigned node, keeping only pods accepted by all `filters`.
///
/// Every node in `nodes` gets an entry, even with no matching pods. Pods that
/// are unassigned, or assigned to a node missing from `nodes`, are skipped.
///
/// # Errors
///
/// Returns `AggregationError::DuplicateNode` if `nodes` names the same node
/// twice.
pub fn aggregate(
    pods: &[WorkloadUnit],
    nodes: &[Node],
    filters: &[&dyn PodPredicate],
) -> Result<BTreeMap<NodeName, NodeAggregate>, AggregationError> {
    let mut matched: BTreeMap<&NodeName, Vec<WorkloadUnit>> = BTreeMap::new();

    for pod in pods {
        let Some(node_name) = pod.node_name.as_ref() else {
            continue;
        };
        if !all_match(filters, pod) {
            continue;
        }
        matched.entry(node_name).or_default().push(pod.clone());
    }

    let mut aggregates = BTreeMap::new();
    for node in nodes {
        if aggregates.contains_key(&node.name) {
            return Err(AggregationError::DuplicateNode(node.name.clone()));
        }
        let pods = matched.remove(&node.name).unwrap_or_default();
        aggregates.insert(
            node.name.clone(),
            NodeAggregate {
                node: node.clone(),
                pods,
            },
        );
    }

    for (node, orphans) in matched {
        debug!(
            node = %node,
            pods = orphans.len(),
            "Skipping pods assigned to a node missing from the snapshot"
        );
    }

    Ok(aggregates)
}
