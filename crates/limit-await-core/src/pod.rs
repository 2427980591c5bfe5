//! Workload units and nodes as observed from cluster caches.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{NodeName, PodUid};

/// Phase of the pod lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PodPhase {
    /// Pod has been accepted but containers are not yet running.
    Pending,
    /// Pod is running with at least one container.
    Running,
    /// All containers terminated successfully.
    Succeeded,
    /// At least one container failed.
    Failed,
    /// Pod status cannot be determined.
    #[default]
    Unknown,
}

impl PodPhase {
    /// Parse a pod phase from a Kubernetes phase string.
    #[must_use]
    pub fn from_k8s_phase(phase: &str) -> Self {
        match phase {
            "Pending" => Self::Pending,
            "Running" => Self::Running,
            "Succeeded" => Self::Succeeded,
            "Failed" => Self::Failed,
            _ => Self::Unknown,
        }
    }
}

/// The pod's `Ready` condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyCondition {
    /// Whether the condition status is `True`.
    pub status: bool,
    /// When the condition last changed status, if reported.
    pub last_transition: Option<DateTime<Utc>>,
}

impl ReadyCondition {
    /// A condition that is `True` and transitioned at the given instant.
    #[must_use]
    pub const fn ready_since(at: DateTime<Utc>) -> Self {
        Self {
            status: true,
            last_transition: Some(at),
        }
    }

    /// A condition that is `False`.
    #[must_use]
    pub const fn not_ready() -> Self {
        Self {
            status: false,
            last_transition: None,
        }
    }

    /// Whether the condition has been `True` for longer than `min_ready_seconds`.
    ///
    /// With a zero threshold any `True` condition is stable. Otherwise the
    /// transition time must be known and strictly older than the threshold.
    #[must_use]
    pub fn is_stable(&self, min_ready_seconds: u32, now: DateTime<Utc>) -> bool {
        if !self.status {
            return false;
        }
        if min_ready_seconds == 0 {
            return true;
        }
        self.last_transition.is_some_and(|at| {
            at + TimeDelta::seconds(i64::from(min_ready_seconds)) < now
        })
    }
}

/// A schedulable workload unit (pod).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadUnit {
    /// Unique identifier assigned by the API server.
    pub uid: PodUid,
    /// Pod name.
    pub name: String,
    /// Pod namespace.
    pub namespace: String,
    /// Current lifecycle phase.
    pub phase: PodPhase,
    /// The `Ready` condition, if the pod reports one.
    pub ready: Option<ReadyCondition>,
    /// Node the pod is assigned to, if bound.
    pub node_name: Option<NodeName>,
}

impl WorkloadUnit {
    /// Create an unassigned pod in the `Pending` phase.
    #[must_use]
    pub fn new(uid: PodUid, name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            uid,
            name: name.into(),
            namespace: namespace.into(),
            phase: PodPhase::Pending,
            ready: None,
            node_name: None,
        }
    }

    /// Set the lifecycle phase.
    #[must_use]
    pub fn with_phase(mut self, phase: PodPhase) -> Self {
        self.phase = phase;
        self
    }

    /// Set the `Ready` condition.
    #[must_use]
    pub fn with_ready(mut self, ready: ReadyCondition) -> Self {
        self.ready = Some(ready);
        self
    }

    /// Assign the pod to a node.
    #[must_use]
    pub fn with_node(mut self, node: NodeName) -> Self {
        self.node_name = Some(node);
        self
    }

    /// `namespace/name`, as used in log fields.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// Whether the pod is ready and has been for at least `min_ready_seconds`.
    #[must_use]
    pub fn is_stably_ready(&self, min_ready_seconds: u32, now: DateTime<Utc>) -> bool {
        self.ready
            .is_some_and(|c| c.is_stable(min_ready_seconds, now))
    }
}

/// A cluster node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Node {
    /// Node name.
    pub name: NodeName,
}

impl Node {
    /// Create a node with the given name.
    #[must_use]
    pub const fn new(name: NodeName) -> Self {
        Self { name }
    }
}
