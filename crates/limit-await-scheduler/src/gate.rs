//! The synchronous permit decision.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use limit_await_core::{NodeName, WorkloadUnit};

use crate::framework::{NodeLister, PermitDecision};

/// Decides, once per scheduling attempt, whether a pod binds now or waits.
///
/// Holds no per-pod state; release decisions are made by
/// [`WaitingPodReleaser`](crate::releaser::WaitingPodReleaser) against the
/// framework's waiting registry.
#[derive(Clone)]
pub struct AdmissionGate {
    nodes: Arc<dyn NodeLister>,
    system_namespace: String,
    permit_timeout: Duration,
}

impl AdmissionGate {
    /// Create a gate that parks pods for up to `permit_timeout`.
    #[must_use]
    pub fn new(
        nodes: Arc<dyn NodeLister>,
        system_namespace: impl Into<String>,
        permit_timeout: Duration,
    ) -> Self {
        Self {
            nodes,
            system_namespace: system_namespace.into(),
            permit_timeout,
        }
    }

    /// Decide for `pod` on its candidate `node`.
    ///
    /// System-namespace pods always proceed. Any other pod waits, unless the
    /// candidate node cannot be read from the node cache, which fails the
    /// attempt.
    #[must_use]
    pub fn permit(&self, pod: &WorkloadUnit, node: &NodeName) -> PermitDecision {
        if pod.namespace == self.system_namespace {
            info!(pod = %pod.key(), node = %node, "Permit system pod");
            return PermitDecision::Proceed;
        }

        match self.nodes.get(node) {
            Ok(Some(_)) => {}
            Ok(None) => {
                warn!(pod = %pod.key(), node = %node, "Candidate node missing from snapshot");
                return PermitDecision::Error {
                    message: format!("node {node} not found in snapshot"),
                };
            }
            Err(e) => {
                warn!(pod = %pod.key(), node = %node, error = %e, "Failed to read node snapshot");
                return PermitDecision::Error {
                    message: format!("failed to get node information: {e}"),
                };
            }
        }

        info!(
            pod = %pod.key(),
            node = %node,
            timeout_secs = self.permit_timeout.as_secs(),
            "Pod waits for node capacity"
        );
        PermitDecision::Wait {
            timeout: self.permit_timeout,
        }
    }
}
