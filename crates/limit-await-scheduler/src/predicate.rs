//! Pod predicates used to select which pods occupy admission slots.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use limit_await_core::{PodPhase, WorkloadUnit};
use tracing::trace;

use crate::framework::WaitingRegistry;

/// A boolean test over a pod.
pub trait PodPredicate: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Whether the pod satisfies the predicate.
    fn evaluate(&self, pod: &WorkloadUnit) -> bool;
}

/// Short-circuiting conjunction: true if every predicate accepts the pod.
///
/// Predicates are evaluated in order and evaluation stops at the first
/// rejection. An empty list accepts every pod.
#[must_use]
pub fn all_match(predicates: &[&dyn PodPredicate], pod: &WorkloadUnit) -> bool {
    match predicates.iter().find(|p| !p.evaluate(pod)) {
        Some(rejected) => {
            trace!(pod = %pod.key(), predicate = rejected.name(), "Pod filtered out");
            false
        }
        None => true,
    }
}

/// Matches pods that still compete for node startup capacity.
///
/// `Pending` pods are not ready. `Running` pods are not ready unless their
/// `Ready` condition has been true for `min_ready_seconds`. Terminal and
/// unknown pods never match.
#[derive(Debug, Clone, Copy)]
pub struct NotReady {
    min_ready_seconds: u32,
    now: DateTime<Utc>,
}

impl NotReady {
    /// Create the predicate evaluated at `now`.
    #[must_use]
    pub const fn new(min_ready_seconds: u32, now: DateTime<Utc>) -> Self {
        Self {
            min_ready_seconds,
            now,
        }
    }
}

impl PodPredicate for NotReady {
    fn name(&self) -> &'static str {
        "not-ready"
    }

    fn evaluate(&self, pod: &WorkloadUnit) -> bool {
        match pod.phase {
            PodPhase::Pending => true,
            PodPhase::Running => !pod.is_stably_ready(self.min_ready_seconds, self.now),
            PodPhase::Succeeded | PodPhase::Failed | PodPhase::Unknown => false,
        }
    }
}

/// Matches pods that are not parked in the waiting registry.
pub struct NotWaiting {
    registry: Arc<dyn WaitingRegistry>,
}

impl NotWaiting {
    /// Create the predicate backed by the framework's registry.
    #[must_use]
    pub fn new(registry: Arc<dyn WaitingRegistry>) -> Self {
        Self { registry }
    }
}

impl PodPredicate for NotWaiting {
    fn name(&self) -> &'static str {
        "not-waiting"
    }

    fn evaluate(&self, pod: &WorkloadUnit) -> bool {
        !self.registry.is_waiting(&pod.uid)
    }
}
