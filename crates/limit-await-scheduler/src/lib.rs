//! Permit-phase admission control that caps not-ready pods per node.
//!
//! This crate provides the `LimitAwaitScheduling` permit plugin. Before a
//! pod's binding to its candidate node is committed, the plugin parks it in
//! the framework's waiting registry; a background releaser lets parked pods
//! through as nodes gain free startup slots. It handles:
//!
//! - The synchronous permit decision ([`AdmissionGate`])
//! - Per-node pod grouping under composable predicates ([`index`])
//! - Free-slot estimation from cluster snapshots ([`CapacityEstimator`])
//! - Periodic release of waiting pods ([`WaitingPodReleaser`])
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Scheduler framework                         │
//! │   permit hook      │     WaitingRegistry     │   Pod/Node caches │
//! └─────────────────────────────────────────────────────────────────┘
//!          │                   ▲          ▲                │
//!          ▼                   │ allow    │ is_waiting     │ list
//! ┌─────────────────┐   ┌──────┴──────────┴────────────────▼───────┐
//! │  AdmissionGate  │   │ WaitingPodReleaser                        │
//! │  Proceed / Wait │   │   └─ CapacityEstimator                    │
//! └─────────────────┘   │        └─ index::aggregate + predicates   │
//!                       └───────────────────────────────────────────┘
//! ```
//!
//! The gate and the releaser share no state of their own; they meet only
//! in the framework's waiting registry.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use limit_await_scheduler::{FrameworkHandle, PluginRegistry, WaitingPodMap};
//! use limit_await_scheduler::k8s::ClusterCaches;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = kube::Client::try_default().await?;
//! let caches = ClusterCaches::spawn(&client);
//! let waiting = Arc::new(WaitingPodMap::new());
//! let handle = FrameworkHandle::new(caches.pods.clone(), caches.nodes.clone(), waiting);
//!
//! let args = serde_json::json!({ "parallelism": 4 });
//! let plugin = PluginRegistry::with_defaults().build("LimitAwaitScheduling", Some(&args), handle)?;
//!
//! // ... call plugin.permit(&pod, &node) from each scheduling attempt ...
//!
//! plugin.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Testing
//!
//! Enable the `test-utils` feature for an in-memory cluster:
//!
//! ```ignore
//! use std::sync::Arc;
//! use limit_await_scheduler::{FrameworkHandle, MockCluster, WaitingPodMap};
//!
//! let cluster = Arc::new(MockCluster::new());
//! let handle = FrameworkHandle::new(cluster.clone(), cluster, Arc::new(WaitingPodMap::new()));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod capacity;
pub mod config;
pub mod error;
pub mod framework;
pub mod gate;
pub mod index;
pub mod k8s;
pub mod plugin;
pub mod predicate;
pub mod registry;
pub mod releaser;
pub mod waiting;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use capacity::{CapacityEstimator, CapacityTable};
pub use config::LimitAwaitArgs;
pub use error::{AggregationError, Result, SchedulerError};
pub use framework::{
    Clock, FrameworkHandle, NodeLister, PermitDecision, PermitPlugin, PodLister, SystemClock,
    WaitingRegistry, WaitingUnit,
};
pub use gate::AdmissionGate;
pub use index::{aggregate, NodeAggregate};
pub use plugin::LimitAwaitScheduling;
pub use registry::{PluginFactory, PluginRegistry};
pub use releaser::{ReleaseStats, WaitingPodReleaser};
pub use waiting::{WaitHandle, WaitOutcome, WaitingPodMap};

#[cfg(any(test, feature = "test-utils"))]
pub use mock::{FixedClock, MockCluster};
