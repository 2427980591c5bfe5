//! Core cluster types for the limit-await permit plugin.
//!
//! This crate provides the cluster-independent vocabulary shared by the
//! admission logic and its Kubernetes adapters:
//!
//! - **Identifiers**: Validated node names and pod UIDs
//! - **Workload model**: Pods, nodes, lifecycle phase and readiness
//! - **Error types**: Common error definitions shared across crates
//!
//! # Example
//!
//! ```
//! use limit_await_core::{NodeName, PodPhase, PodUid, WorkloadUnit};
//!
//! let node = NodeName::new("worker-1").unwrap();
//! let pod = WorkloadUnit::new(PodUid::new("8f2c").unwrap(), "web-0", "default")
//!     .with_phase(PodPhase::Pending)
//!     .with_node(node.clone());
//!
//! assert_eq!(pod.node_name.as_ref(), Some(&node));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod ids;
pub mod pod;

pub use error::{CoreError, Result};
pub use ids::{IdError, NodeName, PodUid};
pub use pod::{Node, PodPhase, ReadyCondition, WorkloadUnit};
