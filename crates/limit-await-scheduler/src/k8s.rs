//! Kubernetes-backed cluster caches.
//!
//! Pods and nodes are mirrored into `kube::runtime` reflector stores and
//! converted into the core model on every read. A store refuses to serve
//! snapshots until its watcher has completed the initial list.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::core::v1::{Node as K8sNode, Pod};
use kube::runtime::reflector::{self, ObjectRef, Store};
use kube::runtime::watcher::{self, watcher, Config as WatcherConfig};
use kube::runtime::WatchStreamExt;
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use limit_await_core::{
    CoreError, Node, NodeName, PodPhase, PodUid, ReadyCondition, WorkloadUnit,
};

use crate::framework::{NodeLister, PodLister};
use crate::{Result, SchedulerError};

/// Convert a Kubernetes pod into the core model.
///
/// # Errors
///
/// Returns an error if the pod has no UID or name, or carries an invalid
/// node name.
pub fn workload_unit_from_pod(pod: &Pod) -> Result<WorkloadUnit> {
    let missing = |field| CoreError::MissingField { kind: "Pod", field };

    let uid = pod
        .metadata
        .uid
        .as_deref()
        .ok_or_else(|| missing("metadata.uid"))?;
    let name = pod
        .metadata
        .name
        .as_deref()
        .ok_or_else(|| missing("metadata.name"))?;
    let namespace = pod.metadata.namespace.as_deref().unwrap_or("default");

    let status = pod.status.as_ref();
    let phase = status
        .and_then(|s| s.phase.as_deref())
        .map(PodPhase::from_k8s_phase)
        .unwrap_or_default();

    let ready = status
        .and_then(|s| s.conditions.as_ref())
        .and_then(|conditions| conditions.iter().find(|c| c.type_ == "Ready"))
        .map(|c| ReadyCondition {
            status: c.status == "True",
            last_transition: c.last_transition_time.as_ref().map(|t| t.0),
        });

    let node_name = pod
        .spec
        .as_ref()
        .and_then(|s| s.node_name.as_deref())
        .filter(|n| !n.is_empty())
        .map(NodeName::new)
        .transpose()
        .map_err(CoreError::from)?;

    let mut unit = WorkloadUnit::new(PodUid::new(uid).map_err(CoreError::from)?, name, namespace)
        .with_phase(phase);
    unit.ready = ready;
    unit.node_name = node_name;
    Ok(unit)
}

/// Convert a Kubernetes node into the core model.
///
/// # Errors
///
/// Returns an error if the node has no name or an invalid one.
pub fn node_from_k8s(node: &K8sNode) -> Result<Node> {
    let name = node
        .metadata
        .name
        .as_deref()
        .ok_or(CoreError::MissingField {
            kind: "Node",
            field: "metadata.name",
        })?;
    Ok(Node::new(NodeName::new(name).map_err(CoreError::from)?))
}

/// A reflector store that reports whether its initial list has completed.
pub struct Reflected<K: Resource + Clone + 'static>
where
    K::DynamicType: Eq + Hash + Clone,
{
    store: Store<K>,
    synced: Arc<AtomicBool>,
    kind: &'static str,
}

/// Pod cache backed by a reflector.
pub type ReflectorPodLister = Reflected<Pod>;

/// Node cache backed by a reflector.
pub type ReflectorNodeLister = Reflected<K8sNode>;

impl<K: Resource + Clone + 'static> Reflected<K>
where
    K::DynamicType: Eq + Hash + Clone,
{
    fn new(store: Store<K>, kind: &'static str) -> Self {
        Self {
            store,
            synced: Arc::new(AtomicBool::new(false)),
            kind,
        }
    }

    /// Whether the initial list has completed.
    #[must_use]
    pub fn is_synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }

    fn ensure_synced(&self) -> Result<()> {
        if !self.is_synced() {
            return Err(SchedulerError::SnapshotUnavailable(format!(
                "{} cache has not synced",
                self.kind
            )));
        }
        Ok(())
    }

    fn snapshot(&self) -> Result<Vec<Arc<K>>> {
        self.ensure_synced()?;
        Ok(self.store.state())
    }
}

impl PodLister for Reflected<Pod> {
    fn list_pods(&self) -> Result<Vec<WorkloadUnit>> {
        Ok(self
            .snapshot()?
            .iter()
            .filter_map(|pod| match workload_unit_from_pod(pod) {
                Ok(unit) => Some(unit),
                Err(e) => {
                    debug!(error = %e, "Skipping unconvertible pod");
                    None
                }
            })
            .collect())
    }
}

impl NodeLister for Reflected<K8sNode> {
    fn list_nodes(&self) -> Result<Vec<Node>> {
        Ok(self
            .snapshot()?
            .iter()
            .filter_map(|node| match node_from_k8s(node) {
                Ok(node) => Some(node),
                Err(e) => {
                    debug!(error = %e, "Skipping unconvertible node");
                    None
                }
            })
            .collect())
    }

    fn get(&self, name: &NodeName) -> Result<Option<Node>> {
        self.ensure_synced()?;
        self.store
            .get(&ObjectRef::new(name.as_str()))
            .map(|node| node_from_k8s(&node))
            .transpose()
    }
}

/// Running pod and node reflectors.
pub struct ClusterCaches {
    /// Pod cache.
    pub pods: Arc<ReflectorPodLister>,
    /// Node cache.
    pub nodes: Arc<ReflectorNodeLister>,
    tasks: Vec<JoinHandle<()>>,
}

impl ClusterCaches {
    /// Start cluster-wide pod and node reflectors.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn spawn(client: &Client) -> Self {
        let (pods, pod_task) = spawn_reflector(Api::<Pod>::all(client.clone()), "pod");
        let (nodes, node_task) = spawn_reflector(Api::<K8sNode>::all(client.clone()), "node");

        Self {
            pods: Arc::new(pods),
            nodes: Arc::new(nodes),
            tasks: vec![pod_task, node_task],
        }
    }

    /// Whether both caches completed their initial list.
    #[must_use]
    pub fn is_synced(&self) -> bool {
        self.pods.is_synced() && self.nodes.is_synced()
    }

    /// Stop the reflector tasks.
    pub fn abort(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

fn spawn_reflector<K>(api: Api<K>, kind: &'static str) -> (Reflected<K>, JoinHandle<()>)
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    K::DynamicType: Default + Eq + Hash + Clone + Send + Sync,
{
    let (reader, writer) = reflector::store();
    let reflected = Reflected::new(reader, kind);
    let synced = Arc::clone(&reflected.synced);

    let task = tokio::spawn(async move {
        let stream = watcher(api, WatcherConfig::default())
            .default_backoff()
            .reflect(writer);
        futures::pin_mut!(stream);

        info!(kind, "Starting cluster cache reflector");

        while let Some(event) = stream.next().await {
            match event {
                Ok(watcher::Event::InitDone) => {
                    if !synced.swap(true, Ordering::AcqRel) {
                        info!(kind, "Cluster cache synced");
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(kind, error = %e, "Watcher error, will retry");
                }
            }
        }

        warn!(kind, "Cluster cache reflector exited unexpectedly");
    });

    (reflected, task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{PodCondition, PodSpec, PodStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
    use kube::api::ObjectMeta;

    fn k8s_pod(phase: &str, ready: Option<&str>, node: Option<&str>) -> Pod {
        let now = chrono::Utc::now();
        Pod {
            metadata: ObjectMeta {
                name: Some("web-0".to_string()),
                namespace: Some("shop".to_string()),
                uid: Some("0c2f6b9e".to_string()),
                ..Default::default()
            },
            spec: Some(PodSpec {
                node_name: node.map(ToString::to_string),
                ..Default::default()
            }),
            status: Some(PodStatus {
                phase: Some(phase.to_string()),
                conditions: ready.map(|status| {
                    vec![PodCondition {
                        type_: "Ready".to_string(),
                        status: status.to_string(),
                        last_transition_time: Some(Time(now)),
                        ..Default::default()
                    }]
                }),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn converts_running_ready_pod() {
        let unit = workload_unit_from_pod(&k8s_pod("Running", Some("True"), Some("worker-1")))
            .unwrap();

        assert_eq!(unit.key(), "shop/web-0");
        assert_eq!(unit.uid.as_str(), "0c2f6b9e");
        assert_eq!(unit.phase, PodPhase::Running);
        assert_eq!(unit.node_name, Some(NodeName::new("worker-1").unwrap()));
        let ready = unit.ready.unwrap();
        assert!(ready.status);
        assert!(ready.last_transition.is_some());
    }

    #[test]
    fn converts_unbound_pending_pod() {
        let unit = workload_unit_from_pod(&k8s_pod("Pending", None, Some(""))).unwrap();
        assert_eq!(unit.phase, PodPhase::Pending);
        assert!(unit.node_name.is_none());
        assert!(unit.ready.is_none());
    }

    #[test]
    fn pod_without_uid_is_rejected() {
        let mut pod = k8s_pod("Pending", None, None);
        pod.metadata.uid = None;
        assert!(matches!(
            workload_unit_from_pod(&pod),
            Err(SchedulerError::Core(CoreError::MissingField { .. }))
        ));
    }

    #[test]
    fn converts_node() {
        assert_eq!(
            node_from_k8s(&k8s_node("worker-7")).unwrap().name,
            NodeName::new("worker-7").unwrap()
        );
    }

    fn k8s_node(name: &str) -> K8sNode {
        K8sNode {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn node_lookup_reads_store_directly() {
        let (reader, mut writer) = reflector::store::<K8sNode>();
        writer.apply_watcher_event(&watcher::Event::Apply(k8s_node("worker-1")));
        writer.apply_watcher_event(&watcher::Event::Apply(k8s_node("worker-2")));
        let lister = Reflected::new(reader, "node");
        let worker = NodeName::new("worker-2").unwrap();

        assert!(matches!(
            lister.get(&worker),
            Err(SchedulerError::SnapshotUnavailable(_))
        ));

        lister.synced.store(true, Ordering::Release);
        assert_eq!(lister.get(&worker).unwrap().map(|n| n.name), Some(worker));
        assert!(lister
            .get(&NodeName::new("worker-9").unwrap())
            .unwrap()
            .is_none());
    }

    #[test]
    fn unsynced_cache_is_unavailable() {
        let (reader, mut writer) = reflector::store::<Pod>();
        writer.apply_watcher_event(&watcher::Event::Apply(k8s_pod(
            "Running",
            Some("False"),
            Some("worker-1"),
        )));
        let lister = Reflected::new(reader, "pod");

        assert!(matches!(
            lister.list_pods(),
            Err(SchedulerError::SnapshotUnavailable(_))
        ));

        lister.synced.store(true, Ordering::Release);
        let pods = lister.list_pods().unwrap();
        assert_eq!(pods.len(), 1);
        assert_eq!(pods[0].ready.map(|r| r.status), Some(false));
    }
}
