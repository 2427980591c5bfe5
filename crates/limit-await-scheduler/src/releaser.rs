//! Background release of waiting pods.
//!
//! Runs the capacity reconciliation loop on a fixed interval: each tick
//! recomputes free slots per node and allows waiting pods while their node
//! still has room.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

use crate::capacity::CapacityEstimator;
use crate::framework::WaitingRegistry;
use crate::Result;

/// Counters for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReleaseStats {
    /// Pods found waiting at the start of the tick.
    pub waiting: usize,
    /// Pods allowed during the tick.
    pub released: usize,
}

/// Releases waiting pods as node capacity frees up.
pub struct WaitingPodReleaser {
    estimator: CapacityEstimator,
    registry: Arc<dyn WaitingRegistry>,
    interval: Duration,
    plugin_name: String,
}

impl WaitingPodReleaser {
    /// Create a releaser that ticks every `interval` and allows pods on
    /// behalf of `plugin_name`.
    #[must_use]
    pub fn new(
        estimator: CapacityEstimator,
        registry: Arc<dyn WaitingRegistry>,
        interval: Duration,
        plugin_name: impl Into<String>,
    ) -> Self {
        Self {
            estimator,
            registry,
            interval,
            plugin_name: plugin_name.into(),
        }
    }

    /// Run until `shutdown` flips to `true` or its sender is dropped.
    #[instrument(skip(self, shutdown), fields(plugin = %self.plugin_name))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_ms = self.interval.as_millis(),
            parallelism = self.estimator.parallelism(),
            "Starting waiting pod releaser"
        );

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; wait a full interval instead.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.tick() {
                        Ok(stats) if stats.released > 0 => {
                            info!(
                                waiting = stats.waiting,
                                released = stats.released,
                                "Released waiting pods"
                            );
                        }
                        Ok(stats) => {
                            debug!(waiting = stats.waiting, "No waiting pods released");
                        }
                        Err(e) => {
                            warn!(error = %e, "Skipping release tick");
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Waiting pod releaser shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Run a single release pass.
    ///
    /// Waiting pods are considered earliest-enqueued first, ties broken by
    /// UID. A pod is allowed only while its node has a free slot, and each
    /// release consumes one slot for the rest of the tick.
    ///
    /// # Errors
    ///
    /// Returns an error if capacity could not be estimated; nothing is
    /// released in that case.
    pub fn tick(&self) -> Result<ReleaseStats> {
        let mut capacity = self.estimator.free_slots()?;

        let mut waiting = self.registry.waiting_units();
        waiting.sort_by(|a, b| {
            a.enqueued_at
                .cmp(&b.enqueued_at)
                .then_with(|| a.pod.uid.cmp(&b.pod.uid))
        });

        let mut stats = ReleaseStats {
            waiting: waiting.len(),
            released: 0,
        };

        for unit in &waiting {
            if capacity.get(&unit.node).unwrap_or(0) == 0 {
                continue;
            }
            if !self.registry.allow(&unit.pod.uid, &self.plugin_name) {
                debug!(pod = %unit.pod.key(), "Pod left the waiting registry before release");
                continue;
            }
            capacity.try_take(&unit.node);
            stats.released += 1;
            info!(
                pod = %unit.pod.key(),
                node = %unit.node,
                free_slots = capacity.get(&unit.node).unwrap_or(0),
                "Released waiting pod"
            );
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::{Clock, FrameworkHandle};
    use crate::mock::{FixedClock, MockCluster};
    use crate::waiting::{WaitHandle, WaitOutcome, WaitingPodMap};
    use chrono::{TimeDelta, Utc};
    use limit_await_core::{NodeName, PodPhase, PodUid, ReadyCondition, WorkloadUnit};

    const PLUGIN: &str = "LimitAwaitScheduling";

    fn worker(n: u8) -> NodeName {
        NodeName::new(format!("worker-{n}")).unwrap()
    }

    fn pod(uid: &str, phase: PodPhase, node: &NodeName) -> WorkloadUnit {
        WorkloadUnit::new(PodUid::new(uid).unwrap(), uid, "default")
            .with_phase(phase)
            .with_node(node.clone())
    }

    struct Fixture {
        cluster: Arc<MockCluster>,
        waiting: Arc<WaitingPodMap>,
        clock: Arc<FixedClock>,
        releaser: WaitingPodReleaser,
    }

    fn fixture(parallelism: u32) -> Fixture {
        let cluster = Arc::new(MockCluster::new());
        cluster.add_node(&worker(1));
        cluster.add_node(&worker(2));
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let waiting = Arc::new(WaitingPodMap::with_clock(clock.clone()));
        let handle = FrameworkHandle::new(cluster.clone(), cluster.clone(), waiting.clone())
            .with_clock(clock.clone());
        let releaser = WaitingPodReleaser::new(
            CapacityEstimator::new(handle, parallelism, 0),
            waiting.clone(),
            Duration::from_secs(15),
            PLUGIN,
        );
        Fixture {
            cluster,
            waiting,
            clock,
            releaser,
        }
    }

    fn park(fx: &Fixture, uid: &str, node: &NodeName) -> WaitHandle {
        fx.waiting.park(
            pod(uid, PodPhase::Pending, node),
            node.clone(),
            Duration::from_secs(600),
        )
    }

    #[test]
    fn releases_until_node_is_full() {
        let fx = fixture(2);
        fx.cluster.upsert_pod(pod("running", PodPhase::Running, &worker(1)));
        let _a = park(&fx, "a", &worker(1));
        let _b = park(&fx, "b", &worker(1));

        let stats = fx.releaser.tick().unwrap();

        assert_eq!(stats, ReleaseStats { waiting: 2, released: 1 });
        assert_eq!(fx.waiting.len(), 1);
    }

    #[test]
    fn earliest_enqueued_wins_last_slot() {
        let fx = fixture(1);
        let start = Utc::now();
        fx.clock.set(start);
        let _late = park(&fx, "a-late", &worker(1));
        fx.clock.set(start - TimeDelta::seconds(30));
        let _early = park(&fx, "z-early", &worker(1));

        fx.releaser.tick().unwrap();

        assert!(fx.waiting.is_waiting(&PodUid::new("a-late").unwrap()));
        assert!(!fx.waiting.is_waiting(&PodUid::new("z-early").unwrap()));
    }

    #[test]
    fn full_node_keeps_pods_waiting_across_ticks() {
        let fx = fixture(1);
        fx.cluster.upsert_pod(pod("starting", PodPhase::Running, &worker(1)));
        let _parked = park(&fx, "p", &worker(1));

        for _ in 0..3 {
            assert_eq!(fx.releaser.tick().unwrap().released, 0);
        }
        assert_eq!(fx.waiting.len(), 1);

        // The occupying pod becomes ready: the next tick releases.
        fx.cluster.upsert_pod(
            pod("starting", PodPhase::Running, &worker(1))
                .with_ready(ReadyCondition::ready_since(fx.clock.now())),
        );
        assert_eq!(fx.releaser.tick().unwrap().released, 1);
        assert!(fx.waiting.is_empty());
    }

    #[test]
    fn unknown_node_keeps_pod_waiting() {
        let fx = fixture(4);
        let _parked = park(&fx, "p", &worker(9));

        assert_eq!(fx.releaser.tick().unwrap().released, 0);
        assert_eq!(fx.waiting.len(), 1);
    }

    #[test]
    fn node_removed_between_ticks_keeps_pod_waiting() {
        let fx = fixture(1);
        fx.cluster.upsert_pod(pod("starting", PodPhase::Pending, &worker(2)));
        let _parked = park(&fx, "p", &worker(2));
        assert_eq!(fx.releaser.tick().unwrap().released, 0);

        fx.cluster.remove_node(&worker(2));
        assert_eq!(
            fx.releaser.tick().unwrap(),
            ReleaseStats {
                waiting: 1,
                released: 0
            }
        );
        assert_eq!(fx.waiting.len(), 1);
    }

    #[test]
    fn capacity_is_tracked_per_node() {
        let fx = fixture(1);
        let _a = park(&fx, "a", &worker(1));
        let _b = park(&fx, "b", &worker(1));
        let _c = park(&fx, "c", &worker(2));

        assert_eq!(fx.releaser.tick().unwrap().released, 2);
        assert_eq!(fx.waiting.len(), 1);
    }

    #[test]
    fn released_pod_occupies_on_next_tick() {
        let fx = fixture(4);
        let parked = pod("parked", PodPhase::Pending, &worker(1));
        fx.cluster.upsert_pod(parked.clone());
        fx.cluster.upsert_pod(pod("starting", PodPhase::Running, &worker(1)));
        let _handle = fx.waiting.park(parked.clone(), worker(1), Duration::from_secs(600));

        let estimator = &fx.releaser.estimator;
        assert_eq!(estimator.free_slots().unwrap().get(&worker(1)), Some(3));

        assert_eq!(fx.releaser.tick().unwrap().released, 1);
        fx.cluster.upsert_pod(parked.with_phase(PodPhase::Running));

        assert_eq!(estimator.free_slots().unwrap().get(&worker(1)), Some(2));
    }

    #[test]
    fn snapshot_failure_releases_nothing() {
        let fx = fixture(4);
        let _parked = park(&fx, "p", &worker(1));
        fx.cluster.set_failing(true);

        assert!(fx.releaser.tick().is_err());
        assert_eq!(fx.waiting.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn loop_skips_failed_ticks_and_stops_on_shutdown() {
        let fx = fixture(4);
        let handle = park(&fx, "p", &worker(1));
        fx.cluster.set_failing(true);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let releaser = Arc::new(fx.releaser);
        let task = tokio::spawn({
            let releaser = Arc::clone(&releaser);
            async move { releaser.run(shutdown_rx).await }
        });

        tokio::time::sleep(Duration::from_secs(40)).await;
        assert_eq!(fx.waiting.len(), 1);

        fx.cluster.set_failing(false);
        assert_eq!(
            handle.wait().await,
            WaitOutcome::Allowed {
                by: PLUGIN.to_string()
            }
        );

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }
}
