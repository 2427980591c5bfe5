//! In-memory waiting-pod registry.
//!
//! This is the framework side of the permit phase: a pod that receives a
//! `Wait` decision is parked here until a plugin allows or rejects it, its
//! timeout elapses, or its waiter is dropped. The hosting binary and the tests use it as the
//! [`WaitingRegistry`] handed to plugins.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{debug, info};

use limit_await_core::{NodeName, PodUid, WorkloadUnit};

use crate::framework::{Clock, SystemClock, WaitingRegistry, WaitingUnit};

/// How a parked pod left the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WaitOutcome {
    /// A plugin let the pod proceed.
    Allowed {
        /// Plugin that allowed the pod.
        by: String,
    },
    /// A plugin failed the attempt, or the entry was superseded.
    Rejected {
        /// Plugin that rejected the pod.
        by: String,
        /// Reason given.
        message: String,
    },
    /// The wait timed out.
    TimedOut,
}

struct Entry {
    unit: WaitingUnit,
    seq: u64,
    tx: oneshot::Sender<WaitOutcome>,
}

type Entries = Arc<Mutex<HashMap<PodUid, Entry>>>;

/// Registry of pods parked in the permit phase.
pub struct WaitingPodMap {
    entries: Entries,
    next_seq: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl Default for WaitingPodMap {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitingPodMap {
    /// Create an empty registry using the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty registry with the given time source for timestamps.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            next_seq: AtomicU64::new(0),
            clock,
        }
    }

    /// Park a pod against `node` for at most `timeout`.
    ///
    /// Parking a pod that is already waiting replaces the old entry; its
    /// waiter resolves as rejected.
    pub fn park(&self, pod: WorkloadUnit, node: NodeName, timeout: Duration) -> WaitHandle {
        let (tx, rx) = oneshot::channel();
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let enqueued_at = self.clock.now();
        let deadline = TimeDelta::from_std(timeout)
            .ok()
            .and_then(|d| enqueued_at.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let uid = pod.uid.clone();

        debug!(
            pod = %pod.key(),
            node = %node,
            timeout_secs = timeout.as_secs(),
            "Parked pod in permit phase"
        );

        let unit = WaitingUnit {
            pod,
            node,
            enqueued_at,
            deadline,
        };
        self.entries.lock().insert(uid.clone(), Entry { unit, seq, tx });

        WaitHandle {
            uid,
            seq,
            timeout,
            rx,
            entries: Arc::clone(&self.entries),
        }
    }

    /// Number of pods currently waiting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Check if no pods are waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Reject every waiting pod, e.g. on shutdown. Returns how many were rejected.
    pub fn reject_all(&self, by: &str, message: &str) -> usize {
        let drained: Vec<Entry> = self.entries.lock().drain().map(|(_, e)| e).collect();
        let count = drained.len();
        for entry in drained {
            let _ = entry.tx.send(WaitOutcome::Rejected {
                by: by.to_string(),
                message: message.to_string(),
            });
        }
        if count > 0 {
            info!(count, by, message, "Rejected all waiting pods");
        }
        count
    }

    fn resolve(&self, uid: &PodUid, outcome: WaitOutcome) -> bool {
        let Some(entry) = self.entries.lock().remove(uid) else {
            return false;
        };
        // The waiter may have gone away; the entry is removed either way.
        let _ = entry.tx.send(outcome);
        true
    }
}

impl WaitingRegistry for WaitingPodMap {
    fn waiting_units(&self) -> Vec<WaitingUnit> {
        self.entries
            .lock()
            .values()
            .map(|e| e.unit.clone())
            .collect()
    }

    fn is_waiting(&self, uid: &PodUid) -> bool {
        self.entries.lock().contains_key(uid)
    }

    fn allow(&self, uid: &PodUid, plugin: &str) -> bool {
        let allowed = self.resolve(
            uid,
            WaitOutcome::Allowed {
                by: plugin.to_string(),
            },
        );
        if allowed {
            info!(uid = %uid, plugin, "Waiting pod allowed");
        }
        allowed
    }

    fn reject(&self, uid: &PodUid, plugin: &str, message: &str) -> bool {
        let rejected = self.resolve(
            uid,
            WaitOutcome::Rejected {
                by: plugin.to_string(),
                message: message.to_string(),
            },
        );
        if rejected {
            info!(uid = %uid, plugin, message, "Waiting pod rejected");
        }
        rejected
    }
}

/// The waiter's side of a parked pod.
pub struct WaitHandle {
    uid: PodUid,
    seq: u64,
    timeout: Duration,
    rx: oneshot::Receiver<WaitOutcome>,
    entries: Entries,
}

impl WaitHandle {
    /// UID of the parked pod.
    #[must_use]
    pub fn uid(&self) -> &PodUid {
        &self.uid
    }

    /// Wait until the pod is allowed, rejected, or times out.
    pub async fn wait(mut self) -> WaitOutcome {
        match tokio::time::timeout(self.timeout, &mut self.rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => WaitOutcome::Rejected {
                by: "framework".to_string(),
                message: "superseded by a newer permit attempt".to_string(),
            },
            Err(_) => {
                let removed = {
                    let mut entries = self.entries.lock();
                    if entries.get(&self.uid).is_some_and(|e| e.seq == self.seq) {
                        entries.remove(&self.uid);
                        true
                    } else {
                        false
                    }
                };
                if removed {
                    info!(uid = %self.uid, "Waiting pod timed out");
                    return WaitOutcome::TimedOut;
                }
                // Resolved concurrently with the timeout firing.
                self.rx.try_recv().unwrap_or(WaitOutcome::TimedOut)
            }
        }
    }
}

impl Drop for WaitHandle {
    /// An abandoned waiter takes its entry with it, unless a newer attempt
    /// for the same pod replaced it.
    fn drop(&mut self) {
        let mut entries = self.entries.lock();
        if entries.get(&self.uid).is_some_and(|e| e.seq == self.seq) {
            entries.remove(&self.uid);
            debug!(uid = %self.uid, "Waiter dropped, removed pod from registry");
        }
    }
}
