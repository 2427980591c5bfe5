//! The `LimitAwaitScheduling` permit plugin.
//!
//! Combines the [`AdmissionGate`] used on every scheduling attempt with an
//! owned background [`WaitingPodReleaser`] task.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use limit_await_core::{NodeName, WorkloadUnit};

use crate::capacity::CapacityEstimator;
use crate::config::LimitAwaitArgs;
use crate::framework::{FrameworkHandle, PermitDecision, PermitPlugin};
use crate::gate::AdmissionGate;
use crate::releaser::WaitingPodReleaser;
use crate::Result;

/// Registered name of the plugin.
pub const NAME: &str = "LimitAwaitScheduling";

struct ReleaserTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Caps the number of not-ready pods admitted per node.
///
/// Dropping the plugin without calling `shutdown` drops the shutdown
/// sender, which also stops the releaser.
pub struct LimitAwaitScheduling {
    args: LimitAwaitArgs,
    gate: AdmissionGate,
    releaser: Arc<WaitingPodReleaser>,
    task: Mutex<Option<ReleaserTask>>,
}

impl LimitAwaitScheduling {
    /// Build the plugin without starting its releaser.
    ///
    /// # Errors
    ///
    /// Returns an error if the arguments fail validation.
    pub fn new(args: LimitAwaitArgs, handle: FrameworkHandle) -> Result<Self> {
        args.validate()?;

        let gate = AdmissionGate::new(
            Arc::clone(&handle.nodes),
            args.system_namespace.clone(),
            args.permit_timeout(),
        );
        let waiting = Arc::clone(&handle.waiting);
        let estimator = CapacityEstimator::new(handle, args.parallelism, args.min_ready_seconds);
        let releaser = WaitingPodReleaser::new(estimator, waiting, args.poll_interval(), NAME);

        Ok(Self {
            args,
            gate,
            releaser: Arc::new(releaser),
            task: Mutex::new(None),
        })
    }

    /// Registry factory: decode `args`, build the plugin, and start it.
    ///
    /// # Errors
    ///
    /// Returns an error if the arguments cannot be decoded or are invalid.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn factory(
        args: Option<&serde_json::Value>,
        handle: FrameworkHandle,
    ) -> Result<Box<dyn PermitPlugin>> {
        let plugin = Self::new(LimitAwaitArgs::from_json(args)?, handle)?;
        plugin.start();
        Ok(Box::new(plugin))
    }

    /// Spawn the releaser task. Returns `false` if it is already running.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn start(&self) -> bool {
        let mut task = self.task.lock();
        if task.is_some() {
            return false;
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let releaser = Arc::clone(&self.releaser);
        let handle = tokio::spawn(async move {
            releaser.run(shutdown_rx).await;
        });
        *task = Some(ReleaserTask { shutdown, handle });

        info!(
            parallelism = self.args.parallelism,
            system_namespace = %self.args.system_namespace,
            "Started {NAME} plugin"
        );
        true
    }

    /// Whether the releaser task is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.lock().is_some()
    }

    /// The plugin's arguments.
    #[must_use]
    pub fn args(&self) -> &LimitAwaitArgs {
        &self.args
    }
}

#[async_trait]
impl PermitPlugin for LimitAwaitScheduling {
    fn name(&self) -> &str {
        NAME
    }

    fn permit(&self, pod: &WorkloadUnit, node: &NodeName) -> PermitDecision {
        self.gate.permit(pod, node)
    }

    async fn shutdown(&self) {
        let task = self.task.lock().take();
        let Some(task) = task else {
            return;
        };

        let _ = task.shutdown.send(true);
        if let Err(e) = task.handle.await {
            error!(error = %e, "Releaser task failed");
        }
        info!("Stopped {NAME} plugin");
    }
}
