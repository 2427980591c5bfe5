//! Plugin configuration.
//!
//! The plugin accepts its arguments as a JSON object at construction time
//! (the way scheduler profiles pass plugin args) or from environment
//! variables when hosted by the bundled binary.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Result, SchedulerError};

/// Arguments for the `LimitAwaitScheduling` plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitAwaitArgs {
    /// Maximum number of not-ready pods admitted per node.
    #[serde(default = "LimitAwaitArgs::default_parallelism")]
    pub parallelism: u32,

    /// Interval between capacity reconciliation ticks, in milliseconds.
    #[serde(default = "LimitAwaitArgs::default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// How long a pod may wait in the permit phase, in seconds.
    #[serde(default = "LimitAwaitArgs::default_permit_timeout")]
    pub permit_timeout_seconds: u64,

    /// Pods in this namespace bypass admission control.
    #[serde(default = "LimitAwaitArgs::default_system_namespace")]
    pub system_namespace: String,

    /// Seconds a pod must have been ready before it stops occupying a slot.
    #[serde(default)]
    pub min_ready_seconds: u32,
}

impl LimitAwaitArgs {
    const fn default_parallelism() -> u32 {
        4
    }

    const fn default_poll_interval_ms() -> u64 {
        15_000
    }

    const fn default_permit_timeout() -> u64 {
        600 // 10 minutes
    }

    fn default_system_namespace() -> String {
        "kube-system".to_string()
    }

    /// Decode plugin arguments, falling back to defaults when none are given.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON does not match the argument schema or
    /// the decoded values fail validation.
    pub fn from_json(args: Option<&serde_json::Value>) -> Result<Self> {
        let args = match args {
            Some(value) => serde_json::from_value(value.clone())?,
            None => Self::default(),
        };
        args.validate()?;
        Ok(args)
    }

    /// Load configuration from environment variables.
    ///
    /// Supported environment variables:
    /// - `LIMIT_AWAIT_PARALLELISM`: Per-node cap on not-ready pods
    /// - `LIMIT_AWAIT_POLL_INTERVAL_MS`: Reconciliation interval
    /// - `LIMIT_AWAIT_PERMIT_TIMEOUT_SECONDS`: Permit wait timeout
    /// - `LIMIT_AWAIT_SYSTEM_NAMESPACE`: Namespace exempt from admission control
    /// - `LIMIT_AWAIT_MIN_READY_SECONDS`: Readiness stabilization window
    ///
    /// Values that fail to parse keep their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(n) = lookup("LIMIT_AWAIT_PARALLELISM").and_then(|v| v.parse().ok()) {
            config.parallelism = n;
        }
        if let Some(n) = lookup("LIMIT_AWAIT_POLL_INTERVAL_MS").and_then(|v| v.parse().ok()) {
            config.poll_interval_ms = n;
        }
        if let Some(n) = lookup("LIMIT_AWAIT_PERMIT_TIMEOUT_SECONDS").and_then(|v| v.parse().ok())
        {
            config.permit_timeout_seconds = n;
        }
        if let Some(val) = lookup("LIMIT_AWAIT_SYSTEM_NAMESPACE") {
            config.system_namespace = val;
        }
        if let Some(n) = lookup("LIMIT_AWAIT_MIN_READY_SECONDS").and_then(|v| v.parse().ok()) {
            config.min_ready_seconds = n;
        }

        config
    }

    /// Validate the argument values.
    ///
    /// # Errors
    ///
    /// Returns an error if parallelism, the poll interval, or the permit
    /// timeout is zero.
    pub fn validate(&self) -> Result<()> {
        if self.parallelism == 0 {
            return Err(SchedulerError::Config(
                "parallelism must be at least 1".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(SchedulerError::Config(
                "pollIntervalMs must be positive".to_string(),
            ));
        }
        if self.permit_timeout_seconds == 0 {
            return Err(SchedulerError::Config(
                "permitTimeoutSeconds must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Get the poll interval as a `Duration`.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Get the permit timeout as a `Duration`.
    #[must_use]
    pub const fn permit_timeout(&self) -> Duration {
        Duration::from_secs(self.permit_timeout_seconds)
    }
}

impl Default for LimitAwaitArgs {
    fn default() -> Self {
        Self {
            parallelism: Self::default_parallelism(),
            poll_interval_ms: Self::default_poll_interval_ms(),
            permit_timeout_seconds: Self::default_permit_timeout(),
            system_namespace: Self::default_system_namespace(),
            min_ready_seconds: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config() {
        let config = LimitAwaitArgs::default();
        assert_eq!(config.parallelism, 4);
        assert_eq!(config.poll_interval(), Duration::from_secs(15));
        assert_eq!(config.permit_timeout(), Duration::from_secs(600));
        assert_eq!(config.system_namespace, "kube-system");
        assert_eq!(config.min_ready_seconds, 0);
    }

    #[test]
    fn from_json_fills_defaults() {
        let value = serde_json::json!({ "parallelism": 2, "minReadySeconds": 30 });
        let config = LimitAwaitArgs::from_json(Some(&value)).unwrap();
        assert_eq!(config.parallelism, 2);
        assert_eq!(config.min_ready_seconds, 30);
        assert_eq!(config.poll_interval_ms, 15_000);

        assert_eq!(
            LimitAwaitArgs::from_json(None).unwrap(),
            LimitAwaitArgs::default()
        );
    }

    #[test]
    fn from_json_rejects_bad_args() {
        let wrong_type = serde_json::json!({ "parallelism": "four" });
        assert!(matches!(
            LimitAwaitArgs::from_json(Some(&wrong_type)),
            Err(SchedulerError::InvalidArgs(_))
        ));

        let zero = serde_json::json!({ "parallelism": 0 });
        assert!(matches!(
            LimitAwaitArgs::from_json(Some(&zero)),
            Err(SchedulerError::Config(_))
        ));
    }

    #[test]
    fn from_lookup_overrides_and_ignores_garbage() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("LIMIT_AWAIT_PARALLELISM", "8"),
            ("LIMIT_AWAIT_POLL_INTERVAL_MS", "not-a-number"),
            ("LIMIT_AWAIT_SYSTEM_NAMESPACE", "platform"),
        ]);
        let config = LimitAwaitArgs::from_lookup(|k| env.get(k).map(ToString::to_string));

        assert_eq!(config.parallelism, 8);
        assert_eq!(config.poll_interval_ms, 15_000);
        assert_eq!(config.system_namespace, "platform");
    }
}
