//! Named plugin factories, resolved once at startup.

use std::collections::BTreeMap;

use crate::framework::{FrameworkHandle, PermitPlugin};
use crate::plugin::{self, LimitAwaitScheduling};
use crate::{Result, SchedulerError};

/// Builds a plugin from its JSON arguments and the framework handle.
pub type PluginFactory =
    fn(Option<&serde_json::Value>, FrameworkHandle) -> Result<Box<dyn PermitPlugin>>;

/// A table of plugin names to factories.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    factories: BTreeMap<String, PluginFactory>,
}

impl PluginRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every plugin in this crate.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(plugin::NAME, LimitAwaitScheduling::factory);
        registry
    }

    /// Register `factory` under `name`, replacing any previous entry.
    pub fn register(&mut self, name: impl Into<String>, factory: PluginFactory) {
        self.factories.insert(name.into(), factory);
    }

    /// Registered plugin names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Build the plugin registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownPlugin` if nothing is registered under `name`, or the
    /// factory's own error.
    pub fn build(
        &self,
        name: &str,
        args: Option<&serde_json::Value>,
        handle: FrameworkHandle,
    ) -> Result<Box<dyn PermitPlugin>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| SchedulerError::UnknownPlugin(name.to_string()))?;
        factory(args, handle)
    }
}
