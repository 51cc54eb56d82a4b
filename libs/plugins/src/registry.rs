//! In-memory Plugin Registry (spec.md §4.C).

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::traits::{Action, Plugin, Trigger};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("plugin '{0}' is already registered")]
    DuplicatePlugin(String),

    #[error("plugin '{0}' is not registered")]
    UnknownPlugin(String),

    #[error("no plugin named '{0}'")]
    PluginNotFound(String),

    #[error("action reference '{0}' is not qualified as '<plugin>.<action>'")]
    UnqualifiedReference(String),

    #[error("no action '{action}' on plugin '{plugin}'")]
    ActionNotFound { plugin: String, action: String },

    #[error("no trigger '{trigger}' on plugin '{plugin}'")]
    TriggerNotFound { plugin: String, trigger: String },
}

/// Splits a qualified reference like `slack.send_message` into its plugin
/// and member halves.
pub fn split_qualified(reference: &str) -> Result<(&str, &str), RegistryError> {
    reference
        .split_once('.')
        .filter(|(plugin, member)| !plugin.is_empty() && !member.is_empty())
        .ok_or_else(|| RegistryError::UnqualifiedReference(reference.to_string()))
}

#[derive(Default)]
struct RegistryInner {
    plugins: HashMap<String, Arc<dyn Plugin>>,
    actions: HashMap<String, Arc<dyn Action>>,
    triggers: HashMap<String, Arc<dyn Trigger>>,
}

/// Holds every loaded plugin and indexes their actions/triggers by
/// qualified name for O(1) lookup during workflow execution.
#[derive(Default, Clone)]
pub struct PluginRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl PluginRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a plugin, indexing its actions and triggers under
    /// `<plugin>.<name>`. Rejects a plugin name already registered.
    pub async fn register(&self, plugin: Arc<dyn Plugin>) -> Result<(), RegistryError> {
        let name = plugin.name().to_string();
        let mut inner = self.inner.write().await;
        if inner.plugins.contains_key(&name) {
            return Err(RegistryError::DuplicatePlugin(name));
        }

        for action in plugin.actions() {
            inner
                .actions
                .insert(format!("{name}.{}", action.name()), action);
        }
        for trigger in plugin.triggers() {
            inner
                .triggers
                .insert(format!("{name}.{}", trigger.name()), trigger);
        }

        plugin.on_load().await;
        info!(plugin = %name, "plugin registered");
        inner.plugins.insert(name, plugin);
        Ok(())
    }

    /// Unloads a plugin and every action/trigger it contributed.
    pub async fn unregister(&self, name: &str) -> Result<(), RegistryError> {
        let mut inner = self.inner.write().await;
        let plugin = inner
            .plugins
            .remove(name)
            .ok_or_else(|| RegistryError::UnknownPlugin(name.to_string()))?;

        let prefix = format!("{name}.");
        inner.actions.retain(|key, _| !key.starts_with(&prefix));
        inner.triggers.retain(|key, _| !key.starts_with(&prefix));

        plugin.on_unload().await;
        warn!(plugin = %name, "plugin unregistered");
        Ok(())
    }

    pub async fn get_plugin(&self, name: &str) -> Result<Arc<dyn Plugin>, RegistryError> {
        self.inner
            .read()
            .await
            .plugins
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::PluginNotFound(name.to_string()))
    }

    /// Resolves a fully-qualified `<plugin>.<action>` reference.
    pub async fn get_action(&self, reference: &str) -> Result<Arc<dyn Action>, RegistryError> {
        let (plugin, action) = split_qualified(reference)?;
        self.inner
            .read()
            .await
            .actions
            .get(reference)
            .cloned()
            .ok_or_else(|| RegistryError::ActionNotFound {
                plugin: plugin.to_string(),
                action: action.to_string(),
            })
    }

    /// Resolves a fully-qualified `<plugin>.<trigger>` reference.
    pub async fn get_trigger(&self, reference: &str) -> Result<Arc<dyn Trigger>, RegistryError> {
        let (plugin, trigger) = split_qualified(reference)?;
        self.inner
            .read()
            .await
            .triggers
            .get(reference)
            .cloned()
            .ok_or_else(|| RegistryError::TriggerNotFound {
                plugin: plugin.to_string(),
                trigger: trigger.to_string(),
            })
    }

    pub async fn list_actions(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.read().await.actions.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn list_triggers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.read().await.triggers.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn list_plugins(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.read().await.plugins.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{ActionContext, ActionError, TeardownFn, TriggerSetupError};
    use async_trait::async_trait;
    use loom_domain::Value;

    struct EchoAction;

    #[async_trait]
    impl Action for EchoAction {
        fn name(&self) -> &str {
            "echo"
        }

        async fn execute(&self, ctx: &ActionContext) -> Result<Value, ActionError> {
            Ok(ctx.config.clone())
        }
    }

    struct NoopTrigger;

    #[async_trait]
    impl Trigger for NoopTrigger {
        fn name(&self) -> &str {
            "tick"
        }

        async fn setup(
            &self,
            _config: Value,
            _emit: crate::traits::EmitFn,
        ) -> Result<TeardownFn, TriggerSetupError> {
            Ok(Box::new(|| Box::pin(async {})))
        }
    }

    struct TestPlugin;

    #[async_trait]
    impl Plugin for TestPlugin {
        fn name(&self) -> &str {
            "test"
        }

        fn version(&self) -> &str {
            "1.0.0"
        }

        fn actions(&self) -> Vec<Arc<dyn Action>> {
            vec![Arc::new(EchoAction)]
        }

        fn triggers(&self) -> Vec<Arc<dyn Trigger>> {
            vec![Arc::new(NoopTrigger)]
        }
    }

    #[tokio::test]
    async fn register_indexes_actions_and_triggers() {
        let registry = PluginRegistry::new();
        registry.register(Arc::new(TestPlugin)).await.unwrap();

        assert!(registry.get_action("test.echo").await.is_ok());
        assert!(registry.get_trigger("test.tick").await.is_ok());
        assert_eq!(registry.list_actions().await, vec!["test.echo"]);
    }

    #[tokio::test]
    async fn duplicate_plugin_name_rejected() {
        let registry = PluginRegistry::new();
        registry.register(Arc::new(TestPlugin)).await.unwrap();
        let err = registry.register(Arc::new(TestPlugin)).await.unwrap_err();
        assert_eq!(err, RegistryError::DuplicatePlugin("test".to_string()));
    }

    #[tokio::test]
    async fn unregister_cascades_to_actions_and_triggers() {
        let registry = PluginRegistry::new();
        registry.register(Arc::new(TestPlugin)).await.unwrap();
        registry.unregister("test").await.unwrap();

        assert!(registry.get_action("test.echo").await.is_err());
        assert!(registry.get_trigger("test.tick").await.is_err());
        assert!(registry.get_plugin("test").await.is_err());
    }

    #[tokio::test]
    async fn unqualified_reference_rejected() {
        let registry = PluginRegistry::new();
        let err = registry.get_action("echo").await.unwrap_err();
        assert_eq!(err, RegistryError::UnqualifiedReference("echo".to_string()));
    }
}
