//! The Plugin contract (spec.md §6): what the core requires of any
//! plugin, independent of which integration it implements.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use loom_domain::{RunId, Value};
use thiserror::Error;

/// A callback a trigger invokes, any number of times, from any thread,
/// until its paired teardown returns (spec.md §6).
pub type EmitFn = Arc<dyn Fn(Value) + Send + Sync>;

/// A one-shot teardown returned by `Trigger::setup`. Async because
/// tearing down a socket/poller/watch may itself require I/O.
pub type TeardownFn = Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

/// Errors an action's `execute` may raise (spec.md §7: `ActionError`).
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ActionError(pub String);

impl ActionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Errors a trigger's `setup` may raise (spec.md §7: `TriggerSetupError`).
#[derive(Debug, Error)]
#[error("{0}")]
pub struct TriggerSetupError(pub String);

impl TriggerSetupError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Context passed to an action's `execute` (spec.md §4.E).
#[derive(Clone)]
pub struct ActionContext {
    pub workflow_name: String,
    pub run_id: RunId,
    pub step_id: String,
    /// Materialized (already-interpolated) step config.
    pub config: Value,
    pub trigger: Value,
    /// Snapshot of completed dependency outputs at dispatch time.
    pub steps: HashMap<String, Value>,
    /// Merged process environment + `workflow.env`.
    pub env: HashMap<String, String>,
    /// Log sink tagged with run/step identifiers by the executor.
    pub log: Arc<dyn Fn(&str) + Send + Sync>,
}

impl ActionContext {
    pub fn log(&self, message: impl AsRef<str>) {
        (self.log)(message.as_ref());
    }
}

impl std::fmt::Debug for ActionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionContext")
            .field("workflow_name", &self.workflow_name)
            .field("run_id", &self.run_id)
            .field("step_id", &self.step_id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// A callable unit contributed by a plugin, identified by `<plugin>.<name>`.
#[async_trait]
pub trait Action: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> Option<&str> {
        None
    }

    /// Optional JSON Schema the materialized config must satisfy before
    /// `execute` is called (spec.md §4.E step 4).
    fn schema(&self) -> Option<&serde_json::Value> {
        None
    }

    async fn execute(&self, ctx: &ActionContext) -> Result<Value, ActionError>;
}

/// A long-lived subscription contributed by a plugin that emits events.
#[async_trait]
pub trait Trigger: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> Option<&str> {
        None
    }

    fn schema(&self) -> Option<&serde_json::Value> {
        None
    }

    /// Install whatever long-running resource backs this trigger (poll,
    /// socket, watch) and return a teardown. `emit` may be called from
    /// any thread for as long as the subscription is alive.
    async fn setup(&self, config: Value, emit: EmitFn) -> Result<TeardownFn, TriggerSetupError>;
}

/// A named collection of actions and triggers, with optional process-wide
/// lifecycle hooks.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    fn description(&self) -> Option<&str> {
        None
    }

    fn actions(&self) -> Vec<Arc<dyn Action>> {
        Vec::new()
    }

    fn triggers(&self) -> Vec<Arc<dyn Trigger>> {
        Vec::new()
    }

    async fn on_load(&self) {}

    async fn on_unload(&self) {}
}
