//! Lifecycle event channel (spec §4.E, §6).
//!
//! Two delivery mechanisms share the same event shape: synchronous named
//! listeners (the contract the spec describes — registration order,
//! swallowed listener panics) and an additive `tokio::sync::broadcast`
//! stream for async subscribers such as a gateway.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use loom_domain::{RunId, Value};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::warn;

/// The event names the executor emits, per spec §4.E.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventName {
    WorkflowStarted,
    WorkflowCompleted,
    WorkflowFailed,
    StepStarted,
    StepCompleted,
    StepFailed,
}

impl EventName {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WorkflowStarted => "workflow.started",
            Self::WorkflowCompleted => "workflow.completed",
            Self::WorkflowFailed => "workflow.failed",
            Self::StepStarted => "step.started",
            Self::StepCompleted => "step.completed",
            Self::StepFailed => "step.failed",
        }
    }
}

/// Payload carried by every lifecycle event (spec §4.E).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub name: EventName,
    pub run_id: RunId,
    pub workflow_name: String,
    pub step_id: Option<String>,
    pub status: Option<String>,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

type Listener = Box<dyn Fn(&LifecycleEvent) + Send + Sync>;

/// Fans a run's lifecycle events out to synchronous listeners (in
/// registration order, per-event; a panicking listener is caught and
/// logged, never propagated — spec §4.E) and to an async broadcast
/// stream for subscribers that want a `Stream`/`Receiver` instead.
pub struct EventBus {
    listeners: Mutex<HashMap<EventName, Vec<Listener>>>,
    broadcast: broadcast::Sender<LifecycleEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        let (broadcast, _rx) = broadcast::channel(1024);
        Self {
            listeners: Mutex::new(HashMap::new()),
            broadcast,
        }
    }
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for one event name. Listeners for the same
    /// name run in registration order (spec §5 "Ordering guarantees").
    pub fn on(&self, name: EventName, listener: impl Fn(&LifecycleEvent) + Send + Sync + 'static) {
        self.listeners
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .entry(name)
            .or_default()
            .push(Box::new(listener));
    }

    /// Subscribe to every lifecycle event as an async stream.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.broadcast.subscribe()
    }

    /// Emit an event: synchronous listeners run first (in order), then
    /// the event is broadcast. A listener panic is caught and logged;
    /// it never aborts the run or later listeners.
    pub fn emit(&self, event: LifecycleEvent) {
        let listeners = self
            .listeners
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(handlers) = listeners.get(&event.name) {
            for handler in handlers {
                if let Err(panic) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    handler(&event);
                })) {
                    warn!(?panic, event = event.name.as_str(), "lifecycle listener panicked");
                }
            }
        }
        drop(listeners);

        // No subscribers is expected and not an error.
        let _ = self.broadcast.send(event);
    }
}

impl LifecycleEvent {
    #[must_use]
    pub fn workflow(name: EventName, run_id: RunId, workflow_name: impl Into<String>) -> Self {
        Self {
            name,
            run_id,
            workflow_name: workflow_name.into(),
            step_id: None,
            status: None,
            output: None,
            error: None,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn step(
        name: EventName,
        run_id: RunId,
        workflow_name: impl Into<String>,
        step_id: impl Into<String>,
    ) -> Self {
        Self {
            name,
            run_id,
            workflow_name: workflow_name.into(),
            step_id: Some(step_id.into()),
            status: None,
            output: None,
            error: None,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    #[must_use]
    pub fn with_output(mut self, output: Value) -> Self {
        self.output = Some(output);
        self
    }

    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listeners_run_in_registration_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let o1 = Arc::clone(&order);
        bus.on(EventName::StepStarted, move |_| o1.lock().unwrap().push(1));
        let o2 = Arc::clone(&order);
        bus.on(EventName::StepStarted, move |_| o2.lock().unwrap().push(2));

        bus.emit(LifecycleEvent::step(
            EventName::StepStarted,
            RunId::new(),
            "wf",
            "s1",
        ));

        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn panicking_listener_is_caught() {
        let bus = EventBus::new();
        bus.on(EventName::StepFailed, |_| panic!("boom"));
        bus.emit(LifecycleEvent::step(
            EventName::StepFailed,
            RunId::new(),
            "wf",
            "s1",
        ));
        // Reaching here means the panic didn't propagate.
    }

    #[tokio::test]
    async fn broadcast_subscribers_receive_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.emit(LifecycleEvent::workflow(
            EventName::WorkflowStarted,
            RunId::new(),
            "wf",
        ));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.name, EventName::WorkflowStarted);
    }
}
