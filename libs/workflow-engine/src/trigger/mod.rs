//! Trigger Manager (spec §4.F): owns the `workflowName -> TriggerSubscription`
//! map and an independent `serviceName -> status` aggregate, installs and
//! tears down trigger subscriptions, filters incoming events, and dispatches
//! accepted events to an injected executor callback.

mod filter;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use loom_domain::{RunId, RunStatus, SubscriptionStatus, Value};
use loom_plugins::{PluginRegistry, TeardownFn};
use tracing::{error, info, instrument, warn};

use crate::config::WorkflowConfig;
use crate::parser::parse_workflow;
use crate::state::TriggerSubscription;

pub use filter::EventFilters;

/// Invoked once per accepted event with the freshly re-parsed workflow, the
/// trigger payload, and a fresh run id (spec §4.F "Dispatch"). Returning a
/// boxed future (rather than an `async fn` in a trait) mirrors the shape of
/// `loom_plugins::TeardownFn`.
pub type DispatchFn =
    Arc<dyn Fn(WorkflowConfig, Value, RunId) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Invoked when a dispatch can't proceed (the workflow source failed to
/// re-parse) so the host still observes a terminal outcome for the run it
/// was told about (spec §4.F: `onWorkflowCompleted(workflowName, runId,
/// 'failed')`).
pub type OnCompletedFn = Arc<dyn Fn(String, RunId, RunStatus) + Send + Sync>;

struct Subscription {
    state: TriggerSubscription,
    filters: EventFilters,
    teardown: Option<TeardownFn>,
}

struct ServiceAggregate {
    status: SubscriptionStatus,
    error: Option<String>,
}

fn service_name(trigger_type: &str) -> &str {
    trigger_type.split('.').next().unwrap_or(trigger_type)
}

/// Owns trigger subscriptions for every registered workflow. One manager
/// typically lives for the process lifetime of the host.
pub struct TriggerManager {
    registry: PluginRegistry,
    dispatch: DispatchFn,
    on_completed: OnCompletedFn,
    subscriptions: tokio::sync::Mutex<HashMap<String, Subscription>>,
    services: tokio::sync::Mutex<HashMap<String, ServiceAggregate>>,
}

impl TriggerManager {
    #[must_use]
    pub fn new(registry: PluginRegistry, dispatch: DispatchFn, on_completed: OnCompletedFn) -> Self {
        Self {
            registry,
            dispatch,
            on_completed,
            subscriptions: tokio::sync::Mutex::new(HashMap::new()),
            services: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Install a trigger subscription for `workflow_name`. `workflow_source`
    /// is the raw document text, kept around so each dispatch can re-parse a
    /// fresh authoritative view of it (spec §4.F "Dispatch"). Returns `false`
    /// without side effects when `trigger_type` isn't a registered trigger;
    /// a `setup` failure is recorded as subscription/service state, not
    /// surfaced as an error to the caller (spec §4.F step 1, step 4).
    #[instrument(skip_all)]
    pub async fn setup_trigger(
        &self,
        workflow_name: impl Into<String>,
        trigger_type: impl Into<String>,
        config: Value,
        workflow_source: impl Into<String>,
    ) -> bool {
        let workflow_name = workflow_name.into();
        let trigger_type = trigger_type.into();
        let workflow_source = workflow_source.into();

        let Ok(trigger) = self.registry.get_trigger(&trigger_type).await else {
            return false;
        };

        let service = service_name(&trigger_type).to_string();
        self.mark_service(&service, SubscriptionStatus::Connecting, None).await;

        let filters = EventFilters::compile(&config);
        let emit = self.build_emit(workflow_name.clone(), workflow_source, filters.clone());

        match trigger.setup(config.clone(), emit).await {
            Ok(teardown) => {
                let mut state = TriggerSubscription::connecting(workflow_name.clone(), trigger_type, config);
                state.mark_connected();
                self.subscriptions.lock().await.insert(
                    workflow_name.clone(),
                    Subscription { state, filters, teardown: Some(teardown) },
                );
                self.mark_service(&service, SubscriptionStatus::Connected, None).await;
                info!(%workflow_name, service = %service, "trigger subscription connected");
            }
            Err(e) => {
                let mut state = TriggerSubscription::connecting(workflow_name.clone(), trigger_type, config);
                state.mark_error(e.0.clone());
                self.subscriptions.lock().await.insert(
                    workflow_name.clone(),
                    Subscription { state, filters, teardown: None },
                );
                self.mark_service(&service, SubscriptionStatus::Error, Some(e.0.clone())).await;
                warn!(%workflow_name, service = %service, error = %e.0, "trigger setup failed");
            }
        }

        true
    }

    /// Builds the `emit` closure handed to `Trigger::setup`: apply the
    /// subscription's filters, then — on acceptance — re-parse the workflow
    /// source and hand it to the dispatch callback with a fresh run id.
    fn build_emit(
        &self,
        workflow_name: String,
        workflow_source: String,
        filters: EventFilters,
    ) -> loom_plugins::EmitFn {
        let dispatch = Arc::clone(&self.dispatch);
        let on_completed = Arc::clone(&self.on_completed);

        Arc::new(move |payload: Value| {
            if !filters.matches(&payload) {
                return;
            }

            let dispatch = Arc::clone(&dispatch);
            let on_completed = Arc::clone(&on_completed);
            let workflow_name = workflow_name.clone();
            let workflow_source = workflow_source.clone();

            tokio::spawn(async move {
                let run_id = RunId::new();
                match parse_workflow(&workflow_source) {
                    Ok(config) => dispatch(config, payload, run_id).await,
                    Err(e) => {
                        error!(%workflow_name, error = %e, "trigger dispatch failed to re-parse workflow");
                        on_completed(workflow_name, run_id, RunStatus::Failed);
                    }
                }
            });
        })
    }

    /// Tear down `workflow_name`'s subscription, if any. The stored teardown
    /// is invoked exactly once (spec §3 invariant 6); if no other
    /// subscription shares the trigger's service, the service is marked
    /// `disconnected`.
    #[instrument(skip(self), fields(%workflow_name))]
    pub async fn stop_trigger(&self, workflow_name: &str) {
        let removed = self.subscriptions.lock().await.remove(workflow_name);
        let Some(mut subscription) = removed else {
            return;
        };

        if let Some(teardown) = subscription.teardown.take() {
            teardown().await;
        }

        let service = service_name(&subscription.state.trigger_type).to_string();
        let still_in_use = self
            .subscriptions
            .lock()
            .await
            .values()
            .any(|s| service_name(&s.state.trigger_type) == service);

        if !still_in_use {
            let mut services = self.services.lock().await;
            services.remove(&service);
        }
    }

    /// Tear down every subscription and clear all service state.
    pub async fn stop_all(&self) {
        let names: Vec<String> = self.subscriptions.lock().await.keys().cloned().collect();
        for name in names {
            self.stop_trigger(&name).await;
        }
        self.services.lock().await.clear();
    }

    #[must_use]
    pub async fn subscription(&self, workflow_name: &str) -> Option<TriggerSubscription> {
        self.subscriptions.lock().await.get(workflow_name).map(|s| s.state.clone())
    }

    #[must_use]
    pub async fn service_status(&self, service: &str) -> Option<(SubscriptionStatus, Option<String>)> {
        self.services
            .lock()
            .await
            .get(service)
            .map(|s| (s.status, s.error.clone()))
    }

    async fn mark_service(&self, service: &str, status: SubscriptionStatus, error: Option<String>) {
        self.services
            .lock()
            .await
            .insert(service.to_string(), ServiceAggregate { status, error });
    }
}
