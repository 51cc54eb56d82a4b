//! Workflow Executor (spec §4.E): DAG scheduling, per-step retry, timeout,
//! conditional skip, variable interpolation, and lifecycle event emission.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::{Backoff, Constant};
use chrono::Utc;
use loom_domain::{RunId, RunStatus, StepStatus, Value};
use loom_plugins::{ActionContext, ActionError, PluginRegistry};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{info, instrument, warn};

use crate::config::{StepConfig, WorkflowConfig};
use crate::events::{EventBus, EventName, LifecycleEvent};
use crate::interpolator::{self, Context as InterpContext};
use crate::state::{StepResult, WorkflowRun};

/// A snapshot of everything an in-flight step attempt may reference:
/// the trigger payload, completed-dependency outputs, merged environment,
/// and the run's notion of "today" — captured once per dispatch so a
/// step never observes a dependent's output change mid-attempt.
#[derive(Clone)]
struct RunSnapshot {
    trigger: Value,
    steps: HashMap<String, Value>,
    env: HashMap<String, String>,
    current_date: String,
}

impl RunSnapshot {
    fn context(&self) -> InterpContext<'_> {
        InterpContext {
            trigger: &self.trigger,
            steps: &self.steps,
            env: &self.env,
            current_date: &self.current_date,
        }
    }
}

struct StepOutcome {
    id: String,
    result: StepResult,
}

/// Runs validated workflows to completion, consulting the Plugin Registry
/// to resolve each step's action and the Interpolator to materialize its
/// config (spec §4.E).
#[derive(Clone)]
pub struct Executor {
    registry: PluginRegistry,
    events: Arc<EventBus>,
}

impl Executor {
    #[must_use]
    pub fn new(registry: PluginRegistry, events: Arc<EventBus>) -> Self {
        Self { registry, events }
    }

    #[must_use]
    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    #[must_use]
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Convenience that delegates to the Plugin Registry (spec §4.E
    /// "Public surface").
    pub async fn register_plugin(
        &self,
        plugin: Arc<dyn loom_plugins::Plugin>,
    ) -> Result<(), loom_plugins::RegistryError> {
        self.registry.register(plugin).await
    }

    /// Run `config` to completion, optionally seeded with a trigger
    /// payload. Blocks until the run reaches a terminal status.
    #[instrument(skip(self, config, trigger_data), fields(workflow = %config.name))]
    pub async fn execute(&self, config: &WorkflowConfig, trigger_data: Option<Value>) -> WorkflowRun {
        let step_ids: Vec<String> = config.steps.iter().map(|s| s.id.clone()).collect();
        let mut run = WorkflowRun::new(config.name.clone(), &step_ids, trigger_data.clone());
        run.start();
        self.events
            .emit(LifecycleEvent::workflow(EventName::WorkflowStarted, run.id, &config.name));

        let steps_by_id: HashMap<&str, &StepConfig> =
            config.steps.iter().map(|s| (s.id.as_str(), s)).collect();

        let mut remaining: HashMap<String, usize> = config
            .steps
            .iter()
            .map(|s| (s.id.clone(), s.depends_on.len()))
            .collect();

        let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
        for step in &config.steps {
            for dep in &step.depends_on {
                dependents.entry(dep.clone()).or_default().push(step.id.clone());
            }
        }

        let mut ready: Vec<String> = config
            .steps
            .iter()
            .filter(|s| s.depends_on.is_empty())
            .map(|s| s.id.clone())
            .collect();
        let mut dispatched: HashSet<String> = HashSet::new();
        let mut in_flight = 0usize;
        let mut run_failed = false;

        let (tx, mut rx) = mpsc::unbounded_channel::<StepOutcome>();
        let trigger_value = trigger_data.unwrap_or(Value::Null);
        let mut env: HashMap<String, String> = std::env::vars().collect();
        env.extend(config.env.clone());

        loop {
            if !run_failed {
                for step_id in ready.drain(..) {
                    dispatched.insert(step_id.clone());
                    in_flight += 1;

                    let step = (*steps_by_id
                        .get(step_id.as_str())
                        .expect("only known step ids enter the ready set"))
                    .clone();
                    let snapshot = RunSnapshot {
                        trigger: trigger_value.clone(),
                        steps: run.step_outputs(),
                        env: env.clone(),
                        current_date: Utc::now().format("%Y-%m-%d").to_string(),
                    };
                    let registry = self.registry.clone();
                    let events = Arc::clone(&self.events);
                    let run_id = run.id;
                    let workflow_name = config.name.clone();
                    let tx = tx.clone();

                    tokio::spawn(async move {
                        let outcome =
                            run_step(step, snapshot, registry, events, run_id, workflow_name).await;
                        let _ = tx.send(outcome);
                    });
                }
            } else {
                ready.clear();
            }

            if in_flight == 0 {
                break;
            }

            let outcome = rx
                .recv()
                .await
                .expect("sender stays alive while any step is in flight");
            in_flight -= 1;

            let failed_here = outcome.result.status == StepStatus::Failed;
            run.steps.insert(outcome.id.clone(), outcome.result);
            if failed_here {
                run_failed = true;
            }

            if let Some(deps) = dependents.get(&outcome.id) {
                for dep_id in deps {
                    if let Some(count) = remaining.get_mut(dep_id) {
                        *count = count.saturating_sub(1);
                        if *count == 0 && !dispatched.contains(dep_id) && !run_failed {
                            ready.push(dep_id.clone());
                        }
                    }
                }
            }
        }

        run.recompute_completion();
        match run.status {
            RunStatus::Completed => self
                .events
                .emit(LifecycleEvent::workflow(EventName::WorkflowCompleted, run.id, &config.name)),
            RunStatus::Failed => {
                let event = LifecycleEvent::workflow(EventName::WorkflowFailed, run.id, &config.name)
                    .with_error(run.error.clone().unwrap_or_default());
                self.events.emit(event);
            }
            RunStatus::Pending | RunStatus::Running => {
                warn!(run_id = %run.id, "run reached quiescence without a terminal status");
            }
        }

        run
    }
}

/// Execute one step through its full pipeline: condition, config
/// materialization, action resolution, schema validation, and
/// invocation-with-retry (spec §4.E "Per-step processing").
async fn run_step(
    step: StepConfig,
    snapshot: RunSnapshot,
    registry: PluginRegistry,
    events: Arc<EventBus>,
    run_id: RunId,
    workflow_name: String,
) -> StepOutcome {
    let mut result = StepResult::pending(step.id.clone());

    if let Some(condition) = &step.condition {
        let value = interpolator::interpolate(&Value::String(condition.clone()), &snapshot.context());
        if !value.is_truthy() {
            result.skip().expect("pending -> skipped is always allowed");
            let event = LifecycleEvent::step(EventName::StepCompleted, run_id, &workflow_name, &step.id)
                .with_status("skipped");
            events.emit(event);
            return StepOutcome { id: step.id, result };
        }
    }

    result.start().expect("pending -> running is always allowed");
    events.emit(LifecycleEvent::step(
        EventName::StepStarted,
        run_id,
        &workflow_name,
        &step.id,
    ));

    let materialized = interpolator::interpolate(&step.config, &snapshot.context());

    let action = match registry.get_action(&step.action).await {
        Ok(action) => action,
        Err(_) => {
            let message = format!("unknown action: {}", step.action);
            return fail_step(result, step.id, message, run_id, &workflow_name, &events);
        }
    };

    if let Some(schema) = action.schema() {
        let instance: serde_json::Value = materialized.clone().into();
        match jsonschema::validator_for(schema) {
            Ok(validator) => {
                let errors: Vec<String> = validator
                    .iter_errors(&instance)
                    .map(|e| e.to_string())
                    .collect();
                if !errors.is_empty() {
                    let message = format!("schema validation failed: {}", errors.join("; "));
                    return fail_step(result, step.id, message, run_id, &workflow_name, &events);
                }
            }
            Err(e) => {
                let message = format!("invalid action schema: {e}");
                return fail_step(result, step.id, message, run_id, &workflow_name, &events);
            }
        }
    }

    let (attempts, delay_ms) = match step.retry {
        Some(retry) => (retry.attempts.max(1), retry.delay_ms),
        None => (1, 0),
    };
    let mut backoff = Constant::new(Duration::from_millis(delay_ms));

    let mut last_error = String::new();
    let mut output = None;

    for attempt in 1..=attempts {
        let action_ctx = ActionContext {
            workflow_name: workflow_name.clone(),
            run_id,
            step_id: step.id.clone(),
            config: materialized.clone(),
            trigger: snapshot.trigger.clone(),
            steps: snapshot.steps.clone(),
            env: snapshot.env.clone(),
            log: Arc::new({
                let workflow_name = workflow_name.clone();
                let step_id = step.id.clone();
                move |message: &str| {
                    info!(run_id = %run_id, workflow = %workflow_name, step = %step_id, "{message}");
                }
            }),
        };

        let call = action.execute(&action_ctx);
        let attempt_result: Result<Value, ActionError> = match step.timeout_ms {
            Some(ms) => match timeout(Duration::from_millis(ms), call).await {
                Ok(r) => r,
                Err(_) => Err(ActionError::new(format!("step timed out after {ms}ms"))),
            },
            None => call.await,
        };

        match attempt_result {
            Ok(value) => {
                output = Some(value);
                break;
            }
            Err(e) => {
                last_error = e.0;
                if attempt < attempts {
                    let wait = backoff.next_backoff().unwrap_or(Duration::from_millis(delay_ms));
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    match output {
        Some(value) => {
            result
                .complete(value.clone())
                .expect("running -> completed is always allowed");
            let event = LifecycleEvent::step(EventName::StepCompleted, run_id, &workflow_name, &step.id)
                .with_status("completed")
                .with_output(value);
            events.emit(event);
            StepOutcome { id: step.id, result }
        }
        None => fail_step(result, step.id, last_error, run_id, &workflow_name, &events),
    }
}

fn fail_step(
    mut result: StepResult,
    id: String,
    message: String,
    run_id: RunId,
    workflow_name: &str,
    events: &EventBus,
) -> StepOutcome {
    // `fail` requires Running; a step can also fail straight from Pending
    // (unknown action / schema error, caught before the attempt loop).
    if result.status == StepStatus::Pending {
        result.start().expect("pending -> running is always allowed");
    }
    result.fail(message.clone()).expect("running -> failed is always allowed");
    let event =
        LifecycleEvent::step(EventName::StepFailed, run_id, workflow_name, &id).with_error(message);
    events.emit(event);
    StepOutcome { id, result }
}
