//! Executor behavior exercised through the public `parse_workflow` ->
//! `Executor::execute` pipeline (spec.md §8 scenarios 1-3, 6).

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use loom_domain::{RunStatus, StepStatus, Value};
use loom_plugins::{Action, ActionContext, ActionError, Plugin, PluginRegistry, Trigger};
use loom_workflow_engine::{parse_workflow, EventBus, Executor};

struct SleepAction(u64);

#[async_trait]
impl Action for SleepAction {
    fn name(&self) -> &str {
        "sleep"
    }

    async fn execute(&self, _ctx: &ActionContext) -> Result<Value, ActionError> {
        tokio::time::sleep(Duration::from_millis(self.0)).await;
        Ok(Value::Bool(true))
    }
}

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

/// Requires its config to carry a `name` string; used to exercise the
/// pre-invocation schema validation step (spec §4.E step 4).
struct SchemaAction(serde_json::Value);

#[async_trait]
impl Action for SchemaAction {
    fn name(&self) -> &str {
        "schema_checked"
    }

    fn schema(&self) -> Option<&serde_json::Value> {
        Some(&self.0)
    }

    async fn execute(&self, ctx: &ActionContext) -> Result<Value, ActionError> {
        Ok(ctx.config.clone())
    }
}

struct DemoPlugin;

#[async_trait]
impl Plugin for DemoPlugin {
    fn name(&self) -> &str {
        "demo"
    }
    fn version(&self) -> &str {
        "0.1.0"
    }
    fn actions(&self) -> Vec<Arc<dyn Action>> {
        vec![
            Arc::new(SleepAction(100)),
            Arc::new(EchoAction),
            Arc::new(SchemaAction(serde_json::json!({
                "type": "object",
                "required": ["name"],
                "properties": { "name": { "type": "string" } },
            }))),
        ]
    }
    fn triggers(&self) -> Vec<Arc<dyn Trigger>> {
        Vec::new()
    }
}

async fn demo_executor() -> Executor {
    let registry = PluginRegistry::new();
    registry.register(Arc::new(DemoPlugin)).await.unwrap();
    Executor::new(registry, Arc::new(EventBus::new()))
}

#[tokio::test]
async fn simple_success_scenario_via_parsed_yaml() {
    let yaml = r#"
name: s1
steps:
  - id: log
    action: demo.echo
    config:
      m: "hi"
"#;
    let config = parse_workflow(yaml).unwrap();
    let executor = demo_executor().await;
    let run = executor.execute(&config, None).await;
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.steps["log"].status, StepStatus::Completed);
    assert_eq!(run.steps["log"].output.as_ref().unwrap().get("m"), Some(&Value::from("hi")));
}

#[tokio::test]
async fn three_independent_sleeps_run_in_parallel() {
    let yaml = r#"
name: s3
steps:
  - id: a
    action: demo.sleep
  - id: b
    action: demo.sleep
  - id: c
    action: demo.sleep
"#;
    let config = parse_workflow(yaml).unwrap();
    let executor = demo_executor().await;

    let start = Instant::now();
    let run = executor.execute(&config, None).await;
    let elapsed = start.elapsed();

    assert_eq!(run.status, RunStatus::Completed);
    assert!(
        elapsed < Duration::from_millis(250),
        "three 100ms steps should overlap, took {elapsed:?}"
    );
}

#[tokio::test]
async fn dependent_starts_no_earlier_than_its_dependency_completes() {
    let yaml = r#"
name: s2
steps:
  - id: a
    action: demo.sleep
  - id: b
    action: demo.echo
    needs: [a]
"#;
    let config = parse_workflow(yaml).unwrap();
    let executor = demo_executor().await;
    let run = executor.execute(&config, None).await;

    assert_eq!(run.status, RunStatus::Completed);
    let a_completed = run.steps["a"].completed_at.unwrap();
    let b_started = run.steps["b"].started_at.unwrap();
    assert!(b_started >= a_completed);
}

#[tokio::test]
async fn failed_dependency_leaves_dependent_pending_while_independent_completes() {
    let yaml = r#"
name: s6
steps:
  - id: a
    action: demo.missing
  - id: b
    action: demo.echo
    needs: [a]
  - id: c
    action: demo.sleep
"#;
    let config = parse_workflow(yaml).unwrap();
    let executor = demo_executor().await;
    let run = executor.execute(&config, None).await;

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.steps["a"].status, StepStatus::Failed);
    assert_eq!(run.steps["b"].status, StepStatus::Pending);
    assert_eq!(run.steps["c"].status, StepStatus::Completed);
}

#[tokio::test]
async fn step_exceeding_its_timeout_fails_without_waiting_for_the_action() {
    let yaml = r#"
name: s_timeout
steps:
  - id: a
    action: demo.sleep
    timeout: 20
"#;
    let config = parse_workflow(yaml).unwrap();
    let executor = demo_executor().await;

    let start = Instant::now();
    let run = executor.execute(&config, None).await;
    let elapsed = start.elapsed();

    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.steps["a"].error.as_ref().unwrap().contains("timed out"));
    assert!(
        elapsed < Duration::from_millis(100),
        "should fail at the 20ms timeout, not wait out the 100ms sleep, took {elapsed:?}"
    );
}

#[tokio::test]
async fn schema_violation_fails_the_step_without_invoking_it() {
    let yaml = r#"
name: s_schema
steps:
  - id: a
    action: demo.schema_checked
    config:
      wrong_field: 1
"#;
    let config = parse_workflow(yaml).unwrap();
    let executor = demo_executor().await;
    let run = executor.execute(&config, None).await;

    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.steps["a"].error.as_ref().unwrap().contains("schema validation failed"));
}
