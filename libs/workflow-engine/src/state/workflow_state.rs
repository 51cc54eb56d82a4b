//! Whole-run state (spec §3: `WorkflowRun`) and its completion rule
//! (invariant 5: a run is `completed` only once every step has reached a
//! terminal status and none of them is `failed`).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use loom_domain::{RunId, RunStatus, StepStatus, Value};
use serde::{Deserialize, Serialize};

use super::step_state::StepResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: RunId,
    pub workflow_name: String,
    pub status: RunStatus,
    pub trigger_data: Option<Value>,
    pub steps: HashMap<String, StepResult>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl WorkflowRun {
    #[must_use]
    pub fn new(workflow_name: impl Into<String>, step_ids: &[String], trigger_data: Option<Value>) -> Self {
        let steps = step_ids
            .iter()
            .map(|id| (id.clone(), StepResult::pending(id.clone())))
            .collect();
        Self {
            id: RunId::new(),
            workflow_name: workflow_name.into(),
            status: RunStatus::Pending,
            trigger_data,
            steps,
            started_at: Utc::now(),
            completed_at: None,
            error: None,
        }
    }

    pub fn start(&mut self) {
        self.status = RunStatus::Running;
    }

    /// Mark the run failed (a step failed, or dispatch itself errored).
    /// Fail-fast: no further steps are dispatched, but steps already
    /// in flight are left to finish (spec §4.C "Failure propagation").
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = RunStatus::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
    }

    /// Recompute whether the run is now complete (spec §3 invariant 5):
    /// `failed` as soon as any step has failed — even if fail-fast left
    /// other steps stranded `pending` — `completed` only once every step
    /// is terminal and none failed, else still `running`. Idempotent; safe
    /// to call after each step settles.
    pub fn recompute_completion(&mut self) {
        if self.status == RunStatus::Failed {
            return;
        }
        if self.steps.values().any(|s| s.status == StepStatus::Failed) {
            self.status = RunStatus::Failed;
            self.error.get_or_insert_with(|| "one or more steps failed".to_string());
            self.completed_at.get_or_insert_with(Utc::now);
            return;
        }
        let all_terminal = self.steps.values().all(|s| s.status.is_terminal());
        if !all_terminal {
            return;
        }
        self.status = RunStatus::Completed;
        self.completed_at.get_or_insert_with(Utc::now);
    }

    #[must_use]
    pub fn step_outputs(&self) -> HashMap<String, Value> {
        self.steps
            .iter()
            .filter_map(|(id, result)| result.output.clone().map(|o| (id.clone(), o)))
            .collect()
    }
}
