//! Per-step run state and its transition guard (spec §3 invariant 4:
//! `pending -> running -> {completed | failed | skipped}`, with a direct
//! `pending -> skipped` shortcut when a step's `if` is falsey).

use chrono::{DateTime, Utc};
use loom_domain::{StepStatus, Value};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid step transition from {from:?} to {to:?}")]
pub struct InvalidStepTransition {
    pub from: StepStatus,
    pub to: StepStatus,
}

/// The materialized result of one step within a run (spec §3: `StepResult`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub id: String,
    pub status: StepStatus,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
}

impl StepResult {
    #[must_use]
    pub fn pending(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: StepStatus::Pending,
            output: None,
            error: None,
            started_at: None,
            completed_at: None,
            duration_ms: None,
        }
    }

    /// Whether `self.status -> target` is an allowed transition.
    #[must_use]
    pub const fn can_transition_to(&self, target: StepStatus) -> bool {
        use StepStatus::{Completed, Failed, Pending, Running, Skipped};
        matches!(
            (self.status, target),
            (Pending, Running) | (Pending, Skipped) | (Running, Completed | Failed | Skipped)
        )
    }

    fn transition(&mut self, target: StepStatus) -> Result<(), InvalidStepTransition> {
        if !self.can_transition_to(target) {
            return Err(InvalidStepTransition {
                from: self.status,
                to: target,
            });
        }
        self.status = target;
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), InvalidStepTransition> {
        self.transition(StepStatus::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    pub fn complete(&mut self, output: Value) -> Result<(), InvalidStepTransition> {
        self.transition(StepStatus::Completed)?;
        self.finish(Some(output), None);
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), InvalidStepTransition> {
        self.transition(StepStatus::Failed)?;
        self.finish(None, Some(error.into()));
        Ok(())
    }

    pub fn skip(&mut self) -> Result<(), InvalidStepTransition> {
        self.transition(StepStatus::Skipped)?;
        self.output = Some(Value::Null);
        self.finish(None, None);
        Ok(())
    }

    fn finish(&mut self, output: Option<Value>, error: Option<String>) {
        let now = Utc::now();
        self.completed_at = Some(now);
        if output.is_some() {
            self.output = output;
        }
        self.error = error;
        self.duration_ms = self
            .started_at
            .map(|start| (now - start).num_milliseconds().max(0) as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_lifecycle() {
        let mut step = StepResult::pending("a");
        step.start().unwrap();
        assert_eq!(step.status, StepStatus::Running);
        step.complete(Value::from("ok")).unwrap();
        assert_eq!(step.status, StepStatus::Completed);
        assert_eq!(step.output, Some(Value::from("ok")));
    }

    #[test]
    fn skip_shortcut_from_pending() {
        let mut step = StepResult::pending("a");
        assert!(step.skip().is_ok());
        assert_eq!(step.status, StepStatus::Skipped);
    }

    #[test]
    fn terminal_state_rejects_further_transitions() {
        let mut step = StepResult::pending("a");
        step.start().unwrap();
        step.complete(Value::Null).unwrap();
        assert!(step.start().is_err());
        assert!(step.fail("late").is_err());
    }
}
