//! Run and step state (spec §3).
//!
//! `StepResult` tracks one step's status within a run; `WorkflowRun`
//! aggregates them and derives the run's own terminal status.
//! `TriggerSubscription` tracks a live trigger registration (spec §4.F).

pub mod step_state;
pub mod trigger_subscription;
pub mod workflow_state;

pub use step_state::*;
pub use trigger_subscription::*;
pub use workflow_state::*;
