//! Workflow document types (spec §3, §6): the shape a YAML/JSON document
//! deserializes into before semantic validation runs.

use std::collections::HashMap;

use loom_domain::Value;
use serde::{Deserialize, Serialize};

/// A single named trigger subscription a workflow wants installed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerSpec {
    /// Qualified trigger name, e.g. `"cron.schedule"`.
    #[serde(rename = "type")]
    pub trigger_type: String,

    #[serde(default = "Value::map")]
    pub config: Value,
}

/// Retry policy for a step. Defaults apply to fields omitted *within* an
/// explicit `retry` block; a step with no `retry` key at all runs once.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_attempts")]
    pub attempts: u32,

    #[serde(default = "default_delay_ms", alias = "delay")]
    pub delay_ms: u64,
}

const fn default_attempts() -> u32 {
    3
}

const fn default_delay_ms() -> u64 {
    1000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            delay_ms: default_delay_ms(),
        }
    }
}

/// One step of a workflow as authored in the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepConfig {
    pub id: String,

    pub action: String,

    #[serde(default = "Value::map", alias = "with")]
    pub config: Value,

    #[serde(default, alias = "needs")]
    pub depends_on: Vec<String>,

    #[serde(default)]
    pub retry: Option<RetryConfig>,

    #[serde(default, rename = "timeout")]
    pub timeout_ms: Option<u64>,

    #[serde(default, rename = "if")]
    pub condition: Option<String>,
}

/// A fully decoded workflow document (spec §3: `Workflow`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub triggers: Vec<TriggerSpec>,

    #[serde(default)]
    pub steps: Vec<StepConfig>,

    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// Raw wire shape accepted on input, before the singular/plural trigger
/// alias is normalized into `WorkflowConfig.triggers`. Kept separate from
/// `WorkflowConfig` because the `trigger`/`triggers` alias changes shape
/// (object vs. list), which `serde(alias = ..)` cannot express directly.
#[derive(Debug, Clone, Deserialize)]
pub struct RawWorkflowDocument {
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub trigger: Option<TriggerSpec>,

    #[serde(default)]
    pub triggers: Option<Vec<TriggerSpec>>,

    #[serde(default)]
    pub steps: Vec<StepConfig>,

    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl From<RawWorkflowDocument> for WorkflowConfig {
    fn from(raw: RawWorkflowDocument) -> Self {
        let mut triggers = raw.triggers.unwrap_or_default();
        if let Some(single) = raw.trigger {
            triggers.insert(0, single);
        }

        Self {
            name: raw.name,
            description: raw.description,
            triggers,
            steps: raw.steps,
            env: raw.env,
        }
    }
}
