//! Workflow document parser (spec §4.A).
//!
//! Decodes YAML (the canonical form) or JSON-compatible input into a
//! `WorkflowConfig`, normalizing the `with`/`needs`/singular-`trigger`
//! aliases along the way so nothing downstream of this module ever sees
//! them.

use thiserror::Error;

use crate::config::{RawWorkflowDocument, WorkflowConfig};

/// A `ParseError` always carries a pointer path to the offending node,
/// dot/bracket notation matching the document's own shape (e.g.
/// `"steps[2].retry.attempts"`).
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("at {path}: {message}")]
    Malformed { path: String, message: String },
}

impl ParseError {
    fn from_yaml(err: serde_yml::Error) -> Self {
        // serde_yml reports its own location inside the Display message;
        // surface it as the path since serde_yml doesn't expose a
        // structured pointer.
        Self::Malformed {
            path: err
                .location()
                .map(|loc| format!("line {}, column {}", loc.line(), loc.column()))
                .unwrap_or_else(|| "<document>".to_string()),
            message: err.to_string(),
        }
    }
}

/// Parse a workflow document (YAML, or JSON — a strict subset of YAML).
///
/// Performs only syntactic decoding and alias normalization; reference
/// and graph checks belong to [`crate::parser::validate_workflow`].
pub fn parse_workflow(source: &str) -> Result<WorkflowConfig, ParseError> {
    let raw: RawWorkflowDocument = serde_yml::from_str(source).map_err(ParseError::from_yaml)?;
    let config = WorkflowConfig::from(raw);

    if config.name.trim().is_empty() {
        return Err(ParseError::Malformed {
            path: "name".to_string(),
            message: "workflow name must not be empty".to_string(),
        });
    }

    for (idx, step) in config.steps.iter().enumerate() {
        if step.id.trim().is_empty() {
            return Err(ParseError::Malformed {
                path: format!("steps[{idx}].id"),
                message: "step id must not be empty".to_string(),
            });
        }
        if !step
            .id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ParseError::Malformed {
                path: format!("steps[{idx}].id"),
                message: format!(
                    "step id '{}' must match [A-Za-z0-9_-]+",
                    step.id
                ),
            });
        }
        if step.action.trim().is_empty() {
            return Err(ParseError::Malformed {
                path: format!("steps[{idx}].action"),
                message: "step action must not be empty".to_string(),
            });
        }
    }

    Ok(config)
}
