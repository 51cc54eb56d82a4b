//! Semantic validation of a parsed workflow (spec §4.B).
//!
//! Unlike the parser's structural checks, this pass needs the fully
//! decoded `WorkflowConfig` plus optional catalogues of action/trigger
//! names known to the host, and never stops at the first problem: it
//! collects every issue and classifies each as an error or a warning.

use std::collections::{HashMap, HashSet};

use petgraph::algo;
use petgraph::graph::DiGraph;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::config::WorkflowConfig;

/// How serious a validation issue is. Only `Error` issues make a
/// workflow unusable; `Warning` issues are reported but don't block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

/// A single validation finding, with enough context to point a user at
/// the offending node and, where possible, suggest a fix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub message: String,
    pub location: Option<String>,
    pub suggestion: Option<String>,
}

impl ValidationIssue {
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            location: None,
            suggestion: None,
        }
    }

    #[must_use]
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            location: None,
            suggestion: None,
        }
    }

    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self.severity, Severity::Error)
    }
}

/// Outcome of validating a workflow: every issue found, in the order
/// checks ran. `valid()` is `errors == ∅` (spec §4.B).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    #[must_use]
    pub fn valid(&self) -> bool {
        !self.issues.iter().any(ValidationIssue::is_error)
    }

    #[must_use]
    pub fn errors(&self) -> Vec<&ValidationIssue> {
        self.issues.iter().filter(|i| i.is_error()).collect()
    }

    fn push(&mut self, issue: ValidationIssue) {
        self.issues.push(issue);
    }
}

/// Validate a parsed workflow. `available_actions`/`available_triggers`,
/// when given, gate the unknown-action/unknown-trigger checks; when
/// absent those checks are skipped (the caller has no catalogue yet).
#[must_use]
pub fn validate_workflow(
    config: &WorkflowConfig,
    available_actions: Option<&[String]>,
    available_triggers: Option<&[String]>,
) -> ValidationReport {
    let mut report = ValidationReport::default();

    validate_triggers(config, available_triggers, &mut report);
    validate_duplicate_ids(config, &mut report);
    validate_depends_on(config, &mut report);
    validate_actions(config, available_actions, &mut report);
    validate_cycles(config, &mut report);
    validate_variable_references(config, &mut report);
    validate_descriptiveness(config, &mut report);

    report
}

fn validate_triggers(
    config: &WorkflowConfig,
    available_triggers: Option<&[String]>,
    report: &mut ValidationReport,
) {
    let Some(known) = available_triggers else {
        return;
    };
    let known_set: HashSet<&str> = known.iter().map(String::as_str).collect();

    for (idx, trigger) in config.triggers.iter().enumerate() {
        if !known_set.contains(trigger.trigger_type.as_str()) {
            report.push(
                ValidationIssue::error(format!(
                    "unknown trigger type '{}'",
                    trigger.trigger_type
                ))
                .with_location(format!("triggers[{idx}].type"))
                .with_suggestion(known_names_suggestion(known)),
            );
        }
    }
}

fn validate_actions(
    config: &WorkflowConfig,
    available_actions: Option<&[String]>,
    report: &mut ValidationReport,
) {
    let Some(known) = available_actions else {
        return;
    };
    let known_set: HashSet<&str> = known.iter().map(String::as_str).collect();

    for (idx, step) in config.steps.iter().enumerate() {
        if !known_set.contains(step.action.as_str()) {
            report.push(
                ValidationIssue::error(format!("unknown action '{}'", step.action))
                    .with_location(format!("steps[{idx}].action"))
                    .with_suggestion(known_names_suggestion(known)),
            );
        }
    }
}

fn known_names_suggestion(known: &[String]) -> String {
    let sample: Vec<&str> = known.iter().take(5).map(String::as_str).collect();
    format!("known names: {}", sample.join(", "))
}

fn validate_duplicate_ids(config: &WorkflowConfig, report: &mut ValidationReport) {
    let mut seen = HashSet::new();
    for (idx, step) in config.steps.iter().enumerate() {
        if !seen.insert(step.id.as_str()) {
            report.push(
                ValidationIssue::error(format!("duplicate step id '{}'", step.id))
                    .with_location(format!("steps[{idx}].id")),
            );
        }
    }
}

fn validate_depends_on(config: &WorkflowConfig, report: &mut ValidationReport) {
    let step_ids: HashSet<&str> = config.steps.iter().map(|s| s.id.as_str()).collect();

    for (idx, step) in config.steps.iter().enumerate() {
        for dep in &step.depends_on {
            if !step_ids.contains(dep.as_str()) {
                let suggestion = find_similar(dep, &step_ids);
                report.push(
                    ValidationIssue::error(format!(
                        "step '{}' depends_on unknown step '{dep}'",
                        step.id
                    ))
                    .with_location(format!("steps[{idx}].depends_on"))
                    .with_suggestion(
                        suggestion
                            .map(|s| format!("Did you mean '{s}'?"))
                            .unwrap_or_default(),
                    ),
                );
            }
        }
    }
}

/// Find the closest known id to `target` by Levenshtein distance, within
/// a small edit-distance window so unrelated names aren't suggested.
fn find_similar<'a>(target: &str, candidates: &HashSet<&'a str>) -> Option<&'a str> {
    let mut best_match: Option<&str> = None;
    let mut best_distance = usize::MAX;

    for &candidate in candidates {
        let distance = strsim::levenshtein(target, candidate);
        if distance < best_distance && distance <= 3 {
            best_distance = distance;
            best_match = Some(candidate);
        }
    }

    best_match
}

fn validate_cycles(config: &WorkflowConfig, report: &mut ValidationReport) {
    let graph = build_dependency_graph(config);

    if algo::is_cyclic_directed(&graph) {
        let sccs = algo::kosaraju_scc(&graph);
        let cycle_nodes: Vec<&str> = sccs
            .iter()
            .find(|scc| scc.len() > 1)
            .map(|scc| scc.iter().map(|&idx| graph[idx]).collect())
            .unwrap_or_default();

        report.push(ValidationIssue::error(format!(
            "circular dependency involving steps: {}",
            cycle_nodes.join(" -> ")
        )));
    }
}

/// Build a `petgraph::DiGraph` with one node per step and one edge per
/// `depends_on` entry (dependency -> dependent), used for both cycle
/// detection here and scheduling in the executor.
#[must_use]
pub fn build_dependency_graph(config: &WorkflowConfig) -> DiGraph<&str, ()> {
    let mut graph = DiGraph::new();
    let mut node_indices = HashMap::new();

    for step in &config.steps {
        let idx = graph.add_node(step.id.as_str());
        node_indices.insert(step.id.as_str(), idx);
    }

    for step in &config.steps {
        let Some(&dependent_idx) = node_indices.get(step.id.as_str()) else {
            continue;
        };
        for dep in &step.depends_on {
            if let Some(&dep_idx) = node_indices.get(dep.as_str()) {
                graph.add_edge(dep_idx, dependent_idx, ());
            }
        }
    }

    graph
}

static TEMPLATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([^}]+?)\s*\}\}").expect("static regex is valid"));

fn validate_variable_references(config: &WorkflowConfig, report: &mut ValidationReport) {
    let step_ids: Vec<&str> = config.steps.iter().map(|s| s.id.as_str()).collect();

    for (idx, step) in config.steps.iter().enumerate() {
        let earlier_ids: HashSet<&str> = step_ids[..idx].iter().copied().collect();
        let mut references = Vec::new();
        collect_references(&step.config, &mut references);
        if let Some(condition) = &step.condition {
            collect_references_in_str(condition, &mut references);
        }

        for reference in references {
            validate_reference(
                &reference,
                &earlier_ids,
                !config.triggers.is_empty(),
                &format!("steps[{idx}]"),
                report,
            );
        }
    }
}

fn collect_references(value: &loom_domain::Value, out: &mut Vec<String>) {
    match value {
        loom_domain::Value::String(s) => collect_references_in_str(s, out),
        loom_domain::Value::List(items) => {
            for item in items {
                collect_references(item, out);
            }
        }
        loom_domain::Value::Map(map) => {
            for value in map.values() {
                collect_references(value, out);
            }
        }
        _ => {}
    }
}

fn collect_references_in_str(s: &str, out: &mut Vec<String>) {
    for captures in TEMPLATE_RE.captures_iter(s) {
        out.push(captures[1].trim().to_string());
    }
}

fn validate_reference(
    expr: &str,
    earlier_ids: &HashSet<&str>,
    has_triggers: bool,
    location: &str,
    report: &mut ValidationReport,
) {
    // Strip a trailing comparison or boolean literal; we only validate
    // the leading path reference.
    let path_expr = expr
        .split("==")
        .next()
        .unwrap_or(expr)
        .split("!=")
        .next()
        .unwrap_or(expr)
        .trim();

    if path_expr == "true" || path_expr == "false" || path_expr == "currentDate" {
        return;
    }

    if let Some(rest) = path_expr.strip_prefix("steps.") {
        let step_id = rest.split('.').next().unwrap_or_default();
        if !earlier_ids.contains(step_id) {
            report.push(
                ValidationIssue::error(format!(
                    "reference to unknown or not-yet-completed step '{step_id}'"
                ))
                .with_location(location.to_string()),
            );
        }
        return;
    }

    if path_expr == "trigger" || path_expr.starts_with("trigger.") {
        if !has_triggers {
            report.push(
                ValidationIssue::warning("reference to 'trigger' but workflow has no triggers")
                    .with_location(location.to_string()),
            );
        }
        return;
    }

    if path_expr.starts_with("env.") {
        return;
    }

    report.push(
        ValidationIssue::warning(format!("unrecognized reference '{path_expr}'"))
            .with_location(location.to_string()),
    );
}

fn validate_descriptiveness(config: &WorkflowConfig, report: &mut ValidationReport) {
    if config.description.as_deref().unwrap_or_default().trim().is_empty() {
        report.push(ValidationIssue::warning("workflow has no description"));
    }
    if config.steps.is_empty() {
        report.push(ValidationIssue::warning("workflow has no steps"));
    }
}
