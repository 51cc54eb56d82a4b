//! Variable interpolation (spec §4.D).
//!
//! Resolves `{{ EXPR }}` references inside step config and `if` against
//! a run's trigger payload, completed-step outputs, and environment.

use std::collections::HashMap;
use std::sync::LazyLock;

use loom_domain::Value;
use regex::Regex;

/// Everything an expression can reference: `trigger`, `steps.<id>`,
/// `env.<NAME>`, and `currentDate`.
pub struct Context<'a> {
    pub trigger: &'a Value,
    pub steps: &'a HashMap<String, Value>,
    pub env: &'a HashMap<String, String>,
    pub current_date: &'a str,
}

static TEMPLATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*(.+?)\s*\}\}").expect("static regex is valid"));

/// Recursively interpolate `{{ }}` templates through a `Value`.
///
/// Strings with no template are the identity (property 4 of spec §8).
/// A string that is *entirely* a single `{{ EXPR }}` resolves to the
/// referenced value with its original type preserved; anything else is
/// stringified and spliced into the surrounding text.
#[must_use]
pub fn interpolate(value: &Value, ctx: &Context<'_>) -> Value {
    match value {
        Value::String(s) => interpolate_string(s, ctx),
        Value::List(items) => {
            Value::List(items.iter().map(|item| interpolate(item, ctx)).collect())
        }
        Value::Map(map) => Value::Map(
            map.iter()
                .map(|(k, v)| (k.clone(), interpolate(v, ctx)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn interpolate_string(s: &str, ctx: &Context<'_>) -> Value {
    if let Some(whole) = whole_token_expr(s) {
        return evaluate_expr(whole, ctx);
    }

    if !TEMPLATE_RE.is_match(s) {
        return Value::String(s.to_string());
    }

    let replaced = TEMPLATE_RE.replace_all(s, |captures: &regex::Captures<'_>| {
        evaluate_expr(captures[1].trim(), ctx).stringify()
    });
    Value::String(replaced.into_owned())
}

/// If `s` is nothing but a single `{{ EXPR }}` (no surrounding text),
/// return the trimmed expression text.
fn whole_token_expr(s: &str) -> Option<&str> {
    let trimmed = s.trim();
    let inner = trimmed.strip_prefix("{{")?.strip_suffix("}}")?;
    if TEMPLATE_RE.find_iter(trimmed).count() == 1 {
        Some(inner.trim())
    } else {
        None
    }
}

/// Evaluate an expression: a dotted path reference, an `==`/`!=`
/// comparison, or a boolean literal (spec §4.D, §9 "keep it small").
#[must_use]
pub fn evaluate_expr(expr: &str, ctx: &Context<'_>) -> Value {
    let expr = expr.trim();

    for op in ["==", "!="] {
        if let Some(idx) = find_operator(expr, op) {
            let lhs = resolve_operand(expr[..idx].trim(), ctx);
            let rhs = resolve_operand(expr[idx + op.len()..].trim(), ctx);
            let equal = lhs == rhs;
            return Value::Bool(if op == "==" { equal } else { !equal });
        }
    }

    resolve_operand(expr, ctx)
}

/// Find `op` outside of a quoted string literal.
fn find_operator(expr: &str, op: &str) -> Option<usize> {
    let mut in_quotes = false;
    let mut quote_char = '"';
    let mut byte_idx = 0;
    for c in expr.chars() {
        if in_quotes {
            if c == quote_char {
                in_quotes = false;
            }
        } else if c == '"' || c == '\'' {
            in_quotes = true;
            quote_char = c;
        } else if expr[byte_idx..].starts_with(op) {
            return Some(byte_idx);
        }
        byte_idx += c.len_utf8();
    }
    None
}

fn resolve_operand(token: &str, ctx: &Context<'_>) -> Value {
    let token = token.trim();

    if let Some(unquoted) = unquote(token) {
        return Value::String(unquoted.to_string());
    }
    match token {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        "null" => return Value::Null,
        _ => {}
    }
    if let Ok(n) = token.parse::<f64>() {
        return Value::Number(n);
    }

    resolve_path(token, ctx).unwrap_or(Value::Null)
}

fn unquote(token: &str) -> Option<&str> {
    if token.len() >= 2
        && ((token.starts_with('"') && token.ends_with('"'))
            || (token.starts_with('\'') && token.ends_with('\'')))
    {
        Some(&token[1..token.len() - 1])
    } else {
        None
    }
}

/// Resolve a dotted path against the run context. Numeric segments
/// index into lists. Missing intermediate segments resolve to `None`
/// (spec §4.D "missing path -> no error").
fn resolve_path(path: &str, ctx: &Context<'_>) -> Option<Value> {
    let mut segments = path.split('.');
    let root = segments.next()?;
    let rest: Vec<&str> = segments.collect();

    match root {
        "trigger" => {
            if rest.is_empty() {
                Some(ctx.trigger.clone())
            } else {
                ctx.trigger.get_path(&rest).cloned()
            }
        }
        "steps" => {
            let (step_id, path_rest) = rest.split_first()?;
            let output = ctx.steps.get(*step_id)?;
            if path_rest.is_empty() {
                Some(output.clone())
            } else {
                output.get_path(path_rest).cloned()
            }
        }
        "env" => {
            let name = rest.first()?;
            ctx.env.get(*name).cloned().map(Value::String)
        }
        "currentDate" if rest.is_empty() => Some(Value::String(ctx.current_date.to_string())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx<'a>(
        trigger: &'a Value,
        steps: &'a HashMap<String, Value>,
        env: &'a HashMap<String, String>,
    ) -> Context<'a> {
        Context {
            trigger,
            steps,
            env,
            current_date: "2026-07-28",
        }
    }

    #[test]
    fn identity_when_no_template() {
        let trigger = Value::Null;
        let steps = HashMap::new();
        let env = HashMap::new();
        let c = ctx(&trigger, &steps, &env);
        let input = Value::from("plain text");
        assert_eq!(interpolate(&input, &c), input);
    }

    #[test]
    fn whole_token_preserves_type() {
        let trigger = Value::Null;
        let mut steps = HashMap::new();
        steps.insert(
            "x".to_string(),
            Value::Map([("result".to_string(), Value::Number(7.0))].into_iter().collect()),
        );
        let env = HashMap::new();
        let c = ctx(&trigger, &steps, &env);
        let input = Value::from("{{ steps.x.result }}");
        assert_eq!(interpolate(&input, &c), Value::Number(7.0));
    }

    #[test]
    fn partial_template_is_stringified() {
        let trigger = Value::Null;
        let mut steps = HashMap::new();
        steps.insert("x".to_string(), Value::Number(7.0));
        let env = HashMap::new();
        let c = ctx(&trigger, &steps, &env);
        let input = Value::from("value: {{ steps.x }}!");
        assert_eq!(interpolate(&input, &c), Value::from("value: 7!"));
    }

    #[test]
    fn missing_path_is_empty_when_stringified_and_null_whole_token() {
        let trigger = Value::Null;
        let steps = HashMap::new();
        let env = HashMap::new();
        let c = ctx(&trigger, &steps, &env);
        assert_eq!(
            interpolate(&Value::from("x={{ steps.missing.y }}"), &c),
            Value::from("x=")
        );
        assert_eq!(interpolate(&Value::from("{{ steps.missing.y }}"), &c), Value::Null);
    }

    #[test]
    fn equality_expression() {
        let trigger = Value::Null;
        let mut steps = HashMap::new();
        steps.insert(
            "a".to_string(),
            Value::Map([("x".to_string(), Value::Number(1.0))].into_iter().collect()),
        );
        let env = HashMap::new();
        let c = ctx(&trigger, &steps, &env);
        assert_eq!(evaluate_expr("steps.a.x == 1", &c), Value::Bool(true));
        assert_eq!(evaluate_expr("steps.a.x != 1", &c), Value::Bool(false));
    }

    #[test]
    fn boolean_literal() {
        let trigger = Value::Null;
        let steps = HashMap::new();
        let env = HashMap::new();
        let c = ctx(&trigger, &steps, &env);
        assert_eq!(evaluate_expr("true", &c), Value::Bool(true));
    }

    #[test]
    fn env_reference_resolves() {
        let trigger = Value::Null;
        let steps = HashMap::new();
        let mut env = HashMap::new();
        env.insert("NAME".to_string(), "world".to_string());
        let c = ctx(&trigger, &steps, &env);
        assert_eq!(evaluate_expr("env.NAME", &c), Value::String("world".to_string()));
    }
}
