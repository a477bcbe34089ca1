//! Rule body predicates (`FIND` / `MATCH`).
//!
//! A rule body is stored as the JSON document it was written as, e.g.
//!
//! ```json
//! {"FIND": {"r'^auth[a-zA-Z]+$'": ["administrator"]}}
//! {"MATCH": {"definition": "technicalRule"}}
//! ```
//!
//! and parsed into a [`Quantifier`] when it is evaluated. Parsing failures are
//! reported per rule and never abort the evaluation of other rules.

use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

use crate::{AccessError, AccessResult};

/// Parsed rule predicate.
#[derive(Debug, Clone)]
pub enum Quantifier {
    /// True if some key matching `selector` holds a value in `values`.
    Find {
        /// Key selector.
        selector: Regex,
        /// Reference values.
        values: BTreeSet<String>,
    },
    /// True if `field` is present and equal to `value`.
    Match {
        /// Field name, dots address nested objects.
        field: String,
        /// Expected value.
        value: Value,
    },
}

impl Quantifier {
    /// Tag of the search quantifier.
    pub const FIND: &'static str = "FIND";
    /// Tag of the equality quantifier.
    pub const MATCH: &'static str = "MATCH";

    /// Creates a `FIND` quantifier.
    pub fn find(
        selector: &str,
        values: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<Self, regex::Error> {
        Ok(Self::Find {
            selector: Regex::new(strip_raw_literal(selector))?,
            values: values.into_iter().map(Into::into).collect(),
        })
    }

    /// Creates a `MATCH` quantifier.
    pub fn exact(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Match {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Parses the body of the rule named `rule`.
    pub fn parse(rule: &str, body: &Value) -> AccessResult<Self> {
        let invalid = |reason: String| AccessError::invalid_rule(rule, reason);

        let (tag, operand) = body
            .as_object()
            .and_then(single_entry)
            .ok_or_else(|| invalid("body must hold exactly one quantifier".to_string()))?;

        let (key, argument) = operand
            .as_object()
            .and_then(single_entry)
            .ok_or_else(|| invalid(format!("{tag} takes exactly one key")))?;

        match tag.as_str() {
            Self::FIND => {
                let selector = Regex::new(strip_raw_literal(key))
                    .map_err(|e| invalid(format!("bad selector {key}: {e}")))?;
                let values = reference_values(argument)
                    .ok_or_else(|| invalid("FIND values must be scalars".to_string()))?;
                Ok(Self::Find { selector, values })
            }
            Self::MATCH => Ok(Self::Match {
                field: key.clone(),
                value: argument.clone(),
            }),
            other => Err(invalid(format!("unknown quantifier {other}"))),
        }
    }

    /// Evaluates the predicate against a candidate document.
    pub fn matches(&self, candidate: &Value) -> bool {
        match self {
            Self::Find { selector, values } => find(candidate, selector, values),
            Self::Match { field, value } => lookup(candidate, field).is_some_and(|found| found == value),
        }
    }
}

fn single_entry(map: &Map<String, Value>) -> Option<(&String, &Value)> {
    if map.len() == 1 {
        map.iter().next()
    } else {
        None
    }
}

/// `r'^auth$'` is accepted as a spelling of `^auth$`.
fn strip_raw_literal(selector: &str) -> &str {
    match selector.strip_prefix("r'") {
        Some(rest) if rest.ends_with('\'') => rest.trim_matches('\''),
        _ => selector,
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn reference_values(argument: &Value) -> Option<BTreeSet<String>> {
    match argument {
        Value::Array(items) => items.iter().map(scalar_text).collect(),
        other => scalar_text(other).map(|s| BTreeSet::from([s])),
    }
}

fn intersects(value: &Value, values: &BTreeSet<String>) -> bool {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(scalar_text)
            .any(|item| values.contains(&item)),
        other => scalar_text(other).is_some_and(|item| values.contains(&item)),
    }
}

fn find(candidate: &Value, selector: &Regex, values: &BTreeSet<String>) -> bool {
    match candidate {
        Value::Object(map) => map.iter().any(|(key, value)| {
            (selector.is_match(key) && intersects(value, values)) || find(value, selector, values)
        }),
        Value::Array(items) => items.iter().any(|item| find(item, selector, values)),
        _ => false,
    }
}

fn lookup<'a>(candidate: &'a Value, field: &str) -> Option<&'a Value> {
    if let Some(direct) = candidate.get(field) {
        return Some(direct);
    }
    field
        .split('.')
        .try_fold(candidate, |node, part| node.as_object()?.get(part))
}
