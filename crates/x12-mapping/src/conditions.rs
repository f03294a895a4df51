//! Condition evaluation over business objects
//!
//! Field references take four forms:
//!
//! - a dotted object path, `shipment.purpose_code`
//! - a segment selector, `N1[01=SH|SF]`, matching recorded segment views
//!   whose element 01 holds any of the listed values
//! - a segment element, `B2.04`, read from the first view with that tag
//! - a bare tag, `L11`, counting views with that tag
//!
//! `stops` and `S5` both name the stop collection: the number of recorded
//! S5 segments when there are any, the length of the `stops` array
//! otherwise.

use regex::Regex;
use serde_json::Value;
use tracing::{debug, trace};
use x12_ir::{IssueLevel, ValidationIssue};
use x12_schema::config::value_to_string;
use x12_schema::{Condition, ConditionOp, ValidationRule};

use crate::object::{array_items, is_present, lookup, segment_views, view_element, view_tag};

/// What a condition field refers to
#[derive(Debug, Clone, PartialEq, Eq)]
enum FieldRef<'a> {
    Path(&'a str),
    Selector {
        tag: &'a str,
        key: String,
        values: Vec<&'a str>,
    },
    Element {
        tag: &'a str,
        key: String,
    },
    Tag(&'a str),
    Stops,
}

fn is_tag(s: &str) -> bool {
    (2..=3).contains(&s.len())
        && s.chars().next().is_some_and(|c| c.is_ascii_uppercase())
        && s.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
}

fn element_key(tag: &str, position: &str) -> Option<String> {
    let position: usize = position.trim().parse().ok()?;
    (position > 0).then(|| format!("{tag}{position:02}"))
}

fn classify(field: &str) -> FieldRef<'_> {
    let field = field.trim();
    if field == "stops" || field == "S5" {
        return FieldRef::Stops;
    }
    if let Some((tag, rest)) = field.split_once('[') {
        if let Some((position, values)) = rest.strip_suffix(']').and_then(|r| r.split_once('=')) {
            if let (true, Some(key)) = (is_tag(tag), element_key(tag, position)) {
                return FieldRef::Selector {
                    tag,
                    key,
                    values: values.split('|').map(str::trim).collect(),
                };
            }
        }
        return FieldRef::Path(field);
    }
    if let Some((tag, position)) = field.split_once('.') {
        if is_tag(tag) && position.chars().all(|c| c.is_ascii_digit()) {
            if let Some(key) = element_key(tag, position) {
                return FieldRef::Element { tag, key };
            }
        }
        return FieldRef::Path(field);
    }
    if is_tag(field) {
        return FieldRef::Tag(field);
    }
    FieldRef::Path(field)
}

fn count_target(value: Option<&Value>) -> i64 {
    match value {
        Some(v) => i64::try_from(array_items(v).len()).unwrap_or(i64::MAX),
        None => 0,
    }
}

fn int_value(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn compare_count(op: ConditionOp, count: i64, expected: Option<&Value>) -> bool {
    let Some(expected) = int_value(expected) else {
        return false;
    };
    match op {
        ConditionOp::CountLessThan => count < expected,
        ConditionOp::CountGreaterThan => count > expected,
        ConditionOp::CountEquals => count == expected,
        _ => false,
    }
}

fn compare_numeric(actual: &str, expected: &str, op: ConditionOp) -> bool {
    let (Ok(a), Ok(b)) = (actual.trim().parse::<f64>(), expected.trim().parse::<f64>()) else {
        return false;
    };
    match op {
        ConditionOp::GreaterThan => a > b,
        ConditionOp::LessThan => a < b,
        ConditionOp::GreaterOrEqual => a >= b,
        ConditionOp::LessOrEqual => a <= b,
        _ => false,
    }
}

/// Compare one scalar against the condition value
fn compare_scalar(op: ConditionOp, actual: Option<&str>, expected: Option<&Value>) -> bool {
    let expected = expected.map(value_to_string).unwrap_or_default();
    let present = actual.is_some_and(|a| !a.trim().is_empty());
    let actual = actual.unwrap_or_default();
    match op {
        ConditionOp::Exists => present,
        ConditionOp::NotExists => !present,
        ConditionOp::Equals => actual == expected,
        ConditionOp::NotEquals => actual != expected,
        ConditionOp::Contains => actual.contains(expected.as_str()),
        ConditionOp::NotContains => !actual.contains(expected.as_str()),
        ConditionOp::StartsWith => actual.starts_with(expected.as_str()),
        ConditionOp::EndsWith => actual.ends_with(expected.as_str()),
        ConditionOp::GreaterThan
        | ConditionOp::LessThan
        | ConditionOp::GreaterOrEqual
        | ConditionOp::LessOrEqual => compare_numeric(actual, &expected, op),
        ConditionOp::RegexMatch => Regex::new(&expected).is_ok_and(|re| re.is_match(actual)),
        ConditionOp::CountLessThan | ConditionOp::CountGreaterThan | ConditionOp::CountEquals => {
            false
        }
    }
}

/// Existence and cardinality over a number of matches
fn compare_matches(op: ConditionOp, count: usize, expected: Option<&Value>) -> bool {
    let count = i64::try_from(count).unwrap_or(i64::MAX);
    match op {
        ConditionOp::Exists => count > 0,
        ConditionOp::NotExists => count == 0,
        _ if op.is_count() => compare_count(op, count, expected),
        _ => false,
    }
}

fn evaluate_predicate(op: ConditionOp, field: &str, expected: Option<&Value>, object: &Value) -> bool {
    match classify(field) {
        FieldRef::Stops => {
            let s5 = segment_views(object).filter(|v| view_tag(v) == "S5").count();
            let count = if s5 > 0 {
                s5
            } else {
                object.get("stops").map_or(0, |s| array_items(s).len())
            };
            compare_matches(op, count, expected)
        }
        FieldRef::Selector { tag, key, values } => {
            let count = segment_views(object)
                .filter(|v| view_tag(v) == tag)
                .filter(|v| {
                    view_element(v, &key).is_some_and(|actual| values.contains(&actual.trim()))
                })
                .count();
            compare_matches(op, count, expected)
        }
        FieldRef::Tag(tag) => {
            let count = segment_views(object).filter(|v| view_tag(v) == tag).count();
            compare_matches(op, count, expected)
        }
        FieldRef::Element { tag, key } => {
            if op.is_count() {
                let count = segment_views(object)
                    .filter(|v| view_tag(v) == tag)
                    .filter(|v| view_element(v, &key).is_some_and(|a| !a.is_empty()))
                    .count();
                return compare_matches(op, count, expected);
            }
            let actual = segment_views(object)
                .find(|v| view_tag(v) == tag)
                .and_then(|v| view_element(v, &key));
            compare_scalar(op, actual.as_deref(), expected)
        }
        FieldRef::Path(path) => {
            let value = lookup(object, path);
            match op {
                _ if op.is_count() => compare_count(op, count_target(value), expected),
                ConditionOp::Exists => is_present(value),
                ConditionOp::NotExists => !is_present(value),
                _ => {
                    let actual = value.filter(|v| !v.is_null()).map(value_to_string);
                    compare_scalar(op, actual.as_deref(), expected)
                }
            }
        }
    }
}

/// Evaluate a condition tree against a business object
pub fn evaluate(condition: &Condition, object: &Value) -> bool {
    match condition {
        Condition::Predicate { op, field, value } => {
            let result = evaluate_predicate(*op, field, value.as_ref(), object);
            trace!(%op, field = %field, result, "condition evaluated");
            result
        }
        Condition::All(items) => items.iter().all(|c| evaluate(c, object)),
        Condition::Any(items) => items.iter().any(|c| evaluate(c, object)),
    }
}

/// Run rules whose condition describes a violation
///
/// Each rule whose condition holds yields one issue at `level` with the
/// rule's severity. Rules without a condition never fire. Issues carry no
/// location; callers attach the owning transaction.
pub fn evaluate_rules(rules: &[ValidationRule], object: &Value, level: IssueLevel) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    for rule in rules {
        if rule.condition.is_empty() || !evaluate(&rule.condition, object) {
            continue;
        }
        let code = if rule.error_code.is_empty() {
            rule.rule_id.as_str()
        } else {
            rule.error_code.as_str()
        };
        let message = if rule.message.is_empty() {
            rule.name.as_str()
        } else {
            rule.message.as_str()
        };
        debug!(rule = %code, "business rule violated");
        let mut issue = ValidationIssue::error(code, message, level).with_severity(rule.severity);
        if !rule.name.is_empty() {
            issue = issue.with_context(rule.name.clone());
        }
        issues.push(issue);
    }
    issues
}
