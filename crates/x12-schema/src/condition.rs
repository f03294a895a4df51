//! Condition trees
//!
//! On disk a condition is a flat object
//! `{ "type": op, "field": path, "value": v, "and": [...], "or": [...] }`.
//! In memory it is a recursive sum type. A node with a predicate and `and`
//! branches requires all of them; `or` branches add one more requirement
//! that at least one branch holds.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Predicate operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionOp {
    Exists,
    NotExists,
    Equals,
    NotEquals,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    GreaterThan,
    LessThan,
    GreaterOrEqual,
    LessOrEqual,
    RegexMatch,
    CountLessThan,
    CountGreaterThan,
    CountEquals,
}

impl ConditionOp {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exists => "exists",
            Self::NotExists => "not_exists",
            Self::Equals => "equals",
            Self::NotEquals => "not_equals",
            Self::Contains => "contains",
            Self::NotContains => "not_contains",
            Self::StartsWith => "starts_with",
            Self::EndsWith => "ends_with",
            Self::GreaterThan => "greater_than",
            Self::LessThan => "less_than",
            Self::GreaterOrEqual => "greater_or_equal",
            Self::LessOrEqual => "less_or_equal",
            Self::RegexMatch => "regex_match",
            Self::CountLessThan => "count_less_than",
            Self::CountGreaterThan => "count_greater_than",
            Self::CountEquals => "count_equals",
        }
    }

    /// Check if the operator compares a collection size
    pub fn is_count(self) -> bool {
        matches!(
            self,
            Self::CountLessThan | Self::CountGreaterThan | Self::CountEquals
        )
    }
}

impl FromStr for ConditionOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let op = match s.trim().to_ascii_lowercase().as_str() {
            "exists" => Self::Exists,
            "not_exists" => Self::NotExists,
            "equals" | "eq" | "==" => Self::Equals,
            "not_equals" | "ne" | "!=" => Self::NotEquals,
            "contains" => Self::Contains,
            "not_contains" => Self::NotContains,
            "starts_with" => Self::StartsWith,
            "ends_with" => Self::EndsWith,
            "greater_than" | "gt" | ">" => Self::GreaterThan,
            "less_than" | "lt" | "<" => Self::LessThan,
            "greater_or_equal" | "gte" | ">=" => Self::GreaterOrEqual,
            "less_or_equal" | "lte" | "<=" => Self::LessOrEqual,
            "regex_match" | "regex" | "matches" => Self::RegexMatch,
            "count_less_than" => Self::CountLessThan,
            "count_greater_than" => Self::CountGreaterThan,
            "count_equals" => Self::CountEquals,
            other => return Err(format!("unknown condition type '{other}'")),
        };
        Ok(op)
    }
}

impl fmt::Display for ConditionOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recursive condition over a business object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ConditionFile", into = "ConditionFile")]
pub enum Condition {
    /// Leaf `{field, op, value}`
    Predicate {
        op: ConditionOp,
        field: String,
        value: Option<Value>,
    },
    /// Every branch must hold; empty is true
    All(Vec<Condition>),
    /// At least one branch must hold; empty is false
    Any(Vec<Condition>),
}

impl Default for Condition {
    fn default() -> Self {
        Self::All(Vec::new())
    }
}

impl Condition {
    /// Leaf predicate
    pub fn predicate(op: ConditionOp, field: impl Into<String>, value: Option<Value>) -> Self {
        Self::Predicate {
            op,
            field: field.into(),
            value,
        }
    }

    /// Check if this is the empty always-true condition
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::All(items) if items.is_empty())
    }
}

/// Flat on-disk form
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConditionFile {
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    op: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<Value>,
    #[serde(rename = "and", default, skip_serializing_if = "Vec::is_empty")]
    and_conditions: Vec<ConditionFile>,
    #[serde(rename = "or", default, skip_serializing_if = "Vec::is_empty")]
    or_conditions: Vec<ConditionFile>,
}

impl TryFrom<ConditionFile> for Condition {
    type Error = String;

    fn try_from(file: ConditionFile) -> Result<Self, Self::Error> {
        let mut all = Vec::new();
        if !file.op.is_empty() {
            all.push(Condition::Predicate {
                op: file.op.parse()?,
                field: file.field,
                value: file.value.filter(|v| !v.is_null()),
            });
        }
        for branch in file.and_conditions {
            all.push(Condition::try_from(branch)?);
        }
        if !file.or_conditions.is_empty() {
            let any = file
                .or_conditions
                .into_iter()
                .map(Condition::try_from)
                .collect::<Result<Vec<_>, _>>()?;
            all.push(Condition::Any(any));
        }
        Ok(if all.len() == 1 {
            all.remove(0)
        } else {
            Condition::All(all)
        })
    }
}

impl From<Condition> for ConditionFile {
    fn from(condition: Condition) -> Self {
        match condition {
            Condition::Predicate { op, field, value } => ConditionFile {
                op: op.as_str().to_string(),
                field,
                value,
                ..ConditionFile::default()
            },
            Condition::All(items) => ConditionFile {
                and_conditions: items.into_iter().map(ConditionFile::from).collect(),
                ..ConditionFile::default()
            },
            Condition::Any(items) => ConditionFile {
                or_conditions: items.into_iter().map(ConditionFile::from).collect(),
                ..ConditionFile::default()
            },
        }
    }
}
