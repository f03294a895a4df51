//! Transform expressions
//!
//! Expressions are a name with an optional `:` parameter, for example
//! `uppercase`, `pad_left:10`, `regex_replace:[^0-9]->` or `map:SH=SF,CN=ST`.
//! Hyphenated spellings (`pad-left:10`) are accepted. A name that is not
//! built in refers to a customer transformation rule.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use regex::Regex;
use tracing::{trace, warn};
use x12_schema::{CustomerOverlay, TransformationRule};

use crate::{Error, Result};

/// A parsed transform expression
#[derive(Debug, Clone)]
pub enum Transform {
    Uppercase,
    Lowercase,
    Trim,
    RemoveSpaces,
    /// Keep ASCII letters and digits
    RemoveSpecial,
    AlphaOnly,
    NumericOnly,
    PadLeft(usize),
    PadRight(usize),
    PadZero(usize),
    Truncate(usize),
    RegexReplace {
        pattern: Regex,
        replacement: String,
    },
    /// Template with a `{}` or `%s` placeholder
    Format(String),
    /// Exact-match lookup; unmatched values pass through
    Map(BTreeMap<String, String>),
    /// Customer transformation referenced by name
    Named(String),
}

impl FromStr for Transform {
    type Err = Error;

    fn from_str(expression: &str) -> Result<Self> {
        let expression = expression.trim();
        let (name, param) = match expression.split_once(':') {
            Some((name, param)) => (name, Some(param)),
            None => (expression, None),
        };
        let normalized = name.trim().to_ascii_lowercase().replace('-', "_");

        let length = |param: Option<&str>| -> Result<usize> {
            param
                .map(str::trim)
                .and_then(|p| p.parse::<usize>().ok())
                .ok_or_else(|| Error::transform(expression, "expected a length parameter"))
        };

        let transform = match (normalized.as_str(), param) {
            ("uppercase" | "upper", None) => Self::Uppercase,
            ("lowercase" | "lower", None) => Self::Lowercase,
            ("trim", None) => Self::Trim,
            ("remove_spaces", None) => Self::RemoveSpaces,
            ("remove_special", None) => Self::RemoveSpecial,
            ("alpha_only", None) => Self::AlphaOnly,
            ("numeric_only", None) => Self::NumericOnly,
            ("pad_left", p) => Self::PadLeft(length(p)?),
            ("pad_right", p) => Self::PadRight(length(p)?),
            ("pad_zero", p) => Self::PadZero(length(p)?),
            ("truncate", p) => Self::Truncate(length(p)?),
            ("regex_replace", Some(p)) => {
                let (pattern, replacement) = p
                    .split_once("->")
                    .or_else(|| p.split_once('→'))
                    .unwrap_or((p, ""));
                let pattern = Regex::new(pattern)
                    .map_err(|e| Error::transform(expression, e.to_string()))?;
                Self::RegexReplace {
                    pattern,
                    replacement: replacement.to_string(),
                }
            }
            ("format", Some(template)) => Self::Format(template.to_string()),
            ("map", Some(pairs)) => Self::Map(parse_pairs(pairs)),
            (_, None) if !name.is_empty() => Self::Named(name.to_string()),
            _ => return Err(Error::transform(expression, "unknown transform")),
        };
        Ok(transform)
    }
}

/// `k=v,k2=v2`; `k:v` pairs are accepted too
fn parse_pairs(pairs: &str) -> BTreeMap<String, String> {
    pairs
        .split(',')
        .filter_map(|pair| pair.split_once('=').or_else(|| pair.split_once(':')))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

impl Transform {
    /// Apply to a value; named transforms pass the value through
    pub fn apply(&self, value: &str) -> String {
        match self {
            Self::Uppercase => value.to_uppercase(),
            Self::Lowercase => value.to_lowercase(),
            Self::Trim => value.trim().to_string(),
            Self::RemoveSpaces => value.chars().filter(|c| *c != ' ').collect(),
            Self::RemoveSpecial => value.chars().filter(char::is_ascii_alphanumeric).collect(),
            Self::AlphaOnly => value.chars().filter(char::is_ascii_alphabetic).collect(),
            Self::NumericOnly => value.chars().filter(char::is_ascii_digit).collect(),
            Self::PadLeft(width) => format!("{value:>width$}"),
            Self::PadRight(width) => format!("{value:<width$}"),
            Self::PadZero(width) => format!("{value:0>width$}"),
            Self::Truncate(width) => value.chars().take(*width).collect(),
            Self::RegexReplace {
                pattern,
                replacement,
            } => pattern.replace_all(value, replacement.as_str()).into_owned(),
            Self::Format(template) => fill_template(template, value),
            Self::Map(table) => table.get(value).cloned().unwrap_or_else(|| value.to_string()),
            Self::Named(_) => value.to_string(),
        }
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uppercase => f.write_str("uppercase"),
            Self::Lowercase => f.write_str("lowercase"),
            Self::Trim => f.write_str("trim"),
            Self::RemoveSpaces => f.write_str("remove_spaces"),
            Self::RemoveSpecial => f.write_str("remove_special"),
            Self::AlphaOnly => f.write_str("alpha_only"),
            Self::NumericOnly => f.write_str("numeric_only"),
            Self::PadLeft(n) => write!(f, "pad_left:{n}"),
            Self::PadRight(n) => write!(f, "pad_right:{n}"),
            Self::PadZero(n) => write!(f, "pad_zero:{n}"),
            Self::Truncate(n) => write!(f, "truncate:{n}"),
            Self::RegexReplace {
                pattern,
                replacement,
            } => write!(f, "regex_replace:{pattern}->{replacement}"),
            Self::Format(template) => write!(f, "format:{template}"),
            Self::Map(table) => {
                let pairs: Vec<String> = table.iter().map(|(k, v)| format!("{k}={v}")).collect();
                write!(f, "map:{}", pairs.join(","))
            }
            Self::Named(name) => f.write_str(name),
        }
    }
}

fn fill_template(template: &str, value: &str) -> String {
    if template.contains("{}") {
        template.replacen("{}", value, 1)
    } else if template.contains("%s") {
        template.replacen("%s", value, 1)
    } else {
        template.to_string()
    }
}

/// Parse and apply an expression, resolving names against an overlay
///
/// Unknown names leave the value unchanged.
///
/// # Errors
///
/// Returns [`Error::Transform`] when a built-in transform has a malformed
/// parameter or a regex does not compile.
pub fn apply_expression(
    expression: &str,
    value: &str,
    overlay: Option<&CustomerOverlay>,
) -> Result<String> {
    let transform: Transform = expression.parse()?;
    let Transform::Named(name) = &transform else {
        return Ok(transform.apply(value));
    };
    match overlay.and_then(|o| o.transformation(name)) {
        Some(rule) => apply_rule(rule, value),
        None => {
            warn!("Unknown transform '{}', value left unchanged", name);
            Ok(value.to_string())
        }
    }
}

/// Apply a named customer transformation rule
///
/// # Errors
///
/// Returns [`Error::Transform`] when a `regex_replace` pattern does not
/// compile.
pub fn apply_rule(rule: &TransformationRule, value: &str) -> Result<String> {
    let param = |key: &str| rule.parameters.get(key).map(String::as_str);
    trace!(rule = %rule.name, kind = %rule.transform_type, "customer transform");

    let out = match rule.transform_type.to_ascii_lowercase().replace('-', "_").as_str() {
        "replace" => match (param("old"), param("new")) {
            (Some(old), Some(new)) if !old.is_empty() => value.replace(old, new),
            _ => value.to_string(),
        },
        "regex_replace" => match param("pattern") {
            Some(pattern) => Regex::new(pattern)
                .map_err(|e| Error::transform(rule.name.clone(), e.to_string()))?
                .replace_all(value, param("replacement").unwrap_or_default())
                .into_owned(),
            None => value.to_string(),
        },
        "format" => param("template").map_or_else(|| value.to_string(), |t| fill_template(t, value)),
        "map" => param("mappings")
            .map(parse_pairs)
            .and_then(|table| table.get(value).cloned())
            .unwrap_or_else(|| value.to_string()),
        "pad" => {
            let width = param("length").and_then(|l| l.parse::<usize>().ok()).unwrap_or(0);
            let fill = param("char").and_then(|c| c.chars().next()).unwrap_or(' ');
            let missing = width.saturating_sub(value.chars().count());
            let padding: String = std::iter::repeat_n(fill, missing).collect();
            if param("direction") == Some("left") {
                format!("{padding}{value}")
            } else {
                format!("{value}{padding}")
            }
        }
        other => match other.parse::<Transform>()? {
            Transform::Named(_) => value.to_string(),
            builtin => builtin.apply(value),
        },
    };
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(expression: &str, value: &str) -> String {
        apply_expression(expression, value, None).unwrap()
    }

    #[test]
    fn test_case_and_whitespace() {
        assert_eq!(apply("uppercase", "test"), "TEST");
        assert_eq!(apply("lowercase", "TeSt"), "test");
        assert_eq!(apply("trim", "  a b  "), "a b");
        assert_eq!(apply("remove_spaces", " a b c "), "abc");
        assert_eq!(apply("remove-spaces", "a b"), "ab");
    }

    #[test]
    fn test_character_filters() {
        assert_eq!(apply("remove_special", "AB-12/c"), "AB12c");
        assert_eq!(apply("alpha_only", "AB-12/c"), "ABc");
        assert_eq!(apply("numeric_only", "(555) 123-4567"), "5551234567");
    }

    #[test]
    fn test_padding_and_truncation() {
        assert_eq!(apply("pad_left:5", "42"), "   42");
        assert_eq!(apply("pad_right:5", "42"), "42   ");
        assert_eq!(apply("pad_zero:5", "42"), "00042");
        assert_eq!(apply("pad_zero:2", "1234"), "1234");
        assert_eq!(apply("truncate:3", "ABCDEF"), "ABC");
        assert_eq!(apply("truncate:10", "ABC"), "ABC");
    }

    #[test]
    fn test_regex_replace() {
        assert_eq!(apply("regex_replace:[^0-9]->", "A1-B2"), "12");
        assert_eq!(apply("regex_replace:(\\d+)->#$1", "ref 77"), "ref #77");
    }

    #[test]
    fn test_format_and_map() {
        assert_eq!(apply("format:REF-{}", "9"), "REF-9");
        assert_eq!(apply("format:%s/X", "9"), "9/X");
        assert_eq!(apply("map:SH=SF,CN=ST", "CN"), "ST");
        assert_eq!(apply("map:SH=SF", "BT"), "BT");
    }

    #[test]
    fn test_bad_parameters() {
        assert!(apply_expression("pad_left:x", "1", None).is_err());
        assert!(apply_expression("truncate", "1", None).is_err());
        assert!(apply_expression("regex_replace:([->x", "1", None).is_err());
        assert!(apply_expression("bogus:1", "1", None).is_err());
    }

    #[test]
    fn test_display_round_trip() {
        for expr in ["uppercase", "pad_left:10", "truncate:3", "format:{}-X", "map:A=B"] {
            let t: Transform = expr.parse().unwrap();
            assert_eq!(t.to_string(), expr);
        }
    }

    #[test]
    fn test_named_customer_transforms() {
        let mut overlay = CustomerOverlay::empty("ACME");
        overlay.transformations.push(TransformationRule {
            name: "dashes".into(),
            transform_type: "replace".into(),
            parameters: [("old", "-"), ("new", "")]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..TransformationRule::default()
        });
        overlay.transformations.push(TransformationRule {
            name: "zero10".into(),
            transform_type: "pad".into(),
            parameters: [("length", "6"), ("char", "0"), ("direction", "left")]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..TransformationRule::default()
        });

        assert_eq!(apply_expression("dashes", "12-34", Some(&overlay)).unwrap(), "1234");
        assert_eq!(apply_expression("zero10", "42", Some(&overlay)).unwrap(), "000042");
        assert_eq!(apply_expression("unknown_name", "x", Some(&overlay)).unwrap(), "x");
    }

    #[test]
    fn test_rule_map_accepts_colon_pairs() {
        let rule = TransformationRule {
            name: "codes".into(),
            transform_type: "map".into(),
            parameters: [("mappings".to_string(), "PP:PREPAID, CC:COLLECT".to_string())]
                .into_iter()
                .collect(),
            ..TransformationRule::default()
        };
        assert_eq!(apply_rule(&rule, "CC").unwrap(), "COLLECT");
        assert_eq!(apply_rule(&rule, "TP").unwrap(), "TP");
    }
}
