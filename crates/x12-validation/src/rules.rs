//! Validation rules
//!
//! Pure checks over single values and over the segments of one
//! transaction. The engine decides severity and location; a rule only
//! says whether a value passes and which issue code describes the failure.

use chrono::{NaiveDate, NaiveTime};
use x12_schema::{ConditionalRule, DataType, MustBe, ProcessedSegment, RuleTrigger, TriggerOp};

/// Validation rule result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleResult {
    pub is_valid: bool,
    /// Issue code for a failure
    pub code: Option<&'static str>,
    pub message: Option<String>,
}

impl RuleResult {
    #[must_use]
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            code: None,
            message: None,
        }
    }

    pub fn invalid(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            code: Some(code),
            message: Some(message.into()),
        }
    }
}

/// Characters that count toward an element's length
///
/// Sign and decimal point are not counted for numeric types.
fn counted_length(value: &str, data_type: DataType) -> usize {
    match data_type {
        DataType::Numeric | DataType::ImpliedDecimal(_) | DataType::Decimal => {
            value.chars().filter(|c| *c != '-' && *c != '.').count()
        }
        _ => value.chars().count(),
    }
}

/// Validate length bounds; a zero maximum is unbounded
#[must_use]
pub fn validate_length(value: &str, data_type: DataType, min: usize, max: usize) -> RuleResult {
    let len = counted_length(value, data_type);

    if len < min {
        return RuleResult::invalid(
            "ELEM_TOO_SHORT",
            format!("Value length {len} is less than minimum {min}"),
        );
    }
    if max > 0 && len > max {
        return RuleResult::invalid(
            "ELEM_TOO_LONG",
            format!("Value length {len} exceeds maximum {max}"),
        );
    }
    RuleResult::valid()
}

/// Validate the lexical form of a data type
///
/// Dates are `CCYYMMDD`, or `YYMMDD` for six-character dates such as
/// ISA09. Times are `HHMM`, `HHMMSS` or `HHMMSS` followed by up to two
/// digits of decimal seconds. Numeric types accept an optional leading
/// minus sign followed by digits; `R` also accepts one decimal point.
#[must_use]
pub fn validate_data_type(value: &str, data_type: DataType) -> RuleResult {
    match data_type {
        DataType::Date => {
            let format = match value.len() {
                8 => "%Y%m%d",
                6 => "%y%m%d",
                _ => "",
            };
            if !format.is_empty() && NaiveDate::parse_from_str(value, format).is_ok() {
                RuleResult::valid()
            } else {
                RuleResult::invalid(
                    "ELEM_INVALID_DATE",
                    format!("Value '{value}' is not a valid date (expected CCYYMMDD)"),
                )
            }
        }
        DataType::Time => {
            if is_valid_time(value) {
                RuleResult::valid()
            } else {
                RuleResult::invalid(
                    "ELEM_INVALID_TIME",
                    format!("Value '{value}' is not a valid time (expected HHMM or HHMMSS)"),
                )
            }
        }
        DataType::Numeric | DataType::ImpliedDecimal(_) => {
            let digits = value.strip_prefix('-').unwrap_or(value);
            if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
                RuleResult::valid()
            } else {
                RuleResult::invalid(
                    "ELEM_INVALID_CHAR",
                    format!("Value '{value}' is not a valid integer"),
                )
            }
        }
        DataType::Decimal => {
            let unsigned = value.strip_prefix('-').unwrap_or(value);
            let points = unsigned.bytes().filter(|b| *b == b'.').count();
            let digits = unsigned.bytes().filter(u8::is_ascii_digit).count();
            if points <= 1 && digits > 0 && digits + points == unsigned.len() {
                RuleResult::valid()
            } else {
                RuleResult::invalid(
                    "ELEM_INVALID_CHAR",
                    format!("Value '{value}' is not a valid decimal"),
                )
            }
        }
        DataType::Alphanumeric | DataType::Identifier | DataType::Binary => RuleResult::valid(),
    }
}

fn is_valid_time(value: &str) -> bool {
    if !value.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    match value.len() {
        4 => NaiveTime::parse_from_str(value, "%H%M").is_ok(),
        6..=8 => NaiveTime::parse_from_str(&value[..6], "%H%M%S").is_ok(),
        _ => false,
    }
}

/// Check the WHEN clause of a rule against one segment
#[must_use]
pub fn trigger_matches(trigger: &RuleTrigger, segment: &ProcessedSegment) -> bool {
    if !segment.tag.eq_ignore_ascii_case(&trigger.segment) {
        return false;
    }
    let value = segment.value(trigger.element);
    if value.is_empty() {
        return false;
    }
    match trigger.operator {
        TriggerOp::Equals => value == trigger.value,
        TriggerOp::NotEquals => value != trigger.value,
        TriggerOp::Contains => value.contains(trigger.value.as_str()),
        TriggerOp::Exists => true,
    }
}

/// A cross-segment rule whose requirement failed
#[derive(Debug, Clone)]
pub struct ConditionalViolation<'a> {
    pub rule: &'a ConditionalRule,
    /// Segment the failure is reported at
    pub segment: &'a ProcessedSegment,
    /// Element issue code: missing, excluded or wrong value
    pub code: &'static str,
    pub message: String,
}

/// Evaluate `WHEN segment.element <op> value THEN ...` over a transaction
///
/// The requirement is met when any segment with the THEN tag satisfies
/// it; `absent` is met when no such segment carries a value. The failure
/// is reported at the first THEN segment, or at the first triggering
/// segment when the THEN segment does not occur.
#[must_use]
pub fn validate_conditional<'a>(
    rule: &'a ConditionalRule,
    segments: &'a [ProcessedSegment],
) -> Option<ConditionalViolation<'a>> {
    let trigger = segments.iter().find(|s| trigger_matches(&rule.when, s))?;

    let then = &rule.then;
    let targets: Vec<&ProcessedSegment> = segments
        .iter()
        .filter(|s| s.tag.eq_ignore_ascii_case(&then.segment))
        .collect();
    let met = match then.must_be {
        MustBe::Present => targets.iter().any(|s| !s.value(then.element).is_empty()),
        MustBe::Absent => targets.iter().all(|s| s.value(then.element).is_empty()),
        MustBe::EqualTo => targets.iter().any(|s| s.value(then.element) == then.value),
    };
    if met {
        return None;
    }

    let (code, expectation) = match then.must_be {
        MustBe::Present => ("ELEM_CONDITIONAL_MISSING", "must be present".to_string()),
        MustBe::Absent => ("ELEM_EXCLUSION_CONDITION", "must be absent".to_string()),
        MustBe::EqualTo => ("ELEM_INVALID_CODE_VALUE", format!("must equal '{}'", then.value)),
    };
    let subject = format!("{}{:02} {expectation}", then.segment, then.element);
    let message = if rule.description.is_empty() {
        format!("{subject} when {}{:02} matches", rule.when.segment, rule.when.element)
    } else {
        format!("{}: {subject}", rule.description)
    };

    let reported_at = match then.must_be {
        MustBe::Absent => targets
            .iter()
            .find(|s| !s.value(then.element).is_empty())
            .copied(),
        _ => targets.first().copied(),
    };
    Some(ConditionalViolation {
        rule,
        segment: reported_at.unwrap_or(trigger),
        code,
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use x12_ir::Severity;
    use x12_schema::{ElementValue, RuleRequirement, SegmentPosition, SegmentSchema};

    fn segment(tag: &str, index: usize, values: &[&str]) -> ProcessedSegment {
        let mut seg = ProcessedSegment::new(
            Arc::new(SegmentSchema::new(tag, tag, "004010")),
            SegmentPosition {
                index,
                ..SegmentPosition::default()
            },
        );
        for (i, v) in values.iter().enumerate() {
            if !v.is_empty() {
                seg.set(i + 1, ElementValue::Simple((*v).to_string()));
            }
        }
        seg
    }

    fn rule(when: RuleTrigger, then: RuleRequirement) -> ConditionalRule {
        ConditionalRule {
            id: "R1".into(),
            description: String::new(),
            when,
            then,
            severity: Severity::Error,
        }
    }

    #[test]
    fn test_validate_length() {
        assert!(validate_length("AB", DataType::Identifier, 2, 2).is_valid);
        assert_eq!(
            validate_length("A", DataType::Identifier, 2, 2).code,
            Some("ELEM_TOO_SHORT")
        );
        assert_eq!(
            validate_length("ABC", DataType::Identifier, 2, 2).code,
            Some("ELEM_TOO_LONG")
        );
        assert!(validate_length("-12.5", DataType::Decimal, 1, 3).is_valid);
        assert!(validate_length("anything at all", DataType::Alphanumeric, 1, 0).is_valid);
    }

    #[test]
    fn test_dates() {
        assert!(validate_data_type("20240115", DataType::Date).is_valid);
        assert!(validate_data_type("240115", DataType::Date).is_valid);
        let bad = validate_data_type("20241315", DataType::Date);
        assert_eq!(bad.code, Some("ELEM_INVALID_DATE"));
        assert!(!validate_data_type("2024-01-15", DataType::Date).is_valid);
    }

    #[test]
    fn test_times() {
        assert!(validate_data_type("0830", DataType::Time).is_valid);
        assert!(validate_data_type("083015", DataType::Time).is_valid);
        assert!(validate_data_type("08301525", DataType::Time).is_valid);
        assert_eq!(
            validate_data_type("2561", DataType::Time).code,
            Some("ELEM_INVALID_TIME")
        );
        assert!(!validate_data_type("08:30", DataType::Time).is_valid);
    }

    #[test]
    fn test_numbers() {
        assert!(validate_data_type("000000001", DataType::Numeric).is_valid);
        assert!(validate_data_type("-42", DataType::ImpliedDecimal(2)).is_valid);
        assert_eq!(
            validate_data_type("4.2", DataType::Numeric).code,
            Some("ELEM_INVALID_CHAR")
        );
        assert!(validate_data_type("12.50", DataType::Decimal).is_valid);
        assert!(validate_data_type("-.5", DataType::Decimal).is_valid);
        assert!(!validate_data_type("1.2.3", DataType::Decimal).is_valid);
        assert!(!validate_data_type("1e5", DataType::Decimal).is_valid);
        assert!(validate_data_type("free text", DataType::Alphanumeric).is_valid);
    }

    #[test]
    fn test_trigger_operators() {
        let b2 = segment("B2", 3, &["", "TEST", "", "SHIP123", "", "PP"]);
        let trigger = |op, value: &str| RuleTrigger {
            segment: "B2".into(),
            element: 6,
            operator: op,
            value: value.into(),
        };
        assert!(trigger_matches(&trigger(TriggerOp::Equals, "PP"), &b2));
        assert!(!trigger_matches(&trigger(TriggerOp::NotEquals, "PP"), &b2));
        assert!(trigger_matches(&trigger(TriggerOp::Contains, "P"), &b2));
        assert!(trigger_matches(&trigger(TriggerOp::Exists, ""), &b2));

        let missing = RuleTrigger {
            element: 5,
            ..trigger(TriggerOp::Exists, "")
        };
        assert!(!trigger_matches(&missing, &b2));
    }

    #[test]
    fn test_conditional_present() {
        // Third-party payment needs a bill-to party
        let r = rule(
            RuleTrigger {
                segment: "B2".into(),
                element: 6,
                operator: TriggerOp::Equals,
                value: "TP".into(),
            },
            RuleRequirement {
                segment: "N1".into(),
                element: 2,
                must_be: MustBe::Present,
                value: String::new(),
            },
        );

        let without = vec![segment("B2", 3, &["", "", "", "", "", "TP"])];
        let violation = validate_conditional(&r, &without).unwrap();
        assert_eq!(violation.code, "ELEM_CONDITIONAL_MISSING");
        assert_eq!(violation.segment.index(), 3);
        assert_eq!(violation.message, "N102 must be present when B206 matches");

        let with = vec![
            segment("B2", 3, &["", "", "", "", "", "TP"]),
            segment("N1", 4, &["BT", "PAYER"]),
        ];
        assert!(validate_conditional(&r, &with).is_none());

        let not_triggered = vec![segment("B2", 3, &["", "", "", "", "", "PP"])];
        assert!(validate_conditional(&r, &not_triggered).is_none());
    }

    #[test]
    fn test_conditional_absent_and_equal() {
        let when = RuleTrigger {
            segment: "B2".into(),
            element: 6,
            operator: TriggerOp::Exists,
            value: String::new(),
        };
        let segments = vec![
            segment("B2", 3, &["", "", "", "", "", "CC"]),
            segment("NTE", 4, &["", "FIRST"]),
            segment("NTE", 5, &["", "SECOND"]),
        ];

        let absent = rule(
            when.clone(),
            RuleRequirement {
                segment: "NTE".into(),
                element: 2,
                must_be: MustBe::Absent,
                value: String::new(),
            },
        );
        let violation = validate_conditional(&absent, &segments).unwrap();
        assert_eq!(violation.code, "ELEM_EXCLUSION_CONDITION");
        assert_eq!(violation.segment.index(), 4);

        let mut equal = rule(
            when,
            RuleRequirement {
                segment: "NTE".into(),
                element: 2,
                must_be: MustBe::EqualTo,
                value: "SECOND".into(),
            },
        );
        assert!(validate_conditional(&equal, &segments).is_none());
        equal.then.value = "THIRD".into();
        equal.description = "Notes must mention the third stop".into();
        let violation = validate_conditional(&equal, &segments).unwrap();
        assert_eq!(violation.code, "ELEM_INVALID_CODE_VALUE");
        assert!(violation.message.starts_with("Notes must mention the third stop: NTE02"));
    }
}
