//! Strictness levels and validation toggles
//!
//! A single [`ValidationLevel`] decides the baseline outcome of each check.
//! The fine-grained toggles in [`ValidationConfig`] can switch checks off or
//! adjust how invalid codes are reported, but a strict level never demotes
//! an error and a lenient level never raises a warning to an error.
#![allow(clippy::must_use_candidate)] // Accessors are clear at call sites without #[must_use].
#![allow(clippy::struct_excessive_bools)] // Toggles mirror the on-disk configuration keys.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use x12_ir::Severity;

/// Overall strictness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationLevel {
    Strict,
    #[default]
    Standard,
    Lenient,
    None,
}

impl FromStr for ValidationLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "standard" | "custom" | "" => Ok(Self::Standard),
            "lenient" => Ok(Self::Lenient),
            "none" | "off" => Ok(Self::None),
            other => Err(format!("unknown validation level '{other}'")),
        }
    }
}

impl fmt::Display for ValidationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Strict => "strict",
            Self::Standard => "standard",
            Self::Lenient => "lenient",
            Self::None => "none",
        })
    }
}

/// A check whose outcome depends on strictness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Check {
    MandatoryElement,
    InvalidCode,
    Length,
    UnknownSegment,
    ExtraElement,
    SegmentCount,
    Format,
}

/// What a level does with a failed check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    Error,
    Warning,
    /// Evaluated but not reported
    Ignore,
    /// Not evaluated
    Skip,
}

impl ValidationLevel {
    /// Baseline outcome of a check at this level
    pub fn outcome(self, check: Check) -> CheckOutcome {
        use CheckOutcome::{Error, Ignore, Skip, Warning};
        match (check, self) {
            (Check::MandatoryElement | Check::SegmentCount, Self::Strict | Self::Standard) => Error,
            (Check::MandatoryElement | Check::SegmentCount, Self::Lenient) => Warning,

            (Check::InvalidCode, Self::Strict) => Error,
            (Check::InvalidCode, Self::Standard) => Warning,
            (Check::InvalidCode, Self::Lenient) => Ignore,

            (Check::Length | Check::Format, Self::Strict) => Error,
            (Check::Length | Check::Format, Self::Standard) => Warning,

            (Check::UnknownSegment, Self::Strict) => Error,
            (Check::UnknownSegment, Self::Standard) => Warning,
            (Check::UnknownSegment, Self::Lenient | Self::None) => Ignore,

            (Check::ExtraElement, Self::Strict) => Error,
            (Check::ExtraElement, _) => Ignore,

            (_, Self::None) | (Check::Length | Check::Format, Self::Lenient) => Skip,
        }
    }
}

/// How invalid code values are reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeHandling {
    Error,
    #[default]
    Warning,
    Ignore,
}

/// Element-level toggles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElementValidationConfig {
    pub enforce_mandatory: bool,
    pub allow_extra_elements: bool,
    pub allow_unknown_segments: bool,
    pub skip_length_check: bool,
    pub skip_format_check: bool,
}

impl Default for ElementValidationConfig {
    fn default() -> Self {
        Self {
            enforce_mandatory: true,
            allow_extra_elements: false,
            allow_unknown_segments: false,
            skip_length_check: false,
            skip_format_check: false,
        }
    }
}

/// Code-list toggles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodeValidationConfig {
    pub invalid_code_handling: CodeHandling,
    pub case_sensitive: bool,
    pub allow_partial_matches: bool,
    pub allow_custom_codes: bool,
    /// Values shorter than this skip code validation
    pub min_length_to_validate: usize,
}

impl Default for CodeValidationConfig {
    fn default() -> Self {
        Self {
            invalid_code_handling: CodeHandling::Warning,
            case_sensitive: false,
            allow_partial_matches: false,
            allow_custom_codes: false,
            min_length_to_validate: 1,
        }
    }
}

impl CodeValidationConfig {
    /// Check a value against one code
    ///
    /// Comparison ignores case unless `case_sensitive` is set. With
    /// `allow_partial_matches` a value matches a code it is a prefix of, or
    /// that is a prefix of it.
    pub fn matches(&self, value: &str, code: &str) -> bool {
        let (v, c) = if self.case_sensitive {
            (value.to_string(), code.to_string())
        } else {
            (value.to_ascii_uppercase(), code.to_ascii_uppercase())
        };
        if v == c {
            return true;
        }
        self.allow_partial_matches && !v.is_empty() && (c.starts_with(&v) || v.starts_with(&c))
    }

    /// Check if a value is long enough to be validated
    pub fn should_validate(&self, value: &str) -> bool {
        !value.is_empty() && value.chars().count() >= self.min_length_to_validate
    }
}

/// Effective validation settings for one transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub level: ValidationLevel,
    pub elements: ElementValidationConfig,
    pub codes: CodeValidationConfig,
    /// When false an SE count mismatch is at most a warning
    pub enforce_segment_counts: bool,
    pub validate_control_numbers: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self::for_level(ValidationLevel::Standard)
    }
}

impl ValidationConfig {
    /// Toggles that match a strictness level
    pub fn for_level(level: ValidationLevel) -> Self {
        let (handling, custom) = match level {
            ValidationLevel::Strict => (CodeHandling::Error, false),
            ValidationLevel::Standard => (CodeHandling::Warning, true),
            ValidationLevel::Lenient | ValidationLevel::None => (CodeHandling::Ignore, true),
        };
        Self {
            level,
            elements: ElementValidationConfig {
                enforce_mandatory: level != ValidationLevel::None,
                ..ElementValidationConfig::default()
            },
            codes: CodeValidationConfig {
                invalid_code_handling: handling,
                allow_custom_codes: custom,
                ..CodeValidationConfig::default()
            },
            enforce_segment_counts: true,
            validate_control_numbers: true,
        }
    }

    /// Severity for a failed check, or `None` when it is not reported
    pub fn severity_for(&self, check: Check) -> Option<Severity> {
        let outcome = self.level.outcome(check);
        let base = match outcome {
            CheckOutcome::Error => Severity::Error,
            CheckOutcome::Warning => Severity::Warning,
            CheckOutcome::Ignore | CheckOutcome::Skip => return None,
        };

        match check {
            Check::MandatoryElement if !self.elements.enforce_mandatory => None,
            Check::Length if self.elements.skip_length_check => None,
            Check::Format if self.elements.skip_format_check => None,
            Check::ExtraElement if self.elements.allow_extra_elements => None,
            Check::UnknownSegment if self.elements.allow_unknown_segments => None,
            Check::SegmentCount if !self.enforce_segment_counts => Some(Severity::Warning),
            Check::InvalidCode => match (self.level, self.codes.invalid_code_handling) {
                (ValidationLevel::Strict, _) => Some(base),
                (_, CodeHandling::Ignore) => None,
                (_, CodeHandling::Warning) => Some(Severity::Warning),
                (_, CodeHandling::Error) => Some(Severity::Error),
            },
            _ => Some(base),
        }
    }

    /// Check if a check runs at all
    pub fn runs(&self, check: Check) -> bool {
        self.level.outcome(check) != CheckOutcome::Skip
    }
}

/// Partial settings layered over a [`ValidationConfig`]
///
/// Every field is optional; only present fields change the target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strictness: Option<ValidationLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enforce_mandatory: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_extra_elements: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_unknown_segments: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_length_check: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_format_check: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_sensitive_codes: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_partial_code_matches: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_custom_codes: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length_to_validate_code: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalid_code_handling: Option<CodeHandling>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enforce_segment_counts: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validate_control_numbers: Option<bool>,
}

impl ValidationOverrides {
    /// Layer these overrides onto a config
    ///
    /// A strictness override resets the toggles to that level's defaults
    /// before the remaining fields apply.
    pub fn apply(&self, config: &mut ValidationConfig) {
        if let Some(level) = self.strictness {
            *config = ValidationConfig::for_level(level);
        }
        let e = &mut config.elements;
        set(&mut e.enforce_mandatory, self.enforce_mandatory);
        set(&mut e.allow_extra_elements, self.allow_extra_elements);
        set(&mut e.allow_unknown_segments, self.allow_unknown_segments);
        set(&mut e.skip_length_check, self.skip_length_check);
        set(&mut e.skip_format_check, self.skip_format_check);

        let c = &mut config.codes;
        set(&mut c.case_sensitive, self.case_sensitive_codes);
        set(&mut c.allow_partial_matches, self.allow_partial_code_matches);
        set(&mut c.allow_custom_codes, self.allow_custom_codes);
        set(&mut c.min_length_to_validate, self.min_length_to_validate_code);
        set(&mut c.invalid_code_handling, self.invalid_code_handling);

        set(&mut config.enforce_segment_counts, self.enforce_segment_counts);
        set(&mut config.validate_control_numbers, self.validate_control_numbers);
    }

    /// Check if no field is set
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn set<T>(target: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *target = v;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strictness_table() {
        use CheckOutcome::{Error, Ignore, Skip, Warning};
        let rows = [
            (Check::MandatoryElement, [Error, Error, Warning, Skip]),
            (Check::InvalidCode, [Error, Warning, Ignore, Skip]),
            (Check::Length, [Error, Warning, Skip, Skip]),
            (Check::UnknownSegment, [Error, Warning, Ignore, Ignore]),
            (Check::ExtraElement, [Error, Ignore, Ignore, Ignore]),
            (Check::SegmentCount, [Error, Error, Warning, Skip]),
        ];
        let levels = [
            ValidationLevel::Strict,
            ValidationLevel::Standard,
            ValidationLevel::Lenient,
            ValidationLevel::None,
        ];
        for (check, expected) in rows {
            for (level, outcome) in levels.iter().zip(expected) {
                assert_eq!(level.outcome(check), outcome, "{check:?} at {level}");
            }
        }
    }

    #[test]
    fn test_strict_never_demotes_codes() {
        let mut config = ValidationConfig::for_level(ValidationLevel::Strict);
        config.codes.invalid_code_handling = CodeHandling::Warning;
        assert_eq!(config.severity_for(Check::InvalidCode), Some(Severity::Error));
    }

    #[test]
    fn test_lenient_never_raises() {
        let mut config = ValidationConfig::for_level(ValidationLevel::Lenient);
        config.codes.invalid_code_handling = CodeHandling::Error;
        assert_eq!(config.severity_for(Check::InvalidCode), None);
        assert_eq!(config.severity_for(Check::MandatoryElement), Some(Severity::Warning));
        assert_eq!(config.severity_for(Check::Length), None);
    }

    #[test]
    fn test_toggles() {
        let mut config = ValidationConfig::for_level(ValidationLevel::Strict);
        config.elements.skip_length_check = true;
        config.elements.allow_extra_elements = true;
        config.enforce_segment_counts = false;
        assert_eq!(config.severity_for(Check::Length), None);
        assert_eq!(config.severity_for(Check::ExtraElement), None);
        assert_eq!(config.severity_for(Check::SegmentCount), Some(Severity::Warning));
        assert_eq!(config.severity_for(Check::Format), Some(Severity::Error));
    }

    #[test]
    fn test_code_matching() {
        let mut codes = CodeValidationConfig::default();
        assert!(codes.matches("pp", "PP"));
        assert!(!codes.matches("P", "PP"));
        codes.allow_partial_matches = true;
        assert!(codes.matches("P", "PP"));
        codes.case_sensitive = true;
        assert!(!codes.matches("pp", "PP"));

        codes.min_length_to_validate = 2;
        assert!(!codes.should_validate("P"));
        assert!(codes.should_validate("PP"));
    }

    #[test]
    fn test_overrides_layering() {
        let mut config = ValidationConfig::default();
        let overrides = ValidationOverrides {
            strictness: Some(ValidationLevel::Strict),
            skip_length_check: Some(true),
            ..ValidationOverrides::default()
        };
        overrides.apply(&mut config);
        assert_eq!(config.level, ValidationLevel::Strict);
        assert!(config.elements.skip_length_check);
        assert_eq!(config.codes.invalid_code_handling, CodeHandling::Error);

        let toggles_only = ValidationOverrides {
            allow_extra_elements: Some(true),
            ..ValidationOverrides::default()
        };
        toggles_only.apply(&mut config);
        assert_eq!(config.level, ValidationLevel::Strict);
        assert!(config.elements.allow_extra_elements);
        assert!(!toggles_only.is_empty());
        assert!(ValidationOverrides::default().is_empty());
    }

    #[test]
    fn test_level_parsing() {
        assert_eq!("STRICT".parse::<ValidationLevel>().unwrap(), ValidationLevel::Strict);
        assert_eq!("custom".parse::<ValidationLevel>().unwrap(), ValidationLevel::Standard);
        assert!("paranoid".parse::<ValidationLevel>().is_err());
    }
}
