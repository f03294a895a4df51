//! Diagnostic error model
//!
//! [`EdiError`] is the reportable form of a failure: a category, a machine
//! code, a severity, a location inside the interchange, a free-form context
//! bag and any number of recovery suggestions. Crate-level `Error` enums
//! convert into it when a caller needs more than a message.
//!
//! [`ErrorCollector`] accumulates anything with a severity while enforcing an
//! error cap and an optional stop-on-fatal policy.
#![allow(clippy::must_use_candidate)] // Accessors are clear at call sites without #[must_use].
#![allow(clippy::return_self_not_must_use)] // Builder methods return Self for chaining.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::issue::{Severity, ValidationIssue};

/// Category of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Syntax,
    Delimiter,
    Structure,
    Encoding,
    Required,
    Format,
    Value,
    Length,
    Cardinality,
    BusinessRule,
    Dependency,
    Consistency,
    Io,
    Timeout,
    Resource,
}

impl ErrorKind {
    /// Default severity for the category
    pub fn default_severity(self) -> Severity {
        match self {
            Self::Delimiter | Self::Io | Self::Timeout | Self::Resource => Severity::Fatal,
            _ => Severity::Error,
        }
    }

    /// Lower-case name
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Syntax => "syntax",
            Self::Delimiter => "delimiter",
            Self::Structure => "structure",
            Self::Encoding => "encoding",
            Self::Required => "required",
            Self::Format => "format",
            Self::Value => "value",
            Self::Length => "length",
            Self::Cardinality => "cardinality",
            Self::BusinessRule => "business_rule",
            Self::Dependency => "dependency",
            Self::Consistency => "consistency",
            Self::Io => "io",
            Self::Timeout => "timeout",
            Self::Resource => "resource",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a failure occurred
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorLocation {
    /// Segment tag
    pub segment_tag: Option<String>,
    /// 0-based segment index
    pub segment_index: Option<usize>,
    /// 1-based element position
    pub element: Option<usize>,
    /// 1-based component position
    pub component: Option<usize>,
    /// Source file
    pub file_path: Option<PathBuf>,
    /// 1-based line
    pub line: Option<usize>,
    /// 1-based column
    pub column: Option<usize>,
}

impl ErrorLocation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_segment(mut self, tag: impl Into<String>, index: usize) -> Self {
        self.segment_tag = Some(tag.into());
        self.segment_index = Some(index);
        self
    }

    pub fn with_segment_index(mut self, index: usize) -> Self {
        self.segment_index = Some(index);
        self
    }

    pub fn with_element(mut self, element: usize) -> Self {
        self.element = Some(element);
        self
    }

    pub fn with_component(mut self, component: usize) -> Self {
        self.component = Some(component);
        self
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    pub fn with_line_column(mut self, line: usize, column: usize) -> Self {
        self.line = Some(line);
        self.column = Some(column);
        self
    }
}

impl fmt::Display for ErrorLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(path) = &self.file_path {
            parts.push(path.display().to_string());
        }
        if let Some(line) = self.line {
            parts.push(format!("line {line}"));
        }
        match (&self.segment_tag, self.segment_index) {
            (Some(tag), Some(idx)) => parts.push(format!("{tag} (segment {idx})")),
            (None, Some(idx)) => parts.push(format!("segment {idx}")),
            (Some(tag), None) => parts.push(tag.clone()),
            (None, None) => {}
        }
        if let Some(el) = self.element {
            parts.push(format!("element {el}"));
        }
        if let Some(c) = self.component {
            parts.push(format!("component {c}"));
        }
        f.write_str(&parts.join(", "))
    }
}

/// Callable that proposes a corrected value for a bad one
pub type AutoFix = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Advice attached to a diagnostic
#[derive(Clone)]
pub struct RecoverySuggestion {
    /// What to do
    pub action: String,
    /// Why it helps
    pub description: String,
    /// Example of a correct value or segment
    pub example: Option<String>,
    auto_fix: Option<AutoFix>,
}

impl RecoverySuggestion {
    pub fn new(action: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            description: description.into(),
            example: None,
            auto_fix: None,
        }
    }

    pub fn with_example(mut self, example: impl Into<String>) -> Self {
        self.example = Some(example.into());
        self
    }

    pub fn with_auto_fix<F>(mut self, fix: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.auto_fix = Some(Arc::new(fix));
        self
    }

    /// Check if the suggestion can repair a value on its own
    pub fn has_auto_fix(&self) -> bool {
        self.auto_fix.is_some()
    }

    /// Run the auto-fix against a value
    pub fn apply(&self, value: &str) -> Option<String> {
        self.auto_fix.as_ref().and_then(|fix| fix(value))
    }
}

impl fmt::Debug for RecoverySuggestion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoverySuggestion")
            .field("action", &self.action)
            .field("description", &self.description)
            .field("example", &self.example)
            .field("auto_fix", &self.auto_fix.is_some())
            .finish()
    }
}

/// Reportable failure with location, context and suggestions
#[derive(Debug, Clone, Error)]
#[error("[{kind}] {code}: {message}")]
pub struct EdiError {
    pub kind: ErrorKind,
    pub code: String,
    pub message: String,
    pub severity: Severity,
    pub location: ErrorLocation,
    pub context: BTreeMap<String, String>,
    pub suggestions: Vec<RecoverySuggestion>,
}

impl EdiError {
    /// Create a diagnostic at the category's default severity
    pub fn new(kind: ErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            severity: kind.default_severity(),
            location: ErrorLocation::default(),
            context: BTreeMap::new(),
            suggestions: Vec::new(),
        }
    }

    /// Delimiter detection failure
    pub fn delimiter_detect(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::Delimiter, "DELIMITER_DETECT", reason)
            .with_location(ErrorLocation::new().with_segment("ISA", 0))
            .with_suggestion(
                RecoverySuggestion::new(
                    "Verify the ISA header",
                    "The ISA segment must be the first segment and is 106 bytes long with the standard separators",
                )
                .with_example(
                    "ISA*00*          *00*          *ZZ*SENDER         *ZZ*RECEIVER       *240101*1200*U*00401*000000001*0*P*>~",
                ),
            )
    }

    /// Missing mandatory element
    pub fn required_element(tag: impl Into<String>, index: usize, element: usize) -> Self {
        let tag = tag.into();
        Self::new(
            ErrorKind::Required,
            "ELEM_MISSING",
            format!("{tag}{element:02} is mandatory"),
        )
        .with_location(ErrorLocation::new().with_segment(tag, index).with_element(element))
        .with_suggestion(RecoverySuggestion::new(
            "Supply a value",
            "Populate the element or configure a default in the customer overlay",
        ))
    }

    /// Processing was cancelled by the caller
    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Timeout, "CANCELLED", "processing was cancelled")
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_location(mut self, location: ErrorLocation) -> Self {
        self.location = location;
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: RecoverySuggestion) -> Self {
        self.suggestions.push(suggestion);
        self
    }

    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Fatal
    }
}

/// Anything an [`ErrorCollector`] can hold
pub trait Reportable {
    fn severity(&self) -> Severity;
}

impl Reportable for EdiError {
    fn severity(&self) -> Severity {
        self.severity
    }
}

impl Reportable for ValidationIssue {
    fn severity(&self) -> Severity {
        ValidationIssue::severity(self)
    }
}

/// Signal returned when a collector refuses to continue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CollectorHalt {
    #[error("maximum number of errors ({limit}) exceeded")]
    MaxErrorsExceeded { limit: usize },

    #[error("fatal error recorded")]
    Fatal,
}

/// Accumulates diagnostics or issues for one document
///
/// Only error and fatal items count toward the cap. An item that would go
/// past the cap is dropped and the collector reports
/// [`CollectorHalt::MaxErrorsExceeded`]. A fatal item is always stored;
/// with `stop_on_fatal` set the collector then reports
/// [`CollectorHalt::Fatal`].
#[derive(Debug, Clone)]
pub struct ErrorCollector<T> {
    items: Vec<T>,
    max_errors: usize,
    stop_on_fatal: bool,
    error_count: usize,
    truncated: bool,
}

impl<T: Reportable> Default for ErrorCollector<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Reportable> ErrorCollector<T> {
    /// Default error cap
    pub const DEFAULT_MAX_ERRORS: usize = 1000;

    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            max_errors: Self::DEFAULT_MAX_ERRORS,
            stop_on_fatal: false,
            error_count: 0,
            truncated: false,
        }
    }

    /// Set the error cap; zero disables it
    pub fn with_max_errors(mut self, max_errors: usize) -> Self {
        self.max_errors = max_errors;
        self
    }

    pub fn with_stop_on_fatal(mut self, stop: bool) -> Self {
        self.stop_on_fatal = stop;
        self
    }

    /// Record an item
    ///
    /// # Errors
    ///
    /// Returns a [`CollectorHalt`] when the caller should stop producing
    /// items.
    pub fn add(&mut self, item: T) -> Result<(), CollectorHalt> {
        let severity = item.severity();
        if severity.is_error() {
            if self.max_errors > 0 && self.error_count >= self.max_errors {
                if !self.truncated {
                    debug!("Error cap of {} reached, dropping further errors", self.max_errors);
                }
                self.truncated = true;
                return Err(CollectorHalt::MaxErrorsExceeded {
                    limit: self.max_errors,
                });
            }
            self.error_count += 1;
        }
        self.items.push(item);
        if severity == Severity::Fatal && self.stop_on_fatal {
            return Err(CollectorHalt::Fatal);
        }
        Ok(())
    }

    /// Record several items, stopping at the first halt
    ///
    /// # Errors
    ///
    /// Returns the first [`CollectorHalt`] raised by [`add`](Self::add).
    pub fn extend<I: IntoIterator<Item = T>>(&mut self, items: I) -> Result<(), CollectorHalt> {
        for item in items {
            self.add(item)?;
        }
        Ok(())
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn warning_count(&self) -> usize {
        self.items
            .iter()
            .filter(|i| i.severity() == Severity::Warning)
            .count()
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    pub fn has_fatal(&self) -> bool {
        self.items.iter().any(|i| i.severity() == Severity::Fatal)
    }

    /// Check if items were dropped because of the cap
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.error_count = 0;
        self.truncated = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issue::IssueLevel;

    #[test]
    fn test_delimiter_detect_diagnostic() {
        let err = EdiError::delimiter_detect("input does not start with ISA");
        assert_eq!(err.kind, ErrorKind::Delimiter);
        assert!(err.is_fatal());
        assert_eq!(err.suggestions.len(), 1);
        assert!(err.suggestions[0].example.as_deref().unwrap().starts_with("ISA*"));
        assert_eq!(err.location.segment_tag.as_deref(), Some("ISA"));
        assert!(err.to_string().contains("DELIMITER_DETECT"));
    }

    #[test]
    fn test_context_bag() {
        let err = EdiError::new(ErrorKind::Value, "BAD", "bad value")
            .with_context("partner", "ACME")
            .with_context("segment", "B2");
        assert_eq!(err.context.get("partner").map(String::as_str), Some("ACME"));
        assert_eq!(err.context.len(), 2);
        assert_eq!(err.severity, Severity::Error);
    }

    #[test]
    fn test_auto_fix() {
        let s = RecoverySuggestion::new("Uppercase", "Codes are upper case")
            .with_auto_fix(|v| Some(v.to_uppercase()));
        assert!(s.has_auto_fix());
        assert_eq!(s.apply("pp"), Some("PP".to_string()));

        let plain = RecoverySuggestion::new("Check", "Check it");
        assert_eq!(plain.apply("x"), None);
        assert!(format!("{plain:?}").contains("auto_fix: false"));
    }

    #[test]
    fn test_location_display() {
        let loc = ErrorLocation::new().with_segment("B2", 3).with_element(6);
        assert_eq!(loc.to_string(), "B2 (segment 3), element 6");
    }

    #[test]
    fn test_collector_cap() {
        let mut c: ErrorCollector<EdiError> = ErrorCollector::new().with_max_errors(2);
        assert!(c.add(EdiError::new(ErrorKind::Value, "A", "a")).is_ok());
        assert!(c
            .add(EdiError::new(ErrorKind::Value, "W", "w").with_severity(Severity::Warning))
            .is_ok());
        assert!(c.add(EdiError::new(ErrorKind::Value, "B", "b")).is_ok());
        let halt = c.add(EdiError::new(ErrorKind::Value, "C", "c")).unwrap_err();
        assert_eq!(halt, CollectorHalt::MaxErrorsExceeded { limit: 2 });
        assert_eq!(c.len(), 3);
        assert_eq!(c.error_count(), 2);
        assert_eq!(c.warning_count(), 1);
        assert!(c.is_truncated());
    }

    #[test]
    fn test_collector_stop_on_fatal() {
        let mut c: ErrorCollector<EdiError> = ErrorCollector::new().with_stop_on_fatal(true);
        let halt = c.add(EdiError::delimiter_detect("short")).unwrap_err();
        assert_eq!(halt, CollectorHalt::Fatal);
        assert!(c.has_fatal());
        assert_eq!(c.len(), 1);

        let mut lenient: ErrorCollector<EdiError> = ErrorCollector::new();
        assert!(lenient.add(EdiError::delimiter_detect("short")).is_ok());
    }

    #[test]
    fn test_collector_holds_issues() {
        let mut c = ErrorCollector::new().with_max_errors(1);
        c.extend([
            ValidationIssue::warning("W", "w", IssueLevel::Element),
            ValidationIssue::error("E", "e", IssueLevel::Element),
        ])
        .unwrap();
        assert!(c.add(ValidationIssue::error("E2", "e", IssueLevel::Element)).is_err());
        assert_eq!(c.into_items().len(), 2);
    }
}
