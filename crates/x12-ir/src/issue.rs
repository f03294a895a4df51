//! Validation issues and their locations
#![allow(clippy::must_use_candidate)] // Accessors are clear at call sites without #[must_use].
#![allow(clippy::return_self_not_must_use)] // Builder methods return Self for chaining.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Severity shared by validation issues and diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Fatal,
}

impl Severity {
    /// Check if this severity makes a document invalid
    pub fn is_error(self) -> bool {
        matches!(self, Self::Error | Self::Fatal)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

/// Layer of the document an issue was raised at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueLevel {
    Document,
    Structure,
    Segment,
    Element,
    Business,
    Customer,
}

impl fmt::Display for IssueLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Document => "document",
            Self::Structure => "structure",
            Self::Segment => "segment",
            Self::Element => "element",
            Self::Business => "business",
            Self::Customer => "customer",
        };
        f.write_str(s)
    }
}

/// Where in a document an issue applies
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueLocation {
    /// Segment tag, empty for document-wide issues
    pub segment_tag: String,

    /// 0-based segment index within the document
    pub segment_index: usize,

    /// 1-based element position
    pub element_position: Option<usize>,

    /// 1-based component position
    pub component_position: Option<usize>,

    /// Loop the segment belongs to
    pub loop_id: Option<String>,

    /// Copy of the offending value
    pub bad_value: Option<String>,

    /// Free-form context, rendered into CTX for 999
    pub context: Option<String>,
}

/// A single finding produced by processing or validation
///
/// Issues are built once through the chained constructors and never
/// modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    severity: Severity,
    code: String,
    message: String,
    location: IssueLocation,
    level: IssueLevel,
    element_ref: Option<String>,
}

impl ValidationIssue {
    /// Create an issue with no location
    pub fn new(
        severity: Severity,
        code: impl Into<String>,
        message: impl Into<String>,
        level: IssueLevel,
    ) -> Self {
        Self {
            severity,
            code: code.into(),
            message: message.into(),
            location: IssueLocation::default(),
            level,
            element_ref: None,
        }
    }

    /// Shorthand for an error-severity issue
    pub fn error(code: impl Into<String>, message: impl Into<String>, level: IssueLevel) -> Self {
        Self::new(Severity::Error, code, message, level)
    }

    /// Shorthand for a warning-severity issue
    pub fn warning(code: impl Into<String>, message: impl Into<String>, level: IssueLevel) -> Self {
        Self::new(Severity::Warning, code, message, level)
    }

    /// Locate the issue at a segment
    pub fn at_segment(mut self, tag: impl Into<String>, index: usize) -> Self {
        self.location.segment_tag = tag.into();
        self.location.segment_index = index;
        self
    }

    /// Set the 1-based element position
    pub fn with_element(mut self, position: usize) -> Self {
        self.location.element_position = Some(position);
        self
    }

    /// Set the 1-based component position
    pub fn with_component(mut self, position: usize) -> Self {
        self.location.component_position = Some(position);
        self
    }

    /// Set the loop id
    pub fn with_loop(mut self, loop_id: impl Into<String>) -> Self {
        self.location.loop_id = Some(loop_id.into());
        self
    }

    /// Copy the offending value
    pub fn with_bad_value(mut self, value: impl Into<String>) -> Self {
        self.location.bad_value = Some(value.into());
        self
    }

    /// Attach free-form context
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.location.context = Some(context.into());
        self
    }

    /// Attach the data element reference number (e.g. `146`)
    pub fn with_element_ref(mut self, reference: impl Into<String>) -> Self {
        self.element_ref = Some(reference.into());
        self
    }

    /// Replace the location wholesale
    pub fn with_location(mut self, location: IssueLocation) -> Self {
        self.location = location;
        self
    }

    /// Same issue at a different severity
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Same issue at a different level
    pub fn with_level(mut self, level: IssueLevel) -> Self {
        self.level = level;
        self
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn location(&self) -> &IssueLocation {
        &self.location
    }

    pub fn level(&self) -> IssueLevel {
        self.level
    }

    pub fn element_ref(&self) -> Option<&str> {
        self.element_ref.as_deref()
    }

    /// 0-based segment index
    pub fn segment_index(&self) -> usize {
        self.location.segment_index
    }

    /// Segment tag
    pub fn segment_tag(&self) -> &str {
        &self.location.segment_tag
    }

    /// Check if the issue makes a document invalid
    pub fn is_error(&self) -> bool {
        self.severity.is_error()
    }

    /// Check if the issue is a warning
    pub fn is_warning(&self) -> bool {
        self.severity == Severity::Warning
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.code, self.message)?;
        if !self.location.segment_tag.is_empty() {
            write!(
                f,
                " at {} (segment {})",
                self.location.segment_tag, self.location.segment_index
            )?;
            if let Some(pos) = self.location.element_position {
                write!(f, " element {pos}")?;
            }
        }
        Ok(())
    }
}
