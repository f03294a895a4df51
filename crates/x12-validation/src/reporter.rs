//! Validation reports
#![allow(clippy::must_use_candidate)] // Accessors are clear at call sites without #[must_use].

use std::fmt;

use serde::Serialize;
use serde_json::Value;
use x12_ir::{IssueLevel, ValidationIssue};
use x12_schema::ProcessedSegment;

/// Validation stages in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Syntactic,
    Structural,
    Element,
    Conditional,
    Business,
}

impl Stage {
    pub const ALL: [Self; 5] = [
        Self::Syntactic,
        Self::Structural,
        Self::Element,
        Self::Conditional,
        Self::Business,
    ];
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Syntactic => "syntactic",
            Self::Structural => "structural",
            Self::Element => "element",
            Self::Conditional => "conditional",
            Self::Business => "business",
        })
    }
}

/// One ST..SE set as the validator saw it
#[derive(Debug, Clone, Serialize)]
pub struct TransactionReport {
    pub st_index: usize,
    pub se_index: Option<usize>,
    /// ST01
    pub set_id: String,
    /// ST02
    pub control: String,
    /// Whether a transaction config was found for the set
    pub configured: bool,
    /// Mapped business object, when a config exists and mapping succeeded
    pub business_object: Option<Value>,
}

/// Everything one validation run produced
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    /// Issues in stage order
    pub issues: Vec<ValidationIssue>,
    pub error_count: usize,
    pub warning_count: usize,
    /// Stages that started
    pub stages: Vec<Stage>,
    /// Stopped by a cancellation token
    pub cancelled: bool,
    /// Stopped because the error cap was reached
    pub truncated: bool,
    pub transactions: Vec<TransactionReport>,
    /// Processed form of every segment, in scan order
    #[serde(skip)]
    pub segments: Vec<ProcessedSegment>,
}

impl ValidationReport {
    /// No error-severity issues were found
    ///
    /// A cancelled run is never valid.
    pub fn is_valid(&self) -> bool {
        self.error_count == 0 && !self.cancelled
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.is_warning())
    }

    pub fn at_level(&self, level: IssueLevel) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(move |i| i.level() == level)
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.issues.iter().any(|i| i.code() == code)
    }

    /// Issue codes in report order
    pub fn codes(&self) -> Vec<&str> {
        self.issues.iter().map(ValidationIssue::code).collect()
    }

    /// Business object of the transaction starting at `st_index`
    pub fn business_object(&self, st_index: usize) -> Option<&Value> {
        self.transactions
            .iter()
            .find(|t| t.st_index == st_index)
            .and_then(|t| t.business_object.as_ref())
    }

    /// One-line outcome, e.g. `invalid: 2 errors, 1 warning (5 stages)`
    pub fn summary(&self) -> String {
        let outcome = if self.cancelled {
            "cancelled"
        } else if self.is_valid() {
            "valid"
        } else {
            "invalid"
        };
        let plural = |n: usize| if n == 1 { "" } else { "s" };
        let mut out = format!(
            "{outcome}: {} error{}, {} warning{} ({} stage{})",
            self.error_count,
            plural(self.error_count),
            self.warning_count,
            plural(self.warning_count),
            self.stages.len(),
            plural(self.stages.len()),
        );
        if self.truncated {
            out.push_str(", truncated");
        }
        out
    }
}
