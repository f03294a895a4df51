#![deny(warnings)]
#![deny(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

//! # x12-ir
//!
//! Core data model shared by every stage of the X12 engine.
//!
//! This crate holds the separator set of an interchange, raw segments as they
//! come off the scanner, the document container with its envelope metadata,
//! validation issues, and the diagnostic error model used to report failures
//! with locations and recovery suggestions.

/// Cooperative cancellation shared between a caller and a running scan.
pub mod cancel;
/// Diagnostic error model: kinds, locations, recovery suggestions, collectors.
pub mod diagnostics;
/// Separator set declared by an ISA header.
pub mod delimiters;
/// Document container and envelope metadata.
pub mod document;
/// Validation issues and their locations.
pub mod issue;
/// Raw segments produced by the scanner.
pub mod segment;

/// Cancellation token checked at scanner and validator boundaries.
pub use cancel::CancellationToken;
/// Diagnostic primitives.
pub use diagnostics::{
    AutoFix, CollectorHalt, EdiError, ErrorCollector, ErrorKind, ErrorLocation,
    RecoverySuggestion, Reportable,
};
/// Separator set.
pub use delimiters::Delimiters;
/// Document container.
pub use document::{Document, DocumentMetadata};
/// Issue model.
pub use issue::{IssueLevel, IssueLocation, Severity, ValidationIssue};
/// Raw segment.
pub use segment::RawSegment;

use thiserror::Error;

/// Errors that can occur when working with the core model
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Invalid delimiters: {reason}")]
    InvalidDelimiters { reason: String },

    #[error("Invalid document framing: {reason}")]
    InvalidFraming { reason: String },

    #[error("Segment index {index} is out of range (document has {len} segments)")]
    SegmentOutOfRange { index: usize, len: usize },
}

impl Error {
    /// Build an invalid-delimiters error.
    pub fn invalid_delimiters(reason: impl Into<String>) -> Self {
        Self::InvalidDelimiters {
            reason: reason.into(),
        }
    }

    /// Build an invalid-framing error.
    pub fn invalid_framing(reason: impl Into<String>) -> Self {
        Self::InvalidFraming {
            reason: reason.into(),
        }
    }

    /// Convert into a diagnostic record.
    #[must_use]
    pub fn diagnostic(&self) -> EdiError {
        match self {
            Self::InvalidDelimiters { .. } => {
                EdiError::new(ErrorKind::Delimiter, "INVALID_DELIMITERS", self.to_string())
            }
            Self::InvalidFraming { .. } => {
                EdiError::new(ErrorKind::Structure, "INVALID_FRAMING", self.to_string())
            }
            Self::SegmentOutOfRange { index, .. } => {
                EdiError::new(ErrorKind::Structure, "SEGMENT_OUT_OF_RANGE", self.to_string())
                    .with_location(ErrorLocation::new().with_segment_index(*index))
            }
        }
    }
}

/// Crate-local result type for core model operations.
pub type Result<T> = std::result::Result<T, Error>;
