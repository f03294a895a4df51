#![deny(warnings)]
#![deny(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

//! # x12-mapping
//!
//! Business-object mapping for X12 transactions.
//!
//! A [`Mapper`] reads schema-processed segments into a nested JSON business
//! object and builds transaction bodies back from such objects, both driven
//! by a transaction configuration's segment mappings. The crate also holds
//! the transform expression language used by mappings and customer overlays,
//! and the condition evaluator behind business rules and conditional
//! segments.

/// Condition trees evaluated over business objects.
pub mod conditions;
/// Parse and build directions of the segment mapper.
pub mod mapper;
/// Dotted-path access into JSON business objects.
pub mod object;
/// Transform expressions such as `uppercase` or `pad_left:10`.
pub mod transforms;

pub use conditions::{evaluate, evaluate_rules};
pub use mapper::Mapper;
pub use object::business_view;
pub use transforms::{apply_expression, Transform};

use thiserror::Error;
use x12_ir::{EdiError, ErrorKind, ErrorLocation, RecoverySuggestion};

/// Errors that can occur while mapping
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid transform '{expression}': {message}")]
    Transform { expression: String, message: String },

    #[error("No outbound mapping for segment {segment}")]
    NoMapping { segment: String },

    #[error("Segment {segment} has no values to write")]
    EmptySegment { segment: String },

    #[error("Element {segment}{element:02} ({field}) is required but empty")]
    RequiredField {
        segment: String,
        element: usize,
        field: String,
    },

    #[error("Element {segment}{element:02} value '{value}' does not match {pattern}")]
    Validation {
        segment: String,
        element: usize,
        value: String,
        pattern: String,
    },

    #[error("Invalid pattern for {segment}{element:02}: {message}")]
    InvalidPattern {
        segment: String,
        element: usize,
        message: String,
    },

    #[error("Loop {loop_id} has {count} occurrences, allowed {min}..{max}")]
    LoopOccurrences {
        loop_id: String,
        count: usize,
        min: usize,
        /// Zero means unbounded
        max: usize,
    },

    #[error("Cannot write object path '{path}': {message}")]
    InvalidPath { path: String, message: String },

    #[error(transparent)]
    Schema(#[from] x12_schema::Error),
}

impl Error {
    /// Build a transform error.
    pub fn transform(expression: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transform {
            expression: expression.into(),
            message: message.into(),
        }
    }

    /// Build a required-field error.
    pub fn required_field(segment: impl Into<String>, element: usize, field: impl Into<String>) -> Self {
        Self::RequiredField {
            segment: segment.into(),
            element,
            field: field.into(),
        }
    }

    /// Build an invalid-path error.
    pub fn invalid_path(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Convert into a diagnostic record.
    #[must_use]
    pub fn diagnostic(&self) -> EdiError {
        match self {
            Self::Transform { expression, .. } => {
                EdiError::new(ErrorKind::Format, "INVALID_TRANSFORM", self.to_string())
                    .with_context("transform", expression.clone())
            }
            Self::NoMapping { segment } | Self::EmptySegment { segment } => {
                EdiError::new(ErrorKind::Dependency, "NO_MAPPING", self.to_string())
                    .with_location(ErrorLocation::new().with_segment(segment.clone(), 0))
            }
            Self::RequiredField {
                segment, element, field,
            } => EdiError::new(ErrorKind::Required, "REQUIRED_FIELD_MISSING", self.to_string())
                .with_location(
                    ErrorLocation::new()
                        .with_segment(segment.clone(), 0)
                        .with_element(*element),
                )
                .with_context("field", field.clone())
                .with_suggestion(RecoverySuggestion::new(
                    "Provide the field",
                    format!("Set '{field}' on the business object or configure a default"),
                )),
            Self::Validation {
                segment, element, ..
            }
            | Self::InvalidPattern {
                segment, element, ..
            } => EdiError::new(ErrorKind::Value, "FIELD_VALIDATION_FAILED", self.to_string())
                .with_location(
                    ErrorLocation::new()
                        .with_segment(segment.clone(), 0)
                        .with_element(*element),
                ),
            Self::LoopOccurrences { loop_id, .. } => {
                EdiError::new(ErrorKind::Cardinality, "LOOP_OCCURRENCES", self.to_string())
                    .with_context("loop", loop_id.clone())
            }
            Self::InvalidPath { path, .. } => {
                EdiError::new(ErrorKind::Consistency, "INVALID_OBJECT_PATH", self.to_string())
                    .with_context("path", path.clone())
            }
            Self::Schema(e) => e.diagnostic(),
        }
    }
}

/// Crate-local result type for mapping operations.
pub type Result<T> = std::result::Result<T, Error>;
