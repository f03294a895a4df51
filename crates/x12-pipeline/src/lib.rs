#![deny(warnings)]
#![deny(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

//! # x12-pipeline
//!
//! Integrated parse and build service for X12 interchanges.
//!
//! [`Pipeline::parse`] detects delimiters, scans segments, validates every
//! transaction against its config, the partner profile and the customer
//! overlay, maps business objects and optionally emits a 997 or 999.
//! [`Pipeline::build`] goes the other way: a business object becomes an
//! enveloped interchange written with the partner's delimiters.
//!
//! [`StreamProcessor`] runs many independent documents on a bounded pool
//! and returns results in submission order.

mod numeric;
/// Parse and build orchestration.
pub mod pipeline;
/// Bounded concurrent processing of many documents.
pub mod streaming;

pub use pipeline::{
    BuildOptions, BuildResult, ParseOptions, ParseResult, ParseTiming, Pipeline, PipelineConfig,
    PipelineMetrics, PipelineStats,
};
pub use streaming::{ProcessResult, StreamConfig, StreamMessage, StreamProcessor, StreamStats};

use thiserror::Error;
use x12_ir::{EdiError, ErrorKind, ErrorLocation};

/// Errors that can occur in the pipeline
#[derive(Error, Debug)]
pub enum Error {
    #[error("Pipeline error during {operation} for '{target}': {message}")]
    Pipeline {
        operation: String,
        target: String,
        message: String,
    },

    #[error("Streaming error: {0}")]
    Streaming(String),

    #[error("IO error during {operation} for '{path}': {message}")]
    Io {
        operation: String,
        path: String,
        message: String,
    },

    #[error(transparent)]
    Adapter(#[from] x12_adapter::Error),

    #[error(transparent)]
    Schema(#[from] x12_schema::Error),

    #[error(transparent)]
    Mapping(#[from] x12_mapping::Error),

    #[error(transparent)]
    Validation(#[from] x12_validation::Error),
}

impl Error {
    /// Create a structured pipeline error with operation/target context.
    pub fn pipeline(
        operation: impl Into<String>,
        target: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Pipeline {
            operation: operation.into(),
            target: target.into(),
            message: message.into(),
        }
    }

    /// Create a structured I/O error with operation/path context.
    pub fn io(
        operation: impl Into<String>,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Io {
            operation: operation.into(),
            path: path.into(),
            message: message.into(),
        }
    }

    /// Whether the document could not be processed at all
    ///
    /// Delimiter detection failures, cancellation and I/O errors abort a
    /// document; everything else is a failure of one request.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Adapter(e) => e.is_fatal(),
            Self::Io { .. } => true,
            _ => false,
        }
    }

    /// Convert into a diagnostic record.
    #[must_use]
    pub fn diagnostic(&self) -> EdiError {
        match self {
            Self::Pipeline {
                operation, target, ..
            } => EdiError::new(ErrorKind::Structure, "PIPELINE_ERROR", self.to_string())
                .with_context("operation", operation.clone())
                .with_context("target", target.clone()),
            Self::Streaming(_) => {
                EdiError::new(ErrorKind::Resource, "STREAMING_ERROR", self.to_string())
            }
            Self::Io { path, .. } => EdiError::new(ErrorKind::Io, "IO_ERROR", self.to_string())
                .with_location(ErrorLocation::new().with_file(path.clone())),
            Self::Adapter(e) => e.diagnostic(),
            Self::Schema(e) => e.diagnostic(),
            Self::Mapping(e) => e.diagnostic(),
            Self::Validation(e) => e.diagnostic(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::io("io", "<unknown>", e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_error_preserves_operation_and_target() {
        let error = Error::pipeline("build", "204", "no functional identifier");
        match &error {
            Error::Pipeline {
                operation,
                target,
                message,
            } => {
                assert_eq!(operation, "build");
                assert_eq!(target, "204");
                assert_eq!(message, "no functional identifier");
            }
            _ => panic!("expected pipeline variant"),
        }
        assert!(!error.is_fatal());
        assert_eq!(error.diagnostic().code, "PIPELINE_ERROR");
    }

    #[test]
    fn test_io_error_from_std_error_has_fallback_context() {
        let io_error = std::fs::File::open("/path/that/does/not/exist")
            .map_err(Error::from)
            .expect_err("open should fail");

        match &io_error {
            Error::Io {
                operation,
                path,
                message,
            } => {
                assert_eq!(operation, "io");
                assert_eq!(path, "<unknown>");
                assert!(!message.is_empty());
            }
            _ => panic!("expected io variant"),
        }
        assert!(io_error.is_fatal());
    }

    #[test]
    fn test_delimiter_failure_is_fatal() {
        let error = Error::from(x12_adapter::Error::delimiter_detect("no ISA header"));
        assert!(error.is_fatal());
        assert_eq!(error.diagnostic().kind, ErrorKind::Delimiter);
    }
}
