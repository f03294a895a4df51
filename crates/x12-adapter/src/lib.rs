#![deny(warnings)]
#![deny(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

//! # x12-adapter
//!
//! X12 wire handling.
//!
//! This crate detects delimiters from the ISA header, scans segments lazily
//! from any [`std::io::BufRead`], pairs ST/SE into transaction blocks under
//! their GS/GE and ISA/IEA envelopes, writes segments back out, and builds
//! 997/999 functional acknowledgments inside swapped envelopes.

/// 997/999 acknowledgment builder.
pub mod ack;
/// ISA/GS envelope records, control numbers and envelope checks.
pub mod envelopes;
/// Streaming segment scanner and batch scanner.
pub mod parser;
/// Segment writer.
pub mod serializer;
/// Transaction, group and interchange block detection.
pub mod splitter;
/// Delimiter detection from the ISA header.
pub mod syntax;

pub use ack::{AckBuilder, AckOutput, AckType};
pub use envelopes::{
    check_envelopes, system_clock, Clock, ControlNumberGenerator, EnvelopeWriter, GroupHeader,
    InterchangeHeader, SequentialControlNumbers, TimestampControlNumbers,
};
pub use parser::{BatchScanner, SegmentScanner, X12Parser};
pub use serializer::X12Serializer;
pub use splitter::{split, GroupBlock, InterchangeBlock, SplitResult, TxBlock};
pub use syntax::detect_delimiters;

use thiserror::Error;
use x12_ir::{EdiError, ErrorKind, ErrorLocation, RecoverySuggestion};

/// Errors raised while reading or writing X12 on the wire
#[derive(Error, Debug)]
pub enum Error {
    #[error("Delimiter detection failed: {reason}")]
    DelimiterDetect { reason: String },

    #[error("Scan error at segment {index}: {message}")]
    Scan { index: usize, message: String },

    #[error("Cannot write {tag} (segment {index}): {message}")]
    Serialize {
        tag: String,
        index: usize,
        message: String,
    },

    #[error("Envelope error: {0}")]
    Envelope(String),

    #[error("Control number error: {0}")]
    ControlNumber(String),

    #[error("Acknowledgment error: {0}")]
    Ack(String),

    #[error("Processing cancelled after {segments} segments")]
    Cancelled { segments: usize },

    #[error(transparent)]
    Ir(#[from] x12_ir::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build a delimiter detection failure.
    pub fn delimiter_detect(reason: impl Into<String>) -> Self {
        Self::DelimiterDetect {
            reason: reason.into(),
        }
    }

    /// Build a scan error for a segment index.
    pub fn scan(index: usize, message: impl Into<String>) -> Self {
        Self::Scan {
            index,
            message: message.into(),
        }
    }

    /// Build an envelope error.
    pub fn envelope(message: impl Into<String>) -> Self {
        Self::Envelope(message.into())
    }

    /// Build an acknowledgment error.
    pub fn ack(message: impl Into<String>) -> Self {
        Self::Ack(message.into())
    }

    /// Fatal failures abort the current document.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::DelimiterDetect { .. } | Self::Cancelled { .. } | Self::Io(_)
        )
    }

    /// Convert into a diagnostic record.
    #[must_use]
    pub fn diagnostic(&self) -> EdiError {
        match self {
            Self::DelimiterDetect { reason } => EdiError::delimiter_detect(reason.clone()),
            Self::Scan { index, .. } => {
                EdiError::new(ErrorKind::Syntax, "SCAN_ERROR", self.to_string())
                    .with_location(ErrorLocation::new().with_segment_index(*index))
            }
            Self::Serialize { tag, index, .. } => {
                EdiError::new(ErrorKind::Value, "SERIALIZE_ERROR", self.to_string())
                    .with_location(ErrorLocation::new().with_segment(tag.clone(), *index))
            }
            Self::Envelope(_) => EdiError::new(ErrorKind::Structure, "ENVELOPE_ERROR", self.to_string())
                .with_suggestion(RecoverySuggestion::new(
                    "check envelope",
                    "Every ISA needs an IEA and every GS a GE with matching control numbers",
                )),
            Self::ControlNumber(_) => {
                EdiError::new(ErrorKind::Resource, "CONTROL_NUMBER_ERROR", self.to_string())
            }
            Self::Ack(_) => EdiError::new(ErrorKind::Structure, "ACK_ERROR", self.to_string()),
            Self::Cancelled { segments } => {
                EdiError::cancelled().with_context("segments", segments.to_string())
            }
            Self::Ir(err) => err.diagnostic(),
            Self::Io(_) => EdiError::new(ErrorKind::Io, "IO_ERROR", self.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
