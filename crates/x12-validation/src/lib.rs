#![deny(warnings)]
#![deny(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

//! # x12-validation
//!
//! Schema-driven segment processing and staged validation for X12.
//!
//! A [`SegmentProcessor`] turns raw segments into processed segments with
//! loop positions, element values and code descriptions. A [`Validator`]
//! then runs the syntactic, structural, element, conditional and business
//! stages with strictness resolved per transaction from its config, the
//! partner profile and the customer overlay.
//!
//! ## Example Usage
//!
//! ```rust
//! use x12_adapter::X12Parser;
//!
//! let text = "ISA*00*          *00*          *ZZ*SENDER         *ZZ*RECEIVER       \
//!             *240101*1200*U*00401*000000001*0*P*>~\
//!             GS*SM*SENDER*RECEIVER*20240101*1200*1*X*004010~\
//!             ST*204*0001~B2**TEST**SHIP123**PP~N1*SH*ACME~N1*CN*BETA~\
//!             S5*1*CL~S5*2*CU~SE*7*0001~GE*1*1~IEA*1*000000001~";
//! let doc = X12Parser::new().parse(text.as_bytes()).unwrap();
//!
//! let report = x12_validation::validate(&doc).unwrap();
//! assert!(report.is_valid());
//! ```

/// Code list membership checks.
pub mod codelist;
/// Staged validator.
pub mod engine;
/// Loop position tracking and schema-driven segment processing.
pub mod processor;
/// Validation reports and stages.
pub mod reporter;
/// Length, format and conditional element rules.
pub mod rules;

pub use codelist::{CodeList, CodeListResult};
pub use engine::{Validator, DEFAULT_VERSION};
pub use processor::{PositionTracker, SegmentProcessor, DEFAULT_LOOP_STARTS};
pub use reporter::{Stage, TransactionReport, ValidationReport};
pub use rules::{
    trigger_matches, validate_conditional, validate_data_type, validate_length,
    ConditionalViolation, RuleResult,
};

use std::sync::Arc;

use thiserror::Error;
use x12_ir::{EdiError, ErrorKind};
use x12_schema::{ConfigStore, SchemaRegistry};

/// Errors that can occur during validation
#[derive(Error, Debug)]
pub enum Error {
    #[error("Document has no segments")]
    EmptyDocument,

    #[error(transparent)]
    Schema(#[from] x12_schema::Error),
}

impl Error {
    /// Convert into a diagnostic record.
    #[must_use]
    pub fn diagnostic(&self) -> EdiError {
        match self {
            Self::EmptyDocument => {
                EdiError::new(ErrorKind::Structure, "EMPTY_DOCUMENT", self.to_string())
            }
            Self::Schema(e) => e.diagnostic(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Validate a document against the built-in schemas and standard configs
///
/// # Errors
///
/// Returns an error when the built-in registry cannot load or the document
/// is empty.
pub fn validate(doc: &x12_ir::Document) -> Result<ValidationReport> {
    let registry = SchemaRegistry::with_builtin()?;
    let configs = ConfigStore::with_standard_configs()?;
    Validator::new(registry.snapshot()?, Arc::new(configs)).validate(doc)
}
