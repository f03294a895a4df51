#![deny(warnings)]
#![deny(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

//! # x12-schema
//!
//! Versioned segment schemas, partner profiles and transaction
//! configurations for the X12 engine.
//!
//! Schemas are loaded from `<base>/<version>/segments/*.json` (or YAML, or
//! a single bundle document) into a [`SchemaRegistry`] whose readers always
//! see a consistent snapshot. Partner profiles and transaction
//! configurations live in concurrent stores keyed by partner id and by
//! `type:version`. Validation settings from those layers are folded into a
//! [`ResolvedValidation`] per transaction.

/// Built-in segment bundle for 004010 and 005010.
pub mod builtin;
/// Recursive condition trees used by business rules and conditional segments.
pub mod condition;
/// Transaction configurations, customer overlays and the config store.
pub mod config;
/// Schema file formats and directory loading.
pub mod loader;
/// Segment and element schema model.
pub mod model;
/// Schema-processed segment records.
pub mod processed;
/// Partner profiles and the profile store.
pub mod profile;
/// Snapshot-consistent schema registry.
pub mod registry;
/// Layered validation configuration resolution.
pub mod resolve;
/// Ready-made 204 and 997 transaction configurations.
pub mod standard_configs;
/// Strictness levels and fine-grained validation toggles.
pub mod validation;

pub use condition::{Condition, ConditionOp};
pub use config::{
    ConditionalRule, ConditionalSegment, ConfigStore, CustomerOverlay, Direction, ElementMapping,
    ElementOverlay, LoopDefinition, LoopRequirement, MustBe, RuleRequirement, RuleTrigger,
    SegmentMapping, SegmentOverlay, SegmentRequirement, TransactionConfig, TransactionStructure,
    TransformationRule, TriggerOp, ValidationRule,
};
pub use loader::SchemaLoader;
pub use model::{CodeValue, ComponentSchema, DataType, ElementSchema, Requirement, SegmentSchema};
pub use processed::{ElementValue, ProcessedSegment, SegmentPosition};
pub use profile::{PartnerProfile, ProfileStore, TransactionSupport};
pub use registry::{RegistrySnapshot, SchemaRegistry};
pub use resolve::{ElementRule, ResolvedValidation};
pub use validation::{
    Check, CheckOutcome, CodeHandling, CodeValidationConfig, ElementValidationConfig,
    ValidationConfig, ValidationLevel, ValidationOverrides,
};

use x12_ir::{EdiError, ErrorKind, ErrorLocation, RecoverySuggestion};

use thiserror::Error;

/// Errors that can occur when working with schemas, profiles and configs
#[derive(Error, Debug)]
pub enum Error {
    #[error("Schema not found for segment {tag} in version {version}")]
    NotFound { version: String, tag: String },

    #[error("Transaction configuration not found: {key}")]
    ConfigNotFound { key: String },

    #[error("Partner profile not found: {partner_id}")]
    ProfileNotFound { partner_id: String },

    #[error("Invalid schema format in {source_name}: {message}")]
    InvalidFormat {
        source_name: String,
        message: String,
    },

    #[error("Invalid partner profile {partner_id}: {reason}")]
    InvalidProfile { partner_id: String, reason: String },

    #[error("Invalid configuration {key}: {reason}")]
    InvalidConfig { key: String, reason: String },

    #[error("Registry lock poisoned during {operation}")]
    LockPoisoned { operation: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build a schema-not-found error.
    pub fn not_found(version: impl Into<String>, tag: impl Into<String>) -> Self {
        Self::NotFound {
            version: version.into(),
            tag: tag.into(),
        }
    }

    /// Build an invalid-format error for a named source.
    pub fn invalid_format(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Build an invalid-profile error.
    pub fn invalid_profile(partner_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidProfile {
            partner_id: partner_id.into(),
            reason: reason.into(),
        }
    }

    /// Build an invalid-config error.
    pub fn invalid_config(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Build a lock-poisoned error.
    pub fn lock_poisoned(operation: impl Into<String>) -> Self {
        Self::LockPoisoned {
            operation: operation.into(),
        }
    }

    /// Convert into a diagnostic record.
    #[must_use]
    pub fn diagnostic(&self) -> EdiError {
        match self {
            Self::NotFound { tag, .. } => {
                EdiError::new(ErrorKind::Dependency, "SCHEMA_NOT_FOUND", self.to_string())
                    .with_context("segment", tag.clone())
            }
            Self::ConfigNotFound { key } => {
                EdiError::new(ErrorKind::Dependency, "CONFIG_NOT_FOUND", self.to_string())
                    .with_context("config", key.clone())
                    .with_suggestion(RecoverySuggestion::new(
                        "Register a transaction configuration",
                        "Load a config for this transaction type and version into the config store",
                    ))
            }
            Self::ProfileNotFound { partner_id } => {
                EdiError::new(ErrorKind::Dependency, "PROFILE_NOT_FOUND", self.to_string())
                    .with_context("partner", partner_id.clone())
            }
            Self::InvalidFormat { source_name, .. } => {
                EdiError::new(ErrorKind::Format, "INVALID_SCHEMA", self.to_string())
                    .with_location(ErrorLocation::new().with_file(source_name.clone()))
            }
            Self::InvalidProfile { partner_id, .. } => {
                EdiError::new(ErrorKind::Consistency, "INVALID_PROFILE", self.to_string())
                    .with_context("partner", partner_id.clone())
            }
            Self::InvalidConfig { key, .. } => {
                EdiError::new(ErrorKind::Consistency, "INVALID_CONFIG", self.to_string())
                    .with_context("config", key.clone())
            }
            Self::LockPoisoned { .. } => {
                EdiError::new(ErrorKind::Resource, "LOCK_POISONED", self.to_string())
            }
            Self::Io(_) => EdiError::new(ErrorKind::Io, "IO_ERROR", self.to_string()),
        }
    }
}

/// Crate-local result type for schema operations.
pub type Result<T> = std::result::Result<T, Error>;
