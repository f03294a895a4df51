//! Built-in segment bundle
//!
//! Covers the envelope segments, the 204 load tender body and the
//! 997/999 acknowledgment segments. The same definitions are registered
//! for 004010 and 005010.

use crate::loader::{FileFormat, SchemaLoader};
use crate::model::SegmentSchema;
use crate::Result;

const CORE_BUNDLE: &str = include_str!("../schemas/x12_core.json");

/// Versions the built-in bundle is registered under
pub const BUILTIN_VERSIONS: &[&str] = &["004010", "005010"];

/// Parse the built-in bundle for one version
///
/// # Errors
///
/// Returns an error only if the embedded bundle is malformed.
pub fn core_segments(version: &str) -> Result<Vec<SegmentSchema>> {
    let mut schemas = SchemaLoader::parse(CORE_BUNDLE, FileFormat::Json, "x12_core.json", version)?;
    for schema in &mut schemas {
        schema.version = version.to_string();
    }
    Ok(schemas)
}
