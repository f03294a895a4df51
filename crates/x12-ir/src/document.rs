//! Document container for one scanned interchange
#![allow(clippy::must_use_candidate)] // Accessors are clear at call sites without #[must_use].
#![allow(clippy::return_self_not_must_use)] // Fluent setters are designed for chaining.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{Delimiters, Error, RawSegment, Result};

/// Ordered segments of an interchange plus envelope metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Segments in source order
    pub segments: Vec<RawSegment>,

    /// Separators the segments were read with
    pub delimiters: Delimiters,

    /// Envelope metadata taken from ISA, GS and the first ST
    pub metadata: DocumentMetadata,
}

/// Envelope values of a document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// ISA06, trimmed
    pub sender_id: String,

    /// ISA08, trimmed
    pub receiver_id: String,

    /// ISA05 sender qualifier
    pub sender_qualifier: String,

    /// ISA07 receiver qualifier
    pub receiver_qualifier: String,

    /// ISA13
    pub isa_control_number: String,

    /// GS06 of the first group
    pub group_control_number: String,

    /// GS01 of the first group
    pub functional_id: String,

    /// ST01 of the first transaction
    pub transaction_set_id: String,

    /// ST02 of the first transaction
    pub st_control_number: String,

    /// GS08 when present, otherwise ISA12 widened to six digits
    pub version: String,

    /// ISA12 as written
    pub interchange_version: String,

    /// ISA15 usage indicator
    pub usage_indicator: String,
}

impl DocumentMetadata {
    /// Extract envelope values from a segment list
    pub fn extract(segments: &[RawSegment]) -> Self {
        let mut meta = Self::default();
        for seg in segments {
            match seg.tag.as_str() {
                "ISA" if meta.isa_control_number.is_empty() => {
                    meta.sender_qualifier = seg.element(5).trim().to_string();
                    meta.sender_id = seg.element(6).trim().to_string();
                    meta.receiver_qualifier = seg.element(7).trim().to_string();
                    meta.receiver_id = seg.element(8).trim().to_string();
                    meta.interchange_version = seg.element(12).trim().to_string();
                    meta.isa_control_number = seg.element(13).trim().to_string();
                    meta.usage_indicator = seg.element(15).trim().to_string();
                }
                "GS" if meta.group_control_number.is_empty() => {
                    meta.functional_id = seg.element(1).to_string();
                    meta.group_control_number = seg.element(6).to_string();
                    meta.version = seg.element(8).to_string();
                }
                "ST" if meta.st_control_number.is_empty() => {
                    meta.transaction_set_id = seg.element(1).to_string();
                    meta.st_control_number = seg.element(2).to_string();
                }
                _ => {}
            }
        }
        if meta.version.is_empty() && !meta.interchange_version.is_empty() {
            meta.version = format!("{}0", meta.interchange_version);
        }
        meta
    }

    /// Six-digit version prefix, e.g. `005010` for `005010X210`
    pub fn base_version(&self) -> &str {
        self.version.get(..6).unwrap_or(&self.version)
    }
}

impl Document {
    /// Create a document and extract its metadata
    pub fn new(segments: Vec<RawSegment>, delimiters: Delimiters) -> Self {
        let metadata = DocumentMetadata::extract(&segments);
        trace!(
            "Document built with {} segments, ISA13={}",
            segments.len(),
            metadata.isa_control_number
        );
        Self {
            segments,
            delimiters,
            metadata,
        }
    }

    /// Replace the metadata
    pub fn with_metadata(mut self, metadata: DocumentMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Number of segments
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Check if the document has no segments
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Segment at a 0-based index
    ///
    /// # Errors
    ///
    /// Returns [`Error::SegmentOutOfRange`] for an index past the end.
    pub fn segment(&self, index: usize) -> Result<&RawSegment> {
        self.segments.get(index).ok_or(Error::SegmentOutOfRange {
            index,
            len: self.segments.len(),
        })
    }

    /// First segment with a tag
    pub fn find(&self, tag: &str) -> Option<&RawSegment> {
        self.segments.iter().find(|s| s.is(tag))
    }

    /// Last segment with a tag
    pub fn find_last(&self, tag: &str) -> Option<&RawSegment> {
        self.segments.iter().rev().find(|s| s.is(tag))
    }

    /// Tags in source order
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().map(|s| s.tag.as_str())
    }

    /// Check ISA/IEA framing
    ///
    /// The first segment must be ISA, the last non-empty tag must be IEA,
    /// and ISA13 must equal IEA02.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFraming`] describing the first violation.
    pub fn check_framing(&self) -> Result<()> {
        let first = self
            .segments
            .first()
            .ok_or_else(|| Error::invalid_framing("document has no segments"))?;
        if !first.is("ISA") {
            return Err(Error::invalid_framing(format!(
                "first segment is {} instead of ISA",
                first.tag
            )));
        }
        let last = self
            .segments
            .iter()
            .rev()
            .find(|s| !s.tag.is_empty())
            .ok_or_else(|| Error::invalid_framing("document has no tagged segments"))?;
        if !last.is("IEA") {
            return Err(Error::invalid_framing(format!(
                "last segment is {} instead of IEA",
                last.tag
            )));
        }
        let isa13 = first.element(13).trim();
        let iea02 = last.element(2).trim();
        if isa13 != iea02 {
            return Err(Error::invalid_framing(format!(
                "ISA13 {isa13} does not match IEA02 {iea02}"
            )));
        }
        Ok(())
    }
}
