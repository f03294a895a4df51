//! Segments after schema processing
#![allow(clippy::must_use_candidate)] // Accessors are clear at call sites without #[must_use].

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use x12_ir::ValidationIssue;

use crate::model::{component_key, element_key, SegmentSchema};

/// Value stored under an element key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ElementValue {
    Simple(String),
    /// Component key (`C01`) to value
    Composite(BTreeMap<String, String>),
}

impl ElementValue {
    /// Scalar view; a composite yields its first component
    pub fn as_str(&self) -> &str {
        match self {
            Self::Simple(v) => v,
            Self::Composite(map) => map.get(&component_key(1)).map_or("", String::as_str),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Simple(v) => v.is_empty(),
            Self::Composite(map) => map.values().all(String::is_empty),
        }
    }
}

/// Where a segment sits in the interchange
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentPosition {
    /// 0-based scan index
    pub index: usize,
    /// 1-based line, one segment per line
    pub line: usize,
    pub loop_id: Option<String>,
    /// Iteration of `loop_id`, starting at 1
    pub loop_iteration: usize,
    pub parent_loop: Option<String>,
    /// ST02 of the enclosing transaction
    pub transaction_id: Option<String>,
    /// GS06 of the enclosing group
    pub group_id: Option<String>,
    /// ISA13 of the enclosing interchange
    pub interchange_id: Option<String>,
}

/// A raw segment read through its schema
#[derive(Debug, Clone)]
pub struct ProcessedSegment {
    pub schema: Arc<SegmentSchema>,
    pub tag: String,
    /// Element key (`B206`) to value; at most one value per key
    pub elements: BTreeMap<String, ElementValue>,
    /// Element key to code description for matched code values
    pub descriptions: BTreeMap<String, String>,
    pub position: SegmentPosition,
    pub issues: Vec<ValidationIssue>,
    pub partner_id: Option<String>,
}

impl ProcessedSegment {
    pub fn new(schema: Arc<SegmentSchema>, position: SegmentPosition) -> Self {
        Self {
            tag: schema.tag.clone(),
            schema,
            elements: BTreeMap::new(),
            descriptions: BTreeMap::new(),
            position,
            issues: Vec::new(),
            partner_id: None,
        }
    }

    /// Store a value, replacing any previous value for the position
    pub fn set(&mut self, position: usize, value: ElementValue) {
        self.elements.insert(element_key(&self.tag, position), value);
    }

    pub fn element(&self, position: usize) -> Option<&ElementValue> {
        self.elements.get(&element_key(&self.tag, position))
    }

    /// Scalar value of a 1-based position, empty when absent
    pub fn value(&self, position: usize) -> &str {
        self.element(position).map_or("", ElementValue::as_str)
    }

    /// Component value of a 1-based element and component position
    pub fn component(&self, position: usize, component: usize) -> &str {
        match self.element(position) {
            Some(ElementValue::Composite(map)) => {
                map.get(&component_key(component)).map_or("", String::as_str)
            }
            Some(ElementValue::Simple(v)) if component == 1 => v,
            _ => "",
        }
    }

    /// Code description attached during processing
    pub fn description(&self, position: usize) -> Option<&str> {
        self.descriptions
            .get(&element_key(&self.tag, position))
            .map(String::as_str)
    }

    pub fn index(&self) -> usize {
        self.position.index
    }

    pub fn is_unknown(&self) -> bool {
        self.schema.is_unknown
    }

    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(ValidationIssue::is_error)
    }
}
