//! Raw segments as produced by the scanner
#![allow(clippy::must_use_candidate)] // Accessors are clear at call sites without #[must_use].

use serde::{Deserialize, Serialize};

use crate::Delimiters;

/// A segment split into elements and components, untouched by any schema
///
/// Each element holds at least one component. Simple elements are a
/// single-component vector, so `elements[i][0]` is always valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSegment {
    /// Segment identifier, e.g. `ST`
    pub tag: String,

    /// Elements after the tag; element 1 is `elements[0]`
    pub elements: Vec<Vec<String>>,

    /// 0-based position within the scan
    pub index: usize,
}

impl RawSegment {
    /// Create a segment from simple (single-component) element values
    pub fn new<S: Into<String>>(
        tag: impl Into<String>,
        elements: impl IntoIterator<Item = S>,
        index: usize,
    ) -> Self {
        Self {
            tag: tag.into(),
            elements: elements.into_iter().map(|e| vec![e.into()]).collect(),
            index,
        }
    }

    /// Create a segment from pre-split elements
    pub fn from_components(tag: impl Into<String>, elements: Vec<Vec<String>>, index: usize) -> Self {
        Self {
            tag: tag.into(),
            elements,
            index,
        }
    }

    /// Value of a 1-based element position (its first component)
    ///
    /// Returns an empty string for positions beyond the segment, which is how
    /// X12 treats omitted trailing elements.
    pub fn element(&self, position: usize) -> &str {
        self.component(position, 1)
    }

    /// Value of a 1-based element and 1-based component position
    pub fn component(&self, position: usize, component: usize) -> &str {
        if position == 0 || component == 0 {
            return "";
        }
        self.elements
            .get(position - 1)
            .and_then(|c| c.get(component - 1))
            .map_or("", String::as_str)
    }

    /// All components of a 1-based element position
    pub fn components(&self, position: usize) -> &[String] {
        position
            .checked_sub(1)
            .and_then(|i| self.elements.get(i))
            .map_or(&[], Vec::as_slice)
    }

    /// Check if an element is a composite with more than one component
    pub fn is_composite(&self, position: usize) -> bool {
        self.components(position).len() > 1
    }

    /// Number of elements after the tag
    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    /// Check the tag ignoring ASCII case
    pub fn is(&self, tag: &str) -> bool {
        self.tag.eq_ignore_ascii_case(tag)
    }

    /// Encode the segment with the given separators, without the terminator
    pub fn encode(&self, delimiters: &Delimiters) -> String {
        let element = delimiters.element_char();
        let component = delimiters.component_char();
        let mut out = self.tag.clone();
        for comps in &self.elements {
            out.push(element);
            for (i, c) in comps.iter().enumerate() {
                if i > 0 {
                    out.push(component);
                }
                out.push_str(c);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b2() -> RawSegment {
        RawSegment::new("B2", ["", "TEST", "", "SHIP123", "", "PP"], 3)
    }

    #[test]
    fn test_element_access() {
        let seg = b2();
        assert_eq!(seg.element(2), "TEST");
        assert_eq!(seg.element(1), "");
        assert_eq!(seg.element(6), "PP");
        assert_eq!(seg.element(7), "");
        assert_eq!(seg.element(0), "");
        assert_eq!(seg.element_count(), 6);
    }

    #[test]
    fn test_composite_access() {
        let seg = RawSegment::from_components(
            "SV1",
            vec![vec!["HC".into(), "99213".into()], vec!["40".into()]],
            0,
        );
        assert!(seg.is_composite(1));
        assert!(!seg.is_composite(2));
        assert_eq!(seg.component(1, 2), "99213");
        assert_eq!(seg.component(1, 3), "");
        assert_eq!(seg.components(5).len(), 0);
    }

    #[test]
    fn test_encode_keeps_interior_empties() {
        let seg = b2();
        assert_eq!(seg.encode(&Delimiters::default()), "B2**TEST**SHIP123**PP");
    }

    #[test]
    fn test_encode_with_alternate_delimiters() {
        let seg = RawSegment::from_components(
            "SV1",
            vec![vec!["HC".into(), "99213".into()], vec!["40".into()]],
            0,
        );
        let d = Delimiters::new(b'`', b'<', b'~').unwrap();
        assert_eq!(seg.encode(&d), "SV1`HC<99213`40");
    }

    #[test]
    fn test_tag_match_ignores_case() {
        assert!(b2().is("b2"));
        assert!(!b2().is("B2A"));
    }
}
