//! X12 separator set
//!
//! An interchange declares its separators in the ISA header. The element
//! separator is the byte after `ISA`, the component separator is ISA16 and
//! the segment terminator follows ISA16. 005010 interchanges may also carry
//! a repetition separator in ISA11.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Default element separator
pub const DEFAULT_ELEMENT_SEPARATOR: u8 = b'*';
/// Default component separator
pub const DEFAULT_COMPONENT_SEPARATOR: u8 = b'>';
/// Default segment terminator
pub const DEFAULT_SEGMENT_TERMINATOR: u8 = b'~';

/// Separators used to read and write one interchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delimiters {
    /// Element separator (default '*')
    pub element: u8,
    /// Component separator (default '>')
    pub component: u8,
    /// Segment terminator (default '~')
    pub segment: u8,
    /// Repetition separator, only present for 005010 and later
    pub repetition: Option<u8>,
}

impl Default for Delimiters {
    fn default() -> Self {
        Self {
            element: DEFAULT_ELEMENT_SEPARATOR,
            component: DEFAULT_COMPONENT_SEPARATOR,
            segment: DEFAULT_SEGMENT_TERMINATOR,
            repetition: None,
        }
    }
}

impl Delimiters {
    /// Create a validated separator set without a repetition separator
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDelimiters`] when a separator is zero or two
    /// separators share a byte.
    pub fn new(element: u8, component: u8, segment: u8) -> Result<Self> {
        let delimiters = Self {
            element,
            component,
            segment,
            repetition: None,
        };
        delimiters.validate()?;
        Ok(delimiters)
    }

    /// Attach a repetition separator
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDelimiters`] when the repetition separator
    /// collides with another separator.
    pub fn with_repetition(mut self, repetition: u8) -> Result<Self> {
        self.repetition = if repetition == 0 {
            None
        } else {
            Some(repetition)
        };
        self.validate()?;
        Ok(self)
    }

    /// Check that element and segment are set and all present separators are distinct
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDelimiters`] describing the first violation.
    pub fn validate(&self) -> Result<()> {
        if self.element == 0 {
            return Err(Error::invalid_delimiters("element separator is not set"));
        }
        if self.segment == 0 {
            return Err(Error::invalid_delimiters("segment terminator is not set"));
        }

        let mut present = vec![
            ("element", self.element),
            ("segment", self.segment),
        ];
        if self.component != 0 {
            present.push(("component", self.component));
        }
        if let Some(rep) = self.repetition {
            present.push(("repetition", rep));
        }

        for (i, (name_a, a)) in present.iter().enumerate() {
            for (name_b, b) in &present[i + 1..] {
                if a == b {
                    return Err(Error::invalid_delimiters(format!(
                        "{} and {} separators are both {:?}",
                        name_a,
                        name_b,
                        char::from(*a)
                    )));
                }
            }
        }

        Ok(())
    }

    /// Check if a byte is one of the active separators
    pub fn is_special(&self, byte: u8) -> bool {
        byte == self.element
            || byte == self.segment
            || (self.component != 0 && byte == self.component)
            || self.repetition == Some(byte)
    }

    /// Element separator as a char
    pub fn element_char(&self) -> char {
        char::from(self.element)
    }

    /// Component separator as a char
    pub fn component_char(&self) -> char {
        char::from(self.component)
    }

    /// Segment terminator as a char
    pub fn segment_char(&self) -> char {
        char::from(self.segment)
    }
}
