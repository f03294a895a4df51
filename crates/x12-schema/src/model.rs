//! Segment schema model
#![allow(clippy::must_use_candidate)] // Accessors are clear at call sites without #[must_use].
#![allow(clippy::return_self_not_must_use)] // Builder methods return Self for chaining.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// X12 element data type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DataType {
    /// `AN`
    Alphanumeric,
    /// `ID`
    Identifier,
    /// `DT`
    Date,
    /// `TM`
    Time,
    /// `N` / `N0`
    Numeric,
    /// `N1`..`N9`, the digit count after the implied decimal point
    ImpliedDecimal(u8),
    /// `R`
    Decimal,
    /// `B`
    Binary,
}

impl DataType {
    /// Short X12 code
    pub fn code(self) -> String {
        match self {
            Self::Alphanumeric => "AN".into(),
            Self::Identifier => "ID".into(),
            Self::Date => "DT".into(),
            Self::Time => "TM".into(),
            Self::Numeric => "N0".into(),
            Self::ImpliedDecimal(d) => format!("N{d}"),
            Self::Decimal => "R".into(),
            Self::Binary => "B".into(),
        }
    }

    /// Check if values must consist of digits only
    pub fn is_integral(self) -> bool {
        matches!(self, Self::Numeric | Self::ImpliedDecimal(_))
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let parsed = match upper.as_str() {
            "AN" | "ALPHANUMERIC" | "STRING" => Self::Alphanumeric,
            "ID" | "IDENTIFIER" => Self::Identifier,
            "DT" | "DATE" => Self::Date,
            "TM" | "TIME" => Self::Time,
            "N" | "N0" | "NUMERIC" => Self::Numeric,
            "R" | "DECIMAL" | "REAL" => Self::Decimal,
            "B" | "BINARY" => Self::Binary,
            "NUMERIC_IMPLIED" | "NUMERIC-WITH-IMPLIED-DECIMAL" => Self::ImpliedDecimal(2),
            other => {
                let digits = other
                    .strip_prefix('N')
                    .and_then(|d| d.parse::<u8>().ok())
                    .filter(|d| *d <= 9);
                match digits {
                    Some(d) => Self::ImpliedDecimal(d),
                    None => return Err(format!("unknown data type '{s}'")),
                }
            }
        };
        Ok(parsed)
    }
}

impl TryFrom<String> for DataType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DataType> for String {
    fn from(value: DataType) -> Self {
        value.code()
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code())
    }
}

/// Element requirement designator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Requirement {
    Mandatory,
    Optional,
    Conditional,
    NotUsed,
}

impl FromStr for Requirement {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "m" | "mandatory" | "required" => Ok(Self::Mandatory),
            "o" | "optional" | "" => Ok(Self::Optional),
            "x" | "c" | "conditional" => Ok(Self::Conditional),
            "n" | "not_used" | "not-used" | "notused" => Ok(Self::NotUsed),
            _ => Err(format!("unknown requirement '{s}'")),
        }
    }
}

impl TryFrom<String> for Requirement {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Requirement> for String {
    fn from(value: Requirement) -> Self {
        match value {
            Requirement::Mandatory => "M",
            Requirement::Optional => "O",
            Requirement::Conditional => "X",
            Requirement::NotUsed => "N",
        }
        .to_string()
    }
}

/// Permitted value of an identifier element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeValue {
    pub code: String,
    #[serde(default)]
    pub description: String,
}

impl CodeValue {
    pub fn new(code: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            description: description.into(),
        }
    }
}

/// One component of a composite element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentSchema {
    /// 1-based component position
    pub position: usize,
    pub ref_id: String,
    pub name: String,
    pub data_type: DataType,
    pub requirement: Requirement,
    pub min_length: usize,
    pub max_length: usize,
    pub codes: Vec<CodeValue>,
}

/// One element of a segment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementSchema {
    /// 1-based element position
    pub position: usize,
    /// Data element reference number, e.g. `146`
    pub ref_id: String,
    pub name: String,
    pub data_type: DataType,
    pub requirement: Requirement,
    pub min_length: usize,
    pub max_length: usize,
    pub repeat: usize,
    pub description: String,
    pub codes: Vec<CodeValue>,
    pub components: Vec<ComponentSchema>,
    /// Free-form syntax notes carried from the schema file
    pub rules: Vec<String>,
}

impl ElementSchema {
    /// Create an optional alphanumeric element
    pub fn new(position: usize, ref_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            position,
            ref_id: ref_id.into(),
            name: name.into(),
            data_type: DataType::Alphanumeric,
            requirement: Requirement::Optional,
            min_length: 0,
            max_length: 0,
            repeat: 1,
            description: String::new(),
            codes: Vec::new(),
            components: Vec::new(),
            rules: Vec::new(),
        }
    }

    pub fn with_type(mut self, data_type: DataType) -> Self {
        self.data_type = data_type;
        self
    }

    pub fn with_requirement(mut self, requirement: Requirement) -> Self {
        self.requirement = requirement;
        self
    }

    pub fn with_length(mut self, min: usize, max: usize) -> Self {
        self.min_length = min;
        self.max_length = max;
        self
    }

    pub fn with_codes(mut self, codes: Vec<CodeValue>) -> Self {
        self.codes = codes;
        self
    }

    pub fn is_mandatory(&self) -> bool {
        self.requirement == Requirement::Mandatory
    }

    pub fn is_composite(&self) -> bool {
        !self.components.is_empty()
    }

    pub fn has_codes(&self) -> bool {
        !self.codes.is_empty()
    }

    /// Look up a code by exact value
    pub fn code(&self, value: &str) -> Option<&CodeValue> {
        self.codes.iter().find(|c| c.code == value)
    }
}

/// Schema for one segment tag in one version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentSchema {
    /// Upper-case segment tag
    pub tag: String,
    pub name: String,
    pub purpose: String,
    pub version: String,
    /// Suggested position within its transaction
    pub position: Option<u32>,
    /// Loop the segment normally starts or belongs to
    pub loop_id: Option<String>,
    pub min_use: usize,
    pub max_use: Option<usize>,
    pub elements: Vec<ElementSchema>,
    /// Synthesized for a tag the registry does not know
    pub is_unknown: bool,
}

impl SegmentSchema {
    pub fn new(tag: impl Into<String>, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_uppercase(),
            name: name.into(),
            purpose: String::new(),
            version: version.into(),
            position: None,
            loop_id: None,
            min_use: 0,
            max_use: None,
            elements: Vec::new(),
            is_unknown: false,
        }
    }

    /// Minimal schema for a tag with no registered definition
    pub fn unknown(tag: &str, version: &str) -> Self {
        let mut schema = Self::new(tag, format!("Unknown Segment {tag}"), version);
        schema.is_unknown = true;
        schema
    }

    pub fn with_elements(mut self, elements: Vec<ElementSchema>) -> Self {
        self.elements = elements;
        self
    }

    pub fn with_loop(mut self, loop_id: impl Into<String>) -> Self {
        self.loop_id = Some(loop_id.into());
        self
    }

    /// Element schema at a 1-based position
    pub fn element(&self, position: usize) -> Option<&ElementSchema> {
        self.elements.iter().find(|e| e.position == position)
    }

    /// Highest declared element position
    pub fn max_position(&self) -> usize {
        self.elements.iter().map(|e| e.position).max().unwrap_or(0)
    }

    /// Check that element positions run 1..N without gaps or repeats
    ///
    /// # Errors
    ///
    /// Returns a description of the first gap or duplicate.
    pub fn check_positions(&self) -> std::result::Result<(), String> {
        for (i, element) in self.elements.iter().enumerate() {
            if element.position != i + 1 {
                return Err(format!(
                    "{}: element {} declared at position {}, expected {}",
                    self.tag,
                    element.ref_id,
                    element.position,
                    i + 1
                ));
            }
        }
        Ok(())
    }

    /// Element key in `<TAG><NN>` form
    pub fn element_key(&self, position: usize) -> String {
        element_key(&self.tag, position)
    }
}

/// Element key in `<TAG><NN>` form, e.g. `B206`
pub fn element_key(tag: &str, position: usize) -> String {
    format!("{tag}{position:02}")
}

/// Component key in `C<MM>` form, e.g. `C02`
pub fn component_key(position: usize) -> String {
    format!("C{position:02}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_parsing() {
        assert_eq!("AN".parse::<DataType>().unwrap(), DataType::Alphanumeric);
        assert_eq!("id".parse::<DataType>().unwrap(), DataType::Identifier);
        assert_eq!("N0".parse::<DataType>().unwrap(), DataType::Numeric);
        assert_eq!("N2".parse::<DataType>().unwrap(), DataType::ImpliedDecimal(2));
        assert_eq!("date".parse::<DataType>().unwrap(), DataType::Date);
        assert_eq!("R".parse::<DataType>().unwrap(), DataType::Decimal);
        assert!("XYZ".parse::<DataType>().is_err());
        assert!(DataType::ImpliedDecimal(2).is_integral());
        assert!(!DataType::Decimal.is_integral());
    }

    #[test]
    fn test_requirement_parsing() {
        assert_eq!("M".parse::<Requirement>().unwrap(), Requirement::Mandatory);
        assert_eq!("mandatory".parse::<Requirement>().unwrap(), Requirement::Mandatory);
        assert_eq!("X".parse::<Requirement>().unwrap(), Requirement::Conditional);
        assert_eq!("not-used".parse::<Requirement>().unwrap(), Requirement::NotUsed);
        assert!("Q".parse::<Requirement>().is_err());
    }

    #[test]
    fn test_unknown_schema() {
        let schema = SegmentSchema::unknown("ZZZ", "004010");
        assert!(schema.is_unknown);
        assert_eq!(schema.name, "Unknown Segment ZZZ");
        assert!(schema.elements.is_empty());
    }

    #[test]
    fn test_position_check() {
        let ok = SegmentSchema::new("n1", "Name", "004010").with_elements(vec![
            ElementSchema::new(1, "98", "Entity Identifier Code"),
            ElementSchema::new(2, "93", "Name"),
        ]);
        assert_eq!(ok.tag, "N1");
        assert!(ok.check_positions().is_ok());
        assert_eq!(ok.max_position(), 2);
        assert_eq!(ok.element_key(2), "N102");

        let gap = SegmentSchema::new("N1", "Name", "004010").with_elements(vec![
            ElementSchema::new(1, "98", "Entity Identifier Code"),
            ElementSchema::new(3, "66", "Qualifier"),
        ]);
        assert!(gap.check_positions().is_err());
    }

    #[test]
    fn test_code_lookup() {
        let el = ElementSchema::new(6, "146", "Shipment Method of Payment")
            .with_type(DataType::Identifier)
            .with_codes(vec![CodeValue::new("PP", "Prepaid"), CodeValue::new("CC", "Collect")]);
        assert!(el.has_codes());
        assert_eq!(el.code("PP").map(|c| c.description.as_str()), Some("Prepaid"));
        assert!(el.code("pp").is_none());
        assert_eq!(component_key(3), "C03");
    }
}
