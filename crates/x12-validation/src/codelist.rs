//! Code list validation
//!
//! Identifier elements carry the codes their schema allows. A customer
//! overlay may narrow an element to its own list of allowed codes, which
//! then replaces the schema list for membership while descriptions still
//! come from the schema.

use x12_schema::{CodeValidationConfig, CodeValue, ComponentSchema, ElementSchema};

/// Codes allowed at one element or component position
#[derive(Debug, Clone)]
pub struct CodeList<'a> {
    /// Data element reference, e.g. `146`
    pub name: &'a str,
    codes: Vec<&'a str>,
    described: &'a [CodeValue],
}

impl<'a> CodeList<'a> {
    /// Code list of an element schema
    #[must_use]
    pub fn for_element(element: &'a ElementSchema) -> Self {
        Self {
            name: &element.ref_id,
            codes: element.codes.iter().map(|c| c.code.as_str()).collect(),
            described: &element.codes,
        }
    }

    /// Code list of a component schema
    #[must_use]
    pub fn for_component(component: &'a ComponentSchema) -> Self {
        Self {
            name: &component.ref_id,
            codes: component.codes.iter().map(|c| c.code.as_str()).collect(),
            described: &component.codes,
        }
    }

    /// Replace membership with an overlay's allowed codes
    ///
    /// An empty list keeps the schema codes.
    #[must_use]
    pub fn restricted_to(mut self, allowed: &'a [String]) -> Self {
        if !allowed.is_empty() {
            self.codes = allowed.iter().map(String::as_str).collect();
        }
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    /// Check a value against the list
    #[must_use]
    pub fn check(&self, value: &str, config: &CodeValidationConfig) -> CodeListResult {
        if self.codes.is_empty() || !config.should_validate(value) {
            return CodeListResult::Skipped;
        }
        match self.codes.iter().find(|code| config.matches(value, code)) {
            Some(code) => CodeListResult::Valid {
                description: self
                    .described
                    .iter()
                    .find(|c| c.code.eq_ignore_ascii_case(code))
                    .map(|c| c.description.clone())
                    .filter(|d| !d.is_empty()),
            },
            None => CodeListResult::Invalid {
                code: value.to_string(),
                list_name: self.name.to_string(),
            },
        }
    }

    /// Allowed codes joined for messages, e.g. `CC, PP, TP`
    #[must_use]
    pub fn display(&self) -> String {
        self.codes.join(", ")
    }
}

/// Validation result for code list checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeListResult {
    /// Code is valid
    Valid { description: Option<String> },
    /// Code is invalid
    Invalid { code: String, list_name: String },
    /// No list, or the value is too short to validate
    Skipped,
}

impl CodeListResult {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !matches!(self, Self::Invalid { .. })
    }

    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        match self {
            Self::Invalid { code, list_name } => {
                Some(format!("Code '{code}' is not valid for element {list_name}"))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use x12_schema::{DataType, Requirement};

    fn payment_method() -> ElementSchema {
        ElementSchema::new(6, "146", "Shipment Method of Payment")
            .with_type(DataType::Identifier)
            .with_requirement(Requirement::Mandatory)
            .with_length(2, 2)
            .with_codes(vec![
                CodeValue::new("CC", "Collect"),
                CodeValue::new("PP", "Prepaid (by Seller)"),
                CodeValue::new("TP", "Third Party Pay"),
            ])
    }

    #[test]
    fn test_valid_code_carries_description() {
        let element = payment_method();
        let result = CodeList::for_element(&element).check("PP", &CodeValidationConfig::default());
        assert_eq!(
            result,
            CodeListResult::Valid {
                description: Some("Prepaid (by Seller)".into())
            }
        );
    }

    #[test]
    fn test_invalid_code() {
        let element = payment_method();
        let result = CodeList::for_element(&element).check("XX", &CodeValidationConfig::default());
        assert!(!result.is_valid());
        assert_eq!(
            result.error_message().as_deref(),
            Some("Code 'XX' is not valid for element 146")
        );
    }

    #[test]
    fn test_case_sensitivity() {
        let element = payment_method();
        let list = CodeList::for_element(&element);
        assert!(list.check("pp", &CodeValidationConfig::default()).is_valid());

        let strict = CodeValidationConfig {
            case_sensitive: true,
            ..CodeValidationConfig::default()
        };
        assert!(!list.check("pp", &strict).is_valid());
    }

    #[test]
    fn test_partial_match() {
        let element = payment_method();
        let list = CodeList::for_element(&element);
        let partial = CodeValidationConfig {
            allow_partial_matches: true,
            ..CodeValidationConfig::default()
        };
        assert!(list.check("P", &partial).is_valid());
        assert!(!list.check("P", &CodeValidationConfig::default()).is_valid());
    }

    #[test]
    fn test_short_values_and_empty_lists_are_skipped() {
        let element = payment_method();
        let config = CodeValidationConfig {
            min_length_to_validate: 3,
            ..CodeValidationConfig::default()
        };
        assert_eq!(CodeList::for_element(&element).check("XX", &config), CodeListResult::Skipped);

        let free_text = ElementSchema::new(4, "145", "Shipment Identification Number");
        let list = CodeList::for_element(&free_text);
        assert!(list.is_empty());
        assert_eq!(list.check("ANY", &CodeValidationConfig::default()), CodeListResult::Skipped);
    }

    #[test]
    fn test_overlay_restriction() {
        let element = payment_method();
        let allowed = vec!["PP".to_string()];
        let list = CodeList::for_element(&element).restricted_to(&allowed);
        assert_eq!(list.len(), 1);
        assert_eq!(list.display(), "PP");
        assert!(!list.check("CC", &CodeValidationConfig::default()).is_valid());
        assert!(matches!(
            list.check("PP", &CodeValidationConfig::default()),
            CodeListResult::Valid { description: Some(_) }
        ));

        let unrestricted = CodeList::for_element(&element).restricted_to(&[]);
        assert_eq!(unrestricted.len(), 3);
    }
}
