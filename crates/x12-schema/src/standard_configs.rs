//! Ready-made transaction configurations
//!
//! The 204 load tender and 997 acknowledgment configurations ship with the
//! crate so an engine can parse and build without any files on disk.

use crate::config::TransactionConfig;
use crate::{Error, Result};

const LOAD_TENDER_204: &str = include_str!("../configs/204_004010.json");
const FUNCTIONAL_ACK_997: &str = include_str!("../configs/997_004010.json");

/// 204 Motor Carrier Load Tender, 004010
///
/// # Errors
///
/// Returns an error only if the embedded document is malformed.
pub fn example_204_config() -> Result<TransactionConfig> {
    parse("204_004010.json", LOAD_TENDER_204)
}

/// 997 Functional Acknowledgment, 004010
///
/// # Errors
///
/// Returns an error only if the embedded document is malformed.
pub fn example_997_config() -> Result<TransactionConfig> {
    parse("997_004010.json", FUNCTIONAL_ACK_997)
}

/// Both standard configs under every built-in version
///
/// # Errors
///
/// Returns an error only if an embedded document is malformed.
pub fn standard_configs() -> Result<Vec<TransactionConfig>> {
    let mut out = Vec::new();
    for base in [example_204_config()?, example_997_config()?] {
        for version in crate::builtin::BUILTIN_VERSIONS {
            let mut config = base.clone();
            config.version = (*version).to_string();
            out.push(config);
        }
    }
    Ok(out)
}

fn parse(name: &str, content: &str) -> Result<TransactionConfig> {
    serde_json::from_str(content).map_err(|e| Error::invalid_format(name, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{Condition, ConditionOp};

    #[test]
    fn test_204_structure() {
        let config = example_204_config().unwrap();
        assert_eq!(config.key(), "204:004010");

        let s5 = config.loop_started_by("S5").unwrap();
        assert_eq!((s5.min_occurs, s5.max_occurs), (2, 999));
        let n1 = config.loop_started_by("N1").unwrap();
        assert_eq!(n1.member_tags(), vec!["N1", "N3", "N4", "G61"]);
        assert_eq!(config.loop_containing("G62").unwrap().loop_id, "S5");

        let b2 = config.outbound_mapping("B2").unwrap();
        let payment = b2.elements.iter().find(|e| e.element_position == 6).unwrap();
        assert!(payment.required);
        assert_eq!(payment.validation.as_deref(), Some("^(CC|PP|TP|DC)$"));
    }

    #[test]
    fn test_204_rules() {
        let config = example_204_config().unwrap();
        let codes: Vec<&str> = config
            .validation_rules
            .iter()
            .map(|r| r.error_code.as_str())
            .collect();
        assert_eq!(codes, vec!["MISSING_SHIPPER", "MISSING_CONSIGNEE", "INSUFFICIENT_STOPS"]);
        assert_eq!(
            config.validation_rules[1].condition,
            Condition::predicate(ConditionOp::NotExists, "N1[01=CN]", None)
        );

        let b2a = &config.structure.conditional_segments[0];
        assert_eq!(b2a.segment_id, "B2A");
        assert!(matches!(b2a.condition, Condition::All(ref items) if items.len() == 2));
    }

    #[test]
    fn test_997_structure() {
        let config = example_997_config().unwrap();
        let required: Vec<&str> = config
            .structure
            .required_segments
            .iter()
            .map(|s| s.segment_id.as_str())
            .collect();
        assert_eq!(required, vec!["ST", "AK1", "AK9", "SE"]);
        assert_eq!(
            config.loop_started_by("AK2").unwrap().member_tags(),
            vec!["AK2", "AK3", "AK4", "AK5"]
        );
    }

    #[test]
    fn test_standard_configs_cover_builtin_versions() {
        let keys: Vec<String> = standard_configs().unwrap().iter().map(TransactionConfig::key).collect();
        assert_eq!(keys, vec!["204:004010", "204:005010", "997:004010", "997:005010"]);
    }
}
