//! Load tender mapping and business rules against the shipped 204 config.

use std::sync::Arc;

use anyhow::Result;
use serde_json::json;
use x12_ir::IssueLevel;
use x12_mapping::{business_view, evaluate_rules, Mapper};
use x12_schema::standard_configs::example_204_config;
use x12_schema::{ElementValue, ProcessedSegment, SegmentPosition, SegmentSchema};

fn segment(tag: &str, index: usize, values: &[&str]) -> ProcessedSegment {
    let schema = Arc::new(SegmentSchema::new(tag, tag, "004010"));
    let mut seg = ProcessedSegment::new(
        schema,
        SegmentPosition {
            index,
            ..SegmentPosition::default()
        },
    );
    for (i, v) in values.iter().enumerate() {
        if !v.is_empty() {
            seg.set(i + 1, ElementValue::Simple((*v).to_string()));
        }
    }
    seg
}

#[test]
fn test_complete_tender_passes_business_rules() -> Result<()> {
    let config = Arc::new(example_204_config()?);
    let mapper = Mapper::new(config.clone());
    let segments = vec![
        segment("B2", 3, &["", "TEST", "", "SHIP123", "", "PP"]),
        segment("N1", 4, &["SH", "ACME"]),
        segment("N1", 5, &["CN", "BETA"]),
        segment("S5", 6, &["1", "CL"]),
        segment("S5", 7, &["2", "CU"]),
    ];
    let obj = mapper.parse(&segments)?;
    let issues = evaluate_rules(&config.validation_rules, &obj, IssueLevel::Business);
    assert!(issues.is_empty(), "{issues:?}");
    Ok(())
}

#[test]
fn test_missing_consignee_and_stops_fire() -> Result<()> {
    let config = Arc::new(example_204_config()?);
    let mapper = Mapper::new(config.clone());
    let segments = vec![
        segment("B2", 3, &["", "TEST", "", "SHIP123", "", "PP"]),
        segment("N1", 4, &["SF", "ACME"]),
        segment("S5", 5, &["1", "CL"]),
    ];
    let obj = mapper.parse(&segments)?;
    let issues = evaluate_rules(&config.validation_rules, &obj, IssueLevel::Business);
    let codes: Vec<&str> = issues.iter().map(|i| i.code()).collect();
    assert_eq!(codes, ["MISSING_CONSIGNEE", "INSUFFICIENT_STOPS"]);
    assert!(issues.iter().all(|i| i.level() == IssueLevel::Business));
    Ok(())
}

#[test]
fn test_business_object_survives_build_and_parse() -> Result<()> {
    let mapper = Mapper::new(Arc::new(example_204_config()?));
    let original = json!({
        "shipment": {"scac": "TEST", "shipment_id": "SHIP123", "payment_method": "PP"},
        "parties": [
            {"entity_code": "SH", "name": "ACME", "address_line1": "1 MAIN ST", "city": "DALLAS", "state": "TX"},
            {"entity_code": "CN", "name": "BETA"}
        ],
        "stops": [
            {"stop_number": 1, "reason_code": "CL", "date_qualifier": "10", "date": "2024-01-15", "time_qualifier": "Y", "time": "08:30"},
            {"stop_number": 2, "reason_code": "CU"}
        ]
    });

    let built = mapper.build(&original)?;
    let processed: Vec<ProcessedSegment> = built
        .iter()
        .enumerate()
        .map(|(i, raw)| {
            let values: Vec<&str> = (1..=raw.elements.len()).map(|p| raw.element(p)).collect();
            segment(&raw.tag, i + 3, &values)
        })
        .collect();
    let parsed = mapper.parse(&processed)?;
    assert_eq!(business_view(&parsed), original);
    Ok(())
}
