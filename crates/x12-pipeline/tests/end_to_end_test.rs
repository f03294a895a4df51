//! End-to-end integration tests for x12-pipeline

use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use serde_json::json;
use tempfile::NamedTempFile;

use x12_adapter::{AckType, SequentialControlNumbers};
use x12_ir::{CancellationToken, IssueLevel};
use x12_pipeline::{BuildOptions, Error, ParseOptions, Pipeline, PipelineConfig};
use x12_schema::{PartnerProfile, ValidationLevel};

const TENDER_BODY: [&str; 5] = [
    "B2**TEST**SHIP123**PP",
    "N1*SH*ACME",
    "N1*CN*BETA",
    "S5*1*CL",
    "S5*2*CU",
];

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn pipeline() -> Pipeline {
    init_tracing();
    Pipeline::with_defaults()
        .unwrap()
        .with_control_numbers(Arc::new(SequentialControlNumbers::new()))
}

/// ST..SE with a correct SE01
fn transaction(control: &str, body: &[&str]) -> String {
    let mut out = format!("ST*204*{control}~");
    for segment in body {
        out.push_str(segment);
        out.push('~');
    }
    out.push_str(&format!("SE*{}*{control}~", body.len() + 2));
    out
}

fn interchange(version: &str, transactions: &[String]) -> String {
    let isa_version = &version[..5];
    let mut out = format!(
        "ISA*00*          *00*          *ZZ*SENDER         *ZZ*RECEIVER       \
*240101*1200*U*{isa_version}*000000001*0*P*>~GS*SM*SENDER*RECEIVER*20240101*1200*1*X*{version}~"
    );
    for tx in transactions {
        out.push_str(tx);
    }
    out.push_str(&format!("GE*{}*1~IEA*1*000000001~", transactions.len()));
    out
}

fn valid_204() -> String {
    interchange("004010", &[transaction("0001", &TENDER_BODY)])
}

fn tender_without(tag_and_code: &str) -> String {
    let body: Vec<&str> = TENDER_BODY
        .iter()
        .copied()
        .filter(|s| !s.starts_with(tag_and_code))
        .collect();
    interchange("004010", &[transaction("0001", &body)])
}

fn ack_lines(edi: &str) -> Vec<String> {
    edi.split('~')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn tender_object() -> serde_json::Value {
    json!({
        "shipment": {"scac": "TEST", "shipment_id": "SHIP123", "payment_method": "PP"},
        "parties": [
            {"entity_code": "SH", "name": "ACME"},
            {"entity_code": "CN", "name": "BETA"}
        ],
        "stops": [
            {"stop_number": 1, "reason_code": "CL"},
            {"stop_number": 2, "reason_code": "CU"}
        ]
    })
}

#[test]
fn test_valid_tender_is_accepted() -> Result<()> {
    let p = pipeline();
    let result = p.parse(valid_204().as_bytes(), &ParseOptions::new().with_ack(true))?;

    assert!(result.is_valid);
    assert!(result.issues().is_empty(), "unexpected issues: {:?}", result.issues());

    let ack = result.ack.as_ref().expect("ack requested");
    assert_eq!(ack.ack_type, AckType::Functional997);
    let lines = ack_lines(&ack.edi);
    assert!(lines.iter().any(|l| l.starts_with("ST*997*")));
    for expected in ["AK1*SM*1", "AK2*204*0001", "AK5*A", "AK9*A*1*1*1"] {
        assert!(lines.contains(&expected.to_string()), "missing {expected} in {lines:?}");
    }
    assert_eq!(result.ack_segments().len(), lines.len());

    let object = result.business_objects().next().expect("mapped object");
    assert_eq!(object["shipment"]["shipment_id"], "SHIP123");
    assert_eq!(result.timing.segment_count, 11);
    assert_eq!(result.timing.transaction_count, 1);
    Ok(())
}

#[test]
fn test_missing_consignee_is_rejected() -> Result<()> {
    let p = pipeline();
    let options = ParseOptions::new()
        .with_level(ValidationLevel::Strict)
        .with_ack(true);
    let result = p.parse(tender_without("N1*CN").as_bytes(), &options)?;

    assert!(!result.is_valid);
    let issue = result
        .issues()
        .iter()
        .find(|i| i.code() == "MISSING_CONSIGNEE")
        .expect("consignee issue");
    assert_eq!(issue.level(), IssueLevel::Business);

    let lines = ack_lines(result.ack_edi().expect("ack requested"));
    assert!(lines.contains(&"AK5*E".to_string()));
    assert!(lines.contains(&"AK9*E*1*1*0".to_string()));
    Ok(())
}

#[test]
fn test_single_stop_is_insufficient() -> Result<()> {
    let p = pipeline();
    let result = p.parse(tender_without("S5*2").as_bytes(), &ParseOptions::new())?;

    let issue = result
        .issues()
        .iter()
        .find(|i| i.code() == "INSUFFICIENT_LOOP_OCCURRENCES")
        .expect("loop issue");
    assert_eq!(issue.location().loop_id.as_deref(), Some("S5"));
    assert!(issue.message().contains("minimum 2"), "{}", issue.message());
    assert!(!result.is_valid);
    Ok(())
}

#[test]
fn test_custom_delimiters_round_trip() -> Result<()> {
    let p = pipeline();
    p.profiles().insert(PartnerProfile::new("BACKTICK", '`', '<', '~'))?;

    let object = tender_object();
    let built = p.build(&object, &BuildOptions::new("204").for_partner("BACKTICK"))?;
    assert!(built.edi.contains("ST`204"), "{}", built.edi);
    assert!(built.edi.starts_with("ISA`"));
    assert_eq!(built.interchange_control, "000000001");
    assert_eq!(built.version, "004010");

    let parsed = p.parse(built.edi.as_bytes(), &ParseOptions::new().for_partner("BACKTICK"))?;
    assert_eq!(parsed.document.delimiters.element, b'`');
    assert!(parsed.is_valid, "unexpected issues: {:?}", parsed.issues());
    assert!(parsed.profile.is_some());

    let back = parsed.business_objects().next().expect("mapped object");
    assert_eq!(back["shipment"], object["shipment"]);
    for (item, original) in back["parties"]
        .as_array()
        .expect("parties")
        .iter()
        .zip(object["parties"].as_array().expect("parties"))
    {
        assert_eq!(item["entity_code"], original["entity_code"]);
        assert_eq!(item["name"], original["name"]);
    }
    let stops: Vec<i64> = back["stops"]
        .as_array()
        .expect("stops")
        .iter()
        .filter_map(|s| s["stop_number"].as_i64())
        .collect();
    assert_eq!(stops, [1, 2]);
    Ok(())
}

#[test]
fn test_partial_acceptance_in_999() -> Result<()> {
    let p = pipeline();
    let mut bad_body = TENDER_BODY.to_vec();
    bad_body[0] = "B2**TEST**SHIP124";
    let text = interchange(
        "005010",
        &[transaction("0001", &TENDER_BODY), transaction("0002", &bad_body)],
    );
    let options = ParseOptions::new()
        .with_level(ValidationLevel::Strict)
        .with_ack(true);
    let result = p.parse(text.as_bytes(), &options)?;
    assert!(!result.is_valid);
    let issue = result
        .issues()
        .iter()
        .find(|i| i.code() == "ELEM_MISSING")
        .expect("missing payment method");
    assert!(issue.is_error());
    assert_eq!(issue.location().element_position, Some(6));

    let ack = result.ack.as_ref().expect("ack requested");
    assert_eq!(ack.ack_type, AckType::Implementation999);
    let lines = ack_lines(&ack.edi);
    for expected in ["IK3*B2*2**8", "IK4*6*146*1", "AK9*P*2*2*1"] {
        assert!(lines.contains(&expected.to_string()), "missing {expected} in {lines:?}");
    }
    let outcomes: Vec<&str> = lines
        .iter()
        .filter(|l| l.starts_with("IK5*"))
        .map(String::as_str)
        .collect();
    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0], "IK5*A");
    assert!(outcomes[1].starts_with("IK5*R"));
    Ok(())
}

#[test]
fn test_forced_strict_rejects_invalid_code() -> Result<()> {
    let p = pipeline();
    let mut bad_body = TENDER_BODY.to_vec();
    bad_body[0] = "B2**TEST**SHIP124**XX";
    let text = interchange(
        "005010",
        &[transaction("0001", &TENDER_BODY), transaction("0002", &bad_body)],
    );
    let options = ParseOptions::new()
        .with_level(ValidationLevel::Strict)
        .with_ack(true);
    let result = p.parse(text.as_bytes(), &options)?;
    assert!(!result.is_valid);
    let issue = result
        .issues()
        .iter()
        .find(|i| i.code() == "ELEM_INVALID_CODE_VALUE")
        .expect("invalid code issue");
    assert!(issue.is_error());

    let ack = result.ack.as_ref().expect("ack requested");
    assert_eq!(ack.ack_type, AckType::Implementation999);
    assert_eq!(ack.transactions_included, 2);
    assert_eq!(ack.transactions_accepted, 1);

    let lines = ack_lines(&ack.edi);
    assert!(lines.contains(&"IK3*B2*2**8".to_string()), "{lines:?}");
    assert!(
        lines.iter().any(|l| l.starts_with("IK4*6*") && l.ends_with("*XX")),
        "{lines:?}"
    );
    let outcomes: Vec<&str> = lines
        .iter()
        .filter(|l| l.starts_with("IK5*"))
        .map(String::as_str)
        .collect();
    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0], "IK5*A");
    assert!(outcomes[1].starts_with("IK5*R"));
    assert!(lines.contains(&"AK9*P*2*2*1".to_string()));
    Ok(())
}

#[test]
fn test_unrecognizable_input_is_fatal() {
    let p = pipeline();
    let err = p.parse(b"HELLO", &ParseOptions::new()).unwrap_err();
    assert!(matches!(
        err,
        Error::Adapter(x12_adapter::Error::DelimiterDetect { .. })
    ));
    assert!(err.is_fatal());
    assert_eq!(err.diagnostic().code, "DELIMITER_DETECT");
}

#[test]
fn test_parse_file() -> Result<()> {
    let p = pipeline();
    let mut file = NamedTempFile::new()?;
    file.write_all(valid_204().as_bytes())?;

    let result = p.parse_file(file.path(), &ParseOptions::new())?;
    assert!(result.is_valid);

    let err = p
        .parse_file(file.path().with_extension("missing"), &ParseOptions::new())
        .unwrap_err();
    assert!(matches!(err, Error::Io { .. }));
    Ok(())
}

#[test]
fn test_auto_acknowledge_profile() -> Result<()> {
    let p = pipeline();
    let mut profile = PartnerProfile::new("AUTO", '*', '>', '~');
    profile.communication.auto_acknowledge = true;
    profile.format.line_ending = "LF".to_string();
    p.profiles().insert(profile)?;

    let result = p.parse(valid_204().as_bytes(), &ParseOptions::new().for_partner("AUTO"))?;
    let edi = result.ack_edi().expect("profile acknowledges");
    assert!(edi.contains("~\n"));
    Ok(())
}

#[test]
fn test_lenient_pipeline_default() -> Result<()> {
    init_tracing();
    let config = PipelineConfig {
        validation_level: ValidationLevel::Lenient,
        ..PipelineConfig::default()
    };
    let p = Pipeline::new(config)?;
    let result = p.parse(tender_without("S5*2").as_bytes(), &ParseOptions::new())?;
    let issue = result
        .issues()
        .iter()
        .find(|i| i.code() == "INSUFFICIENT_LOOP_OCCURRENCES")
        .expect("loop issue");
    assert!(issue.is_warning());
    Ok(())
}

#[test]
fn test_cancelled_parse() {
    let p = pipeline();
    let token = CancellationToken::new();
    token.cancel();
    let err = p
        .parse(valid_204().as_bytes(), &ParseOptions::new().with_cancellation(token))
        .unwrap_err();
    assert!(err.is_fatal());
}

#[test]
fn test_build_rejects_missing_required_field() {
    let p = pipeline();
    let mut object = tender_object();
    object["shipment"]
        .as_object_mut()
        .expect("shipment")
        .remove("shipment_id");
    let err = p.build(&object, &BuildOptions::new("204")).unwrap_err();
    assert!(matches!(err, Error::Mapping(_)));
}

#[test]
fn test_built_interchange_uses_engine_defaults() -> Result<()> {
    let p = pipeline();
    let built = p.build(&tender_object(), &BuildOptions::new("204").with_control_number("0042"))?;
    let lines = ack_lines(&built.edi);
    assert!(lines[1].starts_with("GS*SM*SENDER*RECEIVER*"));
    assert_eq!(lines[2], "ST*204*0042");
    assert!(lines.contains(&"SE*7*0042".to_string()));
    assert_eq!(lines.last().map(String::as_str), Some("IEA*1*000000001"));

    let parsed = p.parse(built.edi.as_bytes(), &ParseOptions::new())?;
    assert!(parsed.is_valid, "unexpected issues: {:?}", parsed.issues());
    Ok(())
}
