//! Functional acknowledgments
//!
//! A 997 answers 004010-class interchanges and a 999 answers 005010 and
//! later. Both carry one acknowledgment transaction set per original
//! functional group, inside an interchange whose sender and receiver are
//! swapped relative to the original.
//!
//! Issues are attributed to transactions by segment index. Segment-level
//! detail (AK3/IK3) is grouped per erroneous segment with its position
//! counted from ST = 1; issues without a segment tag, or located at index 0,
//! only affect the transaction and group status codes.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::{debug, info};
use x12_ir::{Delimiters, Document, IssueLevel, RawSegment, ValidationIssue};

use crate::envelopes::{
    system_clock, Clock, ControlNumberGenerator, EnvelopeWriter, GroupHeader, InterchangeHeader,
    TimestampControlNumbers,
};
use crate::serializer::X12Serializer;
use crate::splitter::{split, GroupBlock, TxBlock};
use crate::{Error, Result};

/// Implementation convention written into 999 ST03 and AK2 when the
/// original transaction carries none
pub const DEFAULT_IMPLEMENTATION: &str = "005010";

/// Most IK5 error codes a single transaction may report
pub const MAX_IK5_CODES: usize = 5;

/// Acknowledgment transaction set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AckType {
    /// 997 functional acknowledgment
    Functional997,
    /// 999 implementation acknowledgment
    Implementation999,
}

impl AckType {
    /// 999 for 005010 and later, otherwise 997
    ///
    /// Accepts GS08-style (`004010`, `005010X210`) and ISA12-style (`00401`)
    /// versions.
    pub fn for_version(version: &str) -> Self {
        let digits: String = version.chars().take(6).collect();
        let normalized = format!("{digits:0<6}");
        if normalized.as_str() >= "005010" {
            Self::Implementation999
        } else {
            Self::Functional997
        }
    }

    pub fn set_id(self) -> &'static str {
        match self {
            Self::Functional997 => "997",
            Self::Implementation999 => "999",
        }
    }
}

impl fmt::Display for AckType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.set_id())
    }
}

impl FromStr for AckType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "997" => Ok(Self::Functional997),
            "999" => Ok(Self::Implementation999),
            other => Err(Error::ack(format!("unknown acknowledgment type '{other}'"))),
        }
    }
}

// ============================================================================
// Code Tables
// ============================================================================

/// AK304/IK304 segment syntax error code
pub fn segment_error_code(code: &str) -> &'static str {
    match code {
        "SEG_UNRECOGNIZED" => "1",
        "SEG_UNEXPECTED" => "2",
        "SEG_MISSING" | "MISSING_REQUIRED_SEGMENT" => "3",
        "SEG_LOOP_ERROR" | "EXCESSIVE_LOOP_OCCURRENCES" => "4",
        "SEG_NOT_IN_POSITION" | "SEG_EXCEEDS_MAXIMUM_USE" => "5",
        "SEG_NOT_IN_DEFINED" => "6",
        "SEG_NOT_IN_PROPER" => "7",
        _ => "8",
    }
}

/// AK403/IK403 element syntax error code
pub fn element_error_code(code: &str) -> &'static str {
    match code {
        "ELEM_MISSING" => "1",
        "ELEM_CONDITIONAL_MISSING" => "2",
        "ELEM_TOO_SHORT" => "3",
        "ELEM_TOO_LONG" => "4",
        "ELEM_INVALID_CODE" => "5",
        "ELEM_INVALID_CHAR" => "6",
        "ELEM_INVALID_CODE_VALUE" => "7",
        "ELEM_INVALID_DATE" => "8",
        "ELEM_INVALID_TIME" => "9",
        "ELEM_EXCLUSION_CONDITION" => "10",
        _ => "12",
    }
}

/// AK905 functional group syntax error code
pub fn group_error_code(code: &str) -> Option<&'static str> {
    match code {
        "GROUP_CONTROL_MISMATCH" => Some("1"),
        "GROUP_VERSION_UNSUPPORTED" => Some("2"),
        "GROUP_TRAILER_MISSING" => Some("3"),
        "GROUP_CONTROL_NUMBER_MISMATCH" => Some("4"),
        "GROUP_COUNT_MISMATCH" => Some("5"),
        "GROUP_CONTROL_NUMBER_DUP" => Some("6"),
        _ => None,
    }
}

/// IK502 transaction set syntax error code
pub fn transaction_error_code(issue: &ValidationIssue) -> Option<&'static str> {
    match issue.code() {
        "UNSUPPORTED_TRANSACTION" => Some("1"),
        "TRANSACTION_TRAILER_MISSING" => Some("2"),
        "TRANSACTION_CONTROL_MISMATCH" => Some("3"),
        "SEGMENT_COUNT_MISMATCH" => Some("4"),
        _ if matches!(issue.level(), IssueLevel::Segment | IssueLevel::Element) => Some("5"),
        _ => None,
    }
}

// ============================================================================
// Builder
// ============================================================================

/// A generated acknowledgment interchange
#[derive(Debug, Clone)]
pub struct AckOutput {
    pub ack_type: AckType,
    /// Serialized interchange
    pub edi: String,
    pub segments: Vec<RawSegment>,
    /// ISA13 of the acknowledgment
    pub interchange_control: String,
    /// GS06 of the acknowledgment
    pub group_control: String,
    /// Transactions acknowledged across all groups
    pub transactions_included: usize,
    pub transactions_accepted: usize,
}

/// Builds 997/999 interchanges from a document and its issues
///
/// The builder is stateless apart from its control number source and can
/// be shared between threads.
#[derive(Clone)]
pub struct AckBuilder {
    control_numbers: Arc<dyn ControlNumberGenerator>,
    clock: Clock,
    delimiters: Option<Delimiters>,
    ack_type: Option<AckType>,
    line_ending: String,
    pad: char,
}

impl fmt::Debug for AckBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AckBuilder")
            .field("delimiters", &self.delimiters)
            .field("ack_type", &self.ack_type)
            .field("line_ending", &self.line_ending)
            .finish_non_exhaustive()
    }
}

impl Default for AckBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AckBuilder {
    /// Timestamp control numbers and the system clock
    pub fn new() -> Self {
        Self {
            control_numbers: Arc::new(TimestampControlNumbers::new()),
            clock: system_clock(),
            delimiters: None,
            ack_type: None,
            line_ending: String::new(),
            pad: ' ',
        }
    }

    #[must_use]
    pub fn with_control_numbers(mut self, generator: Arc<dyn ControlNumberGenerator>) -> Self {
        self.control_numbers = generator;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Write with these separators instead of the document's own
    #[must_use]
    pub fn with_delimiters(mut self, delimiters: Delimiters) -> Self {
        self.delimiters = Some(delimiters);
        self
    }

    /// Force a 997 or 999 regardless of the interchange version
    #[must_use]
    pub fn with_ack_type(mut self, ack_type: AckType) -> Self {
        self.ack_type = Some(ack_type);
        self
    }

    #[must_use]
    pub fn with_line_ending(mut self, line_ending: impl Into<String>) -> Self {
        self.line_ending = line_ending.into();
        self
    }

    #[must_use]
    pub fn with_pad_character(mut self, pad: char) -> Self {
        self.pad = pad;
        self
    }

    /// Acknowledge every functional group of a document
    ///
    /// # Errors
    ///
    /// Fails when the document has no ISA or no GS, when control numbers
    /// cannot be issued, or when the output cannot be serialized.
    pub fn build(&self, document: &Document, issues: &[ValidationIssue]) -> Result<AckOutput> {
        let isa = document
            .find("ISA")
            .ok_or_else(|| Error::ack("document has no ISA segment"))?;
        let interchange = InterchangeHeader::from_segment(isa)?;
        let blocks = split(&document.segments);
        let groups: Vec<&GroupBlock> = blocks.groups().collect();
        let first = groups
            .first()
            .ok_or_else(|| Error::ack("document has no functional group"))?;
        let original_gs = GroupHeader::from_segment(&document.segments[first.gs_index])?;

        let version = if original_gs.version.is_empty() {
            document.metadata.version.as_str()
        } else {
            original_gs.version.as_str()
        };
        let ack_type = self.ack_type.unwrap_or_else(|| AckType::for_version(version));
        let delimiters = self.delimiters.unwrap_or(document.delimiters);

        let now = (self.clock)();
        let interchange_control = self.control_numbers.next_interchange()?;
        let group_control = self.control_numbers.next_group()?;

        let out_isa = interchange
            .swapped()
            .stamped(now, interchange_control.clone());
        let mut out_gs = original_gs.swapped().stamped(now, group_control.clone());
        out_gs.functional_id = "FA".to_string();

        let mut writer = EnvelopeWriter::new(delimiters).with_pad_character(self.pad);
        writer.begin_interchange(&out_isa)?;
        writer.begin_group(&out_gs)?;

        let mut included = 0;
        let mut accepted = 0;
        for (n, group) in groups.iter().enumerate() {
            let control = format!("{:04}", n + 1);
            let implementation =
                (ack_type == AckType::Implementation999).then_some(DEFAULT_IMPLEMENTATION);
            writer.begin_transaction(ack_type.set_id(), &control, implementation)?;

            let summary = GroupAck {
                document,
                group,
                issues,
                ack_type,
                delimiters: &delimiters,
            };
            for segment in summary.body() {
                writer.push(segment)?;
            }
            included += group.transactions.len();
            accepted += summary.accepted_count();
            writer.end_transaction()?;
        }

        writer.end_group()?;
        let segments = writer.finish()?;
        let edi = X12Serializer::new(delimiters)
            .with_line_ending(self.line_ending.clone())
            .serialize(&segments)?;

        info!(
            ack = %ack_type,
            groups = groups.len(),
            included,
            accepted,
            control = %interchange_control,
            "acknowledgment built"
        );
        Ok(AckOutput {
            ack_type,
            edi,
            segments,
            interchange_control,
            group_control,
            transactions_included: included,
            transactions_accepted: accepted,
        })
    }
}

/// One original functional group and the issues raised against it
struct GroupAck<'a> {
    document: &'a Document,
    group: &'a GroupBlock,
    issues: &'a [ValidationIssue],
    ack_type: AckType,
    delimiters: &'a Delimiters,
}

impl GroupAck<'_> {
    fn transaction_issues(&self, tx: &TxBlock) -> Vec<&ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| !i.segment_tag().is_empty() && tx.contains(i.segment_index()))
            .collect()
    }

    fn group_issues(&self) -> Vec<&ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| !i.segment_tag().is_empty() && self.group.contains(i.segment_index()))
            .collect()
    }

    fn accepted_count(&self) -> usize {
        self.group
            .transactions
            .iter()
            .filter(|tx| !self.transaction_issues(tx).iter().any(|i| i.is_error()))
            .count()
    }

    /// Everything between ST and SE
    fn body(&self) -> Vec<RawSegment> {
        let mut out = Vec::new();
        let is_999 = self.ack_type == AckType::Implementation999;

        let mut ak1 = vec![self.group.functional_id.clone(), self.group.control.clone()];
        if is_999 {
            ak1.push(self.group.version.clone());
        }
        out.push(self.segment("AK1", ak1));

        for tx in &self.group.transactions {
            let tx_issues = self.transaction_issues(tx);
            let mut ak2 = vec![tx.set_id.clone(), tx.control.clone()];
            if is_999 {
                let st03 = self.document.segments[tx.st_index].element(3).trim();
                let reference = if st03.is_empty() { DEFAULT_IMPLEMENTATION } else { st03 };
                ak2.push(reference.to_string());
            }
            out.push(self.segment("AK2", ak2));

            for (index, segment_issues) in self.erroneous_segments(tx, &tx_issues) {
                self.segment_detail(tx, index, &segment_issues, &mut out);
            }

            let has_error = tx_issues.iter().any(|i| i.is_error());
            if is_999 {
                let mut ik5 = vec![if has_error { "R" } else { "A" }.to_string()];
                if has_error {
                    let mut codes: Vec<&str> = Vec::new();
                    for code in tx_issues
                        .iter()
                        .filter(|i| i.is_error())
                        .filter_map(|i| transaction_error_code(i))
                    {
                        if !codes.contains(&code) && codes.len() < MAX_IK5_CODES {
                            codes.push(code);
                        }
                    }
                    ik5.extend(codes.into_iter().map(str::to_string));
                }
                out.push(self.segment("IK5", ik5));
            } else {
                let flagged = has_error || tx_issues.iter().any(|i| i.is_warning());
                out.push(self.segment("AK5", [if flagged { "E" } else { "A" }]));
            }
        }

        out.push(self.ak9());
        out
    }

    /// Error issues keyed by segment index, restricted to what AK3/IK3 report
    fn erroneous_segments<'i>(
        &self,
        tx: &TxBlock,
        issues: &[&'i ValidationIssue],
    ) -> BTreeMap<usize, Vec<&'i ValidationIssue>> {
        let mut by_segment: BTreeMap<usize, Vec<&ValidationIssue>> = BTreeMap::new();
        for issue in issues.iter().copied().filter(|i| i.is_error()) {
            let index = issue.segment_index();
            if index == 0 || !tx.contains(index) {
                continue;
            }
            if self.ack_type == AckType::Implementation999
                && !matches!(issue.level(), IssueLevel::Segment | IssueLevel::Element)
            {
                continue;
            }
            by_segment.entry(index).or_default().push(issue);
        }
        by_segment
    }

    fn segment_detail(
        &self,
        tx: &TxBlock,
        index: usize,
        issues: &[&ValidationIssue],
        out: &mut Vec<RawSegment>,
    ) {
        let Some(first) = issues.first() else {
            return;
        };
        let Some(position) = tx.relative_position(index) else {
            return;
        };
        let is_999 = self.ack_type == AckType::Implementation999;
        let loop_id = issues
            .iter()
            .find_map(|i| i.location().loop_id.clone())
            .unwrap_or_default();
        let code = issues
            .iter()
            .find(|i| i.level() != IssueLevel::Element)
            .map_or("8", |i| segment_error_code(i.code()));

        let tag = if is_999 { "IK3" } else { "AK3" };
        out.push(self.segment(
            tag,
            [
                first.segment_tag().to_string(),
                position.to_string(),
                loop_id,
                code.to_string(),
            ],
        ));

        if is_999 {
            if let Some(context) = issues.iter().find_map(|i| i.location().context.as_deref()) {
                out.push(RawSegment::from_components(
                    "CTX",
                    vec![vec![
                        "SITUATIONAL".to_string(),
                        self.clean(context),
                    ]],
                    0,
                ));
            }
        }

        let element_tag = if is_999 { "IK4" } else { "AK4" };
        for issue in issues {
            let location = issue.location();
            let Some(element) = location.element_position else {
                continue;
            };
            let mut position = vec![element.to_string()];
            if let Some(component) = location.component_position {
                position.push(component.to_string());
            }
            let mut fields = vec![
                position,
                vec![issue.element_ref().unwrap_or_default().to_string()],
                vec![element_error_code(issue.code()).to_string()],
                vec![self.clean(location.bad_value.as_deref().unwrap_or_default())],
            ];
            while fields.last().is_some_and(|f| f.iter().all(String::is_empty)) {
                fields.pop();
            }
            out.push(RawSegment::from_components(element_tag, fields, 0));
        }
    }

    fn ak9(&self) -> RawSegment {
        let included = self.group.transactions.len();
        let accepted = self.accepted_count();
        let group_issues = self.group_issues();
        let group_error = group_issues
            .iter()
            .filter(|i| i.is_error())
            .find_map(|i| group_error_code(i.code()));

        let status = match self.ack_type {
            AckType::Functional997 => {
                let flagged = group_issues.iter().any(|i| i.is_error() || i.is_warning());
                if flagged { "E" } else { "A" }
            }
            AckType::Implementation999 => {
                if accepted < included || group_error.is_some() {
                    "P"
                } else {
                    "A"
                }
            }
        };

        let mut fields = vec![
            status.to_string(),
            included.to_string(),
            included.to_string(),
            accepted.to_string(),
        ];
        if status != "A" {
            fields.extend(group_error.map(str::to_string));
        }
        debug!(status, included, accepted, "group acknowledged");
        self.segment("AK9", fields)
    }

    /// Simple-element segment with trailing empty elements dropped
    fn segment<S: Into<String>>(&self, tag: &str, fields: impl IntoIterator<Item = S>) -> RawSegment {
        let mut fields: Vec<String> = fields
            .into_iter()
            .map(|f| {
                let f: String = f.into();
                self.clean(&f)
            })
            .collect();
        while fields.last().is_some_and(String::is_empty) {
            fields.pop();
        }
        RawSegment::new(tag, fields, 0)
    }

    /// Drop characters that would collide with the output separators
    fn clean(&self, value: &str) -> String {
        let d = self.delimiters;
        value
            .chars()
            .filter(|&c| c != d.element_char() && c != d.component_char() && c != d.segment_char())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelopes::SequentialControlNumbers;
    use crate::parser::X12Parser;
    use chrono::{TimeZone, Utc};

    const ISA: &str = "ISA*00*          *00*          *ZZ*SHIPPER        *ZZ*CARRIER        *240101*1200*U*00401*000000001*0*P*>~";

    fn builder() -> AckBuilder {
        AckBuilder::new()
            .with_control_numbers(Arc::new(SequentialControlNumbers::new()))
            .with_clock(Arc::new(|| Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 0).unwrap()))
    }

    fn doc_4010() -> Document {
        let text = format!(
            "{ISA}GS*SM*SHIPPER*CARRIER*20240101*1200*1*X*004010~\
ST*204*0001~B2**TEST**SHIP123**PP~N1*SH*ACME~SE*4*0001~GE*1*1~IEA*1*000000001~"
        );
        X12Parser::new().parse(text.as_bytes()).unwrap()
    }

    fn lines(out: &AckOutput) -> Vec<String> {
        let d = Delimiters::default();
        out.segments.iter().map(|s| s.encode(&d)).collect()
    }

    #[test]
    fn test_version_selection() {
        assert_eq!(AckType::for_version("004010"), AckType::Functional997);
        assert_eq!(AckType::for_version("00401"), AckType::Functional997);
        assert_eq!(AckType::for_version("005010X210"), AckType::Implementation999);
        assert_eq!(AckType::for_version("00501"), AckType::Implementation999);
        assert_eq!("999".parse::<AckType>().unwrap(), AckType::Implementation999);
    }

    #[test]
    fn test_code_tables() {
        assert_eq!(segment_error_code("SEG_UNRECOGNIZED"), "1");
        assert_eq!(segment_error_code("SEG_NOT_IN_PROPER"), "7");
        assert_eq!(segment_error_code("EXCESSIVE_LOOP_OCCURRENCES"), "4");
        assert_eq!(segment_error_code("ANYTHING"), "8");
        assert_eq!(element_error_code("ELEM_TOO_SHORT"), "3");
        assert_eq!(element_error_code("ELEM_EXCLUSION_CONDITION"), "10");
        assert_eq!(element_error_code("OTHER"), "12");
        assert_eq!(group_error_code("GROUP_COUNT_MISMATCH"), Some("5"));
        assert_eq!(group_error_code("OTHER"), None);
    }

    #[test]
    fn test_clean_997() {
        let out = builder().build(&doc_4010(), &[]).unwrap();
        assert_eq!(out.ack_type, AckType::Functional997);
        let lines = lines(&out);
        assert!(lines[0].starts_with("ISA*00*          *00*          *ZZ*CARRIER        *ZZ*SHIPPER        *240506*0708*U*00401*000000001*0*P*>"));
        assert_eq!(lines[1], "GS*FA*CARRIER*SHIPPER*20240506*0708*1*X*004010");
        assert_eq!(
            &lines[2..],
            [
                "ST*997*0001",
                "AK1*SM*1",
                "AK2*204*0001",
                "AK5*A",
                "AK9*A*1*1*1",
                "SE*6*0001",
                "GE*1*1",
                "IEA*1*000000001",
            ]
        );
        assert!(out.edi.ends_with("IEA*1*000000001~"));
        assert_eq!(out.transactions_accepted, 1);
    }

    #[test]
    fn test_997_with_element_error() {
        let doc = doc_4010();
        let issue = ValidationIssue::error("ELEM_MISSING", "B204 required", IssueLevel::Element)
            .at_segment("B2", 3)
            .with_element(4)
            .with_element_ref("145");
        let out = builder().build(&doc, &[issue]).unwrap();
        let lines = lines(&out);
        assert!(lines.contains(&"AK3*B2*2**8".to_string()));
        assert!(lines.contains(&"AK4*4*145*1".to_string()));
        assert!(lines.contains(&"AK5*E".to_string()));
        assert!(lines.contains(&"AK9*E*1*1*0".to_string()));
    }

    #[test]
    fn test_warning_only_is_accepted_with_errors() {
        let issue = ValidationIssue::warning("ELEM_TOO_LONG", "long", IssueLevel::Element)
            .at_segment("N1", 4)
            .with_element(2);
        let out = builder().build(&doc_4010(), &[issue]).unwrap();
        let lines = lines(&out);
        assert!(lines.contains(&"AK5*E".to_string()));
        assert!(lines.contains(&"AK9*E*1*1*1".to_string()));
        assert!(!lines.iter().any(|l| l.starts_with("AK3")));
    }

    #[test]
    fn test_999_partial_acceptance() {
        let isa = ISA.replace("*U*00401*", "*^*00501*");
        let text = format!(
            "{isa}GS*SM*SHIPPER*CARRIER*20240101*1200*7*X*005010~\
ST*204*0001~B2**TEST**SHIP123**PP~SE*3*0001~\
ST*204*0002~B2**TEST**SHIP124**XX~SE*3*0002~\
GE*2*7~IEA*1*000000001~"
        );
        let doc = X12Parser::new().parse(text.as_bytes()).unwrap();
        let issue = ValidationIssue::error("ELEM_INVALID_CODE_VALUE", "bad", IssueLevel::Element)
            .at_segment("B2", 6)
            .with_element(6)
            .with_element_ref("146")
            .with_bad_value("XX")
            .with_context("payment method");
        let out = builder().build(&doc, &[issue]).unwrap();
        assert_eq!(out.ack_type, AckType::Implementation999);
        let lines = lines(&out);
        let body: Vec<&str> = lines[2..].iter().map(String::as_str).collect();
        assert_eq!(
            body,
            [
                "ST*999*0001*005010",
                "AK1*SM*7*005010",
                "AK2*204*0001*005010",
                "IK5*A",
                "AK2*204*0002*005010",
                "IK3*B2*2**8",
                "CTX*SITUATIONAL>payment method",
                "IK4*6*146*7*XX",
                "IK5*R*5",
                "AK9*P*2*2*1",
                "SE*11*0001",
                "GE*1*1",
                "IEA*1*000000001",
            ]
        );
    }

    #[test]
    fn test_group_error_code_in_ak9() {
        let doc = doc_4010();
        let issue = ValidationIssue::error("GROUP_COUNT_MISMATCH", "count", IssueLevel::Structure)
            .at_segment("GE", 6);
        let out = builder().build(&doc, &[issue]).unwrap();
        assert!(lines(&out).contains(&"AK9*E*1*1*1*5".to_string()));
    }

    #[test]
    fn test_document_without_group() {
        let doc = X12Parser::new()
            .parse(format!("{ISA}IEA*0*000000001~").as_bytes())
            .unwrap();
        assert!(matches!(builder().build(&doc, &[]), Err(Error::Ack(_))));
    }
}
