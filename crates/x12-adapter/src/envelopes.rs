//! X12 envelope handling (ISA/IEA, GS/GE, ST/SE)
//!
//! This module reads envelope headers out of scanned segments, writes new
//! envelopes with correct trailer counts, issues control numbers and checks
//! that an inbound interchange's envelopes agree with each other.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::{debug, trace};
use x12_ir::{Delimiters, IssueLevel, RawSegment, ValidationIssue};

use crate::splitter::SplitResult;
use crate::{Error, Result};

/// Width of ISA02 and ISA04
pub const ISA_INFO_WIDTH: usize = 10;
/// Width of ISA06 and ISA08
pub const ISA_ID_WIDTH: usize = 15;
/// Width of ISA13
pub const ISA_CONTROL_WIDTH: usize = 9;

// ============================================================================
// Envelope Headers
// ============================================================================

/// ISA header fields, trimmed of their fixed-width padding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterchangeHeader {
    /// ISA01
    pub auth_qualifier: String,
    /// ISA02
    pub auth_info: String,
    /// ISA03
    pub security_qualifier: String,
    /// ISA04
    pub security_info: String,
    /// ISA05
    pub sender_qualifier: String,
    /// ISA06
    pub sender_id: String,
    /// ISA07
    pub receiver_qualifier: String,
    /// ISA08
    pub receiver_id: String,
    /// ISA09, `YYMMDD`
    pub date: String,
    /// ISA10, `HHMM`
    pub time: String,
    /// ISA11, `U` or the repetition separator
    pub standards_id: String,
    /// ISA12, e.g. `00401`
    pub version: String,
    /// ISA13
    pub control_number: String,
    /// ISA14
    pub ack_requested: String,
    /// ISA15, `P` or `T`
    pub usage_indicator: String,
}

impl InterchangeHeader {
    /// Header with blank authorization and security slots
    pub fn new(
        sender_qualifier: impl Into<String>,
        sender_id: impl Into<String>,
        receiver_qualifier: impl Into<String>,
        receiver_id: impl Into<String>,
    ) -> Self {
        Self {
            auth_qualifier: "00".to_string(),
            auth_info: String::new(),
            security_qualifier: "00".to_string(),
            security_info: String::new(),
            sender_qualifier: sender_qualifier.into(),
            sender_id: sender_id.into(),
            receiver_qualifier: receiver_qualifier.into(),
            receiver_id: receiver_id.into(),
            date: String::new(),
            time: String::new(),
            standards_id: "U".to_string(),
            version: "00401".to_string(),
            control_number: String::new(),
            ack_requested: "0".to_string(),
            usage_indicator: "P".to_string(),
        }
    }

    /// Read an ISA segment
    ///
    /// # Errors
    ///
    /// Returns [`Error::Envelope`] when the segment is not an ISA or has fewer
    /// than 16 elements.
    pub fn from_segment(segment: &RawSegment) -> Result<Self> {
        if !segment.is("ISA") {
            return Err(Error::envelope(format!(
                "expected ISA, found {}",
                segment.tag
            )));
        }
        if segment.element_count() < 16 {
            return Err(Error::envelope(format!(
                "ISA has {} elements, expected 16",
                segment.element_count()
            )));
        }
        let field = |n: usize| segment.element(n).trim().to_string();
        Ok(Self {
            auth_qualifier: field(1),
            auth_info: field(2),
            security_qualifier: field(3),
            security_info: field(4),
            sender_qualifier: field(5),
            sender_id: field(6),
            receiver_qualifier: field(7),
            receiver_id: field(8),
            date: field(9),
            time: field(10),
            standards_id: field(11),
            version: field(12),
            control_number: field(13),
            ack_requested: field(14),
            usage_indicator: field(15),
        })
    }

    /// Same header with sender and receiver exchanged
    #[must_use]
    pub fn swapped(&self) -> Self {
        let mut out = self.clone();
        std::mem::swap(&mut out.sender_qualifier, &mut out.receiver_qualifier);
        std::mem::swap(&mut out.sender_id, &mut out.receiver_id);
        out
    }

    /// Set date, time and control number for a new interchange
    #[must_use]
    pub fn stamped(mut self, now: DateTime<Utc>, control_number: impl Into<String>) -> Self {
        self.date = now.format("%y%m%d").to_string();
        self.time = now.format("%H%M").to_string();
        self.control_number = control_number.into();
        self
    }

    /// Write the fixed-width ISA segment
    pub fn to_segment(&self, delimiters: &Delimiters, pad: char) -> RawSegment {
        let standards_id = if self.standards_id.is_empty() {
            "U".to_string()
        } else {
            self.standards_id.clone()
        };
        let fields = [
            fixed(&self.auth_qualifier, 2, pad),
            fixed(&self.auth_info, ISA_INFO_WIDTH, pad),
            fixed(&self.security_qualifier, 2, pad),
            fixed(&self.security_info, ISA_INFO_WIDTH, pad),
            fixed(&self.sender_qualifier, 2, pad),
            fixed(&self.sender_id, ISA_ID_WIDTH, pad),
            fixed(&self.receiver_qualifier, 2, pad),
            fixed(&self.receiver_id, ISA_ID_WIDTH, pad),
            self.date.clone(),
            self.time.clone(),
            standards_id,
            version_slice(&self.version).to_string(),
            isa_control(&self.control_number),
            self.ack_requested.clone(),
            self.usage_indicator.clone(),
            delimiters.component_char().to_string(),
        ];
        RawSegment::new("ISA", fields, 0)
    }
}

/// GS header fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupHeader {
    /// GS01, e.g. `SM` or `FA`
    pub functional_id: String,
    /// GS02
    pub sender_code: String,
    /// GS03
    pub receiver_code: String,
    /// GS04, `CCYYMMDD`
    pub date: String,
    /// GS05, `HHMM`
    pub time: String,
    /// GS06
    pub control_number: String,
    /// GS07, normally `X`
    pub agency: String,
    /// GS08, e.g. `004010`
    pub version: String,
}

impl GroupHeader {
    pub fn new(
        functional_id: impl Into<String>,
        sender_code: impl Into<String>,
        receiver_code: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            functional_id: functional_id.into(),
            sender_code: sender_code.into(),
            receiver_code: receiver_code.into(),
            date: String::new(),
            time: String::new(),
            control_number: String::new(),
            agency: "X".to_string(),
            version: version.into(),
        }
    }

    /// Read a GS segment
    ///
    /// # Errors
    ///
    /// Returns [`Error::Envelope`] when the segment is not a GS.
    pub fn from_segment(segment: &RawSegment) -> Result<Self> {
        if !segment.is("GS") {
            return Err(Error::envelope(format!("expected GS, found {}", segment.tag)));
        }
        let field = |n: usize| segment.element(n).trim().to_string();
        Ok(Self {
            functional_id: field(1),
            sender_code: field(2),
            receiver_code: field(3),
            date: field(4),
            time: field(5),
            control_number: field(6),
            agency: field(7),
            version: field(8),
        })
    }

    #[must_use]
    pub fn swapped(&self) -> Self {
        let mut out = self.clone();
        std::mem::swap(&mut out.sender_code, &mut out.receiver_code);
        out
    }

    #[must_use]
    pub fn stamped(mut self, now: DateTime<Utc>, control_number: impl Into<String>) -> Self {
        self.date = now.format("%Y%m%d").to_string();
        self.time = now.format("%H%M").to_string();
        self.control_number = control_number.into();
        self
    }

    pub fn to_segment(&self) -> RawSegment {
        RawSegment::new(
            "GS",
            [
                self.functional_id.as_str(),
                self.sender_code.as_str(),
                self.receiver_code.as_str(),
                self.date.as_str(),
                self.time.as_str(),
                self.control_number.as_str(),
                self.agency.as_str(),
                self.version.as_str(),
            ],
            0,
        )
    }
}

/// Pad or cut a value to an exact width
fn fixed(value: &str, width: usize, pad: char) -> String {
    let mut out: String = value.chars().take(width).collect();
    let len = out.chars().count();
    out.extend(std::iter::repeat_n(pad, width - len));
    out
}

/// Five-character ISA12 from either `00401` or `004010`
fn version_slice(version: &str) -> &str {
    version.get(..5).unwrap_or(version)
}

/// Nine-digit zero-padded ISA13
fn isa_control(control: &str) -> String {
    let digits: Vec<char> = control.trim().chars().collect();
    let start = digits.len().saturating_sub(ISA_CONTROL_WIDTH);
    let kept: String = digits[start..].iter().collect();
    format!("{kept:0>9}")
}

// ============================================================================
// Envelope Writer
// ============================================================================

/// Builds a segment list inside ISA/GS/ST envelopes
///
/// Trailers are written with computed counts: SE01 counts ST through SE,
/// GE01 counts transactions and IEA01 counts groups.
#[derive(Debug)]
pub struct EnvelopeWriter {
    delimiters: Delimiters,
    pad: char,
    segments: Vec<RawSegment>,
    interchange_control: Option<String>,
    group: Option<(String, usize)>,
    group_count: usize,
    transaction: Option<(String, usize)>,
}

impl EnvelopeWriter {
    pub fn new(delimiters: Delimiters) -> Self {
        Self {
            delimiters,
            pad: ' ',
            segments: Vec::new(),
            interchange_control: None,
            group: None,
            group_count: 0,
            transaction: None,
        }
    }

    /// Character used to pad ISA fixed-width fields
    #[must_use]
    pub fn with_pad_character(mut self, pad: char) -> Self {
        self.pad = pad;
        self
    }

    fn push_raw(&mut self, mut segment: RawSegment) {
        segment.index = self.segments.len();
        self.segments.push(segment);
    }

    /// Write ISA
    ///
    /// # Errors
    ///
    /// Fails when an interchange is already open.
    pub fn begin_interchange(&mut self, header: &InterchangeHeader) -> Result<()> {
        if self.interchange_control.is_some() {
            return Err(Error::envelope("interchange already open"));
        }
        self.interchange_control = Some(isa_control(&header.control_number));
        let isa = header.to_segment(&self.delimiters, self.pad);
        self.push_raw(isa);
        Ok(())
    }

    /// Write GS
    ///
    /// # Errors
    ///
    /// Fails outside an interchange or while another group is open.
    pub fn begin_group(&mut self, header: &GroupHeader) -> Result<()> {
        if self.interchange_control.is_none() {
            return Err(Error::envelope("GS written outside an interchange"));
        }
        if self.group.is_some() {
            return Err(Error::envelope("group already open"));
        }
        self.group = Some((header.control_number.clone(), 0));
        self.push_raw(header.to_segment());
        Ok(())
    }

    /// Write ST; `implementation` becomes ST03 when given
    ///
    /// # Errors
    ///
    /// Fails outside a group or while another transaction is open.
    pub fn begin_transaction(
        &mut self,
        set_id: &str,
        control: &str,
        implementation: Option<&str>,
    ) -> Result<()> {
        if self.group.is_none() {
            return Err(Error::envelope("ST written outside a group"));
        }
        if self.transaction.is_some() {
            return Err(Error::envelope("transaction already open"));
        }
        let mut fields = vec![set_id, control];
        fields.extend(implementation);
        self.transaction = Some((control.to_string(), self.segments.len()));
        self.push_raw(RawSegment::new("ST", fields, 0));
        Ok(())
    }

    /// Write a body segment into the open transaction
    ///
    /// # Errors
    ///
    /// Fails when no transaction is open.
    pub fn push(&mut self, segment: RawSegment) -> Result<()> {
        if self.transaction.is_none() {
            return Err(Error::envelope(format!(
                "{} written outside a transaction",
                segment.tag
            )));
        }
        self.push_raw(segment);
        Ok(())
    }

    /// Write SE; returns SE01
    ///
    /// # Errors
    ///
    /// Fails when no transaction is open.
    pub fn end_transaction(&mut self) -> Result<usize> {
        let (control, start) = self
            .transaction
            .take()
            .ok_or_else(|| Error::envelope("SE without an open transaction"))?;
        let count = self.segments.len() - start + 1;
        self.push_raw(RawSegment::new("SE", [count.to_string(), control], 0));
        if let Some((_, transactions)) = self.group.as_mut() {
            *transactions += 1;
        }
        Ok(count)
    }

    /// Write GE
    ///
    /// # Errors
    ///
    /// Fails when no group is open or a transaction is still open.
    pub fn end_group(&mut self) -> Result<()> {
        if self.transaction.is_some() {
            return Err(Error::envelope("GE written inside an open transaction"));
        }
        let (control, transactions) = self
            .group
            .take()
            .ok_or_else(|| Error::envelope("GE without an open group"))?;
        self.push_raw(RawSegment::new("GE", [transactions.to_string(), control], 0));
        self.group_count += 1;
        Ok(())
    }

    /// Write IEA and return every segment
    ///
    /// # Errors
    ///
    /// Fails when a group or transaction is still open, or no interchange
    /// was started.
    pub fn finish(mut self) -> Result<Vec<RawSegment>> {
        if self.group.is_some() || self.transaction.is_some() {
            return Err(Error::envelope("interchange closed with an open group"));
        }
        let control = self
            .interchange_control
            .take()
            .ok_or_else(|| Error::envelope("IEA without an interchange"))?;
        let groups = self.group_count.to_string();
        self.push_raw(RawSegment::new("IEA", [groups, control], 0));
        trace!(segments = self.segments.len(), "envelope closed");
        Ok(self.segments)
    }
}

// ============================================================================
// Control Number Management
// ============================================================================

/// Source of interchange and group control numbers
pub trait ControlNumberGenerator: Send + Sync {
    /// Next ISA13, nine digits
    fn next_interchange(&self) -> Result<String>;
    /// Next GS06
    fn next_group(&self) -> Result<String>;
    /// Reset counters for testing
    fn reset(&self) -> Result<()>;
}

/// Clock used for timestamps and timestamp-derived control numbers
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// System UTC clock
pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

#[derive(Debug, Default)]
struct CounterState {
    interchange: u64,
    group: u64,
}

fn lock_error<T>(_: T) -> Error {
    Error::ControlNumber("Failed to lock state".to_string())
}

/// Control numbers derived from the clock's Unix seconds
///
/// Numbers never repeat within one generator: a second request in the same
/// second gets the previous value plus one.
pub struct TimestampControlNumbers {
    clock: Clock,
    state: Arc<Mutex<CounterState>>,
}

impl TimestampControlNumbers {
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    pub fn with_clock(clock: Clock) -> Self {
        Self {
            clock,
            state: Arc::new(Mutex::new(CounterState::default())),
        }
    }

    fn seconds(&self) -> u64 {
        u64::try_from((self.clock)().timestamp()).unwrap_or_default()
    }
}

impl Default for TimestampControlNumbers {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TimestampControlNumbers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimestampControlNumbers").finish_non_exhaustive()
    }
}

impl ControlNumberGenerator for TimestampControlNumbers {
    fn next_interchange(&self) -> Result<String> {
        let candidate = self.seconds() % 1_000_000_000;
        let mut state = self.state.lock().map_err(lock_error)?;
        let next = if candidate <= state.interchange && state.interchange != 0 {
            (state.interchange + 1) % 1_000_000_000
        } else {
            candidate
        };
        state.interchange = next;
        Ok(format!("{next:09}"))
    }

    fn next_group(&self) -> Result<String> {
        let candidate = self.seconds() % 1_000_000;
        let mut state = self.state.lock().map_err(lock_error)?;
        let next = if candidate <= state.group && state.group != 0 {
            (state.group + 1) % 1_000_000
        } else {
            candidate
        };
        state.group = next;
        Ok(next.to_string())
    }

    fn reset(&self) -> Result<()> {
        let mut state = self.state.lock().map_err(lock_error)?;
        *state = CounterState::default();
        Ok(())
    }
}

/// In-memory counters starting at 1, for tests and reproducible output
#[derive(Debug, Default)]
pub struct SequentialControlNumbers {
    state: Arc<Mutex<CounterState>>,
}

impl SequentialControlNumbers {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ControlNumberGenerator for SequentialControlNumbers {
    fn next_interchange(&self) -> Result<String> {
        let mut state = self.state.lock().map_err(lock_error)?;
        state.interchange = state.interchange % 999_999_999 + 1;
        Ok(format!("{:09}", state.interchange))
    }

    fn next_group(&self) -> Result<String> {
        let mut state = self.state.lock().map_err(lock_error)?;
        state.group = state.group % 999_999_999 + 1;
        Ok(state.group.to_string())
    }

    fn reset(&self) -> Result<()> {
        let mut state = self.state.lock().map_err(lock_error)?;
        *state = CounterState::default();
        Ok(())
    }
}

// ============================================================================
// Envelope Checks
// ============================================================================

fn structure_error(code: &str, message: String, tag: &str, index: usize) -> ValidationIssue {
    ValidationIssue::error(code, message, IssueLevel::Structure).at_segment(tag, index)
}

/// Check ISA/IEA, GS/GE and ST/SE agreement
///
/// Reports missing trailers, control-number mismatches and trailer counts
/// that disagree with the content. SE01 is not checked here; its severity
/// depends on the validation level.
pub fn check_envelopes(segments: &[RawSegment], split: &SplitResult) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    match segments.first() {
        Some(first) if first.is("ISA") => {}
        Some(first) => issues.push(structure_error(
            "INTERCHANGE_HEADER_MISSING",
            format!("Interchange starts with {} instead of ISA", first.tag),
            &first.tag,
            0,
        )),
        None => return issues,
    }

    for interchange in &split.interchanges {
        let Some(isa) = interchange.isa_index else {
            continue;
        };
        let Some(iea) = interchange.iea_index else {
            issues.push(structure_error(
                "INTERCHANGE_TRAILER_MISSING",
                format!("Interchange {} has no IEA", interchange.control),
                "ISA",
                isa,
            ));
            continue;
        };
        let iea_seg = &segments[iea];
        let trailer_control = iea_seg.element(2).trim();
        if trailer_control != interchange.control {
            issues.push(
                structure_error(
                    "INTERCHANGE_CONTROL_MISMATCH",
                    format!(
                        "ISA13 {} does not match IEA02 {trailer_control}",
                        interchange.control
                    ),
                    "IEA",
                    iea,
                )
                .with_element(2)
                .with_bad_value(trailer_control),
            );
        }
        let declared = iea_seg.element(1).trim();
        if declared.parse::<usize>().ok() != Some(interchange.groups.len()) {
            issues.push(
                structure_error(
                    "INTERCHANGE_COUNT_MISMATCH",
                    format!(
                        "IEA01 {declared} does not match {} groups",
                        interchange.groups.len()
                    ),
                    "IEA",
                    iea,
                )
                .with_element(1)
                .with_bad_value(declared),
            );
        }
    }

    for group in split.groups() {
        let Some(ge) = group.ge_index else {
            issues.push(structure_error(
                "GROUP_TRAILER_MISSING",
                format!("Group {} has no GE", group.control),
                "GS",
                group.gs_index,
            ));
            continue;
        };
        let ge_seg = &segments[ge];
        let trailer_control = ge_seg.element(2).trim();
        if trailer_control != group.control {
            issues.push(
                structure_error(
                    "GROUP_CONTROL_NUMBER_MISMATCH",
                    format!("GS06 {} does not match GE02 {trailer_control}", group.control),
                    "GE",
                    ge,
                )
                .with_element(2)
                .with_bad_value(trailer_control),
            );
        }
        let declared = ge_seg.element(1).trim();
        if declared.parse::<usize>().ok() != Some(group.transactions.len()) {
            issues.push(
                structure_error(
                    "GROUP_COUNT_MISMATCH",
                    format!(
                        "GE01 {declared} does not match {} transactions",
                        group.transactions.len()
                    ),
                    "GE",
                    ge,
                )
                .with_element(1)
                .with_bad_value(declared),
            );
        }
    }

    for tx in split.transactions() {
        let Some(se) = tx.se_index else { continue };
        let trailer_control = segments[se].element(2).trim();
        if trailer_control != tx.control {
            issues.push(
                structure_error(
                    "TRANSACTION_CONTROL_MISMATCH",
                    format!("ST02 {} does not match SE02 {trailer_control}", tx.control),
                    "SE",
                    se,
                )
                .with_element(2)
                .with_bad_value(trailer_control),
            );
        }
    }

    issues.sort_by_key(ValidationIssue::segment_index);
    debug!(issues = issues.len(), "envelopes checked");
    issues
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::X12Parser;
    use crate::serializer::X12Serializer;
    use crate::splitter::split;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 9, 30, 0).unwrap()
    }

    #[test]
    fn test_isa_fixed_width() {
        let header = InterchangeHeader::new("ZZ", "SENDER", "ZZ", "RECEIVER")
            .stamped(fixed_time(), "42");
        let isa = header.to_segment(&Delimiters::default(), ' ');
        let line = isa.encode(&Delimiters::default());
        assert_eq!(
            line,
            "ISA*00*          *00*          *ZZ*SENDER         *ZZ*RECEIVER       *240315*0930*U*00401*000000042*0*P*>"
        );
        assert_eq!(line.len() + 1, 106);
    }

    #[test]
    fn test_header_roundtrip_and_swap() {
        let isa = InterchangeHeader::new("01", "ACME", "ZZ", "CARRIER")
            .stamped(fixed_time(), "7")
            .to_segment(&Delimiters::default(), ' ');
        let read = InterchangeHeader::from_segment(&isa).unwrap();
        assert_eq!(read.sender_id, "ACME");
        assert_eq!(read.control_number, "000000007");
        let swapped = read.swapped();
        assert_eq!(swapped.sender_qualifier, "ZZ");
        assert_eq!(swapped.sender_id, "CARRIER");
        assert_eq!(swapped.receiver_id, "ACME");
    }

    #[test]
    fn test_gs_dates() {
        let gs = GroupHeader::new("FA", "B", "A", "004010")
            .stamped(fixed_time(), "12")
            .to_segment();
        assert_eq!(
            gs.encode(&Delimiters::default()),
            "GS*FA*B*A*20240315*0930*12*X*004010"
        );
    }

    #[test]
    fn test_writer_counts() {
        let header = InterchangeHeader::new("ZZ", "S", "ZZ", "R").stamped(fixed_time(), "1");
        let group = GroupHeader::new("SM", "S", "R", "004010").stamped(fixed_time(), "5");
        let mut writer = EnvelopeWriter::new(Delimiters::default());
        writer.begin_interchange(&header).unwrap();
        writer.begin_group(&group).unwrap();
        writer.begin_transaction("204", "0001", None).unwrap();
        writer.push(RawSegment::new("B2", ["", "TEST"], 0)).unwrap();
        assert_eq!(writer.end_transaction().unwrap(), 3);
        writer.end_group().unwrap();
        let segments = writer.finish().unwrap();

        let tags: Vec<&str> = segments.iter().map(|s| s.tag.as_str()).collect();
        assert_eq!(tags, ["ISA", "GS", "ST", "B2", "SE", "GE", "IEA"]);
        assert_eq!(segments[4].element(1), "3");
        assert_eq!(segments[5].element(1), "1");
        assert_eq!(segments[5].element(2), "5");
        assert_eq!(segments[6].element(2), "000000001");
        assert_eq!(segments[6].index, 6);

        let text = X12Serializer::default().serialize(&segments).unwrap();
        let doc = X12Parser::new().parse(text.as_bytes()).unwrap();
        let blocks = split(&doc.segments);
        assert!(check_envelopes(&doc.segments, &blocks).is_empty());
    }

    #[test]
    fn test_writer_rejects_misnesting() {
        let mut writer = EnvelopeWriter::new(Delimiters::default());
        assert!(writer.push(RawSegment::new("B2", ["x"], 0)).is_err());
        assert!(writer
            .begin_group(&GroupHeader::new("SM", "S", "R", "004010"))
            .is_err());
        assert!(writer.finish().is_err());
    }

    #[test]
    fn test_sequential_numbers() {
        let generator = SequentialControlNumbers::new();
        assert_eq!(generator.next_interchange().unwrap(), "000000001");
        assert_eq!(generator.next_interchange().unwrap(), "000000002");
        assert_eq!(generator.next_group().unwrap(), "1");
        generator.reset().unwrap();
        assert_eq!(generator.next_interchange().unwrap(), "000000001");
    }

    #[test]
    fn test_timestamp_numbers_are_unique() {
        let generator = TimestampControlNumbers::with_clock(Arc::new(fixed_time));
        let first = generator.next_interchange().unwrap();
        let second = generator.next_interchange().unwrap();
        assert_eq!(first.len(), 9);
        assert_eq!(
            first,
            format!("{:09}", fixed_time().timestamp() % 1_000_000_000)
        );
        assert_ne!(first, second);
        let group = generator.next_group().unwrap();
        assert!(group.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_check_envelopes_reports_mismatches() {
        let text = "ISA*00*          *00*          *ZZ*S              *ZZ*R              *240101*1200*U*00401*000000001*0*P*>~\
GS*SM*S*R*20240101*1200*1*X*004010~\
ST*204*0001~B2**TEST~SE*3*0002~\
GE*2*9~IEA*1*000000002~";
        let doc = X12Parser::new().parse(text.as_bytes()).unwrap();
        let issues = check_envelopes(&doc.segments, &split(&doc.segments));
        let codes: Vec<&str> = issues.iter().map(ValidationIssue::code).collect();
        assert_eq!(
            codes,
            [
                "TRANSACTION_CONTROL_MISMATCH",
                "GROUP_CONTROL_NUMBER_MISMATCH",
                "GROUP_COUNT_MISMATCH",
                "INTERCHANGE_CONTROL_MISMATCH",
            ]
        );
        assert_eq!(issues[0].location().bad_value.as_deref(), Some("0002"));
    }

    #[test]
    fn test_missing_group_trailer() {
        let text = "ISA*00*          *00*          *ZZ*S              *ZZ*R              *240101*1200*U*00401*000000001*0*P*>~\
GS*SM*S*R*20240101*1200*1*X*004010~\
ST*204*0001~SE*2*0001~IEA*1*000000001~";
        let doc = X12Parser::new().parse(text.as_bytes()).unwrap();
        let issues = check_envelopes(&doc.segments, &split(&doc.segments));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code(), "GROUP_TRAILER_MISSING");
        assert_eq!(issues[0].segment_index(), 1);
    }
}
