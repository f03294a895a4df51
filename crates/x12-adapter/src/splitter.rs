//! Transaction, group and interchange blocks
//!
//! Splitting never fails: it describes what the segment stream contains and
//! reports an ST without a matching SE as a structural issue. Envelope
//! consistency (counts, control numbers) is checked separately by
//! [`crate::envelopes::check_envelopes`].
#![allow(clippy::must_use_candidate)] // Accessors are clear at call sites without #[must_use].

use tracing::{debug, warn};
use x12_ir::{IssueLevel, RawSegment, ValidationIssue};

/// Issue code for an ST that has no SE
pub const TRANSACTION_TRAILER_MISSING: &str = "TRANSACTION_TRAILER_MISSING";

/// One ST..SE transaction set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxBlock {
    pub st_index: usize,
    /// `None` when no SE could be paired
    pub se_index: Option<usize>,
    /// Last segment index owned by the transaction
    ///
    /// Equals `se_index` when closed; otherwise the segment before the next
    /// envelope segment.
    pub end_index: usize,
    /// ST01, e.g. `204`
    pub set_id: String,
    /// ST02
    pub control: String,
}

impl TxBlock {
    pub fn is_closed(&self) -> bool {
        self.se_index.is_some()
    }

    pub fn contains(&self, index: usize) -> bool {
        (self.st_index..=self.end_index).contains(&index)
    }

    /// Segments from ST to SE inclusive, as SE01 should count them
    pub fn segment_count(&self) -> Option<usize> {
        self.se_index.map(|se| se - self.st_index + 1)
    }

    /// 1-based position of a segment inside the transaction (ST = 1)
    pub fn relative_position(&self, index: usize) -> Option<usize> {
        self.contains(index).then(|| index - self.st_index + 1)
    }
}

/// One GS..GE functional group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupBlock {
    pub gs_index: usize,
    pub ge_index: Option<usize>,
    /// GS01
    pub functional_id: String,
    /// GS06
    pub control: String,
    /// GS08
    pub version: String,
    pub transactions: Vec<TxBlock>,
}

impl GroupBlock {
    pub fn contains(&self, index: usize) -> bool {
        index >= self.gs_index && self.ge_index.is_none_or(|ge| index <= ge)
    }
}

/// One ISA..IEA interchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterchangeBlock {
    /// `None` for groups that appear without an enclosing ISA
    pub isa_index: Option<usize>,
    pub iea_index: Option<usize>,
    /// ISA13
    pub control: String,
    pub groups: Vec<GroupBlock>,
}

/// Everything the splitter found in a segment stream
#[derive(Debug, Clone, Default)]
pub struct SplitResult {
    pub interchanges: Vec<InterchangeBlock>,
    /// Transactions outside any GS..GE
    pub ungrouped: Vec<TxBlock>,
    pub issues: Vec<ValidationIssue>,
}

impl SplitResult {
    pub fn groups(&self) -> impl Iterator<Item = &GroupBlock> {
        self.interchanges.iter().flat_map(|i| i.groups.iter())
    }

    /// Every transaction in source order
    pub fn transactions(&self) -> Vec<&TxBlock> {
        let mut all: Vec<&TxBlock> = self
            .groups()
            .flat_map(|g| g.transactions.iter())
            .chain(self.ungrouped.iter())
            .collect();
        all.sort_by_key(|tx| tx.st_index);
        all
    }

    pub fn transaction_count(&self) -> usize {
        self.groups().map(|g| g.transactions.len()).sum::<usize>() + self.ungrouped.len()
    }

    /// Transaction owning a segment index
    pub fn transaction_at(&self, index: usize) -> Option<&TxBlock> {
        self.groups()
            .flat_map(|g| g.transactions.iter())
            .chain(self.ungrouped.iter())
            .find(|tx| tx.contains(index))
    }

    /// Group whose GS..GE range covers a segment index
    pub fn group_at(&self, index: usize) -> Option<&GroupBlock> {
        self.groups().find(|g| g.contains(index))
    }
}

fn is_envelope(tag: &str) -> bool {
    matches!(tag, "ST" | "GS" | "GE" | "ISA" | "IEA")
}

/// Pair each ST with an SE
///
/// An ST takes the earliest unused SE whose SE02 equals its ST02. When the
/// control is empty or nothing matches, it takes the nearest unused SE
/// before the next ST.
fn pair_transactions(segments: &[RawSegment]) -> (Vec<TxBlock>, Vec<ValidationIssue>) {
    let st_positions: Vec<usize> = positions(segments, "ST");
    let se_positions: Vec<usize> = positions(segments, "SE");
    let mut used = vec![false; se_positions.len()];
    let mut blocks = Vec::with_capacity(st_positions.len());
    let mut issues = Vec::new();

    for (n, &st) in st_positions.iter().enumerate() {
        let seg = &segments[st];
        let control = seg.element(2).trim().to_string();
        let next_st = st_positions.get(n + 1).copied().unwrap_or(usize::MAX);

        let exact = (!control.is_empty())
            .then(|| {
                se_positions.iter().enumerate().find(|&(k, &se)| {
                    !used[k] && se > st && segments[se].element(2).trim() == control
                })
            })
            .flatten();
        let chosen = exact.or_else(|| {
            se_positions
                .iter()
                .enumerate()
                .find(|&(k, &se)| !used[k] && se > st && se < next_st)
        });

        let se_index = chosen.map(|(k, &se)| {
            used[k] = true;
            se
        });
        let end_index = se_index.unwrap_or_else(|| {
            segments[st + 1..]
                .iter()
                .position(|s| is_envelope(&s.tag))
                .map_or(segments.len() - 1, |offset| st + offset)
        });

        if se_index.is_none() {
            warn!(st_index = st, control = %control, "ST without matching SE");
            issues.push(
                ValidationIssue::error(
                    TRANSACTION_TRAILER_MISSING,
                    format!("Transaction {control} has no matching SE"),
                    IssueLevel::Structure,
                )
                .at_segment("ST", st)
                .with_bad_value(control.clone()),
            );
        }

        blocks.push(TxBlock {
            st_index: st,
            se_index,
            end_index,
            set_id: seg.element(1).trim().to_string(),
            control,
        });
    }
    (blocks, issues)
}

fn positions(segments: &[RawSegment], tag: &str) -> Vec<usize> {
    segments
        .iter()
        .enumerate()
        .filter(|(_, s)| s.is(tag))
        .map(|(i, _)| i)
        .collect()
}

/// Identify transactions and nest them under their groups and interchanges
pub fn split(segments: &[RawSegment]) -> SplitResult {
    let (transactions, issues) = pair_transactions(segments);
    let mut transactions = transactions.into_iter().peekable();
    let mut result = SplitResult {
        issues,
        ..SplitResult::default()
    };
    let mut group_open = false;

    for (index, seg) in segments.iter().enumerate() {
        match seg.tag.to_ascii_uppercase().as_str() {
            "ISA" => {
                result.interchanges.push(InterchangeBlock {
                    isa_index: Some(index),
                    iea_index: None,
                    control: seg.element(13).trim().to_string(),
                    groups: Vec::new(),
                });
                group_open = false;
            }
            "IEA" => {
                if let Some(interchange) = result
                    .interchanges
                    .last_mut()
                    .filter(|i| i.iea_index.is_none())
                {
                    interchange.iea_index = Some(index);
                }
                group_open = false;
            }
            "GS" => {
                if result.interchanges.is_empty() {
                    result.interchanges.push(InterchangeBlock {
                        isa_index: None,
                        iea_index: None,
                        control: String::new(),
                        groups: Vec::new(),
                    });
                }
                if let Some(interchange) = result.interchanges.last_mut() {
                    interchange.groups.push(GroupBlock {
                        gs_index: index,
                        ge_index: None,
                        functional_id: seg.element(1).trim().to_string(),
                        control: seg.element(6).trim().to_string(),
                        version: seg.element(8).trim().to_string(),
                        transactions: Vec::new(),
                    });
                    group_open = true;
                }
            }
            "GE" => {
                if group_open {
                    if let Some(group) = current_group(&mut result) {
                        group.ge_index = Some(index);
                    }
                }
                group_open = false;
            }
            "ST" => {
                if let Some(tx) = transactions.next_if(|tx| tx.st_index == index) {
                    match current_group(&mut result).filter(|_| group_open) {
                        Some(group) => group.transactions.push(tx),
                        None => result.ungrouped.push(tx),
                    }
                }
            }
            _ => {}
        }
    }

    debug!(
        interchanges = result.interchanges.len(),
        transactions = result.transaction_count(),
        unmatched = result.issues.len(),
        "segments split"
    );
    result
}

fn current_group(result: &mut SplitResult) -> Option<&mut GroupBlock> {
    result
        .interchanges
        .last_mut()
        .and_then(|i| i.groups.last_mut())
}

#[cfg(test)]
mod tests {
    use super::*;
    use x12_ir::Delimiters;

    fn segments(text: &str) -> Vec<RawSegment> {
        let d = Delimiters::default();
        text.split('~')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .enumerate()
            .map(|(i, s)| {
                let mut parts = s.split(d.element_char());
                let tag = parts.next().unwrap();
                RawSegment::new(tag, parts, i)
            })
            .collect()
    }

    const TWO_TX: &str = "ISA*00*X*00*X*ZZ*S*ZZ*R*240101*1200*U*00401*000000009*0*P*>~\
        GS*SM*S*R*20240101*1200*7*X*004010~\
        ST*204*0001~B2**TEST~SE*3*0001~\
        ST*204*0002~B2**TEST~N1*SH*A~SE*4*0002~\
        GE*2*7~IEA*1*000000009~";

    #[test]
    fn test_pairs_by_control() {
        let result = split(&segments(TWO_TX));
        assert!(result.issues.is_empty());
        let txs = result.transactions();
        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].st_index, 2);
        assert_eq!(txs[0].se_index, Some(4));
        assert_eq!(txs[1].control, "0002");
        assert_eq!(txs[1].segment_count(), Some(4));
        assert_eq!(txs[1].relative_position(6), Some(2));
    }

    #[test]
    fn test_nesting() {
        let result = split(&segments(TWO_TX));
        assert_eq!(result.interchanges.len(), 1);
        let interchange = &result.interchanges[0];
        assert_eq!(interchange.control, "000000009");
        assert_eq!(interchange.iea_index, Some(10));
        let group = &interchange.groups[0];
        assert_eq!(group.control, "7");
        assert_eq!(group.functional_id, "SM");
        assert_eq!(group.ge_index, Some(9));
        assert_eq!(group.transactions.len(), 2);
        assert!(result.ungrouped.is_empty());
        assert_eq!(result.group_at(5).map(|g| g.gs_index), Some(1));
    }

    #[test]
    fn test_mismatched_control_falls_back_to_nearest() {
        let text = TWO_TX.replace("SE*3*0001", "SE*3*0099");
        let result = split(&segments(&text));
        assert!(result.issues.is_empty());
        assert_eq!(result.transactions()[0].se_index, Some(4));
    }

    #[test]
    fn test_unmatched_st() {
        let text = "ISA*00*X*00*X*ZZ*S*ZZ*R*240101*1200*U*00401*1*0*P*>~\
            GS*SM*S*R*20240101*1200*1*X*004010~\
            ST*204*0001~B2**TEST~GE*1*1~IEA*1*1~";
        let result = split(&segments(text));
        let tx = result.transactions()[0];
        assert_eq!(tx.se_index, None);
        assert_eq!(tx.end_index, 3);
        assert!(tx.contains(3));
        assert!(!tx.contains(4));
        assert_eq!(result.issues.len(), 1);
        assert_eq!(result.issues[0].code(), TRANSACTION_TRAILER_MISSING);
        assert_eq!(result.issues[0].segment_index(), 2);
    }

    #[test]
    fn test_transaction_outside_group() {
        let result = split(&segments("ST*204*0001~SE*2*0001~"));
        assert_eq!(result.ungrouped.len(), 1);
        assert_eq!(result.transaction_count(), 1);
        assert_eq!(result.transaction_at(1).map(|t| t.st_index), Some(0));
    }
}
