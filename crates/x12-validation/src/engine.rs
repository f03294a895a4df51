//! Validation engine
//!
//! Stages run in a fixed order over the whole document: syntactic framing
//! and value formats, transaction structure, element rules, cross-segment
//! conditions, then business rules over the mapped business object. Each
//! transaction is checked with the settings resolved for its own type,
//! partner and customer; envelope segments use the partner-level settings.
//!
//! The error cap and the cancellation token are honored between rules, so
//! a stopped run still returns everything found up to that point.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};
use x12_adapter::{check_envelopes, split, SplitResult, TxBlock};
use x12_ir::{
    CancellationToken, CollectorHalt, Document, ErrorCollector, IssueLevel, RawSegment, Severity,
    ValidationIssue,
};
use x12_mapping::{evaluate_rules, Mapper};
use x12_schema::{
    Check, ConfigStore, ElementValue, PartnerProfile, ProcessedSegment, RegistrySnapshot,
    ResolvedValidation, TransactionConfig, ValidationLevel, ValidationRule,
};

use crate::processor::SegmentProcessor;
use crate::reporter::{Stage, TransactionReport, ValidationReport};
use crate::rules::{validate_conditional, validate_data_type, validate_length};
use crate::{Error, Result};

/// Version assumed when a document declares none
pub const DEFAULT_VERSION: &str = "004010";

/// Staged validator for whole documents
///
/// Holds shared registries; build one per partner or per request and call
/// [`Validator::validate`] for each document.
#[derive(Clone)]
pub struct Validator {
    snapshot: Arc<RegistrySnapshot>,
    configs: Arc<ConfigStore>,
    profile: Option<Arc<PartnerProfile>>,
    customer: Option<String>,
    level: Option<ValidationLevel>,
    max_errors: usize,
    cancel: Option<CancellationToken>,
    default_version: String,
}

impl Validator {
    pub fn new(snapshot: Arc<RegistrySnapshot>, configs: Arc<ConfigStore>) -> Self {
        Self {
            snapshot,
            configs,
            profile: None,
            customer: None,
            level: None,
            max_errors: ErrorCollector::<ValidationIssue>::DEFAULT_MAX_ERRORS,
            cancel: None,
            default_version: DEFAULT_VERSION.to_string(),
        }
    }

    #[must_use]
    pub fn with_profile(mut self, profile: Arc<PartnerProfile>) -> Self {
        self.profile = Some(profile);
        self
    }

    /// Customer whose overlay applies on top of the transaction config
    #[must_use]
    pub fn with_customer(mut self, customer_id: impl Into<String>) -> Self {
        self.customer = Some(customer_id.into());
        self
    }

    /// Force a strictness level over config and profile settings
    #[must_use]
    pub fn with_level(mut self, level: ValidationLevel) -> Self {
        self.level = Some(level);
        self
    }

    /// Error cap; zero disables it
    #[must_use]
    pub fn with_max_errors(mut self, max_errors: usize) -> Self {
        self.max_errors = max_errors;
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    #[must_use]
    pub fn with_default_version(mut self, version: impl Into<String>) -> Self {
        self.default_version = version.into();
        self
    }

    /// Validate a document through every stage
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyDocument`] for a document without segments and
    /// propagates config store failures other than a missing config.
    pub fn validate(&self, doc: &Document) -> Result<ValidationReport> {
        if doc.segments.is_empty() {
            return Err(Error::EmptyDocument);
        }
        let segments = doc.segments.as_slice();
        let version = if doc.metadata.version.trim().is_empty() {
            self.default_version.clone()
        } else {
            doc.metadata.version.trim().to_string()
        };
        info!(
            segments = segments.len(),
            version = %version,
            "Validating document"
        );

        let split = split(segments);
        let envelope = self.scope(None, "", &version);
        let mut txs = Vec::new();
        for block in split.transactions() {
            let tx_version = split
                .group_at(block.st_index)
                .map(|g| g.version.trim())
                .filter(|v| !v.is_empty())
                .map_or_else(|| version.clone(), str::to_string);
            let config = self.config_for(&block.set_id, &tx_version)?;
            let scope = self.scope(config.as_deref(), &block.set_id, &tx_version);
            txs.push(TxContext {
                block,
                config,
                scope,
                version: tx_version,
            });
        }

        let mut owner = vec![None; segments.len()];
        for (t, tx) in txs.iter().enumerate() {
            for slot in owner
                .iter_mut()
                .take(tx.block.end_index + 1)
                .skip(tx.block.st_index)
            {
                *slot = Some(t);
            }
        }
        let scopes: Vec<&Scope> = owner
            .iter()
            .map(|o| o.map_or(&envelope, |t| &txs[t].scope))
            .collect();

        let mut tracker = envelope.processor.tracker();
        for tx in &txs {
            for req in &tx.scope.resolved.loop_requirements {
                tracker.add_loop_start(req.start_segment());
            }
        }
        let processed: Vec<ProcessedSegment> = segments
            .iter()
            .zip(&scopes)
            .map(|(raw, scope)| scope.processor.process_segment(raw, tracker.update(raw)))
            .collect();

        let pass = Pass {
            validator: self,
            segments,
            processed: &processed,
            scopes,
            txs: &txs,
            split: &split,
            envelope: &envelope,
        };
        let mut run = Run::new(self.max_errors, self.cancel.clone());
        let objects = pass.run(&mut run);

        let transactions = txs
            .iter()
            .zip(objects)
            .map(|(tx, business_object)| TransactionReport {
                st_index: tx.block.st_index,
                se_index: tx.block.se_index,
                set_id: tx.block.set_id.clone(),
                control: tx.block.control.clone(),
                configured: tx.config.is_some(),
                business_object,
            })
            .collect();

        let Run {
            collector,
            stages,
            truncated,
            cancelled,
            ..
        } = run;
        let issues = collector.into_items();
        let report = ValidationReport {
            error_count: issues.iter().filter(|i| i.is_error()).count(),
            warning_count: issues.iter().filter(|i| i.is_warning()).count(),
            issues,
            stages,
            cancelled,
            truncated,
            transactions,
            segments: processed,
        };
        info!("Validation finished: {}", report.summary());
        Ok(report)
    }

    fn config_for(&self, set_id: &str, version: &str) -> Result<Option<Arc<TransactionConfig>>> {
        match self.configs.get_config(set_id, version) {
            Ok(config) => Ok(Some(config)),
            Err(x12_schema::Error::ConfigNotFound { key }) => {
                debug!("No transaction config for {}", key);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn scope(&self, config: Option<&TransactionConfig>, set_id: &str, version: &str) -> Scope {
        let mut resolved = ResolvedValidation::resolve(
            config,
            self.profile.as_deref(),
            self.customer.as_deref(),
            set_id,
        );
        if let Some(level) = self.level {
            resolved = resolved.with_level(level);
        }

        let mut processor = SegmentProcessor::new(Arc::clone(&self.snapshot), version)
            .with_validation(resolved.config.clone())
            .with_loop_starts(
                resolved
                    .loop_requirements
                    .iter()
                    .map(|r| r.start_segment().to_string()),
            );
        if let Some(overlay) = &resolved.overlay {
            processor = processor.with_overlay(overlay.clone());
        }
        if let Some(profile) = &self.profile {
            processor = processor.with_partner(profile.partner_id.clone());
        }
        Scope {
            resolved,
            processor,
        }
    }
}

/// Settings and processor for one part of a document
struct Scope {
    resolved: ResolvedValidation,
    processor: SegmentProcessor,
}

impl Scope {
    fn level(&self) -> ValidationLevel {
        self.resolved.config.level
    }

    /// Lenient runs report rule failures as warnings at most
    fn capped(&self, severity: Severity) -> Severity {
        if self.level() == ValidationLevel::Lenient && severity.is_error() {
            Severity::Warning
        } else {
            severity
        }
    }
}

struct TxContext<'a> {
    block: &'a TxBlock,
    config: Option<Arc<TransactionConfig>>,
    scope: Scope,
    version: String,
}

/// Issue sink and stop conditions for one run
struct Run {
    collector: ErrorCollector<ValidationIssue>,
    cancel: Option<CancellationToken>,
    stages: Vec<Stage>,
    truncated: bool,
    cancelled: bool,
}

impl Run {
    fn new(max_errors: usize, cancel: Option<CancellationToken>) -> Self {
        Self {
            collector: ErrorCollector::new().with_max_errors(max_errors),
            cancel,
            stages: Vec::new(),
            truncated: false,
            cancelled: false,
        }
    }

    /// Record an issue; false once the run must stop
    fn push(&mut self, issue: ValidationIssue) -> bool {
        if self.truncated {
            return false;
        }
        match self.collector.add(issue) {
            Ok(()) => true,
            Err(CollectorHalt::MaxErrorsExceeded { limit }) => {
                warn!(limit, "Error cap reached, validation stopped");
                self.truncated = true;
                false
            }
            Err(CollectorHalt::Fatal) => {
                self.truncated = true;
                false
            }
        }
    }

    fn stopped(&mut self) -> bool {
        if self.truncated || self.cancelled {
            return true;
        }
        if self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
            info!("Validation cancelled after {} issues", self.collector.len());
            self.cancelled = true;
        }
        self.cancelled
    }

    fn begin(&mut self, stage: Stage) -> bool {
        if self.stopped() {
            return false;
        }
        debug!(%stage, "Validation stage started");
        self.stages.push(stage);
        true
    }
}

/// Borrowed state shared by the stages of one run
struct Pass<'a> {
    validator: &'a Validator,
    segments: &'a [RawSegment],
    processed: &'a [ProcessedSegment],
    /// Scope owning each segment index
    scopes: Vec<&'a Scope>,
    txs: &'a [TxContext<'a>],
    split: &'a SplitResult,
    envelope: &'a Scope,
}

impl Pass<'_> {
    /// Run all stages; returns the business object of each transaction
    fn run(&self, run: &mut Run) -> Vec<Option<Value>> {
        let mut objects = vec![None; self.txs.len()];
        if run.begin(Stage::Syntactic) {
            self.syntactic(run);
        }
        if run.begin(Stage::Structural) {
            self.structural(run);
        }
        if run.begin(Stage::Element) {
            self.element(run);
        }
        if run.begin(Stage::Conditional) {
            self.conditional(run);
        }
        if run.begin(Stage::Business) {
            self.business(run, &mut objects);
        }
        objects
    }

    fn body(&self, block: &TxBlock) -> &[ProcessedSegment] {
        self.processed
            .get(block.st_index..=block.end_index)
            .unwrap_or_default()
    }

    // ========================================================================
    // Stage 1: framing, encoding, value formats
    // ========================================================================

    fn syntactic(&self, run: &mut Run) {
        let control_numbers = self.envelope.resolved.config.validate_control_numbers;
        let framing = self
            .split
            .issues
            .iter()
            .cloned()
            .chain(check_envelopes(self.segments, self.split));
        for issue in framing {
            if !control_numbers && is_control_mismatch(issue.code()) {
                continue;
            }
            if !run.push(issue) {
                return;
            }
        }

        if let Some(profile) = self.validator.profile.as_ref().filter(|p| p.is_ascii_only()) {
            let offending = self.segments.iter().find(|s| {
                !s.tag.is_ascii() || s.elements.iter().flatten().any(|v| !v.is_ascii())
            });
            if let Some(raw) = offending {
                let issue = ValidationIssue::warning(
                    "ENCODING_ERROR",
                    format!(
                        "Partner {} requires ASCII but segment {} contains other characters",
                        profile.partner_id, raw.tag
                    ),
                    IssueLevel::Document,
                )
                .at_segment(raw.tag.clone(), raw.index);
                if !run.push(issue) {
                    return;
                }
            }
        }

        for (seg, scope) in self.processed.iter().zip(&self.scopes) {
            if run.stopped() {
                return;
            }
            let Some(severity) = scope.resolved.config.severity_for(Check::Format) else {
                continue;
            };
            if seg.is_unknown() {
                continue;
            }
            for element in &seg.schema.elements {
                let Some(ElementValue::Simple(value)) = seg.element(element.position) else {
                    continue;
                };
                let result = validate_data_type(value, element.data_type);
                let (false, Some(code)) = (result.is_valid, result.code) else {
                    continue;
                };
                let issue = locate(
                    ValidationIssue::new(
                        severity,
                        code,
                        result.message.unwrap_or_default(),
                        IssueLevel::Element,
                    ),
                    seg,
                )
                .with_element(element.position)
                .with_element_ref(element.ref_id.clone())
                .with_bad_value(value.clone());
                if !run.push(issue) {
                    return;
                }
            }
        }
    }

    // ========================================================================
    // Stage 2: segment and loop requirements, counts, unknown segments
    // ========================================================================

    fn structural(&self, run: &mut Run) {
        for tx in self.txs {
            if run.stopped() {
                return;
            }
            if tx.scope.level() == ValidationLevel::None {
                continue;
            }
            for issue in self.transaction_structure(tx) {
                if !run.push(issue) {
                    return;
                }
            }
        }

        for (seg, scope) in self.processed.iter().zip(&self.scopes) {
            if !seg.is_unknown() {
                continue;
            }
            let Some(severity) = scope.resolved.config.severity_for(Check::UnknownSegment) else {
                continue;
            };
            let issue = locate(
                ValidationIssue::new(
                    severity,
                    "SEG_UNRECOGNIZED",
                    format!(
                        "Segment {} is not defined for version {}",
                        seg.tag, seg.schema.version
                    ),
                    IssueLevel::Segment,
                ),
                seg,
            );
            if !run.push(issue) {
                return;
            }
        }
    }

    fn transaction_structure(&self, tx: &TxContext<'_>) -> Vec<ValidationIssue> {
        let block = tx.block;
        let body = self.body(block);
        let resolved = &tx.scope.resolved;
        let requirement = tx.scope.capped(Severity::Error);
        let at_st = |issue: ValidationIssue| issue.at_segment("ST", block.st_index);
        let mut issues = Vec::new();

        if let Some(profile) = &self.validator.profile {
            if !profile.supports(&block.set_id, &tx.version, true) {
                issues.push(
                    at_st(ValidationIssue::error(
                        "UNSUPPORTED_TRANSACTION",
                        format!(
                            "Partner {} does not accept inbound {} version {}",
                            profile.partner_id, block.set_id, tx.version
                        ),
                        IssueLevel::Structure,
                    ))
                    .with_context(profile.partner_id.clone()),
                );
            }
        }

        for req in &resolved.segment_requirements {
            if matches!(req.segment_id.to_ascii_uppercase().as_str(), "ST" | "SE") {
                continue;
            }
            let occurrences: Vec<&ProcessedSegment> = body
                .iter()
                .filter(|s| s.tag.eq_ignore_ascii_case(&req.segment_id))
                .collect();
            let min = if req.required {
                req.min_occurs.max(1)
            } else {
                req.min_occurs
            };
            if occurrences.len() < min {
                issues.push(
                    at_st(ValidationIssue::new(
                        requirement,
                        "MISSING_REQUIRED_SEGMENT",
                        format!(
                            "Required segment {} occurs {} time(s), minimum {min}",
                            req.segment_id,
                            occurrences.len()
                        ),
                        IssueLevel::Structure,
                    ))
                    .with_context(req.segment_id.clone()),
                );
            } else if let Some(excess) = (req.max_occurs > 0)
                .then(|| occurrences.get(req.max_occurs))
                .flatten()
            {
                issues.push(locate(
                    ValidationIssue::new(
                        requirement,
                        "SEG_EXCEEDS_MAXIMUM_USE",
                        format!(
                            "Segment {} occurs {} time(s), maximum {}",
                            req.segment_id,
                            occurrences.len(),
                            req.max_occurs
                        ),
                        IssueLevel::Segment,
                    ),
                    excess,
                ));
            }
        }

        for req in &resolved.loop_requirements {
            let start = req.start_segment();
            let starts: Vec<&ProcessedSegment> = body
                .iter()
                .filter(|s| s.tag.eq_ignore_ascii_case(start))
                .collect();
            let min = if req.required {
                req.min_occurs.max(1)
            } else {
                req.min_occurs
            };
            if starts.len() < min {
                issues.push(
                    at_st(ValidationIssue::new(
                        requirement,
                        "INSUFFICIENT_LOOP_OCCURRENCES",
                        format!(
                            "Loop {} occurs {} time(s), minimum {min}",
                            req.loop_id,
                            starts.len()
                        ),
                        IssueLevel::Structure,
                    ))
                    .with_loop(req.loop_id.clone()),
                );
            } else if let Some(excess) = (req.max_occurs > 0)
                .then(|| starts.get(req.max_occurs))
                .flatten()
            {
                issues.push(
                    ValidationIssue::new(
                        requirement,
                        "EXCESSIVE_LOOP_OCCURRENCES",
                        format!(
                            "Loop {} occurs {} time(s), maximum {}",
                            req.loop_id,
                            starts.len(),
                            req.max_occurs
                        ),
                        IssueLevel::Structure,
                    )
                    .at_segment(excess.tag.clone(), excess.index())
                    .with_loop(req.loop_id.clone()),
                );
            }
        }

        if let (Some(se), Some(expected)) = (block.se_index, block.segment_count()) {
            if let Some(severity) = resolved.config.severity_for(Check::SegmentCount) {
                let declared = self.segments.get(se).map_or("", |s| s.element(1).trim());
                if declared.parse::<usize>().ok() != Some(expected) {
                    issues.push(
                        ValidationIssue::new(
                            severity,
                            "SEGMENT_COUNT_MISMATCH",
                            format!("SE01 declares '{declared}' segments, transaction has {expected}"),
                            IssueLevel::Structure,
                        )
                        .at_segment("SE", se)
                        .with_element(1)
                        .with_bad_value(declared),
                    );
                }
            }
        }

        for seg in body.iter().filter(|s| resolved.is_prohibited(&s.tag)) {
            issues.push(
                locate(
                    ValidationIssue::error(
                        "SEG_NOT_IN_DEFINED",
                        format!("Segment {} is prohibited for this partner", seg.tag),
                        IssueLevel::Segment,
                    ),
                    seg,
                )
                .with_severity(requirement),
            );
        }

        issues
    }

    // ========================================================================
    // Stage 3: processor findings, lengths, extra elements, partner rules
    // ========================================================================

    fn element(&self, run: &mut Run) {
        for (i, (seg, scope)) in self.processed.iter().zip(&self.scopes).enumerate() {
            if run.stopped() {
                return;
            }
            let mut issues = seg.issues.clone();
            if !seg.is_unknown() {
                issues.extend(lengths(seg, scope));
                if let Some(raw) = self.segments.get(i) {
                    issues.extend(extra_elements(seg, raw, scope));
                }
            }
            issues.extend(partner_rules(seg, scope));
            for issue in issues {
                if !run.push(issue) {
                    return;
                }
            }
        }
    }

    // ========================================================================
    // Stage 4: WHEN/THEN rules
    // ========================================================================

    fn conditional(&self, run: &mut Run) {
        for tx in self.txs {
            if tx.scope.level() == ValidationLevel::None {
                continue;
            }
            let body = self.body(tx.block);
            for rule in &tx.scope.resolved.conditional_rules {
                if run.stopped() {
                    return;
                }
                let Some(violation) = validate_conditional(rule, body) else {
                    continue;
                };
                let mut issue = locate(
                    ValidationIssue::new(
                        tx.scope.capped(rule.severity),
                        violation.code,
                        violation.message,
                        IssueLevel::Element,
                    ),
                    violation.segment,
                )
                .with_element(rule.then.element);
                if !rule.id.is_empty() {
                    issue = issue.with_context(rule.id.clone());
                }
                if !run.push(issue) {
                    return;
                }
            }
        }
    }

    // ========================================================================
    // Stage 5: business rules over the mapped object
    // ========================================================================

    fn business(&self, run: &mut Run, objects: &mut [Option<Value>]) {
        for (tx, slot) in self.txs.iter().zip(objects.iter_mut()) {
            if run.stopped() {
                return;
            }
            let Some(config) = &tx.config else {
                continue;
            };
            if tx.scope.level() == ValidationLevel::None {
                continue;
            }

            let mut mapper = Mapper::new(Arc::clone(config));
            if let Some(overlay) = &tx.scope.resolved.overlay {
                mapper = mapper.with_overlay(overlay.clone());
            }
            if let Some(profile) = &self.validator.profile {
                mapper = mapper.with_profile(Arc::clone(profile));
            }

            let object = match mapper.parse(self.body(tx.block)) {
                Ok(object) => object,
                Err(e) => {
                    warn!(st = tx.block.st_index, %e, "Mapping failed, business rules skipped");
                    let issue = ValidationIssue::warning(
                        "MAPPING_FAILED",
                        format!("Transaction {} could not be mapped: {e}", tx.block.control),
                        IssueLevel::Business,
                    )
                    .at_segment("ST", tx.block.st_index);
                    if !run.push(issue) {
                        return;
                    }
                    continue;
                }
            };

            let resolved = &tx.scope.resolved;
            let finished = business_rules(run, &resolved.business_rules, &object, IssueLevel::Business, tx.block)
                && business_rules(run, &resolved.customer_rules, &object, IssueLevel::Customer, tx.block);
            *slot = Some(object);
            if !finished {
                return;
            }
        }
    }
}

/// Evaluate rules one at a time; false once the run must stop
fn business_rules(
    run: &mut Run,
    rules: &[ValidationRule],
    object: &Value,
    level: IssueLevel,
    block: &TxBlock,
) -> bool {
    for rule in rules {
        if run.stopped() {
            return false;
        }
        for issue in evaluate_rules(std::slice::from_ref(rule), object, level) {
            if !run.push(issue.at_segment("ST", block.st_index)) {
                return false;
            }
        }
    }
    true
}

fn lengths(seg: &ProcessedSegment, scope: &Scope) -> Vec<ValidationIssue> {
    let Some(severity) = scope.resolved.config.severity_for(Check::Length) else {
        return Vec::new();
    };
    let mut issues = Vec::new();
    for element in &seg.schema.elements {
        let Some(ElementValue::Simple(value)) = seg.element(element.position) else {
            continue;
        };
        let overlay = scope.resolved.element_overlay(&seg.tag, element.position);
        let min = overlay.and_then(|o| o.min_length).unwrap_or(element.min_length);
        let max = overlay.and_then(|o| o.max_length).unwrap_or(element.max_length);
        let result = validate_length(value, element.data_type, min, max);
        if let Some(code) = result.code {
            issues.push(
                locate(
                    ValidationIssue::new(
                        severity,
                        code,
                        format!(
                            "{}{:02}: {}",
                            seg.tag,
                            element.position,
                            result.message.unwrap_or_default()
                        ),
                        IssueLevel::Element,
                    ),
                    seg,
                )
                .with_element(element.position)
                .with_element_ref(element.ref_id.clone())
                .with_bad_value(value.clone()),
            );
        }
    }
    issues
}

fn extra_elements(seg: &ProcessedSegment, raw: &RawSegment, scope: &Scope) -> Vec<ValidationIssue> {
    let Some(severity) = scope.resolved.config.severity_for(Check::ExtraElement) else {
        return Vec::new();
    };
    let declared = seg.schema.max_position();
    (declared + 1..=raw.element_count())
        .filter(|pos| raw.components(*pos).iter().any(|c| !c.is_empty()))
        .map(|pos| {
            locate(
                ValidationIssue::new(
                    severity,
                    "EXTRA_ELEMENT",
                    format!(
                        "Element {}{pos:02} is beyond the {declared} elements defined for the segment",
                        seg.tag
                    ),
                    IssueLevel::Element,
                ),
                seg,
            )
            .with_element(pos)
            .with_bad_value(raw.element(pos))
        })
        .collect()
}

fn partner_rules(seg: &ProcessedSegment, scope: &Scope) -> Vec<ValidationIssue> {
    scope
        .resolved
        .element_rules
        .iter()
        .filter(|r| r.segment_tag.eq_ignore_ascii_case(&seg.tag))
        .filter_map(|rule| {
            let value = seg.value(rule.element_position);
            if value.is_empty() || rule.accepts(value) {
                return None;
            }
            let code = if rule.rule_id.is_empty() {
                "CUSTOM_RULE_FAILED"
            } else {
                rule.rule_id.as_str()
            };
            let message = if rule.message.is_empty() {
                format!(
                    "{}{:02} value '{value}' does not match {}",
                    seg.tag,
                    rule.element_position,
                    rule.pattern.as_str()
                )
            } else {
                rule.message.clone()
            };
            Some(
                locate(
                    ValidationIssue::new(rule.severity, code, message, IssueLevel::Element),
                    seg,
                )
                .with_element(rule.element_position)
                .with_bad_value(value),
            )
        })
        .collect()
}

/// Attach segment, index and loop of a processed segment
fn locate(issue: ValidationIssue, seg: &ProcessedSegment) -> ValidationIssue {
    let issue = issue.at_segment(seg.tag.clone(), seg.index());
    match &seg.position.loop_id {
        Some(loop_id) => issue.with_loop(loop_id.clone()),
        None => issue,
    }
}

fn is_control_mismatch(code: &str) -> bool {
    code.contains("CONTROL") && code.ends_with("MISMATCH")
}

#[cfg(test)]
mod tests {
    use super::*;
    use x12_ir::Delimiters;
    use x12_schema::SchemaRegistry;

    fn validator() -> Validator {
        let registry = SchemaRegistry::with_builtin().unwrap();
        let configs = ConfigStore::with_standard_configs().unwrap();
        Validator::new(registry.snapshot().unwrap(), Arc::new(configs))
    }

    fn document(body: &[&str]) -> Document {
        let mut lines = vec![
            "ISA*00*          *00*          *ZZ*SENDER         *ZZ*RECEIVER       *240101*1200*U*00401*000000001*0*P*>".to_string(),
            "GS*SM*SENDER*RECEIVER*20240101*1200*1*X*004010".to_string(),
            "ST*204*0001".to_string(),
        ];
        lines.extend(body.iter().map(|s| (*s).to_string()));
        lines.push(format!("SE*{}*0001", body.len() + 2));
        lines.push("GE*1*1".to_string());
        lines.push("IEA*1*000000001".to_string());
        let segments = lines
            .iter()
            .enumerate()
            .map(|(i, line)| {
                let mut parts = line.split('*');
                let tag = parts.next().unwrap_or_default();
                RawSegment::new(tag, parts, i)
            })
            .collect();
        Document::new(segments, Delimiters::default())
    }

    const TENDER: &[&str] = &[
        "B2**TEST**SHIP123**PP",
        "N1*SH*ACME SHIPPING",
        "N1*CN*BETA RECEIVING",
        "S5*1*CL",
        "S5*2*CU",
    ];

    #[test]
    fn test_valid_tender_has_no_issues() {
        let report = validator()
            .with_level(ValidationLevel::Strict)
            .validate(&document(TENDER))
            .unwrap();
        assert!(report.issues.is_empty(), "{:?}", report.codes());
        assert!(report.is_valid());
        assert_eq!(report.stages, Stage::ALL);
        assert_eq!(report.transactions.len(), 1);
        assert!(report.transactions[0].configured);
        assert!(report.business_object(2).is_some());
        assert_eq!(report.segments.len(), 11);
    }

    #[test]
    fn test_empty_document_is_an_error() {
        let doc = Document::new(Vec::new(), Delimiters::default());
        assert!(matches!(validator().validate(&doc), Err(Error::EmptyDocument)));
    }

    #[test]
    fn test_segment_count_mismatch() {
        let mut doc = document(TENDER);
        let se = doc.segments.len() - 3;
        doc.segments[se] = RawSegment::new("SE", ["99", "0001"], se);
        let report = validator().validate(&doc).unwrap();
        let issue = report
            .issues
            .iter()
            .find(|i| i.code() == "SEGMENT_COUNT_MISMATCH")
            .unwrap();
        assert!(issue.is_error());
        assert_eq!(issue.segment_index(), se);
        assert_eq!(issue.location().bad_value.as_deref(), Some("99"));

        let lenient = validator()
            .with_level(ValidationLevel::Lenient)
            .validate(&doc)
            .unwrap();
        assert!(lenient.issues.iter().all(|i| !i.is_error()));
        assert!(lenient.has_code("SEGMENT_COUNT_MISMATCH"));
    }

    #[test]
    fn test_excessive_loop_points_at_first_extra_start() {
        let mut body = vec!["B2**TEST**SHIP123**PP", "N1*SH*ACME", "N1*CN*BETA"];
        let notes: Vec<String> = (0..11).map(|i| format!("NTE**NOTE {i}")).collect();
        body.extend(notes.iter().map(String::as_str));
        body.extend(["S5*1*CL", "S5*2*CU"]);
        let report = validator().validate(&document(&body)).unwrap();

        let issue = report
            .issues
            .iter()
            .find(|i| i.code() == "EXCESSIVE_LOOP_OCCURRENCES")
            .unwrap();
        assert_eq!(issue.location().loop_id.as_deref(), Some("NTE"));
        // ST at 2, B2 at 3, N1s at 4 and 5, eleventh NTE at 16
        assert_eq!(issue.segment_index(), 16);
    }

    #[test]
    fn test_format_checks_follow_level() {
        let body = ["B2**TEST**SHIP123**PP", "N1*SH*ACME", "N1*CN*BETA", "S5*1*CL", "G62*10*20241350", "S5*2*CU"];
        let strict = validator()
            .with_level(ValidationLevel::Strict)
            .validate(&document(&body))
            .unwrap();
        let issue = strict
            .issues
            .iter()
            .find(|i| i.code() == "ELEM_INVALID_DATE")
            .unwrap();
        assert!(issue.is_error());
        assert_eq!(issue.location().element_position, Some(2));
        assert_eq!(issue.location().loop_id.as_deref(), Some("S5"));

        let standard = validator().validate(&document(&body)).unwrap();
        assert!(standard.is_valid());
        assert!(standard.warnings().any(|i| i.code() == "ELEM_INVALID_DATE"));
    }

    #[test]
    fn test_unknown_segment_by_level() {
        let mut body = TENDER.to_vec();
        body.insert(1, "ZZZ*CUSTOM");
        let strict = validator()
            .with_level(ValidationLevel::Strict)
            .validate(&document(&body))
            .unwrap();
        assert!(strict.errors().any(|i| i.code() == "SEG_UNRECOGNIZED"));

        let standard = validator().validate(&document(&body)).unwrap();
        assert!(standard.warnings().any(|i| i.code() == "SEG_UNRECOGNIZED"));

        let lenient = validator()
            .with_level(ValidationLevel::Lenient)
            .validate(&document(&body))
            .unwrap();
        assert!(!lenient.has_code("SEG_UNRECOGNIZED"));
    }

    #[test]
    fn test_error_cap_truncates() {
        let body = ["B2**TEST", "N1*ZZ", "N1*YY", "S5**XX"];
        let report = validator()
            .with_level(ValidationLevel::Strict)
            .with_max_errors(2)
            .validate(&document(&body))
            .unwrap();
        assert!(report.truncated);
        assert_eq!(report.error_count, 2);
        assert!(report.summary().ends_with("truncated"));
    }

    #[test]
    fn test_cancelled_before_first_stage() {
        let token = CancellationToken::new();
        token.cancel();
        let report = validator()
            .with_cancellation(token)
            .validate(&document(TENDER))
            .unwrap();
        assert!(report.cancelled);
        assert!(report.stages.is_empty());
        assert!(!report.is_valid());
    }

    #[test]
    fn test_control_mismatch_codes() {
        assert!(is_control_mismatch("INTERCHANGE_CONTROL_MISMATCH"));
        assert!(is_control_mismatch("GROUP_CONTROL_NUMBER_MISMATCH"));
        assert!(!is_control_mismatch("GROUP_COUNT_MISMATCH"));
    }
}
