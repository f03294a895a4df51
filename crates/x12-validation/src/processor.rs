//! Schema-driven segment processing
//!
//! A [`PositionTracker`] follows envelope and loop boundaries through one
//! scan. A [`SegmentProcessor`] reads each raw segment through its schema,
//! applies customer overlay defaults and transforms, and records missing
//! mandatory elements and invalid codes on the processed segment.
#![allow(clippy::must_use_candidate)] // Accessors are clear at call sites without #[must_use].

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{debug, trace};
use x12_ir::{IssueLevel, RawSegment, Severity, ValidationIssue};
use x12_mapping::apply_expression;
use x12_schema::model::{component_key, element_key};
use x12_schema::{
    Check, CustomerOverlay, ElementOverlay, ElementSchema, ElementValue, ProcessedSegment,
    RegistrySnapshot, SegmentPosition, SegmentSchema, ValidationConfig, ValidationLevel,
};

use crate::codelist::{CodeList, CodeListResult};

/// Tags that open a loop iteration when no configuration adds more
///
/// Body segments such as N3, N4, G61 and G62 stay in whichever loop is
/// current.
pub const DEFAULT_LOOP_STARTS: &[&str] = &["N1", "S5"];

// ============================================================================
// Position tracking
// ============================================================================

/// Envelope and loop state for one scan
#[derive(Debug, Clone)]
pub struct PositionTracker {
    loop_starts: Vec<String>,
    interchange: Option<String>,
    group: Option<String>,
    transaction: Option<String>,
    current_loop: Option<String>,
    /// Loops suspended by LS, innermost last
    parents: Vec<Option<String>>,
    /// Iterations per loop start, reset at each ST
    iterations: HashMap<String, usize>,
}

impl Default for PositionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PositionTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::with_loop_starts(DEFAULT_LOOP_STARTS.iter().copied())
    }

    /// Tracker with its own set of loop start tags
    pub fn with_loop_starts<I, S>(starts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tracker = Self {
            loop_starts: Vec::new(),
            interchange: None,
            group: None,
            transaction: None,
            current_loop: None,
            parents: Vec::new(),
            iterations: HashMap::new(),
        };
        for tag in starts {
            tracker.add_loop_start(tag.as_ref());
        }
        tracker
    }

    pub fn add_loop_start(&mut self, tag: &str) {
        let tag = tag.trim().to_ascii_uppercase();
        if !tag.is_empty() && !self.loop_starts.contains(&tag) {
            self.loop_starts.push(tag);
        }
    }

    /// Advance over one segment and return its position
    pub fn update(&mut self, segment: &RawSegment) -> SegmentPosition {
        let tag = segment.tag.to_ascii_uppercase();
        match tag.as_str() {
            "ISA" => {
                self.interchange = non_empty(segment.element(13));
                self.clear_loop();
            }
            "GS" => {
                self.group = non_empty(segment.element(6));
                self.clear_loop();
            }
            "ST" => {
                self.transaction = non_empty(segment.element(2));
                self.iterations.clear();
                self.clear_loop();
            }
            "LS" => {
                self.parents.push(self.current_loop.take());
                self.current_loop = non_empty(segment.element(1));
            }
            "LE" => {
                self.current_loop = self.parents.pop().flatten();
            }
            "SE" | "GE" | "IEA" => self.clear_loop(),
            start if self.loop_starts.iter().any(|s| s == start) => {
                *self.iterations.entry(tag.clone()).or_insert(0) += 1;
                self.current_loop = Some(tag.clone());
            }
            _ => {}
        }

        let loop_iteration = self
            .current_loop
            .as_ref()
            .and_then(|l| self.iterations.get(l))
            .copied()
            .unwrap_or(0);
        SegmentPosition {
            index: segment.index,
            line: segment.index + 1,
            loop_id: self.current_loop.clone(),
            loop_iteration,
            parent_loop: self.parents.last().cloned().flatten(),
            transaction_id: self.transaction.clone(),
            group_id: self.group.clone(),
            interchange_id: self.interchange.clone(),
        }
    }

    /// Positions for a whole scan, in order
    pub fn track(&mut self, segments: &[RawSegment]) -> Vec<SegmentPosition> {
        segments.iter().map(|s| self.update(s)).collect()
    }

    fn clear_loop(&mut self) {
        self.current_loop = None;
        self.parents.clear();
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

// ============================================================================
// Segment processing
// ============================================================================

/// Reads raw segments through the schemas of one version
#[derive(Debug, Clone)]
pub struct SegmentProcessor {
    snapshot: Arc<RegistrySnapshot>,
    version: String,
    validation: ValidationConfig,
    overlay: Option<CustomerOverlay>,
    partner_id: Option<String>,
    loop_starts: Vec<String>,
}

impl SegmentProcessor {
    pub fn new(snapshot: Arc<RegistrySnapshot>, version: impl Into<String>) -> Self {
        Self {
            snapshot,
            version: version.into(),
            validation: ValidationConfig::default(),
            overlay: None,
            partner_id: None,
            loop_starts: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_validation(mut self, validation: ValidationConfig) -> Self {
        self.validation = validation;
        self
    }

    /// Apply a customer overlay; inactive overlays are ignored
    #[must_use]
    pub fn with_overlay(mut self, overlay: CustomerOverlay) -> Self {
        if overlay.active {
            self.overlay = Some(overlay);
        } else {
            debug!("Ignoring inactive overlay {}", overlay.customer_id);
        }
        self
    }

    #[must_use]
    pub fn with_partner(mut self, partner_id: impl Into<String>) -> Self {
        self.partner_id = Some(partner_id.into());
        self
    }

    /// Extra loop start tags on top of [`DEFAULT_LOOP_STARTS`]
    #[must_use]
    pub fn with_loop_starts<I, S>(mut self, starts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.loop_starts.extend(starts.into_iter().map(Into::into));
        self
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Tracker seeded with this processor's loop starts
    #[must_use]
    pub fn tracker(&self) -> PositionTracker {
        PositionTracker::with_loop_starts(
            DEFAULT_LOOP_STARTS
                .iter()
                .copied()
                .chain(self.loop_starts.iter().map(String::as_str)),
        )
    }

    /// Process a whole scan in one pass
    #[must_use]
    pub fn process(&self, segments: &[RawSegment]) -> Vec<ProcessedSegment> {
        let mut tracker = self.tracker();
        segments
            .iter()
            .map(|raw| {
                let position = tracker.update(raw);
                self.process_segment(raw, position)
            })
            .collect()
    }

    /// Schema for a tag, or a synthesized unknown schema
    #[must_use]
    pub fn schema_for(&self, tag: &str) -> Arc<SegmentSchema> {
        match self.snapshot.get(&self.version, tag) {
            Ok(schema) => schema,
            Err(e) => {
                trace!(%e, "Synthesizing schema for {}", tag);
                Arc::new(SegmentSchema::unknown(&tag.to_ascii_uppercase(), &self.version))
            }
        }
    }

    /// Read one raw segment through its schema
    #[must_use]
    pub fn process_segment(&self, raw: &RawSegment, position: SegmentPosition) -> ProcessedSegment {
        let schema = self.schema_for(&raw.tag);
        let mut seg = ProcessedSegment::new(Arc::clone(&schema), position);
        seg.partner_id.clone_from(&self.partner_id);

        if schema.is_unknown {
            for (i, components) in raw.elements.iter().enumerate() {
                if let Some(value) = element_value(components) {
                    seg.set(i + 1, value);
                }
            }
            return seg;
        }

        let declared = schema.max_position();
        let last = if self.validation.elements.allow_extra_elements {
            declared.max(raw.element_count())
        } else {
            declared
        };

        for pos in 1..=last {
            let element = schema.element(pos);
            let element_overlay = self
                .overlay
                .as_ref()
                .and_then(|o| o.element_overlay(&seg.tag, pos));

            let mut value = element_value(raw.components(pos));
            if value.is_none() {
                if let Some(default) = self.overlay.as_ref().and_then(|o| o.default_for(&seg.tag, pos)) {
                    trace!("Default applied to {}", element_key(&seg.tag, pos));
                    value = Some(ElementValue::Simple(default));
                }
            }
            if let Some(expr) = element_overlay.and_then(|o| o.transform.as_deref()) {
                value = self.transform(&mut seg, pos, expr, value);
            }

            match (value, element) {
                (Some(value), Some(element)) => {
                    self.check_codes(&mut seg, element, element_overlay, &value);
                    seg.set(pos, value);
                }
                (Some(value), None) => seg.set(pos, value),
                (None, Some(element)) => self.check_required(&mut seg, element, element_overlay),
                (None, None) => {}
            }
        }

        trace!(
            index = seg.index(),
            tag = %seg.tag,
            elements = seg.elements.len(),
            issues = seg.issues.len(),
            "processed segment"
        );
        seg
    }

    fn transform(
        &self,
        seg: &mut ProcessedSegment,
        pos: usize,
        expression: &str,
        value: Option<ElementValue>,
    ) -> Option<ElementValue> {
        let current = match value {
            Some(ElementValue::Simple(current)) => current,
            other => return other,
        };
        match apply_expression(expression, &current, self.overlay.as_ref()) {
            Ok(transformed) => {
                (!transformed.trim().is_empty()).then(|| ElementValue::Simple(transformed))
            }
            Err(e) => {
                let issue = self.locate(
                    ValidationIssue::warning(
                        "TRANSFORM_ERROR",
                        format!("Transform failed for {}: {e}", element_key(&seg.tag, pos)),
                        IssueLevel::Element,
                    ),
                    seg,
                )
                .with_element(pos)
                .with_bad_value(current.clone());
                seg.issues.push(issue);
                Some(ElementValue::Simple(current))
            }
        }
    }

    fn check_required(
        &self,
        seg: &mut ProcessedSegment,
        element: &ElementSchema,
        overlay: Option<&ElementOverlay>,
    ) {
        let required = overlay
            .and_then(|o| o.required)
            .unwrap_or_else(|| element.is_mandatory());
        if !required {
            return;
        }
        let Some(severity) = self.validation.severity_for(Check::MandatoryElement) else {
            return;
        };
        let issue = self
            .locate(
                ValidationIssue::new(
                    severity,
                    "ELEM_MISSING",
                    format!(
                        "Required element {} ({}) is missing",
                        element_key(&seg.tag, element.position),
                        element.name
                    ),
                    IssueLevel::Element,
                ),
                seg,
            )
            .with_element(element.position)
            .with_element_ref(element.ref_id.clone());
        seg.issues.push(issue);
    }

    fn check_codes(
        &self,
        seg: &mut ProcessedSegment,
        element: &ElementSchema,
        overlay: Option<&ElementOverlay>,
        value: &ElementValue,
    ) {
        let allowed: &[String] = overlay.map_or(&[], |o| o.allowed_codes.as_slice());
        let codes = &self.validation.codes;

        match value {
            ElementValue::Composite(components) if element.is_composite() => {
                for component in &element.components {
                    let key = component_key(component.position);
                    let found = components.get(&key).map_or("", String::as_str);
                    if found.is_empty() {
                        if component.requirement == x12_schema::Requirement::Mandatory {
                            if let Some(severity) = self.validation.severity_for(Check::MandatoryElement) {
                                let issue = self
                                    .locate(
                                        ValidationIssue::new(
                                            severity,
                                            "ELEM_MISSING",
                                            format!(
                                                "Required component {}-{:02} ({}) is missing",
                                                element_key(&seg.tag, element.position),
                                                component.position,
                                                component.name
                                            ),
                                            IssueLevel::Element,
                                        ),
                                        seg,
                                    )
                                    .with_element(element.position)
                                    .with_component(component.position)
                                    .with_element_ref(component.ref_id.clone());
                                seg.issues.push(issue);
                            }
                        }
                        continue;
                    }
                    let list = CodeList::for_component(component);
                    if let CodeListResult::Invalid { .. } = list.check(found, codes) {
                        self.invalid_code(seg, element, Some(component.position), found, &list);
                    }
                }
            }
            _ => {
                let found = value.as_str();
                let list = CodeList::for_element(element).restricted_to(allowed);
                match list.check(found, codes) {
                    CodeListResult::Valid {
                        description: Some(description),
                    } => {
                        seg.descriptions
                            .insert(element_key(&seg.tag, element.position), description);
                    }
                    CodeListResult::Invalid { .. } => {
                        self.invalid_code(seg, element, None, found, &list);
                    }
                    CodeListResult::Valid { description: None } | CodeListResult::Skipped => {}
                }
            }
        }
    }

    fn invalid_code(
        &self,
        seg: &mut ProcessedSegment,
        element: &ElementSchema,
        component: Option<usize>,
        found: &str,
        list: &CodeList<'_>,
    ) {
        let Some(mut severity) = self.validation.severity_for(Check::InvalidCode) else {
            return;
        };
        // Strict never demotes
        if self.validation.codes.allow_custom_codes
            && severity.is_error()
            && self.validation.level != ValidationLevel::Strict
        {
            severity = Severity::Warning;
        }
        let mut issue = self
            .locate(
                ValidationIssue::new(
                    severity,
                    "ELEM_INVALID_CODE_VALUE",
                    format!(
                        "Invalid code '{found}' for {} ({}); expected one of {}",
                        element_key(&seg.tag, element.position),
                        element.name,
                        list.display()
                    ),
                    IssueLevel::Element,
                ),
                seg,
            )
            .with_element(element.position)
            .with_element_ref(list.name.to_string())
            .with_bad_value(found.to_string());
        if let Some(component) = component {
            issue = issue.with_component(component);
        }
        seg.issues.push(issue);
    }

    /// Attach segment, index and loop of a processed segment
    fn locate(&self, issue: ValidationIssue, seg: &ProcessedSegment) -> ValidationIssue {
        let issue = issue.at_segment(seg.tag.clone(), seg.index());
        match &seg.position.loop_id {
            Some(loop_id) => issue.with_loop(loop_id.clone()),
            None => issue,
        }
    }
}

/// Stored form of a raw element; empty elements store nothing
fn element_value(components: &[String]) -> Option<ElementValue> {
    match components {
        [] => None,
        [single] => (!single.is_empty()).then(|| ElementValue::Simple(single.clone())),
        many => {
            let map: BTreeMap<String, String> = many
                .iter()
                .enumerate()
                .filter(|(_, v)| !v.is_empty())
                .map(|(i, v)| (component_key(i + 1), v.clone()))
                .collect();
            (!map.is_empty()).then_some(ElementValue::Composite(map))
        }
    }
}
