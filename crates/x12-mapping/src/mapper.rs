//! Segment mapper
//!
//! Parse walks processed segments in order and applies every inbound
//! mapping for the segment's tag. Array targets (`parties[]`) get one item
//! per loop start; inner loop segments such as N3 after N1 merge into the
//! current item. Object targets merge, so B2 and B2A can share `shipment`.
//!
//! Build emits the structure's header segments, then conditional segments
//! whose condition holds, then each loop in declared order with one
//! iteration per item of the loop's collection. Elements are positional up
//! to the last position holding a value.
//!
//! Outbound element values resolve in a fixed order: object field, mapping
//! default, customer default, transform, regex validation.
#![allow(clippy::must_use_candidate)] // Accessors are clear at call sites without #[must_use].

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use serde_json::{Map, Number, Value};
use tracing::{debug, trace, warn};
use x12_ir::RawSegment;
use x12_schema::config::value_to_string;
use x12_schema::{
    CustomerOverlay, ElementMapping, ElementValue, LoopDefinition, PartnerProfile,
    ProcessedSegment, SegmentMapping, TransactionConfig,
};

use crate::conditions::evaluate;
use crate::object::{
    array_at, array_items, lookup, object_at, POSITION_KEY, SEGMENTS_KEY, SEGMENT_COUNTS_KEY,
    TAG_KEY,
};
use crate::transforms::apply_expression;
use crate::{Error, Result};

/// Collection keys tried for a loop when no loop mapping names one
fn conventional_keys(start_segment: &str) -> &'static [&'static str] {
    match start_segment {
        "N1" => &["parties", "partners", "trading_partners", "n1_loop"],
        "S5" => &["stops", "stop_offs", "stop_details", "s5_loop"],
        "L11" => &["references", "reference_numbers", "l11_loop"],
        "AT7" => &["statuses", "shipment_statuses", "at7_loop"],
        "MS3" => &["interline", "interline_info", "ms3_loop"],
        "NTE" => &["notes", "comments", "special_instructions", "nte_loop"],
        _ => &[],
    }
}

/// Outbound validation patterns by source text; a bad pattern keeps its error
type Patterns = HashMap<String, std::result::Result<Regex, String>>;

fn compile_patterns<'a>(
    patterns: &mut Patterns,
    mappings: impl IntoIterator<Item = &'a SegmentMapping>,
) {
    fn visit(patterns: &mut Patterns, elements: &[ElementMapping]) {
        for elem in elements {
            if let Some(pattern) = elem.validation.as_deref() {
                if !patterns.contains_key(pattern) {
                    let compiled = Regex::new(pattern).map_err(|e| {
                        warn!("Invalid validation pattern {}: {}", pattern, e);
                        e.to_string()
                    });
                    patterns.insert(pattern.to_string(), compiled);
                }
            }
            visit(patterns, &elem.components);
        }
    }
    for mapping in mappings {
        visit(patterns, &mapping.elements);
    }
}

/// Maps processed segments to business objects and back
#[derive(Debug, Clone)]
pub struct Mapper {
    config: Arc<TransactionConfig>,
    overlay: Option<CustomerOverlay>,
    profile: Option<Arc<PartnerProfile>>,
    patterns: Patterns,
}

impl Mapper {
    pub fn new(config: Arc<TransactionConfig>) -> Self {
        let mut patterns = Patterns::new();
        compile_patterns(&mut patterns, &config.mappings);
        Self {
            config,
            overlay: None,
            profile: None,
            patterns,
        }
    }

    /// Use an overlay's defaults, custom mappings and named transforms
    ///
    /// Inactive overlays are ignored.
    #[must_use]
    pub fn with_overlay(mut self, overlay: CustomerOverlay) -> Self {
        if overlay.active {
            compile_patterns(&mut self.patterns, &overlay.custom_mappings);
        }
        self.overlay = overlay.active.then_some(overlay);
        self
    }

    /// Annotate parties and references with the partner's roles and kinds
    #[must_use]
    pub fn with_profile(mut self, profile: Arc<PartnerProfile>) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn config(&self) -> &TransactionConfig {
        &self.config
    }

    fn custom_mappings(&self) -> impl Iterator<Item = &SegmentMapping> {
        self.overlay.iter().flat_map(|o| o.custom_mappings.iter())
    }

    fn inbound_mappings<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a SegmentMapping> {
        self.config.inbound_mappings(tag).chain(
            self.custom_mappings()
                .filter(move |m| m.direction.is_inbound() && m.segment_id.eq_ignore_ascii_case(tag)),
        )
    }

    fn outbound_mapping(&self, tag: &str) -> Option<&SegmentMapping> {
        self.config.outbound_mapping(tag).or_else(|| {
            self.custom_mappings()
                .find(|m| m.direction.is_outbound() && m.segment_id.eq_ignore_ascii_case(tag))
        })
    }

    /// Inner loop segments merge into the current array item
    fn is_inner_segment(&self, tag: &str) -> bool {
        self.config.loop_started_by(tag).is_none() && self.config.loop_containing(tag).is_some()
    }

    // ========================================================================
    // Parse
    // ========================================================================

    /// Map the segments of one transaction to a business object
    ///
    /// The result also records one view per segment under `_segments` and
    /// occurrences per tag under `_segment_counts`; business rules read
    /// segment selectors from those.
    ///
    /// # Errors
    ///
    /// Returns transform errors and [`Error::InvalidPath`] when two mappings
    /// disagree on the shape of a path.
    pub fn parse(&self, segments: &[ProcessedSegment]) -> Result<Value> {
        let mut root = Map::new();
        let mut views = Vec::with_capacity(segments.len());
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();

        for seg in segments {
            *counts.entry(seg.tag.clone()).or_default() += 1;
            views.push(Value::Object(segment_view(seg)));

            for mapping in self.inbound_mappings(&seg.tag) {
                let mut item = self.extract(seg, mapping)?;
                if item.is_empty() {
                    continue;
                }
                self.annotate(seg, &mut item);
                self.place(&mut root, seg, mapping, item)?;
            }
        }

        debug!(
            transaction = %self.config.transaction_type,
            segments = segments.len(),
            "segments mapped"
        );
        root.insert(SEGMENTS_KEY.to_string(), Value::Array(views));
        root.insert(
            SEGMENT_COUNTS_KEY.to_string(),
            Value::Object(
                counts
                    .into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        );
        Ok(Value::Object(root))
    }

    fn extract(&self, seg: &ProcessedSegment, mapping: &SegmentMapping) -> Result<Map<String, Value>> {
        let mut item = Map::new();
        for elem in &mapping.elements {
            if elem.components.is_empty() {
                let raw = seg.value(elem.element_position);
                if let Some(value) = self.inbound_value(raw, elem)? {
                    item.insert(elem.object_field.clone(), value);
                }
                continue;
            }
            let mut nested = Map::new();
            for comp in &elem.components {
                let raw = seg.component(elem.element_position, comp.element_position);
                if let Some(value) = self.inbound_value(raw, comp)? {
                    nested.insert(comp.object_field.clone(), value);
                }
            }
            if !nested.is_empty() {
                item.insert(elem.object_field.clone(), Value::Object(nested));
            }
        }
        Ok(item)
    }

    fn inbound_value(&self, raw: &str, elem: &ElementMapping) -> Result<Option<Value>> {
        if raw.is_empty() {
            return Ok(elem.default_value.clone());
        }
        let value = match elem.transform.as_deref() {
            Some(expr) => apply_expression(expr, raw, self.overlay.as_ref())?,
            None => raw.to_string(),
        };
        Ok(Some(parse_typed(&value, &elem.data_type, elem.format.as_deref())))
    }

    fn annotate(&self, seg: &ProcessedSegment, item: &mut Map<String, Value>) {
        let Some(profile) = self.profile.as_deref() else {
            return;
        };
        let annotation = match seg.tag.as_str() {
            "N1" => profile.party_role(seg.value(1)).map(|r| ("role", r)),
            "L11" => profile.references.kind_of(seg.value(2)).map(|k| ("reference_kind", k)),
            _ => None,
        };
        if let Some((key, value)) = annotation {
            item.entry(key).or_insert_with(|| Value::String(value.to_string()));
        }
    }

    fn place(
        &self,
        root: &mut Map<String, Value>,
        seg: &ProcessedSegment,
        mapping: &SegmentMapping,
        item: Map<String, Value>,
    ) -> Result<()> {
        if !mapping.is_array() {
            object_at(root, &mapping.object_path)?.extend(item);
            return Ok(());
        }
        let items = array_at(root, &mapping.object_path)?;
        if self.is_inner_segment(&seg.tag) {
            if let Some(Value::Object(current)) = items.last_mut() {
                trace!(tag = %seg.tag, path = %mapping.object_path, "merged into current item");
                current.extend(item);
                return Ok(());
            }
        }
        items.push(Value::Object(item));
        Ok(())
    }

    // ========================================================================
    // Build
    // ========================================================================

    /// Build the body of a transaction (the segments between ST and SE)
    ///
    /// # Errors
    ///
    /// Fails when a required segment, a required conditional segment or a
    /// loop with a minimum cannot be built; optional failures are skipped.
    pub fn build(&self, object: &Value) -> Result<Vec<RawSegment>> {
        let mut out = Vec::new();
        let structure = &self.config.structure;

        for req in &structure.required_segments {
            if req.segment_id.eq_ignore_ascii_case("ST") || req.segment_id.eq_ignore_ascii_case("SE") {
                continue;
            }
            match self.build_segment(&req.segment_id, object) {
                Ok(seg) => out.push(seg),
                Err(e) if req.required || req.min_occurs > 0 => return Err(e),
                Err(e) => debug!("Skipping optional segment {}: {}", req.segment_id, e),
            }
        }

        for cond in &structure.conditional_segments {
            if !evaluate(&cond.condition, object) {
                continue;
            }
            match self.build_segment(&cond.segment_id, object) {
                Ok(seg) => out.push(seg),
                Err(e) if cond.required => return Err(e),
                Err(e) => debug!("Skipping conditional segment {}: {}", cond.segment_id, e),
            }
        }

        for def in &structure.loops {
            match self.build_loop(def, object) {
                Ok(segments) => out.extend(segments),
                Err(e) if def.min_occurs > 0 => return Err(e),
                Err(e) => warn!("Skipping loop {}: {}", def.loop_id, e),
            }
        }

        debug!(
            transaction = %self.config.transaction_type,
            segments = out.len(),
            "transaction body built"
        );
        Ok(out)
    }

    /// Build one segment from the object its mapping reads
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoMapping`] without an outbound mapping,
    /// [`Error::RequiredField`] and [`Error::Validation`] for bad fields, and
    /// [`Error::EmptySegment`] when nothing would be written.
    pub fn build_segment(&self, tag: &str, data: &Value) -> Result<RawSegment> {
        let mapping = self.outbound_mapping(tag).ok_or_else(|| Error::NoMapping {
            segment: tag.to_string(),
        })?;

        let mut by_position: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        for elem in &mapping.elements {
            let field = field_value(data, mapping, &elem.object_field);
            let components = if elem.components.is_empty() {
                vec![self.outbound_value(tag, elem, elem.element_position, field)?]
            } else {
                let mut comps: BTreeMap<usize, String> = BTreeMap::new();
                for comp in &elem.components {
                    let value = field.and_then(|f| lookup(f, &comp.object_field));
                    let value = self.outbound_value(tag, comp, elem.element_position, value)?;
                    comps.insert(comp.element_position, value);
                }
                let last = comps
                    .iter()
                    .filter(|(_, v)| !v.is_empty())
                    .map(|(p, _)| *p)
                    .max()
                    .unwrap_or(0);
                let comps: Vec<String> = (1..=last)
                    .map(|p| comps.get(&p).cloned().unwrap_or_default())
                    .collect();
                if comps.is_empty() && elem.required {
                    return Err(Error::required_field(tag, elem.element_position, &elem.object_field));
                }
                comps
            };
            if components.iter().any(|c| !c.is_empty()) {
                by_position.insert(elem.element_position, components);
            }
        }

        let Some(last) = by_position.keys().next_back().copied() else {
            return Err(Error::EmptySegment {
                segment: tag.to_string(),
            });
        };
        let elements: Vec<Vec<String>> = (1..=last)
            .map(|p| by_position.remove(&p).unwrap_or_else(|| vec![String::new()]))
            .collect();
        trace!(tag, elements = elements.len(), "segment built");
        Ok(RawSegment::from_components(tag, elements, 0))
    }

    fn outbound_value(
        &self,
        tag: &str,
        elem: &ElementMapping,
        position: usize,
        field: Option<&Value>,
    ) -> Result<String> {
        let mut value = field
            .map(|v| format_typed(v, &elem.data_type, elem.format.as_deref()))
            .unwrap_or_default();

        if value.is_empty() {
            if let Some(default) = &elem.default_value {
                value = value_to_string(default);
            }
        }
        if value.is_empty() {
            if let Some(default) = self.overlay.as_ref().and_then(|o| o.default_for(tag, position)) {
                value = default;
            }
        }
        if !value.is_empty() {
            if let Some(expr) = elem.transform.as_deref() {
                value = apply_expression(expr, &value, self.overlay.as_ref())?;
            }
        }

        if value.is_empty() && elem.required && elem.components.is_empty() {
            return Err(Error::required_field(tag, position, &elem.object_field));
        }
        if let Some(pattern) = elem.validation.as_deref().filter(|_| !value.is_empty()) {
            let re = match self.patterns.get(pattern) {
                Some(Ok(re)) => re,
                Some(Err(message)) => {
                    return Err(Error::InvalidPattern {
                        segment: tag.to_string(),
                        element: position,
                        message: message.clone(),
                    });
                }
                None => {
                    return Err(Error::InvalidPattern {
                        segment: tag.to_string(),
                        element: position,
                        message: format!("pattern {pattern} was not compiled"),
                    });
                }
            };
            if !re.is_match(&value) {
                return Err(Error::Validation {
                    segment: tag.to_string(),
                    element: position,
                    value,
                    pattern: pattern.to_string(),
                });
            }
        }
        Ok(value)
    }

    /// Collection holding a loop's items
    fn loop_data<'v>(&self, def: &LoopDefinition, data: &'v Value) -> Option<&'v Value> {
        let start = def.start_segment.as_str();
        if let Some(path) = self.config.loop_mappings.get(start) {
            return lookup(data, path).filter(|v| !v.is_null());
        }
        if let Some(mapping) = self.outbound_mapping(start).filter(|m| m.is_array()) {
            if let Some(found) = lookup(data, mapping.base_path()).filter(|v| !v.is_null()) {
                return Some(found);
            }
        }
        let lower = start.to_ascii_lowercase();
        conventional_keys(start)
            .iter()
            .map(|k| (*k).to_string())
            .chain([format!("{lower}_loop"), format!("{lower}s")])
            .find_map(|k| data.get(&k).filter(|v| !v.is_null()))
    }

    fn build_loop(&self, def: &LoopDefinition, data: &Value) -> Result<Vec<RawSegment>> {
        let items = self.loop_data(def, data).map(array_items).unwrap_or_default();
        let count = items.len();
        if count < def.min_occurs || (def.max_occurs > 0 && count > def.max_occurs) {
            return Err(Error::LoopOccurrences {
                loop_id: def.loop_id.clone(),
                count,
                min: def.min_occurs,
                max: def.max_occurs,
            });
        }

        let mut out = Vec::new();
        for item in items {
            for tag in def.member_tags() {
                let required = tag.eq_ignore_ascii_case(&def.start_segment)
                    || def
                        .segments
                        .iter()
                        .any(|s| s.segment_id.eq_ignore_ascii_case(tag) && (s.required || s.min_occurs > 0));
                match self.build_segment(tag, item) {
                    Ok(seg) => out.push(seg),
                    Err(e) if required => return Err(e),
                    Err(e) => trace!("Skipping {} in loop {}: {}", tag, def.loop_id, e),
                }
            }
            for nested in &def.nested_loops {
                match self.build_loop(nested, item) {
                    Ok(segments) => out.extend(segments),
                    Err(e) if nested.min_occurs > 0 => return Err(e),
                    Err(e) => trace!("Skipping nested loop {}: {}", nested.loop_id, e),
                }
            }
        }
        Ok(out)
    }
}

fn segment_view(seg: &ProcessedSegment) -> Map<String, Value> {
    let mut view = Map::new();
    view.insert(TAG_KEY.to_string(), Value::String(seg.tag.clone()));
    view.insert(POSITION_KEY.to_string(), Value::from(seg.index()));
    for (key, value) in &seg.elements {
        let value = match value {
            ElementValue::Simple(v) => Value::String(v.clone()),
            ElementValue::Composite(comps) => Value::Object(
                comps
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect(),
            ),
        };
        view.insert(key.clone(), value);
    }
    view
}

/// Field read by an element mapping; array mappings read the item itself
fn field_value<'v>(data: &'v Value, mapping: &SegmentMapping, field: &str) -> Option<&'v Value> {
    if mapping.object_path.is_empty() || mapping.is_array() {
        lookup(data, field)
    } else {
        lookup(data, &format!("{}.{}", mapping.base_path(), field))
    }
}

// ============================================================================
// Data types
// ============================================================================

const DATE_FORMATS: &[&str] = &["%Y%m%d", "%Y-%m-%d", "%m/%d/%Y", "%y%m%d"];
const TIME_FORMATS: &[(&str, &str)] = &[
    ("%H%M%S", "%H:%M:%S"),
    ("%H%M", "%H:%M"),
    ("%H:%M:%S", "%H:%M:%S"),
    ("%H:%M", "%H:%M"),
];
const DATETIME_FORMATS: &[&str] = &[
    "%Y%m%d%H%M%S",
    "%Y%m%d%H%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
];

/// Convert an element value to its business type
///
/// Values that do not convert stay strings.
pub fn parse_typed(raw: &str, data_type: &str, format: Option<&str>) -> Value {
    let trimmed = raw.trim();
    match data_type.to_ascii_lowercase().as_str() {
        "integer" | "int" => trimmed
            .parse::<i64>()
            .map_or_else(|_| Value::String(raw.to_string()), Value::from),
        "number" | "numeric" | "decimal" => {
            if let Ok(i) = trimmed.parse::<i64>() {
                Value::from(i)
            } else {
                trimmed
                    .parse::<f64>()
                    .ok()
                    .and_then(Number::from_f64)
                    .map_or_else(|| Value::String(raw.to_string()), Value::Number)
            }
        }
        "boolean" | "bool" => Value::Bool(matches!(
            trimmed.to_ascii_lowercase().as_str(),
            "true" | "1" | "y" | "yes" | "t"
        )),
        "date" => {
            let parsed = match format {
                Some(f) => NaiveDate::parse_from_str(trimmed, f).ok(),
                None => DATE_FORMATS
                    .iter()
                    .find_map(|f| NaiveDate::parse_from_str(trimmed, f).ok()),
            };
            parsed.map_or_else(
                || Value::String(raw.to_string()),
                |d| Value::String(d.format("%Y-%m-%d").to_string()),
            )
        }
        "time" => {
            let parsed = match format {
                Some(f) => NaiveTime::parse_from_str(trimmed, f)
                    .ok()
                    .map(|t| (t, if f.contains("%S") { "%H:%M:%S" } else { "%H:%M" })),
                None => TIME_FORMATS.iter().find_map(|(input, output)| {
                    NaiveTime::parse_from_str(trimmed, input).ok().map(|t| (t, *output))
                }),
            };
            parsed.map_or_else(
                || Value::String(raw.to_string()),
                |(t, out)| Value::String(t.format(out).to_string()),
            )
        }
        "datetime" => {
            let parsed = match format {
                Some(f) => NaiveDateTime::parse_from_str(trimmed, f).ok(),
                None => DATETIME_FORMATS
                    .iter()
                    .find_map(|f| NaiveDateTime::parse_from_str(trimmed, f).ok()),
            };
            parsed.map_or_else(
                || Value::String(raw.to_string()),
                |dt| Value::String(dt.format("%Y-%m-%dT%H:%M:%S").to_string()),
            )
        }
        _ => Value::String(raw.to_string()),
    }
}

/// Render a business value as element text
///
/// ISO dates and times go back to X12 form using `format`, defaulting to
/// `CCYYMMDD` and `HHMM`/`HHMMSS`. Text already in X12 form passes through.
pub fn format_typed(value: &Value, data_type: &str, format: Option<&str>) -> String {
    let text = value_to_string(value);
    match data_type.to_ascii_lowercase().as_str() {
        "date" => NaiveDate::parse_from_str(&text, "%Y-%m-%d")
            .map_or(text, |d| d.format(format.unwrap_or("%Y%m%d")).to_string()),
        "time" => {
            if let Ok(t) = NaiveTime::parse_from_str(&text, "%H:%M:%S") {
                t.format(format.unwrap_or("%H%M%S")).to_string()
            } else if let Ok(t) = NaiveTime::parse_from_str(&text, "%H:%M") {
                t.format(format.unwrap_or("%H%M")).to_string()
            } else {
                text
            }
        }
        "datetime" => NaiveDateTime::parse_from_str(&text, "%Y-%m-%dT%H:%M:%S")
            .map_or(text, |dt| dt.format(format.unwrap_or("%Y%m%d%H%M%S")).to_string()),
        "boolean" | "bool" => match value {
            Value::Bool(true) => "Y".to_string(),
            Value::Bool(false) => "N".to_string(),
            _ => text,
        },
        _ => text,
    }
}
