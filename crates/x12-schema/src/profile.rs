//! Partner profiles
//!
//! A profile is bound to a partner id (the file stem of
//! `<root>/<partner-id>.json`). It carries delimiter and formatting
//! overrides, the transactions the partner exchanges, validation knobs and
//! field-level transformations. Profiles are normalized on load: hex-coded
//! delimiters are decoded, defaults are filled in and the delimiter set is
//! checked for collisions.
#![allow(clippy::must_use_candidate)] // Accessors are clear at call sites without #[must_use].
#![allow(clippy::struct_excessive_bools)] // Flags mirror the on-disk profile keys.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use x12_ir::{Delimiters, Severity};

use crate::condition::{Condition, ConditionOp};
use crate::config::{
    CustomerOverlay, Direction, ElementOverlay, LoopRequirement, SegmentOverlay, ValidationRule,
};
use crate::loader::FileFormat;
use crate::validation::{ValidationLevel, ValidationOverrides};
use crate::{Error, Result};

// ============================================================================
// Format
// ============================================================================

/// Delimiters as written in a profile
///
/// Each separator may be given literally or through its `*_hex` twin
/// (`0x0A`, `\x0A`); the hex form wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelimiterConfig {
    pub element: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub component: String,
    pub segment: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub repetition: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub element_hex: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub component_hex: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub segment_hex: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub repetition_hex: String,
}

/// Wire formatting preferences
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatConfig {
    pub delimiters: DelimiterConfig,
    /// `UTF-8` or `ASCII`
    pub encoding: String,
    /// `CR`, `LF`, `CRLF` or `NONE`, written after each segment terminator
    #[serde(skip_serializing_if = "String::is_empty")]
    pub line_ending: String,
    /// Overrides the segment delimiter; accepts `LF`, `CR`, `CRLF`, `\n` and hex
    #[serde(skip_serializing_if = "String::is_empty")]
    pub segment_terminator: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub isa_field_lengths: Vec<usize>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub pad_character: String,
    pub trim_trailing_spaces: bool,
    pub preserve_whitespace: bool,
}

// ============================================================================
// Transactions
// ============================================================================

/// One transaction type the partner exchanges
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionSupport {
    pub transaction_type: String,
    /// Empty means any version
    pub versions: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub schema_path: String,
    pub required: bool,
    pub direction: Direction,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub required_segments: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub optional_segments: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub prohibited_segments: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub loop_requirements: Vec<LoopRequirement>,
}

impl TransactionSupport {
    /// Check if a version is listed, comparing six-digit bases
    pub fn supports_version(&self, version: &str) -> bool {
        self.versions.is_empty()
            || self
                .versions
                .iter()
                .any(|v| v == version || base(v) == base(version))
    }
}

fn base(version: &str) -> &str {
    version.get(..6).unwrap_or(version)
}

// ============================================================================
// Validation
// ============================================================================

/// Regex rule over one element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomRule {
    pub rule_id: String,
    pub name: String,
    pub description: String,
    pub severity: Severity,
    pub segment_tag: String,
    pub element_position: usize,
    /// Pattern the element value must match
    pub condition: String,
    pub error_message: String,
}

impl Default for CustomRule {
    fn default() -> Self {
        Self {
            rule_id: String::new(),
            name: String::new(),
            description: String::new(),
            severity: Severity::Error,
            segment_tag: String::new(),
            element_position: 0,
            condition: String::new(),
            error_message: String::new(),
        }
    }
}

/// Validation block of a profile
///
/// Absent keys leave the underlying configuration alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileValidation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strictness: Option<ValidationLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enforce_segment_order: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enforce_segment_counts: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_unknown_segments: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enforce_required_elements: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enforce_element_formats: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enforce_element_lengths: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validate_control_numbers: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique_control_numbers: Option<bool>,
    pub require_pickup_and_delivery: bool,
    pub require_shipment_id: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub custom_rules: Vec<CustomRule>,
}

impl ProfileValidation {
    /// Express the block as overrides of the engine toggles
    pub fn overrides(&self) -> ValidationOverrides {
        ValidationOverrides {
            strictness: self.strictness,
            enforce_mandatory: self.enforce_required_elements,
            allow_unknown_segments: self.allow_unknown_segments,
            allow_extra_elements: self.allow_unknown_segments,
            skip_length_check: self.enforce_element_lengths.map(|on| !on),
            skip_format_check: self.enforce_element_formats.map(|on| !on),
            enforce_segment_counts: self.enforce_segment_counts,
            validate_control_numbers: self.validate_control_numbers,
            ..ValidationOverrides::default()
        }
    }
}

/// Reference qualifiers the partner uses
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceConfig {
    pub customer_po: Vec<String>,
    pub bill_of_lading: Vec<String>,
    pub shipment_ref: Vec<String>,
    pub shipment_id_quals: Vec<String>,
    /// `ref_first` or `always_b2`
    #[serde(skip_serializing_if = "String::is_empty")]
    pub shipment_id_mode: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_references: BTreeMap<String, String>,
}

impl ReferenceConfig {
    /// Kind of reference a qualifier denotes
    pub fn kind_of(&self, qualifier: &str) -> Option<&str> {
        let listed = |list: &[String]| list.iter().any(|q| q == qualifier);
        if listed(&self.customer_po) {
            Some("customer_po")
        } else if listed(&self.bill_of_lading) {
            Some("bill_of_lading")
        } else if listed(&self.shipment_ref) || listed(&self.shipment_id_quals) {
            Some("shipment_ref")
        } else {
            self.custom_references.get(qualifier).map(String::as_str)
        }
    }
}

/// Partner-specific rule; only `validation` rules reach the validator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusinessRule {
    pub rule_id: String,
    pub name: String,
    /// `mapping`, `validation` or `transformation`
    #[serde(rename = "type")]
    pub rule_type: String,
    /// `field`, `type` and `value` of the failing condition
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub condition: BTreeMap<String, String>,
    /// `error_code`, `message` and `severity` of the resulting issue
    pub action: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "is_zero")]
    pub priority: i32,
}

#[allow(clippy::trivially_copy_pass_by_ref)] // serde passes fields by reference.
fn is_zero(v: &i32) -> bool {
    *v == 0
}

impl BusinessRule {
    /// Convert a `validation` rule into a business rule the validator runs
    pub fn to_validation_rule(&self) -> Option<ValidationRule> {
        if !self.rule_type.eq_ignore_ascii_case("validation") {
            return None;
        }
        let field = self.condition.get("field")?;
        let op = match self
            .condition
            .get("type")
            .or_else(|| self.condition.get("operator"))
            .map(|s| s.parse::<ConditionOp>())
        {
            Some(Ok(op)) => op,
            Some(Err(e)) => {
                warn!("Skipping business rule {}: {}", self.rule_id, e);
                return None;
            }
            None => ConditionOp::NotExists,
        };
        let value = self.condition.get("value").map(|v| Value::String(v.clone()));
        let code = self
            .action
            .get("error_code")
            .cloned()
            .unwrap_or_else(|| self.rule_id.clone());
        let message = self
            .action
            .get("message")
            .cloned()
            .unwrap_or_else(|| self.name.clone());
        let mut rule = ValidationRule::new(code, Condition::predicate(op, field.clone(), value), message);
        rule.name.clone_from(&self.name);
        if let Some(Ok(severity)) = self.action.get("severity").map(|s| parse_severity(s)) {
            rule.severity = severity;
        }
        Some(rule)
    }
}

fn parse_severity(s: &str) -> std::result::Result<Severity, String> {
    match s.trim().to_ascii_lowercase().as_str() {
        "info" => Ok(Severity::Info),
        "warning" | "warn" => Ok(Severity::Warning),
        "error" => Ok(Severity::Error),
        "fatal" => Ok(Severity::Fatal),
        other => Err(format!("unknown severity '{other}'")),
    }
}

// ============================================================================
// Transformations and communication
// ============================================================================

/// Transformation of one element position
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldTransform {
    pub segment_tag: String,
    pub element_position: usize,
    pub transform_type: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
}

impl FieldTransform {
    /// Render as a transform expression such as `pad_left:10`
    pub fn expression(&self) -> String {
        let param = |key: &str| self.parameters.get(key).cloned().unwrap_or_default();
        match self.transform_type.to_ascii_lowercase().replace('-', "_").as_str() {
            "pad" | "pad_left" => format!("pad_left:{}", param("length")),
            "pad_right" => format!("pad_right:{}", param("length")),
            "pad_zero" => format!("pad_zero:{}", param("length")),
            "truncate" => format!("truncate:{}", param("length")),
            "regex_replace" => format!("regex_replace:{}->{}", param("pattern"), param("replacement")),
            "format" => format!("format:{}", param("template")),
            "map" => {
                let pairs: Vec<String> = self
                    .parameters
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect();
                format!("map:{}", pairs.join(","))
            }
            other => other.to_string(),
        }
    }
}

/// Transformation block of a profile
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileTransformations {
    pub emit_iso_datetime: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub timezone: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub date_format: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub time_format: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub service_level_map: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub equipment_type_map: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub stop_type_map: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub accessorial_map: BTreeMap<String, String>,
    /// Segment tag to element position to default value
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub default_values: BTreeMap<String, BTreeMap<usize, String>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub field_transforms: Vec<FieldTransform>,
}

/// Transport settings; only `auto_acknowledge` affects the engine
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommunicationConfig {
    pub protocol: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub host: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub path: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub username: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub auth_method: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub inbound_file_pattern: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub outbound_file_pattern: String,
    pub auto_acknowledge: bool,
    #[serde(rename = "ack_timeout_minutes", skip_serializing_if = "Option::is_none")]
    pub ack_timeout: Option<u32>,
}

// ============================================================================
// Profile
// ============================================================================

/// Partner-specific EDI configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartnerProfile {
    /// Taken from the file name when not written in the document
    #[serde(skip_serializing_if = "String::is_empty")]
    pub partner_id: String,
    pub format: FormatConfig,
    pub supported_transactions: Vec<TransactionSupport>,
    pub validation: ProfileValidation,
    pub references: ReferenceConfig,
    pub party_roles: BTreeMap<String, Vec<String>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub business_rules: Vec<BusinessRule>,
    pub transformations: ProfileTransformations,
    pub communication: CommunicationConfig,
}

impl PartnerProfile {
    /// Profile with literal delimiters
    pub fn new(partner_id: impl Into<String>, element: char, component: char, segment: char) -> Self {
        let mut profile = Self {
            partner_id: partner_id.into(),
            ..Self::default()
        };
        profile.format.delimiters.element = element.to_string();
        profile.format.delimiters.component = component.to_string();
        profile.format.delimiters.segment = segment.to_string();
        profile
    }

    /// Decode hex delimiters, fill defaults and check the delimiter set
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidProfile`] when the element or segment
    /// delimiter is missing or two delimiters collide.
    pub fn normalize(&mut self) -> Result<()> {
        let d = &mut self.format.delimiters;
        for (hex, literal) in [
            (&d.element_hex, &mut d.element),
            (&d.component_hex, &mut d.component),
            (&d.segment_hex, &mut d.segment),
            (&d.repetition_hex, &mut d.repetition),
        ] {
            if !hex.is_empty() {
                *literal = decode_delimiter(hex);
            }
        }
        d.segment = decode_delimiter(&d.segment);
        if !self.format.segment_terminator.is_empty() {
            d.segment = decode_delimiter(&self.format.segment_terminator);
        }

        if self.format.encoding.is_empty() {
            self.format.encoding = "UTF-8".to_string();
        }
        if self.validation.strictness.is_none() {
            self.validation.strictness = Some(ValidationLevel::Strict);
        }

        if self.format.delimiters.element.is_empty() {
            return Err(Error::invalid_profile(&self.partner_id, "element delimiter is required"));
        }
        if self.format.delimiters.segment.is_empty() {
            return Err(Error::invalid_profile(&self.partner_id, "segment delimiter is required"));
        }
        self.delimiters()?;
        Ok(())
    }

    /// Delimiters for reading and writing this partner's interchanges
    ///
    /// A CRLF segment delimiter resolves to LF, which is what the scanner
    /// sees after line-ending normalization. A missing component separator
    /// falls back to `>`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidProfile`] when delimiters collide or are empty.
    pub fn delimiters(&self) -> Result<Delimiters> {
        let d = &self.format.delimiters;
        let first = |s: &str| s.bytes().next();
        let element = first(&d.element)
            .ok_or_else(|| Error::invalid_profile(&self.partner_id, "element delimiter is required"))?;
        let segment = d
            .segment
            .bytes()
            .last()
            .ok_or_else(|| Error::invalid_profile(&self.partner_id, "segment delimiter is required"))?;
        let component = first(&d.component).unwrap_or(x12_ir::delimiters::DEFAULT_COMPONENT_SEPARATOR);

        let mut delimiters = Delimiters::new(element, component, segment)
            .map_err(|e| Error::invalid_profile(&self.partner_id, e.to_string()))?;
        if let Some(rep) = first(&d.repetition) {
            delimiters = delimiters
                .with_repetition(rep)
                .map_err(|e| Error::invalid_profile(&self.partner_id, e.to_string()))?;
        }
        Ok(delimiters)
    }

    /// Text written after every segment terminator
    pub fn line_ending(&self) -> &'static str {
        match self.format.line_ending.to_ascii_uppercase().as_str() {
            "LF" | "\\N" => "\n",
            "CR" | "\\R" => "\r",
            "CRLF" | "\\R\\N" => "\r\n",
            _ => "",
        }
    }

    /// Padding character for fixed-width ISA fields
    pub fn pad_character(&self) -> char {
        self.format.pad_character.chars().next().unwrap_or(' ')
    }

    /// Check if the partner requires 7-bit input
    pub fn is_ascii_only(&self) -> bool {
        let enc = self.format.encoding.to_ascii_uppercase();
        enc == "ASCII" || enc == "US-ASCII"
    }

    pub fn auto_acknowledge(&self) -> bool {
        self.communication.auto_acknowledge
    }

    /// Support entry for a transaction type
    pub fn transaction_support(&self, transaction_type: &str) -> Option<&TransactionSupport> {
        self.supported_transactions
            .iter()
            .find(|t| t.transaction_type == transaction_type)
    }

    /// Check if the partner exchanges a type and version in a direction
    ///
    /// A profile listing no transactions supports everything.
    pub fn supports(&self, transaction_type: &str, version: &str, inbound: bool) -> bool {
        if self.supported_transactions.is_empty() {
            return true;
        }
        self.transaction_support(transaction_type).is_some_and(|t| {
            let direction_ok = if inbound {
                t.direction.is_inbound()
            } else {
                t.direction.is_outbound()
            };
            direction_ok && t.supports_version(version)
        })
    }

    /// First supported version of a transaction type
    pub fn preferred_version(&self, transaction_type: &str) -> Option<&str> {
        self.transaction_support(transaction_type)
            .and_then(|t| t.versions.first())
            .map(String::as_str)
    }

    /// Business rules synthesized from the validation block and `business_rules`
    pub fn validation_rules(&self) -> Vec<ValidationRule> {
        let mut rules = Vec::new();
        if self.validation.require_shipment_id {
            rules.push(ValidationRule::new(
                "MISSING_SHIPMENT_ID",
                Condition::predicate(ConditionOp::NotExists, "shipment.shipment_id", None),
                "Partner requires a shipment identifier",
            ));
        }
        if self.validation.require_pickup_and_delivery {
            rules.push(ValidationRule::new(
                "MISSING_PICKUP_OR_DELIVERY",
                Condition::Any(vec![
                    Condition::predicate(ConditionOp::NotExists, "S5[02=CL|LD|PL]", None),
                    Condition::predicate(ConditionOp::NotExists, "S5[02=CU|UL|PU]", None),
                ]),
                "Partner requires at least one pickup and one delivery stop",
            ));
        }
        let mut business: Vec<&BusinessRule> = self.business_rules.iter().collect();
        business.sort_by_key(|r| r.priority);
        rules.extend(business.into_iter().filter_map(BusinessRule::to_validation_rule));
        rules
    }

    /// Default values and field transforms expressed as a customer overlay
    pub fn as_overlay(&self) -> CustomerOverlay {
        let mut overlay = CustomerOverlay::empty(self.partner_id.clone());
        for (tag, positions) in &self.transformations.default_values {
            let seg = overlay_segment(&mut overlay, tag);
            for (pos, value) in positions {
                seg.elements.entry(*pos).or_default().default_value = Some(value.clone());
            }
        }
        for ft in &self.transformations.field_transforms {
            let seg = overlay_segment(&mut overlay, &ft.segment_tag);
            seg.elements
                .entry(ft.element_position)
                .or_insert_with(ElementOverlay::default)
                .transform = Some(ft.expression());
        }
        overlay
    }

    /// Role a party entity code plays for this partner
    pub fn party_role(&self, entity_code: &str) -> Option<&str> {
        self.party_roles
            .iter()
            .find(|(_, codes)| codes.iter().any(|c| c == entity_code))
            .map(|(role, _)| role.as_str())
    }
}

fn overlay_segment<'a>(overlay: &'a mut CustomerOverlay, tag: &str) -> &'a mut SegmentOverlay {
    overlay
        .segment_rules
        .entry(tag.to_string())
        .or_insert_with(|| SegmentOverlay {
            segment_id: tag.to_string(),
            ..SegmentOverlay::default()
        })
}

/// Decode a delimiter written as hex, an escape or a line-ending name
///
/// `0x0A` and `\x0A` become the byte; `\n`, `LF`, `\r`, `CR`, `\r\n` and
/// `CRLF` become the control characters. Anything else is returned as is.
pub fn decode_delimiter(raw: &str) -> String {
    match raw {
        "\\n" | "LF" => return "\n".to_string(),
        "\\r" | "CR" => return "\r".to_string(),
        "\\r\\n" | "CRLF" => return "\r\n".to_string(),
        _ => {}
    }
    let hex = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .or_else(|| raw.strip_prefix("\\x"));
    match hex {
        Some(h) if h.len() == 2 => u8::from_str_radix(h, 16)
            .map(|b| char::from(b).to_string())
            .unwrap_or_else(|_| raw.to_string()),
        _ => raw.to_string(),
    }
}

// ============================================================================
// Store
// ============================================================================

/// Concurrent store of partner profiles keyed by partner id
pub struct ProfileStore {
    profiles: DashMap<String, Arc<PartnerProfile>>,
    root: Option<PathBuf>,
}

impl Default for ProfileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ProfileStore {
    pub fn new() -> Self {
        Self {
            profiles: DashMap::new(),
            root: None,
        }
    }

    /// Store backed by `<root>/<partner-id>.json`
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            profiles: DashMap::new(),
            root: Some(root.into()),
        }
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Parse, normalize and register a profile
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFormat`] for unparseable content and
    /// [`Error::InvalidProfile`] when normalization fails.
    pub fn load_str(&self, partner_id: &str, content: &str, format: FileFormat) -> Result<Arc<PartnerProfile>> {
        let mut profile: PartnerProfile = match format {
            FileFormat::Json => serde_json::from_str(content)
                .map_err(|e| Error::invalid_format(partner_id, format!("JSON parse error: {e}")))?,
            FileFormat::Yaml => serde_yaml::from_str(content)
                .map_err(|e| Error::invalid_format(partner_id, format!("YAML parse error: {e}")))?,
        };
        if profile.partner_id.is_empty() {
            profile.partner_id = partner_id.to_string();
        }
        self.insert(profile)
    }

    /// Load one profile file; the partner id is the file stem
    ///
    /// A relative path is resolved against the store root.
    ///
    /// # Errors
    ///
    /// Returns IO, parse and normalization errors.
    pub fn load_profile(&self, path: impl AsRef<Path>) -> Result<Arc<PartnerProfile>> {
        let path = path.as_ref();
        let full = match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        };
        let partner_id = full
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        let content = std::fs::read_to_string(&full)?;
        let format = FileFormat::from_path(&full).unwrap_or(FileFormat::Json);
        debug!("Loading partner profile {} from {:?}", partner_id, full);
        self.load_str(&partner_id, &content, format)
    }

    /// Load every profile under a directory
    ///
    /// # Errors
    ///
    /// Returns the first IO, parse or normalization error.
    pub fn load_directory(&self, dir: &Path) -> Result<usize> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(std::result::Result::ok)
            .map(|e| e.path())
            .filter(|p| p.is_file() && FileFormat::from_path(p).is_some())
            .collect();
        paths.sort();
        for path in &paths {
            self.load_profile(path)?;
        }
        info!("Loaded {} partner profiles from {:?}", paths.len(), dir);
        Ok(paths.len())
    }

    /// Normalize and register a profile, replacing any previous one
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidProfile`] when normalization fails.
    pub fn insert(&self, mut profile: PartnerProfile) -> Result<Arc<PartnerProfile>> {
        if profile.partner_id.is_empty() {
            return Err(Error::invalid_profile("", "partner id is required"));
        }
        profile.normalize()?;
        let profile = Arc::new(profile);
        self.profiles
            .insert(profile.partner_id.clone(), Arc::clone(&profile));
        Ok(profile)
    }

    /// Profile for a partner
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProfileNotFound`] for an unknown partner.
    pub fn get(&self, partner_id: &str) -> Result<Arc<PartnerProfile>> {
        self.profiles
            .get(partner_id)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| Error::ProfileNotFound {
                partner_id: partner_id.to_string(),
            })
    }

    /// Register a profile and write it to `<root>/<partner-id>.json`
    ///
    /// # Errors
    ///
    /// Returns normalization, serialization and IO errors.
    pub fn save(&self, profile: PartnerProfile) -> Result<Arc<PartnerProfile>> {
        let profile = self.insert(profile)?;
        if let Some(root) = &self.root {
            let file = root.join(format!("{}.json", profile.partner_id.to_lowercase()));
            let data = serde_json::to_string_pretty(profile.as_ref())
                .map_err(|e| Error::invalid_profile(&profile.partner_id, e.to_string()))?;
            std::fs::create_dir_all(root)?;
            std::fs::write(&file, data)?;
            info!("Saved partner profile {} to {:?}", profile.partner_id, file);
        } else {
            warn!("Profile store has no root; {} kept in memory only", profile.partner_id);
        }
        Ok(profile)
    }

    /// Registered partner ids, sorted
    pub fn list(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.profiles.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn remove(&self, partner_id: &str) -> Option<Arc<PartnerProfile>> {
        self.profiles.remove(partner_id).map(|(_, p)| p)
    }

    pub fn clear(&self) {
        self.profiles.clear();
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn acme_json() -> String {
        json!({
            "format": {
                "delimiters": {"element": "*", "component": ">", "segment": "~", "segment_hex": "0x0A"},
                "line_ending": "LF"
            },
            "supported_transactions": [
                {"transaction_type": "204", "versions": ["004010"], "direction": "inbound"}
            ],
            "validation": {
                "enforce_element_lengths": false,
                "require_shipment_id": true,
                "custom_rules": [{"rule_id": "SCAC", "segment_tag": "B2", "element_position": 2, "condition": "^[A-Z]{4}$"}]
            },
            "party_roles": {"shipper": ["SH", "SF"], "consignee": ["CN"]},
            "transformations": {
                "default_values": {"N1": {"3": "93"}},
                "field_transforms": [{"segment_tag": "B2", "element_position": 2, "transform_type": "uppercase"}]
            },
            "communication": {"protocol": "SFTP", "auto_acknowledge": true}
        })
        .to_string()
    }

    #[test]
    fn test_hex_delimiter_decoding() {
        assert_eq!(decode_delimiter("0x0A"), "\n");
        assert_eq!(decode_delimiter("\\x7E"), "~");
        assert_eq!(decode_delimiter("\\n"), "\n");
        assert_eq!(decode_delimiter("CRLF"), "\r\n");
        assert_eq!(decode_delimiter("*"), "*");
        assert_eq!(decode_delimiter("0xZZ"), "0xZZ");
    }

    #[test]
    fn test_load_normalizes() {
        let store = ProfileStore::new();
        let profile = store.load_str("acme", &acme_json(), FileFormat::Json).unwrap();

        assert_eq!(profile.partner_id, "acme");
        assert_eq!(profile.format.encoding, "UTF-8");
        assert_eq!(profile.validation.strictness, Some(ValidationLevel::Strict));
        assert_eq!(profile.format.delimiters.segment, "\n");
        assert_eq!(profile.delimiters().unwrap().segment, b'\n');
        assert_eq!(profile.line_ending(), "\n");
        assert!(profile.auto_acknowledge());
    }

    #[test]
    fn test_collision_rejected() {
        let store = ProfileStore::new();
        let profile = PartnerProfile::new("bad", '*', '*', '~');
        assert!(matches!(store.insert(profile), Err(Error::InvalidProfile { .. })));

        let mut missing = PartnerProfile::new("nosep", '*', '>', '~');
        missing.format.delimiters.segment.clear();
        assert!(matches!(store.insert(missing), Err(Error::InvalidProfile { .. })));
    }

    #[test]
    fn test_supports() {
        let store = ProfileStore::new();
        let profile = store.load_str("acme", &acme_json(), FileFormat::Json).unwrap();
        assert!(profile.supports("204", "004010", true));
        assert!(!profile.supports("204", "004010", false));
        assert!(!profile.supports("204", "005010", true));
        assert!(!profile.supports("210", "004010", true));
        assert_eq!(profile.preferred_version("204"), Some("004010"));

        let open = PartnerProfile::new("open", '*', '>', '~');
        assert!(open.supports("999", "005010", false));
    }

    #[test]
    fn test_validation_overrides() {
        let store = ProfileStore::new();
        let profile = store.load_str("acme", &acme_json(), FileFormat::Json).unwrap();
        let overrides = profile.validation.overrides();
        assert_eq!(overrides.strictness, Some(ValidationLevel::Strict));
        assert_eq!(overrides.skip_length_check, Some(true));
        assert_eq!(overrides.skip_format_check, None);

        let rules = profile.validation_rules();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].error_code, "MISSING_SHIPMENT_ID");
    }

    #[test]
    fn test_business_rules_converted() {
        let mut profile = PartnerProfile::new("p", '*', '>', '~');
        profile.business_rules.push(BusinessRule {
            rule_id: "BOL".into(),
            rule_type: "validation".into(),
            condition: [("field", "references"), ("type", "count_equals"), ("value", "0")]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            action: [("message", "BOL required"), ("severity", "warning")]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..BusinessRule::default()
        });
        profile.business_rules.push(BusinessRule {
            rule_id: "MAP".into(),
            rule_type: "mapping".into(),
            ..BusinessRule::default()
        });
        let rules = profile.validation_rules();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].error_code, "BOL");
        assert_eq!(rules[0].severity, Severity::Warning);
    }

    #[test]
    fn test_overlay_from_transformations() {
        let store = ProfileStore::new();
        let profile = store.load_str("acme", &acme_json(), FileFormat::Json).unwrap();
        let overlay = profile.as_overlay();
        assert_eq!(overlay.default_for("N1", 3).as_deref(), Some("93"));
        assert_eq!(
            overlay.element_overlay("B2", 2).and_then(|o| o.transform.as_deref()),
            Some("uppercase")
        );
        assert_eq!(profile.party_role("SF"), Some("shipper"));
    }

    #[test]
    fn test_field_transform_expression() {
        let ft = FieldTransform {
            transform_type: "pad".into(),
            parameters: [("length".to_string(), "10".to_string())].into_iter().collect(),
            ..FieldTransform::default()
        };
        assert_eq!(ft.expression(), "pad_left:10");
    }

    #[test]
    fn test_save_and_load_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::with_root(dir.path());
        store.save(PartnerProfile::new("Globex", '`', '<', '~')).unwrap();
        assert!(dir.path().join("globex.json").exists());

        let fresh = ProfileStore::with_root(dir.path());
        assert_eq!(fresh.load_directory(dir.path()).unwrap(), 1);
        let loaded = fresh.get("Globex").unwrap();
        assert_eq!(loaded.delimiters().unwrap().element, b'`');
        assert_eq!(fresh.list(), vec!["Globex".to_string()]);
        assert!(fresh.remove("Globex").is_some());
        assert!(matches!(fresh.get("Globex"), Err(Error::ProfileNotFound { .. })));
    }

    #[test]
    fn test_references() {
        let refs = ReferenceConfig {
            bill_of_lading: vec!["BM".into()],
            custom_references: [("ZZ".to_string(), "internal".to_string())].into_iter().collect(),
            ..ReferenceConfig::default()
        };
        assert_eq!(refs.kind_of("BM"), Some("bill_of_lading"));
        assert_eq!(refs.kind_of("ZZ"), Some("internal"));
        assert_eq!(refs.kind_of("PO"), None);
    }
}
