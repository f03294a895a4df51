//! Transaction configurations and customer overlays
//!
//! A [`TransactionConfig`] is bound to a transaction type and version
//! (`204:004010`). It describes the expected structure, the segment to
//! business-object mappings, business rules and per-customer overlays.
//! [`ConfigStore`] holds them for concurrent readers.
#![allow(clippy::must_use_candidate)] // Accessors are clear at call sites without #[must_use].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use x12_ir::Severity;

use crate::condition::Condition;
use crate::loader::FileFormat;
use crate::validation::ValidationOverrides;
use crate::{Error, Result};

// ============================================================================
// Structure
// ============================================================================

/// Occurrence requirement for one segment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentRequirement {
    pub segment_id: String,
    pub min_occurs: usize,
    /// Zero means unbounded
    pub max_occurs: usize,
    pub position: u32,
    pub required: bool,
    pub description: String,
}

impl SegmentRequirement {
    pub fn new(segment_id: impl Into<String>, min_occurs: usize, max_occurs: usize) -> Self {
        Self {
            segment_id: segment_id.into(),
            min_occurs,
            max_occurs,
            required: min_occurs > 0,
            ..Self::default()
        }
    }
}

/// Repeating group of segments
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopDefinition {
    pub loop_id: String,
    pub name: String,
    pub min_occurs: usize,
    /// Zero means unbounded
    pub max_occurs: usize,
    pub start_segment: String,
    pub segments: Vec<SegmentRequirement>,
    pub nested_loops: Vec<LoopDefinition>,
}

impl LoopDefinition {
    /// Check if a tag belongs to the loop body without starting it
    pub fn has_inner_segment(&self, tag: &str) -> bool {
        !self.start_segment.eq_ignore_ascii_case(tag)
            && self
                .segments
                .iter()
                .any(|s| s.segment_id.eq_ignore_ascii_case(tag))
    }

    /// Tags of the loop body in declared order, start segment first
    pub fn member_tags(&self) -> Vec<&str> {
        let mut tags = vec![self.start_segment.as_str()];
        for seg in &self.segments {
            if !seg.segment_id.eq_ignore_ascii_case(&self.start_segment) {
                tags.push(seg.segment_id.as_str());
            }
        }
        tags
    }
}

/// Segment emitted on build only when a condition holds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditionalSegment {
    pub segment_id: String,
    pub condition: Condition,
    pub required: bool,
    pub description: String,
}

/// Expected shape of a transaction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionStructure {
    pub required_segments: Vec<SegmentRequirement>,
    pub loops: Vec<LoopDefinition>,
    pub conditional_segments: Vec<ConditionalSegment>,
}

// ============================================================================
// Mappings
// ============================================================================

/// Which way a mapping applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
    #[default]
    Both,
}

impl Direction {
    pub fn is_inbound(self) -> bool {
        matches!(self, Self::Inbound | Self::Both)
    }

    pub fn is_outbound(self) -> bool {
        matches!(self, Self::Outbound | Self::Both)
    }
}

/// Element position to object field
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElementMapping {
    /// 1-based element position, or component position inside `components`
    pub element_position: usize,
    pub object_field: String,
    /// `string`, `integer`, `number`, `boolean`, `date`, `time`, `datetime`
    pub data_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transform: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    pub required: bool,
    /// Regex the outbound value must match
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<String>,
    /// Component mappings of a composite element
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<ElementMapping>,
}

impl ElementMapping {
    pub fn new(position: usize, field: impl Into<String>) -> Self {
        Self {
            element_position: position,
            object_field: field.into(),
            data_type: "string".to_string(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_type = data_type.into();
        self
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn with_transform(mut self, transform: impl Into<String>) -> Self {
        self.transform = Some(transform.into());
        self
    }

    #[must_use]
    pub fn with_validation(mut self, pattern: impl Into<String>) -> Self {
        self.validation = Some(pattern.into());
        self
    }

    #[must_use]
    pub fn with_default(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }
}

/// Segment to object path
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentMapping {
    pub segment_id: String,
    /// Dotted path; a `[]` suffix targets an array
    pub object_path: String,
    pub direction: Direction,
    pub elements: Vec<ElementMapping>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transform: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
}

impl SegmentMapping {
    pub fn new(segment_id: impl Into<String>, object_path: impl Into<String>) -> Self {
        Self {
            segment_id: segment_id.into(),
            object_path: object_path.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_elements(mut self, elements: Vec<ElementMapping>) -> Self {
        self.elements = elements;
        self
    }

    /// Check if the target path is an array
    pub fn is_array(&self) -> bool {
        self.object_path.ends_with("[]")
    }

    /// Target path without the `[]` suffix
    pub fn base_path(&self) -> &str {
        self.object_path.trim_end_matches("[]")
    }
}

// ============================================================================
// Rules
// ============================================================================

fn default_severity() -> Severity {
    Severity::Error
}

/// Business rule evaluated against the mapped object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationRule {
    pub rule_id: String,
    pub name: String,
    pub description: String,
    #[serde(default = "default_severity")]
    pub severity: Severity,
    #[serde(rename = "type")]
    pub rule_type: String,
    pub condition: Condition,
    pub message: String,
    pub error_code: String,
}

impl Default for ValidationRule {
    fn default() -> Self {
        Self {
            rule_id: String::new(),
            name: String::new(),
            description: String::new(),
            severity: Severity::Error,
            rule_type: "business_rule".to_string(),
            condition: Condition::default(),
            message: String::new(),
            error_code: String::new(),
        }
    }
}

impl ValidationRule {
    /// Rule that fires when `condition` holds
    pub fn new(
        error_code: impl Into<String>,
        condition: Condition,
        message: impl Into<String>,
    ) -> Self {
        let error_code = error_code.into();
        Self {
            rule_id: error_code.clone(),
            error_code,
            condition,
            message: message.into(),
            ..Self::default()
        }
    }
}

/// Comparison in the WHEN clause of a cross-segment rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerOp {
    #[default]
    Equals,
    NotEquals,
    Contains,
    Exists,
}

/// `WHEN segment.element <op> value`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleTrigger {
    pub segment: String,
    pub element: usize,
    pub operator: TriggerOp,
    pub value: String,
}

/// What the THEN clause demands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MustBe {
    #[default]
    Present,
    Absent,
    EqualTo,
}

/// `THEN segment.element MUST-BE {present | absent | equal-to v}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleRequirement {
    pub segment: String,
    pub element: usize,
    pub must_be: MustBe,
    pub value: String,
}

/// Cross-segment rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditionalRule {
    pub id: String,
    pub description: String,
    pub when: RuleTrigger,
    pub then: RuleRequirement,
    #[serde(default = "default_severity")]
    pub severity: Severity,
}

impl Default for ConditionalRule {
    fn default() -> Self {
        Self {
            id: String::new(),
            description: String::new(),
            when: RuleTrigger::default(),
            then: RuleRequirement::default(),
            severity: Severity::Error,
        }
    }
}

// ============================================================================
// Customer overlays
// ============================================================================

/// Per-element customer override
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElementOverlay {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub allowed_codes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    /// Transform expression, e.g. `uppercase` or `pad_left:10`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transform: Option<String>,
}

/// Per-segment customer override
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentOverlay {
    pub segment_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_occurs: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_occurs: Option<usize>,
    pub elements: BTreeMap<usize, ElementOverlay>,
}

/// Loop occurrence requirement from an overlay or profile
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopRequirement {
    pub loop_id: String,
    pub required: bool,
    pub min_occurs: usize,
    /// Zero means unbounded
    pub max_occurs: usize,
    pub segments: Vec<String>,
}

impl LoopRequirement {
    /// Tag whose occurrences count loop iterations
    pub fn start_segment(&self) -> &str {
        self.segments.first().map_or(self.loop_id.as_str(), String::as_str)
    }
}

impl From<&LoopDefinition> for LoopRequirement {
    fn from(def: &LoopDefinition) -> Self {
        Self {
            loop_id: def.loop_id.clone(),
            required: def.min_occurs > 0,
            min_occurs: def.min_occurs,
            max_occurs: def.max_occurs,
            segments: def.member_tags().into_iter().map(str::to_string).collect(),
        }
    }
}

/// Named transformation a customer can reference from a field
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformationRule {
    pub rule_id: String,
    pub name: String,
    /// `uppercase`, `lowercase`, `trim`, `pad`, `replace`, `regex_replace`, `format`, `map`
    #[serde(rename = "type")]
    pub transform_type: String,
    pub field: String,
    pub parameters: BTreeMap<String, String>,
}

fn default_active() -> bool {
    true
}

/// Customer-specific layer over a transaction config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomerOverlay {
    pub customer_id: String,
    pub customer_name: String,
    #[serde(default = "default_active")]
    pub active: bool,
    pub segment_overrides: BTreeMap<String, SegmentRequirement>,
    pub segment_rules: BTreeMap<String, SegmentOverlay>,
    pub loop_rules: BTreeMap<String, LoopRequirement>,
    pub conditional_rules: Vec<ConditionalRule>,
    pub additional_rules: Vec<ValidationRule>,
    pub custom_mappings: Vec<SegmentMapping>,
    /// Segment tag to element position to value
    pub default_values: BTreeMap<String, BTreeMap<usize, Value>>,
    pub transformations: Vec<TransformationRule>,
}

impl Default for CustomerOverlay {
    fn default() -> Self {
        Self::empty("")
    }
}

impl CustomerOverlay {
    /// Active overlay that changes nothing
    pub fn empty(customer_id: impl Into<String>) -> Self {
        Self {
            customer_id: customer_id.into(),
            customer_name: String::new(),
            active: true,
            segment_overrides: BTreeMap::new(),
            segment_rules: BTreeMap::new(),
            loop_rules: BTreeMap::new(),
            conditional_rules: Vec::new(),
            additional_rules: Vec::new(),
            custom_mappings: Vec::new(),
            default_values: BTreeMap::new(),
            transformations: Vec::new(),
        }
    }

    /// Element overlay for a segment position
    pub fn element_overlay(&self, tag: &str, position: usize) -> Option<&ElementOverlay> {
        self.segment_rules
            .get(tag)
            .and_then(|s| s.elements.get(&position))
    }

    /// Default value for a segment position
    ///
    /// An element overlay default wins over the `default_values` table.
    pub fn default_for(&self, tag: &str, position: usize) -> Option<String> {
        if let Some(v) = self
            .element_overlay(tag, position)
            .and_then(|o| o.default_value.clone())
            .filter(|v| !v.is_empty())
        {
            return Some(v);
        }
        self.default_values
            .get(tag)
            .and_then(|m| m.get(&position))
            .map(value_to_string)
            .filter(|v| !v.is_empty())
    }

    /// Transformation rule by name or id
    pub fn transformation(&self, name: &str) -> Option<&TransformationRule> {
        self.transformations
            .iter()
            .find(|t| t.name == name || t.rule_id == name)
    }

    /// Check if the overlay carries no settings at all
    pub fn is_empty(&self) -> bool {
        self.segment_overrides.is_empty()
            && self.segment_rules.is_empty()
            && self.loop_rules.is_empty()
            && self.conditional_rules.is_empty()
            && self.additional_rules.is_empty()
            && self.custom_mappings.is_empty()
            && self.default_values.is_empty()
            && self.transformations.is_empty()
    }
}

/// Render a JSON scalar the way it would appear in an element
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ============================================================================
// Transaction config
// ============================================================================

/// Configuration for one transaction type and version
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionConfig {
    pub transaction_type: String,
    pub version: String,
    pub name: String,
    pub description: String,
    pub structure: TransactionStructure,
    pub mappings: Vec<SegmentMapping>,
    pub validation_rules: Vec<ValidationRule>,
    /// Base validation settings before profile and customer layers
    #[serde(skip_serializing_if = "ValidationOverrides::is_empty")]
    pub validation: ValidationOverrides,
    /// Cross-segment WHEN/THEN rules
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub conditional_rules: Vec<ConditionalRule>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub customer_overrides: BTreeMap<String, CustomerOverlay>,
    /// Loop start segment to object path
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub loop_mappings: BTreeMap<String, String>,
}

impl TransactionConfig {
    pub fn new(transaction_type: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            transaction_type: transaction_type.into(),
            version: version.into(),
            ..Self::default()
        }
    }

    /// Store key `type:version`
    pub fn key(&self) -> String {
        config_key(&self.transaction_type, &self.version)
    }

    /// Inbound mappings for a segment tag
    pub fn inbound_mappings<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a SegmentMapping> {
        self.mappings
            .iter()
            .filter(move |m| m.direction.is_inbound() && m.segment_id.eq_ignore_ascii_case(tag))
    }

    /// First outbound mapping for a segment tag
    pub fn outbound_mapping(&self, tag: &str) -> Option<&SegmentMapping> {
        self.mappings
            .iter()
            .find(|m| m.direction.is_outbound() && m.segment_id.eq_ignore_ascii_case(tag))
    }

    /// Loop started by a segment tag, searching nested loops too
    pub fn loop_started_by(&self, tag: &str) -> Option<&LoopDefinition> {
        find_loop(&self.structure.loops, &|l| l.start_segment.eq_ignore_ascii_case(tag))
    }

    /// Loop whose body contains a tag without starting with it
    pub fn loop_containing(&self, tag: &str) -> Option<&LoopDefinition> {
        find_loop(&self.structure.loops, &|l| l.has_inner_segment(tag))
    }

    /// All loops, depth first
    pub fn all_loops(&self) -> Vec<&LoopDefinition> {
        fn walk<'a>(loops: &'a [LoopDefinition], out: &mut Vec<&'a LoopDefinition>) {
            for l in loops {
                out.push(l);
                walk(&l.nested_loops, out);
            }
        }
        let mut out = Vec::new();
        walk(&self.structure.loops, &mut out);
        out
    }

    /// Customer overlay by id
    pub fn customer(&self, customer_id: &str) -> Option<&CustomerOverlay> {
        self.customer_overrides.get(customer_id)
    }
}

fn find_loop<'a>(
    loops: &'a [LoopDefinition],
    pred: &dyn Fn(&LoopDefinition) -> bool,
) -> Option<&'a LoopDefinition> {
    for l in loops {
        if pred(l) {
            return Some(l);
        }
        if let Some(found) = find_loop(&l.nested_loops, pred) {
            return Some(found);
        }
    }
    None
}

/// Store key for a transaction type and version
pub fn config_key(transaction_type: &str, version: &str) -> String {
    format!("{transaction_type}:{version}")
}

// ============================================================================
// Store
// ============================================================================

/// Concurrent store of transaction configurations keyed by `type:version`
pub struct ConfigStore {
    configs: DashMap<String, Arc<TransactionConfig>>,
    root: Option<PathBuf>,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore {
    pub fn new() -> Self {
        Self {
            configs: DashMap::new(),
            root: None,
        }
    }

    /// Store that saves configs under `root`
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            configs: DashMap::new(),
            root: Some(root.into()),
        }
    }

    /// Store pre-loaded with the standard 204 and 997 configs
    ///
    /// # Errors
    ///
    /// Returns an error only if an embedded config is malformed.
    pub fn with_standard_configs() -> Result<Self> {
        let store = Self::new();
        for config in crate::standard_configs::standard_configs()? {
            store.insert(config);
        }
        Ok(store)
    }

    /// Parse and register a config
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFormat`] when the content does not parse and
    /// [`Error::InvalidConfig`] when type or version is missing.
    pub fn load_config(&self, content: &str, format: FileFormat) -> Result<Arc<TransactionConfig>> {
        let config: TransactionConfig = match format {
            FileFormat::Json => serde_json::from_str(content)
                .map_err(|e| Error::invalid_format("transaction config", format!("JSON parse error: {e}")))?,
            FileFormat::Yaml => serde_yaml::from_str(content)
                .map_err(|e| Error::invalid_format("transaction config", format!("YAML parse error: {e}")))?,
        };
        if config.transaction_type.is_empty() || config.version.is_empty() {
            return Err(Error::invalid_config(
                config.key(),
                "transaction_type and version are required",
            ));
        }
        Ok(self.insert(config))
    }

    /// Load one config file
    ///
    /// # Errors
    ///
    /// Returns IO and parse errors.
    pub fn load_file(&self, path: &Path) -> Result<Arc<TransactionConfig>> {
        let content = std::fs::read_to_string(path)?;
        let format = FileFormat::from_path(path).unwrap_or(FileFormat::Json);
        self.load_config(&content, format).map_err(|e| match e {
            Error::InvalidFormat { message, .. } => {
                Error::invalid_format(path.display().to_string(), message)
            }
            other => other,
        })
    }

    /// Load every JSON/YAML config in a directory
    ///
    /// # Errors
    ///
    /// Returns the first IO or parse error.
    pub fn load_directory(&self, dir: &Path) -> Result<usize> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(std::result::Result::ok)
            .map(|e| e.path())
            .filter(|p| p.is_file() && FileFormat::from_path(p).is_some())
            .collect();
        paths.sort();
        for path in &paths {
            self.load_file(path)?;
        }
        info!("Loaded {} transaction configs from {:?}", paths.len(), dir);
        Ok(paths.len())
    }

    /// Register a config, replacing any with the same key
    pub fn insert(&self, config: TransactionConfig) -> Arc<TransactionConfig> {
        let key = config.key();
        let config = Arc::new(config);
        debug!("Registered transaction config {}", key);
        self.configs.insert(key, Arc::clone(&config));
        config
    }

    /// Config for a type and version
    ///
    /// A suffixed version like `005010X210` falls back to `005010`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigNotFound`] when neither key is registered.
    pub fn get_config(&self, transaction_type: &str, version: &str) -> Result<Arc<TransactionConfig>> {
        let key = config_key(transaction_type, version);
        if let Some(entry) = self.configs.get(&key) {
            return Ok(Arc::clone(entry.value()));
        }
        if let Some(base) = version.get(..6).filter(|b| *b != version) {
            if let Some(entry) = self.configs.get(&config_key(transaction_type, base)) {
                return Ok(Arc::clone(entry.value()));
            }
        }
        Err(Error::ConfigNotFound { key })
    }

    /// Customer overlay for a config
    ///
    /// Returns an active empty overlay when the customer has none.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigNotFound`] when the config itself is missing.
    pub fn get_customer_config(
        &self,
        transaction_type: &str,
        version: &str,
        customer_id: &str,
    ) -> Result<CustomerOverlay> {
        let config = self.get_config(transaction_type, version)?;
        Ok(config
            .customer(customer_id)
            .cloned()
            .unwrap_or_else(|| CustomerOverlay::empty(customer_id)))
    }

    /// Register a config and write it under the root when one is set
    ///
    /// # Errors
    ///
    /// Returns IO or serialization errors from writing the file.
    pub fn save_config(&self, config: TransactionConfig) -> Result<Arc<TransactionConfig>> {
        if let Some(root) = &self.root {
            let file = root.join(format!(
                "{}_{}.json",
                config.transaction_type, config.version
            ));
            let data = serde_json::to_string_pretty(&config)
                .map_err(|e| Error::invalid_config(config.key(), e.to_string()))?;
            std::fs::create_dir_all(root)?;
            std::fs::write(&file, data)?;
            info!("Saved transaction config {} to {:?}", config.key(), file);
        } else {
            warn!("Config store has no root; {} kept in memory only", config.key());
        }
        Ok(self.insert(config))
    }

    /// Registered keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.configs.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn remove(&self, transaction_type: &str, version: &str) -> Option<Arc<TransactionConfig>> {
        self.configs
            .remove(&config_key(transaction_type, version))
            .map(|(_, v)| v)
    }

    pub fn clear(&self) {
        self.configs.clear();
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }
}
