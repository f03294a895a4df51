//! Pipeline orchestration
//!
//! This module provides the main [`Pipeline`]: inbound parsing with
//! validation, business-object mapping and acknowledgments, and outbound
//! builds from business objects into enveloped interchanges.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, info, warn};
use x12_adapter::{
    AckBuilder, AckOutput, AckType, Clock, ControlNumberGenerator, EnvelopeWriter, GroupHeader,
    InterchangeHeader, TimestampControlNumbers, X12Parser, X12Serializer, system_clock,
};
use x12_ir::{
    CancellationToken, Delimiters, Document, ErrorCollector, IssueLevel, RawSegment,
    ValidationIssue,
};
use x12_mapping::Mapper;
use x12_schema::{ConfigStore, PartnerProfile, ProfileStore, SchemaRegistry, ValidationLevel};
use x12_validation::{ValidationReport, Validator, DEFAULT_VERSION};

use crate::numeric::{duration_ms, usize_to_f64};
use crate::{Error, Result};

// ============================================================================
// Configuration
// ============================================================================

/// Engine defaults for the pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Version used when a document or build request names none
    pub default_version: String,
    /// Level applied when neither the request nor a partner profile sets one
    pub validation_level: ValidationLevel,
    /// Delimiters for outbound builds without a partner profile
    pub delimiters: Delimiters,
    /// Emit an acknowledgment for every parsed document
    pub generate_ack: bool,
    /// Force 997 or 999 instead of choosing by version
    pub ack_type: Option<AckType>,
    /// ISA05/ISA06 for outbound interchanges
    pub sender_qualifier: String,
    pub sender_id: String,
    /// ISA07/ISA08 for outbound interchanges
    pub receiver_qualifier: String,
    pub receiver_id: String,
    /// ISA15, `P` or `T`
    pub usage_indicator: String,
    /// Error cap per document; zero disables it
    pub max_errors: usize,
    /// Documents processed at once by a [`crate::StreamProcessor`]
    pub max_concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_version: DEFAULT_VERSION.to_string(),
            validation_level: ValidationLevel::Standard,
            delimiters: Delimiters::default(),
            generate_ack: false,
            ack_type: None,
            sender_qualifier: "ZZ".to_string(),
            sender_id: "SENDER".to_string(),
            receiver_qualifier: "ZZ".to_string(),
            receiver_id: "RECEIVER".to_string(),
            usage_indicator: "P".to_string(),
            max_errors: ErrorCollector::<ValidationIssue>::DEFAULT_MAX_ERRORS,
            max_concurrency: 4,
        }
    }
}

/// Per-document parse settings
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    /// Partner whose profile drives validation and the acknowledgment format
    pub partner_id: Option<String>,
    /// Customer whose overlay applies on top of the transaction config
    pub customer_id: Option<String>,
    /// Force a strictness level over config and profile settings
    pub level: Option<ValidationLevel>,
    /// Override the pipeline and profile acknowledgment defaults
    pub generate_ack: Option<bool>,
    pub ack_type: Option<AckType>,
    pub cancel: Option<CancellationToken>,
}

impl ParseOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn for_partner(mut self, partner_id: impl Into<String>) -> Self {
        self.partner_id = Some(partner_id.into());
        self
    }

    #[must_use]
    pub fn with_customer(mut self, customer_id: impl Into<String>) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }

    #[must_use]
    pub fn with_level(mut self, level: ValidationLevel) -> Self {
        self.level = Some(level);
        self
    }

    #[must_use]
    pub fn with_ack(mut self, generate: bool) -> Self {
        self.generate_ack = Some(generate);
        self
    }

    #[must_use]
    pub fn with_ack_type(mut self, ack_type: AckType) -> Self {
        self.ack_type = Some(ack_type);
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Outbound build request
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// ST01, e.g. `204`
    pub transaction_type: String,
    /// Falls back to the partner's preferred version, then the pipeline default
    pub version: Option<String>,
    pub partner_id: Option<String>,
    pub customer_id: Option<String>,
    /// ST02
    pub control_number: String,
    /// GS01; derived from the transaction type when unset
    pub functional_id: Option<String>,
}

impl BuildOptions {
    pub fn new(transaction_type: impl Into<String>) -> Self {
        Self {
            transaction_type: transaction_type.into(),
            version: None,
            partner_id: None,
            customer_id: None,
            control_number: "0001".to_string(),
            functional_id: None,
        }
    }

    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    #[must_use]
    pub fn for_partner(mut self, partner_id: impl Into<String>) -> Self {
        self.partner_id = Some(partner_id.into());
        self
    }

    #[must_use]
    pub fn with_customer(mut self, customer_id: impl Into<String>) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }

    #[must_use]
    pub fn with_control_number(mut self, control: impl Into<String>) -> Self {
        self.control_number = control.into();
        self
    }

    #[must_use]
    pub fn with_functional_id(mut self, functional_id: impl Into<String>) -> Self {
        self.functional_id = Some(functional_id.into());
        self
    }
}

/// GS01 functional identifier for a transaction set
pub fn functional_id_for(transaction_type: &str) -> Option<&'static str> {
    match transaction_type {
        "204" => Some("SM"),
        "210" => Some("IM"),
        "214" => Some("QM"),
        "990" => Some("GF"),
        "997" | "999" => Some("FA"),
        _ => None,
    }
}

// ============================================================================
// Results
// ============================================================================

/// Wall-clock milliseconds per phase of one parse
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseTiming {
    pub profile_load_ms: f64,
    pub parse_ms: f64,
    pub validation_ms: f64,
    pub total_ms: f64,
    pub segment_count: usize,
    pub transaction_count: usize,
}

/// Everything one inbound parse produced
#[derive(Debug)]
pub struct ParseResult {
    pub document: Document,
    /// Resolved partner profile, when one was requested
    pub profile: Option<Arc<PartnerProfile>>,
    /// No error-severity issues were found and the run was not cancelled
    pub is_valid: bool,
    /// Issues, stages, business objects and processed segments
    pub report: ValidationReport,
    pub ack: Option<AckOutput>,
    pub timing: ParseTiming,
}

impl ParseResult {
    pub fn issues(&self) -> &[ValidationIssue] {
        &self.report.issues
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.report.has_code(code)
    }

    /// Serialized acknowledgment interchange
    pub fn ack_edi(&self) -> Option<&str> {
        self.ack.as_ref().map(|a| a.edi.as_str())
    }

    pub fn ack_segments(&self) -> &[RawSegment] {
        self.ack.as_ref().map_or(&[], |a| a.segments.as_slice())
    }

    /// Business objects of the configured transactions, in document order
    pub fn business_objects(&self) -> impl Iterator<Item = &Value> {
        self.report
            .transactions
            .iter()
            .filter_map(|t| t.business_object.as_ref())
    }
}

/// An enveloped outbound interchange
#[derive(Debug, Clone)]
pub struct BuildResult {
    pub edi: String,
    pub segments: Vec<RawSegment>,
    pub version: String,
    /// ISA13
    pub interchange_control: String,
    /// GS06
    pub group_control: String,
    /// ST02
    pub transaction_control: String,
}

// ============================================================================
// Statistics
// ============================================================================

/// Counters across every request the pipeline served
#[derive(Debug, Default, Clone)]
pub struct PipelineStats {
    /// Parse requests that produced a document
    pub documents_parsed: usize,
    pub documents_valid: usize,
    pub documents_invalid: usize,
    /// Parse requests that failed before a document existed
    pub documents_failed: usize,
    pub documents_built: usize,
    pub builds_failed: usize,
    pub acks_generated: usize,
    pub segments_processed: usize,
    pub transactions_processed: usize,
    pub issues_reported: usize,
    pub total_processing_time: Duration,
    pub started_at: Option<Instant>,
}

/// Rates derived from [`PipelineStats`]
#[derive(Debug, Default, Clone)]
pub struct PipelineMetrics {
    pub documents_per_second: f64,
    pub segments_per_second: f64,
    pub avg_document_time_ms: f64,
    /// Percentage of parsed documents that were invalid or failed
    pub error_rate: f64,
}

// ============================================================================
// Pipeline
// ============================================================================

/// Parse and build service over shared registries
///
/// The pipeline is `Send + Sync`; one instance serves any number of
/// threads, each document handled by the thread that submitted it.
pub struct Pipeline {
    config: PipelineConfig,
    registry: Arc<SchemaRegistry>,
    configs: Arc<ConfigStore>,
    profiles: Arc<ProfileStore>,
    control_numbers: Arc<dyn ControlNumberGenerator>,
    clock: Clock,
    stats: Mutex<PipelineStats>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("profiles", &self.profiles.list())
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Pipeline over the built-in schemas and standard transaction configs
    ///
    /// # Errors
    ///
    /// Returns an error when a built-in schema or config is malformed.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let registry = SchemaRegistry::with_builtin()?;
        let configs = ConfigStore::with_standard_configs()?;
        Ok(Self::with_stores(
            config,
            Arc::new(registry),
            Arc::new(configs),
            Arc::new(ProfileStore::new()),
        ))
    }

    /// Create a pipeline with default configuration
    ///
    /// # Errors
    ///
    /// See [`Pipeline::new`].
    pub fn with_defaults() -> Result<Self> {
        Self::new(PipelineConfig::default())
    }

    /// Pipeline over caller-owned registries
    pub fn with_stores(
        config: PipelineConfig,
        registry: Arc<SchemaRegistry>,
        configs: Arc<ConfigStore>,
        profiles: Arc<ProfileStore>,
    ) -> Self {
        Self {
            config,
            registry,
            configs,
            profiles,
            control_numbers: Arc::new(TimestampControlNumbers::new()),
            clock: system_clock(),
            stats: Mutex::new(PipelineStats {
                started_at: Some(Instant::now()),
                ..PipelineStats::default()
            }),
        }
    }

    /// Control numbers for outbound interchanges and acknowledgments
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

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn configs(&self) -> &ConfigStore {
        &self.configs
    }

    pub fn profiles(&self) -> &ProfileStore {
        &self.profiles
    }

    // ========================================================================
    // Parse
    // ========================================================================

    /// Parse, validate and optionally acknowledge one interchange
    ///
    /// # Errors
    ///
    /// Fails when delimiters cannot be detected, the scan is cancelled, the
    /// requested partner profile does not exist or the document is empty.
    /// Validation findings are reported in the result, not as errors.
    pub fn parse(&self, data: &[u8], options: &ParseOptions) -> Result<ParseResult> {
        let started = Instant::now();
        let result = self.parse_document(data, options, started);
        self.record_parse(result.as_ref().ok(), started.elapsed());
        result
    }

    /// Read and parse a file
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] when the file cannot be read, otherwise as
    /// [`Pipeline::parse`].
    pub fn parse_file(&self, path: impl AsRef<Path>, options: &ParseOptions) -> Result<ParseResult> {
        let path = path.as_ref();
        let data = std::fs::read(path)
            .map_err(|e| Error::io("read", path.display().to_string(), e.to_string()))?;
        self.parse(&data, options)
    }

    fn parse_document(
        &self,
        data: &[u8],
        options: &ParseOptions,
        started: Instant,
    ) -> Result<ParseResult> {
        let profile = match options.partner_id.as_deref() {
            Some(id) => Some(self.profiles.get(id)?),
            None => None,
        };
        let profile_load = started.elapsed();

        let parse_started = Instant::now();
        let mut parser = X12Parser::new();
        if let Some(token) = &options.cancel {
            parser = parser.with_cancellation(token.clone());
        }
        let document = parser.parse(data)?;
        let parse_elapsed = parse_started.elapsed();
        debug!(
            segments = document.segments.len(),
            version = %document.metadata.version,
            "document scanned"
        );

        let validation_started = Instant::now();
        let mut report = self.validator(profile.as_ref(), options)?.validate(&document)?;
        let validation_elapsed = validation_started.elapsed();

        let wants_ack = options.generate_ack.unwrap_or_else(|| {
            self.config.generate_ack || profile.as_deref().is_some_and(PartnerProfile::auto_acknowledge)
        });
        let ack = if wants_ack && !report.cancelled {
            self.acknowledge(&document, &mut report, profile.as_deref(), options)
        } else {
            None
        };

        let timing = ParseTiming {
            profile_load_ms: duration_ms(profile_load),
            parse_ms: duration_ms(parse_elapsed),
            validation_ms: duration_ms(validation_elapsed),
            total_ms: duration_ms(started.elapsed()),
            segment_count: document.segments.len(),
            transaction_count: report.transactions.len(),
        };
        info!(
            valid = report.is_valid(),
            errors = report.error_count,
            warnings = report.warning_count,
            transactions = timing.transaction_count,
            total_ms = timing.total_ms,
            "document parsed"
        );

        Ok(ParseResult {
            document,
            profile,
            is_valid: report.is_valid(),
            report,
            ack,
            timing,
        })
    }

    fn validator(
        &self,
        profile: Option<&Arc<PartnerProfile>>,
        options: &ParseOptions,
    ) -> Result<Validator> {
        let mut validator = Validator::new(self.registry.snapshot()?, Arc::clone(&self.configs))
            .with_max_errors(self.config.max_errors)
            .with_default_version(self.config.default_version.clone());
        if let Some(profile) = profile {
            validator = validator.with_profile(Arc::clone(profile));
        }
        if let Some(customer) = &options.customer_id {
            validator = validator.with_customer(customer.clone());
        }
        // A profile carries its own strictness; the engine default only
        // applies to documents without one.
        let level = match (options.level, profile) {
            (Some(level), _) => Some(level),
            (None, None) => Some(self.config.validation_level),
            (None, Some(_)) => None,
        };
        if let Some(level) = level {
            validator = validator.with_level(level);
        }
        if let Some(token) = &options.cancel {
            validator = validator.with_cancellation(token.clone());
        }
        Ok(validator)
    }

    /// Build the acknowledgment, recording a warning when it cannot be built
    fn acknowledge(
        &self,
        document: &Document,
        report: &mut ValidationReport,
        profile: Option<&PartnerProfile>,
        options: &ParseOptions,
    ) -> Option<AckOutput> {
        let mut builder = AckBuilder::new()
            .with_control_numbers(Arc::clone(&self.control_numbers))
            .with_clock(Arc::clone(&self.clock));
        if let Some(ack_type) = options.ack_type.or(self.config.ack_type) {
            builder = builder.with_ack_type(ack_type);
        }
        if let Some(profile) = profile {
            match profile.delimiters() {
                Ok(delimiters) => builder = builder.with_delimiters(delimiters),
                Err(e) => warn!(partner = %profile.partner_id, error = %e, "using document delimiters for ack"),
            }
            builder = builder
                .with_line_ending(profile.line_ending())
                .with_pad_character(profile.pad_character());
        }

        match builder.build(document, &report.issues) {
            Ok(ack) => {
                debug!(
                    ack_type = %ack.ack_type,
                    control = %ack.interchange_control,
                    accepted = ack.transactions_accepted,
                    included = ack.transactions_included,
                    "acknowledgment built"
                );
                Some(ack)
            }
            Err(e) => {
                warn!(error = %e, "acknowledgment not generated");
                report.issues.push(ValidationIssue::warning(
                    "ACK_NOT_GENERATED",
                    format!("Acknowledgment not generated: {e}"),
                    IssueLevel::Document,
                ));
                report.warning_count += 1;
                None
            }
        }
    }

    // ========================================================================
    // Build
    // ========================================================================

    /// Build an enveloped interchange from a business object
    ///
    /// # Errors
    ///
    /// Returns mapping errors for missing required fields or failed
    /// validation patterns, [`Error::Schema`] when no config or profile
    /// exists, and [`Error::Pipeline`] when no GS01 can be derived.
    pub fn build(&self, object: &Value, options: &BuildOptions) -> Result<BuildResult> {
        let started = Instant::now();
        let result = self.build_interchange(object, options);
        self.record_build(result.is_ok(), started.elapsed());
        result
    }

    fn build_interchange(&self, object: &Value, options: &BuildOptions) -> Result<BuildResult> {
        let tx_type = options.transaction_type.as_str();
        let profile = match options.partner_id.as_deref() {
            Some(id) => Some(self.profiles.get(id)?),
            None => None,
        };
        let version = options
            .version
            .clone()
            .or_else(|| {
                profile
                    .as_deref()
                    .and_then(|p| p.preferred_version(tx_type))
                    .map(str::to_string)
            })
            .unwrap_or_else(|| self.config.default_version.clone());
        let functional_id = match options.functional_id.as_deref().or(functional_id_for(tx_type)) {
            Some(id) => id.to_string(),
            None => {
                return Err(Error::pipeline(
                    "build",
                    tx_type,
                    "no functional identifier for transaction type",
                ));
            }
        };

        let tx_config = self.configs.get_config(tx_type, &version)?;
        let mut mapper = Mapper::new(tx_config);
        if let Some(customer) = &options.customer_id {
            mapper = mapper.with_overlay(self.configs.get_customer_config(tx_type, &version, customer)?);
        }
        if let Some(profile) = &profile {
            mapper = mapper.with_profile(Arc::clone(profile));
        }
        let body = mapper.build(object)?;

        let (delimiters, pad, line_ending, trim) = match profile.as_deref() {
            Some(p) => (
                p.delimiters()?,
                p.pad_character(),
                p.line_ending(),
                p.format.trim_trailing_spaces,
            ),
            None => (self.config.delimiters, ' ', "", false),
        };

        let now = (self.clock)();
        let interchange_control = self.control_numbers.next_interchange()?;
        let group_control = self.control_numbers.next_group()?;

        let mut isa = InterchangeHeader::new(
            self.config.sender_qualifier.as_str(),
            self.config.sender_id.as_str(),
            self.config.receiver_qualifier.as_str(),
            self.config.receiver_id.as_str(),
        )
        .stamped(now, interchange_control.clone());
        isa.version = version.get(..5).unwrap_or("00401").to_string();
        isa.usage_indicator.clone_from(&self.config.usage_indicator);
        let gs = GroupHeader::new(
            functional_id,
            self.config.sender_id.as_str(),
            self.config.receiver_id.as_str(),
            version.as_str(),
        )
        .stamped(now, group_control.clone());

        let mut writer = EnvelopeWriter::new(delimiters).with_pad_character(pad);
        writer.begin_interchange(&isa)?;
        writer.begin_group(&gs)?;
        writer.begin_transaction(tx_type, &options.control_number, None)?;
        for segment in body {
            writer.push(segment)?;
        }
        let count = writer.end_transaction()?;
        writer.end_group()?;
        let segments = writer.finish()?;

        let edi = X12Serializer::new(delimiters)
            .with_line_ending(line_ending)
            .with_trim_trailing_spaces(trim)
            .serialize(&segments)?;
        info!(
            transaction_type = tx_type,
            %version,
            segments = count,
            control = %interchange_control,
            "interchange built"
        );

        Ok(BuildResult {
            edi,
            segments,
            version,
            interchange_control,
            group_control,
            transaction_control: options.control_number.clone(),
        })
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    fn record_parse(&self, result: Option<&ParseResult>, elapsed: Duration) {
        let Ok(mut stats) = self.stats.lock() else {
            warn!("pipeline statistics unavailable");
            return;
        };
        stats.total_processing_time += elapsed;
        match result {
            Some(result) => {
                stats.documents_parsed += 1;
                if result.is_valid {
                    stats.documents_valid += 1;
                } else {
                    stats.documents_invalid += 1;
                }
                if result.ack.is_some() {
                    stats.acks_generated += 1;
                }
                stats.segments_processed += result.timing.segment_count;
                stats.transactions_processed += result.timing.transaction_count;
                stats.issues_reported += result.report.issues.len();
            }
            None => stats.documents_failed += 1,
        }
    }

    fn record_build(&self, ok: bool, elapsed: Duration) {
        let Ok(mut stats) = self.stats.lock() else {
            warn!("pipeline statistics unavailable");
            return;
        };
        stats.total_processing_time += elapsed;
        if ok {
            stats.documents_built += 1;
        } else {
            stats.builds_failed += 1;
        }
    }

    /// Snapshot of the counters
    ///
    /// # Errors
    ///
    /// Returns [`Error::Pipeline`] when the statistics lock is poisoned.
    pub fn stats(&self) -> Result<PipelineStats> {
        self.stats
            .lock()
            .map(|s| s.clone())
            .map_err(|_| Error::pipeline("stats", "pipeline", "statistics lock poisoned"))
    }

    /// Get metrics
    ///
    /// # Errors
    ///
    /// See [`Pipeline::stats`].
    pub fn metrics(&self) -> Result<PipelineMetrics> {
        let stats = self.stats()?;
        let elapsed_secs = stats
            .started_at
            .map(|t| t.elapsed())
            .unwrap_or_default()
            .as_secs_f64();
        let per_second = |n: usize| {
            if elapsed_secs > 0.0 {
                usize_to_f64(n) / elapsed_secs
            } else {
                0.0
            }
        };
        let attempted = stats.documents_parsed + stats.documents_failed;

        Ok(PipelineMetrics {
            documents_per_second: per_second(attempted),
            segments_per_second: per_second(stats.segments_processed),
            avg_document_time_ms: if attempted > 0 {
                duration_ms(stats.total_processing_time) / usize_to_f64(attempted)
            } else {
                0.0
            },
            error_rate: if attempted > 0 {
                usize_to_f64(stats.documents_invalid + stats.documents_failed)
                    / usize_to_f64(attempted)
                    * 100.0
            } else {
                0.0
            },
        })
    }

    /// Reset the counters
    pub fn reset_stats(&self) {
        if let Ok(mut stats) = self.stats.lock() {
            *stats = PipelineStats {
                started_at: Some(Instant::now()),
                ..PipelineStats::default()
            };
        }
    }
}
