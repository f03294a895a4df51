//! Validation settings resolved for one transaction
//!
//! Layers, lowest first: engine defaults, the transaction config's
//! `validation` block, the partner profile's `validation` block. Rules are
//! additive: config rules, then profile rules, then the customer overlay's
//! additional rules, which are kept apart so they report at customer level.

use regex::Regex;
use tracing::{debug, warn};
use x12_ir::Severity;

use crate::config::{
    ConditionalRule, CustomerOverlay, ElementOverlay, LoopRequirement, SegmentRequirement,
    TransactionConfig, ValidationRule,
};
use crate::profile::PartnerProfile;
use crate::validation::{ValidationConfig, ValidationLevel, ValidationOverrides};

/// Regex a single element value must satisfy
#[derive(Debug, Clone)]
pub struct ElementRule {
    pub rule_id: String,
    pub segment_tag: String,
    pub element_position: usize,
    pub pattern: Regex,
    pub severity: Severity,
    pub message: String,
}

impl ElementRule {
    #[must_use]
    pub fn accepts(&self, value: &str) -> bool {
        self.pattern.is_match(value)
    }
}

/// Everything the validator needs for one transaction
#[derive(Debug, Clone, Default)]
pub struct ResolvedValidation {
    pub config: ValidationConfig,
    pub segment_requirements: Vec<SegmentRequirement>,
    pub prohibited_segments: Vec<String>,
    pub loop_requirements: Vec<LoopRequirement>,
    pub conditional_rules: Vec<ConditionalRule>,
    pub business_rules: Vec<ValidationRule>,
    /// Reported at customer level
    pub customer_rules: Vec<ValidationRule>,
    pub element_rules: Vec<ElementRule>,
    /// Profile transformations merged with the customer overlay
    pub overlay: Option<CustomerOverlay>,
    /// Config and profile toggles, replayed when the level is forced
    layers: Vec<ValidationOverrides>,
}

impl ResolvedValidation {
    /// Fold config, profile and customer layers
    #[must_use]
    pub fn resolve(
        config: Option<&TransactionConfig>,
        profile: Option<&PartnerProfile>,
        customer_id: Option<&str>,
        transaction_type: &str,
    ) -> Self {
        let mut resolved = Self::default();

        if let Some(config) = config {
            resolved.layer(config.validation.clone());
            resolved.segment_requirements = config.structure.required_segments.clone();
            resolved.loop_requirements = config
                .all_loops()
                .into_iter()
                .map(LoopRequirement::from)
                .collect();
            resolved.conditional_rules = config.conditional_rules.clone();
            resolved.business_rules = config.validation_rules.clone();
        }

        if let Some(profile) = profile {
            resolved.layer(profile.validation.overrides());
            resolved.business_rules.extend(profile.validation_rules());
            resolved.element_rules = compile_custom_rules(profile);

            if let Some(support) = profile.transaction_support(transaction_type) {
                for tag in &support.required_segments {
                    upsert_segment(&mut resolved.segment_requirements, SegmentRequirement::new(tag, 1, 0));
                }
                resolved.prohibited_segments = support.prohibited_segments.clone();
                for req in &support.loop_requirements {
                    upsert_loop(&mut resolved.loop_requirements, req.clone());
                }
            }

            let overlay = profile.as_overlay();
            if !overlay.is_empty() {
                resolved.overlay = Some(overlay);
            }
        }

        let customer = config
            .zip(customer_id)
            .and_then(|(c, id)| c.customer(id))
            .filter(|c| c.active);
        if let Some(customer) = customer {
            debug!("Applying customer overlay {}", customer.customer_id);
            resolved.apply_customer(customer);
        }

        resolved
    }

    fn apply_customer(&mut self, customer: &CustomerOverlay) {
        for (tag, req) in &customer.segment_overrides {
            let mut req = req.clone();
            if req.segment_id.is_empty() {
                req.segment_id.clone_from(tag);
            }
            upsert_segment(&mut self.segment_requirements, req);
        }
        for (tag, seg) in &customer.segment_rules {
            if seg.required == Some(true) || seg.min_occurs.is_some_and(|m| m > 0) {
                let min = seg.min_occurs.unwrap_or(1).max(1);
                let mut req = SegmentRequirement::new(tag, min, seg.max_occurs.unwrap_or(0));
                req.required = true;
                upsert_segment(&mut self.segment_requirements, req);
            }
        }
        for req in customer.loop_rules.values() {
            upsert_loop(&mut self.loop_requirements, req.clone());
        }
        self.conditional_rules
            .extend(customer.conditional_rules.iter().cloned());
        self.customer_rules
            .extend(customer.additional_rules.iter().cloned());

        self.overlay = Some(match self.overlay.take() {
            Some(base) => merge_overlays(base, customer),
            None => customer.clone(),
        });
    }

    fn layer(&mut self, overrides: ValidationOverrides) {
        overrides.apply(&mut self.config);
        self.layers.push(overrides);
    }

    /// Force a strictness level
    ///
    /// Toggles reset to the level's defaults; explicit config and profile
    /// toggles are then replayed without their own strictness.
    #[must_use]
    pub fn with_level(mut self, level: ValidationLevel) -> Self {
        self.config = ValidationConfig::for_level(level);
        for layer in &self.layers {
            let toggles = ValidationOverrides {
                strictness: None,
                ..layer.clone()
            };
            toggles.apply(&mut self.config);
        }
        self
    }

    /// Overlay settings for one element position
    #[must_use]
    pub fn element_overlay(&self, tag: &str, position: usize) -> Option<&ElementOverlay> {
        self.overlay
            .as_ref()
            .and_then(|o| o.element_overlay(tag, position))
    }

    /// Check if a tag is prohibited for this partner
    #[must_use]
    pub fn is_prohibited(&self, tag: &str) -> bool {
        self.prohibited_segments
            .iter()
            .any(|p| p.eq_ignore_ascii_case(tag))
    }
}

fn compile_custom_rules(profile: &PartnerProfile) -> Vec<ElementRule> {
    profile
        .validation
        .custom_rules
        .iter()
        .filter(|r| !r.segment_tag.is_empty() && r.element_position > 0 && !r.condition.is_empty())
        .filter_map(|r| match Regex::new(&r.condition) {
            Ok(pattern) => Some(ElementRule {
                rule_id: r.rule_id.clone(),
                segment_tag: r.segment_tag.to_ascii_uppercase(),
                element_position: r.element_position,
                pattern,
                severity: r.severity,
                message: if r.error_message.is_empty() {
                    format!("{} failed", r.rule_id)
                } else {
                    r.error_message.clone()
                },
            }),
            Err(e) => {
                warn!("Skipping custom rule {} with invalid pattern: {}", r.rule_id, e);
                None
            }
        })
        .collect()
}

fn upsert_segment(list: &mut Vec<SegmentRequirement>, req: SegmentRequirement) {
    match list
        .iter_mut()
        .find(|r| r.segment_id.eq_ignore_ascii_case(&req.segment_id))
    {
        Some(existing) => *existing = req,
        None => list.push(req),
    }
}

fn upsert_loop(list: &mut Vec<LoopRequirement>, req: LoopRequirement) {
    match list.iter_mut().find(|r| r.loop_id == req.loop_id) {
        Some(existing) => {
            let segments = std::mem::take(&mut existing.segments);
            *existing = req;
            if existing.segments.is_empty() {
                existing.segments = segments;
            }
        }
        None => list.push(req),
    }
}

/// Layer a customer overlay over a base overlay; the customer wins
fn merge_overlays(mut base: CustomerOverlay, top: &CustomerOverlay) -> CustomerOverlay {
    for (tag, seg) in &top.segment_rules {
        let target = base
            .segment_rules
            .entry(tag.clone())
            .or_insert_with(|| seg.clone());
        for (pos, el) in &seg.elements {
            target.elements.insert(*pos, el.clone());
        }
        target.required = seg.required.or(target.required);
        target.min_occurs = seg.min_occurs.or(target.min_occurs);
        target.max_occurs = seg.max_occurs.or(target.max_occurs);
    }
    for (tag, values) in &top.default_values {
        let target = base.default_values.entry(tag.clone()).or_default();
        for (pos, v) in values {
            target.insert(*pos, v.clone());
        }
    }
    base.customer_id.clone_from(&top.customer_id);
    base.customer_name.clone_from(&top.customer_name);
    base.segment_overrides.clone_from(&top.segment_overrides);
    base.loop_rules.clone_from(&top.loop_rules);
    base.conditional_rules.clone_from(&top.conditional_rules);
    base.additional_rules.clone_from(&top.additional_rules);
    base.custom_mappings.clone_from(&top.custom_mappings);
    base.transformations.clone_from(&top.transformations);
    base
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SegmentOverlay;
    use crate::condition::{Condition, ConditionOp};
    use crate::profile::CustomRule;
    use crate::standard_configs::example_204_config;

    fn customer() -> CustomerOverlay {
        let mut c = CustomerOverlay::empty("ACME");
        c.additional_rules.push(ValidationRule::new(
            "ACME_REF",
            Condition::predicate(ConditionOp::CountEquals, "references", Some(0.into())),
            "ACME requires a reference",
        ));
        let mut seg = SegmentOverlay {
            segment_id: "N1".into(),
            ..SegmentOverlay::default()
        };
        seg.elements.insert(
            4,
            ElementOverlay {
                default_value: Some("ACME1".into()),
                ..ElementOverlay::default()
            },
        );
        c.segment_rules.insert("N1".into(), seg);
        c
    }

    #[test]
    fn test_config_only() {
        let config = example_204_config().unwrap();
        let resolved = ResolvedValidation::resolve(Some(&config), None, None, "204");
        assert_eq!(resolved.config.level, ValidationLevel::Standard);
        assert_eq!(resolved.business_rules.len(), 3);
        let s5 = resolved
            .loop_requirements
            .iter()
            .find(|l| l.loop_id == "S5")
            .unwrap();
        assert_eq!((s5.min_occurs, s5.start_segment()), (2, "S5"));
        assert!(resolved.overlay.is_none());
    }

    #[test]
    fn test_profile_overrides_config() {
        let mut config = example_204_config().unwrap();
        config.validation = ValidationOverrides {
            strictness: Some(ValidationLevel::Lenient),
            ..ValidationOverrides::default()
        };
        let mut profile = PartnerProfile::new("p", '*', '>', '~');
        profile.normalize().unwrap();
        profile.validation.enforce_element_lengths = Some(false);
        profile.validation.custom_rules.push(CustomRule {
            rule_id: "SCAC".into(),
            segment_tag: "b2".into(),
            element_position: 2,
            condition: "^[A-Z]{4}$".into(),
            ..CustomRule::default()
        });
        profile.validation.custom_rules.push(CustomRule {
            rule_id: "BROKEN".into(),
            segment_tag: "B2".into(),
            element_position: 4,
            condition: "([".into(),
            ..CustomRule::default()
        });

        let resolved = ResolvedValidation::resolve(Some(&config), Some(&profile), None, "204");
        assert_eq!(resolved.config.level, ValidationLevel::Strict);
        assert!(resolved.config.elements.skip_length_check);
        assert_eq!(resolved.element_rules.len(), 1);
        assert_eq!(resolved.element_rules[0].segment_tag, "B2");
        assert!(resolved.element_rules[0].accepts("ABCD"));
        assert!(!resolved.element_rules[0].accepts("abc"));
    }

    #[test]
    fn test_customer_rules_append() {
        let mut config = example_204_config().unwrap();
        config.customer_overrides.insert("ACME".into(), customer());

        let resolved = ResolvedValidation::resolve(Some(&config), None, Some("ACME"), "204");
        assert_eq!(resolved.business_rules.len(), 3);
        assert_eq!(resolved.customer_rules.len(), 1);
        assert_eq!(
            resolved
                .element_overlay("N1", 4)
                .and_then(|o| o.default_value.as_deref()),
            Some("ACME1")
        );

        let other = ResolvedValidation::resolve(Some(&config), None, Some("OTHER"), "204");
        assert!(other.customer_rules.is_empty());
    }

    #[test]
    fn test_inactive_customer_ignored() {
        let mut config = example_204_config().unwrap();
        let mut c = customer();
        c.active = false;
        config.customer_overrides.insert("ACME".into(), c);
        let resolved = ResolvedValidation::resolve(Some(&config), None, Some("ACME"), "204");
        assert!(resolved.customer_rules.is_empty());
    }

    #[test]
    fn test_profile_support_requirements() {
        let config = example_204_config().unwrap();
        let mut profile = PartnerProfile::new("p", '*', '>', '~');
        profile.supported_transactions.push(crate::profile::TransactionSupport {
            transaction_type: "204".into(),
            required_segments: vec!["L11".into()],
            prohibited_segments: vec!["NTE".into()],
            loop_requirements: vec![LoopRequirement {
                loop_id: "S5".into(),
                min_occurs: 3,
                ..LoopRequirement::default()
            }],
            ..crate::profile::TransactionSupport::default()
        });
        let resolved = ResolvedValidation::resolve(Some(&config), Some(&profile), None, "204");
        assert!(resolved.segment_requirements.iter().any(|r| r.segment_id == "L11" && r.min_occurs == 1));
        assert!(resolved.is_prohibited("nte"));
        let s5 = resolved.loop_requirements.iter().find(|l| l.loop_id == "S5").unwrap();
        assert_eq!(s5.min_occurs, 3);
        assert_eq!(s5.start_segment(), "S5");
    }

    #[test]
    fn test_merge_prefers_customer() {
        let mut profile = PartnerProfile::new("p", '*', '>', '~');
        profile
            .transformations
            .default_values
            .insert("N1".into(), [(4, "PROFILE".to_string())].into_iter().collect());
        profile
            .transformations
            .default_values
            .insert("B2".into(), [(1, "X".to_string())].into_iter().collect());
        let mut config = example_204_config().unwrap();
        config.customer_overrides.insert("ACME".into(), customer());

        let resolved = ResolvedValidation::resolve(Some(&config), Some(&profile), Some("ACME"), "204");
        let overlay = resolved.overlay.unwrap();
        assert_eq!(overlay.default_for("N1", 4).as_deref(), Some("ACME1"));
        assert_eq!(overlay.default_for("B2", 1).as_deref(), Some("X"));
    }

    #[test]
    fn test_with_level() {
        let resolved = ResolvedValidation::default().with_level(ValidationLevel::None);
        assert_eq!(resolved.config.level, ValidationLevel::None);
        assert!(!resolved.config.elements.enforce_mandatory);
    }

    #[test]
    fn test_forced_strict_resets_code_toggles() {
        let resolved = ResolvedValidation::default().with_level(ValidationLevel::Strict);
        assert_eq!(resolved.config, ValidationConfig::for_level(ValidationLevel::Strict));
        assert!(!resolved.config.codes.allow_custom_codes);
        assert_eq!(
            resolved.config.severity_for(crate::validation::Check::InvalidCode),
            Some(Severity::Error)
        );
    }

    #[test]
    fn test_forced_level_keeps_explicit_toggles() {
        let mut profile = PartnerProfile::new("SKIPLEN", '*', '>', '~');
        profile.validation.strictness = Some(ValidationLevel::Lenient);
        profile.validation.enforce_element_lengths = Some(false);
        let resolved = ResolvedValidation::resolve(None, Some(&profile), None, "204")
            .with_level(ValidationLevel::Strict);
        assert_eq!(resolved.config.level, ValidationLevel::Strict);
        assert!(resolved.config.elements.skip_length_check);
        assert!(!resolved.config.codes.allow_custom_codes);
    }
}
