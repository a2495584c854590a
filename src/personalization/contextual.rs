//! Context-aware weight and threshold adjustments (resolution tier 3).
//!
//! Adjustments are multiplicative factors applied to the value the lower
//! tier would have produced, never replacements. Each factor sits between
//! 3% and 10% away from 1.0, and the combined factor for a dimension is
//! clamped to [`MIN_FACTOR`, `MAX_FACTOR`].
//!
//! Industry factors can be overridden through the config resolver with
//! `contextual.{industry}.{dimension}.weight_factor` and `.threshold_factor`.

use crate::config::ConfigResolver;
use crate::types::PersonalizationContext;

pub const MIN_FACTOR: f64 = 0.90;
pub const MAX_FACTOR: f64 = 1.10;

/// Combined tier-3 suggestion for one dimension
#[derive(Debug, Clone, PartialEq)]
pub struct ContextualAdjustment {
    pub weight_factor: f64,
    pub threshold_factor: f64,
    pub reasons: Vec<String>,
}

impl ContextualAdjustment {
    fn identity() -> Self {
        Self {
            weight_factor: 1.0,
            threshold_factor: 1.0,
            reasons: Vec::new(),
        }
    }

    pub fn adjusts_weight(&self) -> bool {
        (self.weight_factor - 1.0).abs() > f64::EPSILON
    }

    pub fn adjusts_threshold(&self) -> bool {
        (self.threshold_factor - 1.0).abs() > f64::EPSILON
    }

    fn apply(&mut self, weight: f64, threshold: f64, reason: String) {
        if weight == 1.0 && threshold == 1.0 {
            return;
        }
        self.weight_factor *= weight;
        self.threshold_factor *= threshold;
        self.reasons.push(reason);
    }
}

/// Canonical industry name for common aliases
fn canonical_industry(industry: &str) -> &str {
    match industry {
        "finance" | "financial" | "financial_services" | "financial services" | "banking"
        | "insurance" | "fintech" => "finance",
        "healthcare" | "health" | "medical" | "pharma" | "life_sciences" => "healthcare",
        "retail" | "ecommerce" | "e-commerce" | "consumer" => "retail",
        "technology" | "tech" | "software" | "saas" => "technology",
        "manufacturing" | "industrial" | "logistics" => "manufacturing",
        other => other,
    }
}

/// Static `(industry, dimension)` table: (weight factor, threshold factor)
fn industry_factors(industry: &str, dimension: &str) -> Option<(f64, f64)> {
    let factors = match (industry, dimension) {
        ("finance", "accuracy") => (1.10, 1.05),
        ("finance", "consistency") => (1.08, 1.03),
        ("finance", "validity") => (1.05, 1.03),
        ("finance", "timeliness") => (1.05, 1.0),
        ("finance", "stability") => (1.06, 1.0),

        ("healthcare", "completeness") => (1.10, 1.05),
        ("healthcare", "accuracy") => (1.08, 1.05),
        ("healthcare", "validity") => (1.05, 1.03),

        ("retail", "timeliness") => (1.08, 1.0),
        ("retail", "uniqueness") => (1.06, 1.0),
        ("retail", "completeness") => (0.95, 0.97),
        ("retail", "concentration") => (1.05, 1.0),

        ("technology", "consistency") => (1.05, 1.0),
        ("technology", "timeliness") => (1.06, 1.0),
        ("technology", "validity") => (1.04, 1.0),
        ("technology", "trend") => (1.05, 1.0),

        ("manufacturing", "accuracy") => (1.05, 1.03),
        ("manufacturing", "consistency") => (1.07, 1.03),
        ("manufacturing", "stability") => (1.08, 1.0),
        _ => return None,
    };
    Some(factors)
}

fn is_known_industry(industry: &str) -> bool {
    matches!(
        industry,
        "finance" | "healthcare" | "retail" | "technology" | "manufacturing"
    )
}

fn risk_tolerance_threshold_factor(tolerance: &str) -> Option<f64> {
    match tolerance {
        "low" | "conservative" | "averse" => Some(1.05),
        "medium" | "moderate" | "balanced" => Some(1.0),
        "high" | "aggressive" | "tolerant" => Some(0.95),
        _ => None,
    }
}

fn regulatory_weight_factor(regime: &str, dimension: &str) -> Option<f64> {
    let strict = match regime {
        "strict" | "regulated" | "high" | "gdpr" | "hipaa" | "sox" | "pci" => true,
        "standard" | "moderate" | "minimal" | "none" | "low" => false,
        _ => return None,
    };
    let factor = match dimension {
        "accuracy" | "validity" | "completeness" if strict => 1.08,
        _ => 1.0,
    };
    Some(factor)
}

fn business_size_weight_factor(size: &str, dimension: &str) -> Option<f64> {
    let factor = match (size, dimension) {
        ("enterprise" | "large", "consistency" | "uniqueness") => 1.05,
        ("startup" | "small", "timeliness") => 1.05,
        ("enterprise" | "large" | "startup" | "small" | "medium" | "mid" | "smb", _) => 1.0,
        _ => return None,
    };
    Some(factor)
}

/// Attribute values that the contextual tier does not recognize
pub fn unrecognized_attributes(
    context: &PersonalizationContext,
    config: &ConfigResolver,
    dimensions: &[String],
) -> Vec<String> {
    let mut unknown = Vec::new();

    if let Some(industry) = context.industry() {
        let canonical = canonical_industry(&industry);
        let configured = dimensions.iter().any(|d| {
            config
                .get_opt_f64(&format!("contextual.{}.{}.weight_factor", canonical, d))
                .is_some()
        });
        if !is_known_industry(canonical) && !configured {
            unknown.push(format!("industry={}", industry));
        }
    }
    if let Some(tolerance) = context.risk_tolerance() {
        if risk_tolerance_threshold_factor(&tolerance).is_none() {
            unknown.push(format!("risk_tolerance={}", tolerance));
        }
    }
    if let Some(regime) = context.regulatory_environment() {
        if regulatory_weight_factor(&regime, "").is_none() {
            unknown.push(format!("regulatory_environment={}", regime));
        }
    }
    if let Some(size) = context.business_size() {
        if business_size_weight_factor(&size, "").is_none() {
            unknown.push(format!("business_size={}", size));
        }
    }
    unknown
}

/// Tier-3 suggestion for `dimension`, or `None` when nothing in the context
/// adjusts it
pub fn adjustment_for(
    context: &PersonalizationContext,
    dimension: &str,
    config: &ConfigResolver,
) -> Option<ContextualAdjustment> {
    let mut adjustment = ContextualAdjustment::identity();

    if let Some(industry) = context.industry() {
        let canonical = canonical_industry(&industry);
        let (table_weight, table_threshold) =
            industry_factors(canonical, dimension).unwrap_or((1.0, 1.0));
        let weight = config
            .get_opt_f64(&format!("contextual.{}.{}.weight_factor", canonical, dimension))
            .unwrap_or(table_weight)
            .clamp(MIN_FACTOR, MAX_FACTOR);
        let threshold = config
            .get_opt_f64(&format!("contextual.{}.{}.threshold_factor", canonical, dimension))
            .unwrap_or(table_threshold)
            .clamp(MIN_FACTOR, MAX_FACTOR);
        adjustment.apply(weight, threshold, format!("industry {}", canonical));
    }

    if let Some(factor) = context
        .risk_tolerance()
        .and_then(|t| risk_tolerance_threshold_factor(&t))
    {
        adjustment.apply(1.0, factor, "risk tolerance".to_string());
    }

    if let Some(factor) = context
        .regulatory_environment()
        .and_then(|r| regulatory_weight_factor(&r, dimension))
    {
        adjustment.apply(factor, 1.0, "regulatory environment".to_string());
    }

    if let Some(factor) = context
        .business_size()
        .and_then(|s| business_size_weight_factor(&s, dimension))
    {
        adjustment.apply(factor, 1.0, "business size".to_string());
    }

    if adjustment.reasons.is_empty() {
        return None;
    }

    adjustment.weight_factor = adjustment.weight_factor.clamp(MIN_FACTOR, MAX_FACTOR);
    adjustment.threshold_factor = adjustment.threshold_factor.clamp(MIN_FACTOR, MAX_FACTOR);
    Some(adjustment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StaticConfigSource;
    use std::sync::Arc;

    fn ctx(pairs: &[(&str, &str)]) -> PersonalizationContext {
        pairs
            .iter()
            .fold(PersonalizationContext::new(), |c, (k, v)| c.with(*k, *v))
    }

    #[test]
    fn test_industry_alias_adjusts_weight() {
        let adj = adjustment_for(
            &ctx(&[("industry", "Banking")]),
            "accuracy",
            &ConfigResolver::empty(),
        )
        .unwrap();
        assert_eq!(adj.weight_factor, 1.10);
        assert_eq!(adj.threshold_factor, 1.05);
    }

    #[test]
    fn test_unrelated_dimension_gets_no_adjustment() {
        let adj = adjustment_for(
            &ctx(&[("industry", "healthcare")]),
            "timeliness",
            &ConfigResolver::empty(),
        );
        assert!(adj.is_none());
    }

    #[test]
    fn test_unknown_industry_yields_nothing() {
        let context = ctx(&[("industry", "zzz_unknown")]);
        assert!(adjustment_for(&context, "accuracy", &ConfigResolver::empty()).is_none());
        let unknown =
            unrecognized_attributes(&context, &ConfigResolver::empty(), &["accuracy".to_string()]);
        assert_eq!(unknown, vec!["industry=zzz_unknown".to_string()]);
    }

    #[test]
    fn test_combined_factor_is_clamped() {
        let context = ctx(&[
            ("industry", "healthcare"),
            ("regulatory_environment", "hipaa"),
        ]);
        let adj = adjustment_for(&context, "completeness", &ConfigResolver::empty()).unwrap();
        // 1.10 * 1.08 exceeds the band
        assert_eq!(adj.weight_factor, MAX_FACTOR);
        assert_eq!(adj.reasons.len(), 2);
    }

    #[test]
    fn test_risk_tolerance_only_touches_threshold() {
        let adj = adjustment_for(
            &ctx(&[("risk_tolerance", "high")]),
            "uniqueness",
            &ConfigResolver::empty(),
        )
        .unwrap();
        assert!(!adj.adjusts_weight());
        assert_eq!(adj.threshold_factor, 0.95);
    }

    #[test]
    fn test_configured_factor_overrides_table() {
        let source = StaticConfigSource::new()
            .with("contextual.agritech.validity.weight_factor", 1.07);
        let config = ConfigResolver::new(Arc::new(source));
        let context = ctx(&[("industry", "agritech")]);

        let adj = adjustment_for(&context, "validity", &config).unwrap();
        assert_eq!(adj.weight_factor, 1.07);
        assert!(unrecognized_attributes(&context, &config, &["validity".to_string()]).is_empty());
    }
}
