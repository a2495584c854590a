//! Tiered resolution of dimension weights and thresholds.
//!
//! Each field is resolved independently through four tiers, first match wins:
//! 1. User override (request context, then stored `personalization.*` keys)
//! 2. Learned pattern from prior successful assessments
//! 3. Contextual adjustment of the neutral value
//! 4. Neutral fallback: `1 / num_dimensions` weight, `0.5` threshold
//!
//! Tier 4 never fails, so every dimension name resolves, known or not.

use crate::config::{ConfigResolver, EngineConfig, LearningConfig, TierConfig};
use crate::evaluation::{FeedbackLearner, LearnedPattern};
use crate::personalization::contextual;
use crate::scoring::DimensionCatalog;
use crate::types::{DimensionSource, DimensionSpec, PersonalizationContext};
use std::sync::Arc;
use tracing::{debug, info};

pub const NEUTRAL_THRESHOLD: f64 = 0.5;

const USER_CONFIDENCE: f64 = 1.0;
const CONTEXTUAL_CONFIDENCE: f64 = 0.75;
const NEUTRAL_CONFIDENCE: f64 = 0.5;

/// What one tier proposes for a dimension
#[derive(Debug, Clone, PartialEq)]
pub struct TierSuggestion {
    pub weight: Option<f64>,
    pub threshold: Option<f64>,
    pub confidence: f64,
}

impl TierSuggestion {
    fn is_empty(&self) -> bool {
        self.weight.is_none() && self.threshold.is_none()
    }
}

/// Resolves [`DimensionSpec`]s through the user → learned → contextual → neutral chain
pub struct TieredPersonalizationResolver {
    config: ConfigResolver,
    catalog: Arc<DimensionCatalog>,
    learner: Arc<FeedbackLearner>,
    tiers: TierConfig,
    learning: LearningConfig,
}

impl TieredPersonalizationResolver {
    pub fn new(
        config: ConfigResolver,
        catalog: Arc<DimensionCatalog>,
        learner: Arc<FeedbackLearner>,
        settings: &EngineConfig,
    ) -> Self {
        Self {
            config,
            catalog,
            learner,
            tiers: settings.tiers.clone(),
            learning: settings.learning.clone(),
        }
    }

    pub fn catalog(&self) -> &DimensionCatalog {
        &self.catalog
    }

    /// Tier 1: explicit user override from the request, then from stored config
    pub fn user_override(
        &self,
        dimension: &str,
        context: &PersonalizationContext,
    ) -> Option<TierSuggestion> {
        if !self.tiers.user {
            return None;
        }
        let weight = context.user_weight(dimension).or_else(|| {
            self.config
                .get_opt_f64(&format!("personalization.{}.weight", dimension))
        });
        let threshold = context.user_threshold(dimension).or_else(|| {
            self.config
                .get_opt_f64(&format!("personalization.{}.threshold", dimension))
        });

        let suggestion = TierSuggestion {
            weight: weight.map(|w| w.clamp(0.0, 1.0)),
            threshold: threshold.map(|t| t.clamp(0.0, 1.0)),
            confidence: USER_CONFIDENCE,
        };
        (!suggestion.is_empty()).then_some(suggestion)
    }

    /// Best learned pattern for the context that clears the acceptance bar
    pub fn learned_candidate(&self, context: &PersonalizationContext) -> Option<LearnedPattern> {
        if !self.tiers.learned {
            return None;
        }
        let (similarity, pattern) = self.learner.find_similar_scored(context).into_iter().next()?;
        if pattern.confidence > self.learning.min_confidence
            && similarity >= self.learning.min_similarity
        {
            debug!(
                "Accepted learned pattern {} (confidence {:.2}, similarity {:.2})",
                pattern.context_signature, pattern.confidence, similarity
            );
            Some(pattern)
        } else {
            debug!(
                "Rejected learned pattern {} (confidence {:.2}, similarity {:.2})",
                pattern.context_signature, pattern.confidence, similarity
            );
            None
        }
    }

    /// Tier 2: learned weight/threshold for one dimension
    pub fn learned_suggestion(
        &self,
        dimension: &str,
        context: &PersonalizationContext,
    ) -> Option<TierSuggestion> {
        let pattern = self.learned_candidate(context)?;
        Self::suggestion_from_pattern(&pattern, dimension)
    }

    fn suggestion_from_pattern(pattern: &LearnedPattern, dimension: &str) -> Option<TierSuggestion> {
        let suggestion = TierSuggestion {
            weight: pattern.suggested_weights.get(dimension).copied(),
            threshold: pattern
                .suggested_thresholds
                .get(dimension)
                .map(|t| t.clamp(0.0, 1.0)),
            confidence: pattern.confidence,
        };
        (!suggestion.is_empty()).then_some(suggestion)
    }

    /// Tier 3: contextual adjustment of the neutral values
    pub fn contextual_suggestion(
        &self,
        dimension: &str,
        context: &PersonalizationContext,
    ) -> Option<TierSuggestion> {
        if !self.tiers.contextual {
            return None;
        }
        let adjustment = contextual::adjustment_for(context, dimension, &self.config)?;
        let neutral = self.neutral();
        let suggestion = TierSuggestion {
            weight: adjustment
                .adjusts_weight()
                .then(|| neutral.weight.unwrap_or_default() * adjustment.weight_factor),
            threshold: adjustment
                .adjusts_threshold()
                .then(|| (NEUTRAL_THRESHOLD * adjustment.threshold_factor).clamp(0.0, 1.0)),
            confidence: CONTEXTUAL_CONFIDENCE,
        };
        (!suggestion.is_empty()).then_some(suggestion)
    }

    /// Tier 4: equal weight and a 0.5 threshold
    pub fn neutral(&self) -> TierSuggestion {
        let count = self.catalog.len().max(1);
        TierSuggestion {
            weight: Some(1.0 / count as f64),
            threshold: Some(NEUTRAL_THRESHOLD),
            confidence: NEUTRAL_CONFIDENCE,
        }
    }

    /// Resolve one dimension against the context
    pub fn resolve(&self, dimension: &str, context: &PersonalizationContext) -> DimensionSpec {
        let learned = self.learned_candidate(context);
        self.resolve_with(dimension, context, learned.as_ref())
    }

    /// Resolve every catalog dimension, consulting the learner once
    pub fn resolve_all(&self, context: &PersonalizationContext) -> Vec<DimensionSpec> {
        let unknown =
            contextual::unrecognized_attributes(context, &self.config, &self.catalog.names());
        if !unknown.is_empty() {
            info!(
                "Unrecognized context attributes fall back to neutral defaults: {}",
                unknown.join(", ")
            );
        }

        let learned = self.learned_candidate(context);
        self.catalog
            .names()
            .iter()
            .map(|name| self.resolve_with(name, context, learned.as_ref()))
            .collect()
    }

    fn resolve_with(
        &self,
        dimension: &str,
        context: &PersonalizationContext,
        learned: Option<&LearnedPattern>,
    ) -> DimensionSpec {
        let chain: [(DimensionSource, Option<TierSuggestion>); 4] = [
            (DimensionSource::User, self.user_override(dimension, context)),
            (
                DimensionSource::Learned,
                learned.and_then(|p| Self::suggestion_from_pattern(p, dimension)),
            ),
            (
                DimensionSource::Contextual,
                self.contextual_suggestion(dimension, context),
            ),
            (DimensionSource::Neutral, Some(self.neutral())),
        ];

        let (weight, source, confidence) = chain
            .iter()
            .find_map(|(src, s)| {
                s.as_ref()
                    .and_then(|s| s.weight.map(|w| (w, *src, s.confidence)))
            })
            .unwrap_or((1.0 / self.catalog.len().max(1) as f64, DimensionSource::Neutral, NEUTRAL_CONFIDENCE));

        let (threshold, threshold_source) = chain
            .iter()
            .find_map(|(src, s)| s.as_ref().and_then(|s| s.threshold.map(|t| (t, *src))))
            .unwrap_or((NEUTRAL_THRESHOLD, DimensionSource::Neutral));

        let definition = self.catalog.get(dimension);
        let description = definition
            .map(|d| d.description.clone())
            .unwrap_or_else(|| format!("Custom dimension '{}'", dimension));

        debug!(
            "Resolved {}: weight {:.3} ({}), threshold {:.3} ({})",
            dimension, weight, source, threshold, threshold_source
        );

        DimensionSpec {
            name: dimension.to_string(),
            weight,
            threshold: threshold.clamp(0.0, 1.0),
            description,
            source,
            threshold_source,
            confidence,
            scorer: definition.and_then(|d| d.scorer.clone()),
        }
    }
}
