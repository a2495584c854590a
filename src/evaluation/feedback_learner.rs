//! Feedback learning for tier-2 personalization.
//!
//! Records `(context, chosen weights, chosen thresholds, outcome quality)`
//! samples grouped by context signature, and recomputes a [`LearnedPattern`]
//! for the group after every sample.
//!
//! # Eligibility
//!
//! A pattern is offered to the resolver only once it has at least
//! `min_samples` samples with a mean outcome quality above
//! `min_mean_quality`. Confidence grows with sample count:
//! `confidence = mean_quality * n / (n + 1)`.

use crate::cache::context_signature;
use crate::config::LearningConfig;
use crate::evaluation::similarity::{AttributeOverlap, Similarity};
use crate::personalization::normalizer::proportional;
use crate::types::PersonalizationContext;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Weight/threshold suggestion learned from successful assessments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnedPattern {
    pub id: String,
    pub context_signature: String,

    /// Business attributes the samples were recorded under
    pub context: PersonalizationContext,

    // Suggested weights sum to 1.0 over the dimensions they cover
    pub suggested_weights: BTreeMap<String, f64>,
    pub suggested_thresholds: BTreeMap<String, f64>,

    pub confidence: f64,
    pub sample_size: usize,
    pub mean_quality: f64,
    pub updated_at: DateTime<Utc>,
}

impl LearnedPattern {
    /// Calculate confidence from sample count and mean quality
    pub fn calculate_confidence(sample_size: usize, mean_quality: f64) -> f64 {
        if sample_size == 0 {
            return 0.0;
        }
        let n = sample_size as f64;
        (mean_quality * n / (n + 1.0)).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone)]
struct FeedbackSample {
    weights: BTreeMap<String, f64>,
    thresholds: BTreeMap<String, f64>,
    outcome_quality: f64,
}

struct PatternAccumulator {
    samples: Vec<FeedbackSample>,
    pattern: LearnedPattern,
}

impl PatternAccumulator {
    fn new(signature: String, context: PersonalizationContext) -> Self {
        Self {
            samples: Vec::new(),
            pattern: LearnedPattern {
                id: Uuid::new_v4().to_string(),
                context_signature: signature,
                context,
                suggested_weights: BTreeMap::new(),
                suggested_thresholds: BTreeMap::new(),
                confidence: 0.0,
                sample_size: 0,
                mean_quality: 0.0,
                updated_at: Utc::now(),
            },
        }
    }

    /// Recompute the pattern from the full sample set.
    ///
    /// Suggestions are quality-weighted means of what was chosen.
    fn recompute(&mut self) {
        let n = self.samples.len();
        let total_quality: f64 = self.samples.iter().map(|s| s.outcome_quality).sum();
        let mean_quality = if n == 0 { 0.0 } else { total_quality / n as f64 };

        let weights = weighted_mean(self.samples.iter().map(|s| (&s.weights, s.outcome_quality)));
        let thresholds =
            weighted_mean(self.samples.iter().map(|s| (&s.thresholds, s.outcome_quality)));

        self.pattern.suggested_weights = proportional(&weights);
        self.pattern.suggested_thresholds = thresholds
            .into_iter()
            .map(|(k, v)| (k, v.clamp(0.0, 1.0)))
            .collect();
        self.pattern.sample_size = n;
        self.pattern.mean_quality = mean_quality;
        self.pattern.confidence = LearnedPattern::calculate_confidence(n, mean_quality);
        self.pattern.updated_at = Utc::now();
    }
}

/// Per-key mean, weighting each sample by its outcome quality.
/// Falls back to a plain mean when every quality is zero.
fn weighted_mean<'a>(
    samples: impl Iterator<Item = (&'a BTreeMap<String, f64>, f64)>,
) -> BTreeMap<String, f64> {
    let mut sums: BTreeMap<String, (f64, f64, f64, usize)> = BTreeMap::new();
    for (values, quality) in samples {
        for (key, value) in values {
            let entry = sums.entry(key.clone()).or_insert((0.0, 0.0, 0.0, 0));
            entry.0 += value * quality;
            entry.1 += quality;
            entry.2 += value;
            entry.3 += 1;
        }
    }
    sums.into_iter()
        .map(|(key, (weighted, quality, plain, count))| {
            let mean = if quality > 0.0 {
                weighted / quality
            } else {
                plain / count as f64
            };
            (key, mean)
        })
        .collect()
}

/// Records assessment outcomes and serves similar learned patterns
pub struct FeedbackLearner {
    settings: LearningConfig,
    similarity: Arc<dyn Similarity>,
    store: Mutex<HashMap<String, PatternAccumulator>>,
}

impl FeedbackLearner {
    /// Create a learner using attribute-overlap similarity
    pub fn new(settings: LearningConfig) -> Self {
        Self::with_similarity(settings, Arc::new(AttributeOverlap))
    }

    pub fn with_similarity(settings: LearningConfig, similarity: Arc<dyn Similarity>) -> Self {
        Self {
            settings,
            similarity,
            store: Mutex::new(HashMap::new()),
        }
    }

    /// Record the configuration used for an assessment and how well it turned out.
    ///
    /// Non-finite qualities are ignored; others are clamped to [0.0, 1.0].
    pub fn record(
        &self,
        context: &PersonalizationContext,
        chosen_weights: &BTreeMap<String, f64>,
        chosen_thresholds: &BTreeMap<String, f64>,
        outcome_quality: f64,
    ) {
        if !outcome_quality.is_finite() {
            warn!("Ignoring feedback with non-finite outcome quality");
            return;
        }
        let outcome_quality = outcome_quality.clamp(0.0, 1.0);

        let business = PersonalizationContext::from_value(serde_json::Value::Object(
            context.business_attributes().into_iter().collect(),
        ));
        let signature = context_signature(context);

        let sample = FeedbackSample {
            weights: finite_only(chosen_weights),
            thresholds: finite_only(chosen_thresholds),
            outcome_quality,
        };

        let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        let accumulator = store
            .entry(signature.clone())
            .or_insert_with(|| PatternAccumulator::new(signature.clone(), business));
        accumulator.samples.push(sample);
        accumulator.recompute();

        let pattern = &accumulator.pattern;
        if self.is_eligible(pattern) {
            info!(
                "Learned pattern {} updated: {} samples, mean quality {:.2}, confidence {:.2}",
                signature, pattern.sample_size, pattern.mean_quality, pattern.confidence
            );
        } else {
            debug!(
                "Recorded feedback for {} ({} samples, mean quality {:.2})",
                signature, pattern.sample_size, pattern.mean_quality
            );
        }
    }

    /// Whether a pattern may be offered to tier-2 resolution
    pub fn is_eligible(&self, pattern: &LearnedPattern) -> bool {
        pattern.sample_size >= self.settings.min_samples
            && pattern.mean_quality > self.settings.min_mean_quality
    }

    /// Eligible patterns similar to `context`, with their similarity,
    /// ordered by `similarity * confidence` descending
    pub fn find_similar_scored(&self, context: &PersonalizationContext) -> Vec<(f64, LearnedPattern)> {
        let store = self.store.lock().unwrap_or_else(PoisonError::into_inner);

        let mut candidates: Vec<(f64, LearnedPattern)> = store
            .values()
            .map(|acc| &acc.pattern)
            .filter(|p| self.is_eligible(p))
            .filter_map(|p| {
                let similarity = self.similarity.similarity(context, &p.context).clamp(0.0, 1.0);
                (similarity > 0.0).then(|| (similarity, p.clone()))
            })
            .collect();
        drop(store);

        candidates.sort_by(|(sim_a, a), (sim_b, b)| {
            (sim_b * b.confidence)
                .partial_cmp(&(sim_a * a.confidence))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.sample_size.cmp(&a.sample_size))
                .then_with(|| a.context_signature.cmp(&b.context_signature))
        });
        candidates
    }

    /// Eligible patterns similar to `context`, best first
    pub fn find_similar(&self, context: &PersonalizationContext) -> Vec<LearnedPattern> {
        self.find_similar_scored(context)
            .into_iter()
            .map(|(_, pattern)| pattern)
            .collect()
    }

    /// Snapshot of every pattern, eligible or not, for external persistence
    pub fn patterns(&self) -> Vec<LearnedPattern> {
        let store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        let mut patterns: Vec<LearnedPattern> = store.values().map(|a| a.pattern.clone()).collect();
        patterns.sort_by(|a, b| a.context_signature.cmp(&b.context_signature));
        patterns
    }

    pub fn pattern_count(&self) -> usize {
        self.store.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

fn finite_only(values: &BTreeMap<String, f64>) -> BTreeMap<String, f64> {
    values
        .iter()
        .filter(|(_, v)| v.is_finite())
        .map(|(k, v)| (k.clone(), *v))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weights(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn finance() -> PersonalizationContext {
        PersonalizationContext::new()
            .with("industry", "finance")
            .with("business_size", "enterprise")
    }

    #[test]
    fn test_confidence_calculation() {
        assert_eq!(LearnedPattern::calculate_confidence(0, 1.0), 0.0);
        let five = LearnedPattern::calculate_confidence(5, 0.9);
        assert!((five - 0.75).abs() < 1e-9);
        let fifty = LearnedPattern::calculate_confidence(50, 0.9);
        assert!(fifty > five);
        assert!(fifty <= 0.9);
    }

    #[test]
    fn test_pattern_not_eligible_before_min_samples() {
        let learner = FeedbackLearner::new(LearningConfig::default());
        let w = weights(&[("accuracy", 0.5), ("completeness", 0.5)]);
        for _ in 0..4 {
            learner.record(&finance(), &w, &BTreeMap::new(), 0.95);
        }
        assert!(learner.find_similar(&finance()).is_empty());

        learner.record(&finance(), &w, &BTreeMap::new(), 0.95);
        assert_eq!(learner.find_similar(&finance()).len(), 1);
    }

    #[test]
    fn test_low_quality_pattern_never_eligible() {
        let learner = FeedbackLearner::new(LearningConfig::default());
        let w = weights(&[("accuracy", 1.0)]);
        for _ in 0..10 {
            learner.record(&finance(), &w, &BTreeMap::new(), 0.6);
        }
        assert!(learner.find_similar(&finance()).is_empty());
        assert_eq!(learner.patterns().len(), 1);
    }

    #[test]
    fn test_suggestions_are_quality_weighted_and_normalized() {
        let learner = FeedbackLearner::new(LearningConfig::default());
        let t = weights(&[("accuracy", 0.8)]);
        for _ in 0..5 {
            learner.record(&finance(), &weights(&[("accuracy", 3.0), ("validity", 1.0)]), &t, 1.0);
        }

        let pattern = &learner.find_similar(&finance())[0];
        assert!((pattern.suggested_weights["accuracy"] - 0.75).abs() < 1e-9);
        assert!((pattern.suggested_weights["validity"] - 0.25).abs() < 1e-9);
        assert!((pattern.suggested_thresholds["accuracy"] - 0.8).abs() < 1e-9);
        assert_eq!(pattern.sample_size, 5);
    }

    #[test]
    fn test_find_similar_orders_by_similarity_and_confidence() {
        let learner = FeedbackLearner::new(LearningConfig::default());
        let w = weights(&[("accuracy", 1.0)]);
        let partial = PersonalizationContext::new().with("industry", "finance");
        for _ in 0..5 {
            learner.record(&finance(), &w, &BTreeMap::new(), 0.9);
            learner.record(&partial, &w, &BTreeMap::new(), 0.9);
        }

        let results = learner.find_similar_scored(&finance());
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, 1.0);
        assert_eq!(results[0].1.context, finance());
        assert!(results[1].0 < 1.0);
    }

    #[test]
    fn test_override_keys_share_signature() {
        let learner = FeedbackLearner::new(LearningConfig::default());
        let w = weights(&[("accuracy", 1.0)]);
        learner.record(&finance(), &w, &BTreeMap::new(), 0.9);
        learner.record(
            &finance().with("personalization_mode", "strict"),
            &w,
            &BTreeMap::new(),
            0.9,
        );
        assert_eq!(learner.pattern_count(), 1);
    }

    #[test]
    fn test_non_finite_quality_ignored() {
        let learner = FeedbackLearner::new(LearningConfig::default());
        learner.record(&finance(), &BTreeMap::new(), &BTreeMap::new(), f64::NAN);
        assert_eq!(learner.pattern_count(), 0);
    }
}
