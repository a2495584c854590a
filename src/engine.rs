//! The scoring engine: one object that owns every collaborator.
//!
//! Construct it once at startup (see [`ScoringEngine::builder`]) and share it
//! by reference; every public method takes `&self` and is safe to call from
//! multiple threads. None of the assessment entry points fail: problems with
//! the data, the context or a custom scorer degrade the report instead.

use crate::cache::{assessment_key, AssessmentCache, CacheStats};
use crate::config::{ConfigResolver, EngineConfig};
use crate::error::Result;
use crate::evaluation::{FeedbackLearner, Similarity};
use crate::personalization::{PersonalizationMode, RawWeight, TieredPersonalizationResolver, WeightNormalizer};
use crate::scoring::{DimensionCatalog, DimensionScorer, ScoreAggregator};
use crate::types::{
    ConfigurationSummary, DimensionSource, DimensionSpec, DimensionSummary, PersonalizationContext,
    Record, ScoreReport, ScorerRef,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// Dimension specs resolved and normalized for one context
#[derive(Debug, Clone)]
pub struct ResolvedConfiguration {
    pub specs: Vec<DimensionSpec>,

    /// Mode that produced the final weights
    pub mode: PersonalizationMode,
    pub warnings: Vec<String>,
}

impl ResolvedConfiguration {
    pub fn weights(&self) -> BTreeMap<String, f64> {
        self.specs.iter().map(|s| (s.name.clone(), s.weight)).collect()
    }

    pub fn thresholds(&self) -> BTreeMap<String, f64> {
        self.specs.iter().map(|s| (s.name.clone(), s.threshold)).collect()
    }

    pub fn weight_sum(&self) -> f64 {
        self.specs.iter().map(|s| s.weight).sum()
    }

    pub fn get(&self, dimension: &str) -> Option<&DimensionSpec> {
        self.specs.iter().find(|s| s.name == dimension)
    }
}

/// Stored context and the configuration resolved from it, swapped as a unit
struct PersonalizationState {
    context: PersonalizationContext,
    resolved: Arc<ResolvedConfiguration>,
}

/// Builder for [`ScoringEngine`]
pub struct ScoringEngineBuilder {
    config: EngineConfig,
    settings: ConfigResolver,
    custom: Vec<(String, String, ScorerRef)>,
    similarity: Option<Arc<dyn Similarity>>,
    context: PersonalizationContext,
}

impl ScoringEngineBuilder {
    fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            settings: ConfigResolver::empty(),
            custom: Vec::new(),
            similarity: None,
            context: PersonalizationContext::new(),
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Stored key/value settings (`personalization.*`, `contextual.*`)
    pub fn config_resolver(mut self, settings: ConfigResolver) -> Self {
        self.settings = settings;
        self
    }

    /// Add a custom dimension scored by `scorer`.
    ///
    /// Scorers run while the assessment cache is held. A scorer that calls
    /// back into the same engine's `assess` gets an uncached report.
    pub fn register_dimension(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        scorer: ScorerRef,
    ) -> Self {
        self.custom.push((name.into(), description.into(), scorer));
        self
    }

    pub fn similarity(mut self, similarity: Arc<dyn Similarity>) -> Self {
        self.similarity = Some(similarity);
        self
    }

    /// Initial stored personalization context
    pub fn context(mut self, context: PersonalizationContext) -> Self {
        self.context = context;
        self
    }

    /// Validate the configuration and assemble the engine
    pub fn build(self) -> Result<ScoringEngine> {
        self.config.validate()?;
        Ok(ScoringEngine::assemble(self))
    }
}

/// Personalized multi-dimensional scoring engine
pub struct ScoringEngine {
    config: EngineConfig,
    resolver: TieredPersonalizationResolver,
    learner: Arc<FeedbackLearner>,
    scorer: DimensionScorer,
    aggregator: ScoreAggregator,
    cache: AssessmentCache<ScoreReport>,
    state: RwLock<PersonalizationState>,
}

impl ScoringEngine {
    pub fn builder() -> ScoringEngineBuilder {
        ScoringEngineBuilder::new()
    }

    /// Engine with the given configuration and no stored settings
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::builder().config(config).build()
    }

    fn assemble(builder: ScoringEngineBuilder) -> Self {
        let ScoringEngineBuilder {
            config,
            settings,
            custom,
            similarity,
            context,
        } = builder;

        let catalog = custom
            .into_iter()
            .fold(DimensionCatalog::from_config(&config), |catalog, (name, description, scorer)| {
                catalog.with_custom(name, description, scorer)
            });

        let learner = Arc::new(match similarity {
            Some(similarity) => FeedbackLearner::with_similarity(config.learning.clone(), similarity),
            None => FeedbackLearner::new(config.learning.clone()),
        });

        let resolver =
            TieredPersonalizationResolver::new(settings, Arc::new(catalog), learner.clone(), &config);

        let mut engine = Self {
            scorer: DimensionScorer::new(config.scoring.clone()),
            aggregator: ScoreAggregator::new(&config),
            cache: AssessmentCache::new(config.cache.max_entries, config.cache.ttl_seconds),
            resolver,
            learner,
            state: RwLock::new(PersonalizationState {
                context: PersonalizationContext::new(),
                resolved: Arc::new(ResolvedConfiguration {
                    specs: Vec::new(),
                    mode: PersonalizationMode::default(),
                    warnings: Vec::new(),
                }),
            }),
            config,
        };

        let resolved = Arc::new(engine.resolve_configuration(&context));
        engine.state = RwLock::new(PersonalizationState { context, resolved });

        info!(
            "Scoring engine ready: {} dimensions, cache ttl {}s, max {} entries",
            engine.resolver.catalog().len(),
            engine.config.cache.ttl_seconds,
            engine.config.cache.max_entries
        );
        engine
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn learner(&self) -> &FeedbackLearner {
        &self.learner
    }

    fn stored(&self) -> (PersonalizationContext, Arc<ResolvedConfiguration>) {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        (state.context.clone(), state.resolved.clone())
    }

    /// Stored context with `request` laid over it
    pub fn effective_context(&self, request: &PersonalizationContext) -> PersonalizationContext {
        let (stored, _) = self.stored();
        stored.merge(request)
    }

    /// Resolve one dimension for the stored context overlaid with `request`
    pub fn resolve(&self, dimension: &str, request: &PersonalizationContext) -> DimensionSpec {
        self.resolver.resolve(dimension, &self.effective_context(request))
    }

    /// Resolve and normalize every dimension for a fully merged context
    pub fn resolve_configuration(&self, context: &PersonalizationContext) -> ResolvedConfiguration {
        let mut specs = self.resolver.resolve_all(context);
        let mut warnings = Vec::new();

        let mode = match context.get_str("personalization_mode") {
            Some(requested) => requested.parse::<PersonalizationMode>().unwrap_or_else(|e| {
                let msg = format!("{}; using {}", e, self.config.mode);
                warn!("{}", msg);
                warnings.push(msg);
                self.config.mode
            }),
            None => self.config.mode,
        };
        let allow_invalid_sums = context
            .allow_invalid_sums()
            .unwrap_or(self.config.allow_invalid_sums);

        let catalog = self.resolver.catalog();
        let raw: BTreeMap<String, RawWeight> = specs
            .iter()
            .map(|spec| {
                let mut weight = if spec.source == DimensionSource::User {
                    RawWeight::user(spec.weight)
                } else {
                    RawWeight::new(spec.weight)
                };
                if catalog.is_custom(&spec.name) {
                    weight = weight.custom();
                }
                (spec.name.clone(), weight)
            })
            .collect();

        let normalized = WeightNormalizer::new(allow_invalid_sums).normalize(&raw, mode);
        for spec in &mut specs {
            if let Some(weight) = normalized.weights.get(&spec.name) {
                spec.weight = *weight;
            }
        }
        warnings.extend(normalized.warnings);

        debug!(
            "Resolved {} dimensions in {} mode (weight sum {:.4})",
            specs.len(),
            normalized.mode,
            specs.iter().map(|s| s.weight).sum::<f64>()
        );

        ResolvedConfiguration {
            specs,
            mode: normalized.mode,
            warnings,
        }
    }

    /// Assess a record or a list of records.
    ///
    /// Identical `data` and effective context within the cache TTL return the
    /// cached report without re-scoring.
    pub fn assess(&self, data: &Value, request: &PersonalizationContext) -> ScoreReport {
        let (stored, stored_resolved) = self.stored();
        let effective = stored.merge(request);
        let key = assessment_key(data, &effective);

        self.cache.get_or_compute(&key, || {
            let resolved = if request.is_empty() {
                stored_resolved
            } else {
                Arc::new(self.resolve_configuration(&effective))
            };
            self.compute(data, &effective, &resolved)
        })
    }

    fn compute(
        &self,
        data: &Value,
        context: &PersonalizationContext,
        resolved: &ResolvedConfiguration,
    ) -> ScoreReport {
        let mut warnings = resolved.warnings.clone();
        let records = records_from(data, &mut warnings);

        let outcomes = resolved
            .specs
            .iter()
            .map(|spec| {
                let outcome = self.scorer.score(&spec.name, &records, spec, context);
                (spec.name.clone(), outcome)
            })
            .collect();

        let report = self
            .aggregator
            .aggregate_with(&outcomes, &resolved.specs, resolved.mode, warnings);
        info!(
            "Assessed {} records: overall {:.3}, grade {}",
            records.len(),
            report.overall_score,
            report.grade
        );
        report
    }

    /// Merge `delta` into the stored context and re-resolve every dimension.
    ///
    /// Cached assessments are left alone; they are keyed by the context they
    /// were computed under.
    pub fn update_personalization(&self, delta: &PersonalizationContext) {
        // Held across re-resolution so readers see the old or the new state, never a mix
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let context = state.context.merge(delta);
        let resolved = Arc::new(self.resolve_configuration(&context));
        info!("Personalization updated ({} attributes)", context.len());
        *state = PersonalizationState { context, resolved };
    }

    /// Report how well the configuration resolved for `context` worked out
    pub fn record_outcome(&self, context: &PersonalizationContext, outcome_quality: f64) {
        let effective = self.effective_context(context);
        let resolved = self.resolve_configuration(&effective);
        self.learner.record(
            &effective,
            &resolved.weights(),
            &resolved.thresholds(),
            outcome_quality,
        );
    }

    /// Introspect the stored configuration. No side effects.
    pub fn get_configuration_summary(&self) -> ConfigurationSummary {
        let (_, resolved) = self.stored();
        ConfigurationSummary {
            dimensions: resolved
                .specs
                .iter()
                .map(|spec| DimensionSummary {
                    name: spec.name.clone(),
                    weight: spec.weight,
                    threshold: spec.threshold,
                    source: spec.source,
                    threshold_source: spec.threshold_source,
                    description: spec.description.clone(),
                })
                .collect(),
            overall_threshold: self.config.overall_threshold,
            mode: resolved.mode,
            cache_size: self.cache.len(),
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

impl Default for ScoringEngine {
    fn default() -> Self {
        Self::assemble(ScoringEngineBuilder::new())
    }
}

/// Flatten assessment input into records. Anything that is not an object is skipped.
fn records_from(data: &Value, warnings: &mut Vec<String>) -> Vec<Record> {
    match data {
        Value::Object(map) => vec![map.clone()],
        Value::Array(items) => {
            let records: Vec<Record> = items
                .iter()
                .filter_map(|item| item.as_object().cloned())
                .collect();
            let skipped = items.len() - records.len();
            if skipped > 0 {
                let msg = format!("skipped {} entries that are not records", skipped);
                warn!("{}", msg);
                warnings.push(msg);
            }
            records
        }
        other => {
            let msg = format!(
                "expected a record or list of records, got {}",
                type_label(other)
            );
            warn!("{}", msg);
            warnings.push(msg);
            Vec::new()
        }
    }
}

fn type_label(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
