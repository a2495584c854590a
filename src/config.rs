//! Configuration for the Vantage scoring engine
//!
//! Two layers live here:
//! - [`ConfigResolver`]: dotted-key lookups with a caller default, backed by
//!   any [`ConfigSource`]. Lookups never fail; a missing key yields the default.
//! - [`EngineConfig`]: typed engine settings, loaded from defaults, an
//!   optional TOML file and `VANTAGE__` environment variables.

use crate::error::{Result, VantageError};
use crate::personalization::PersonalizationMode;
use crate::scoring::{GradeScale, BUILTIN_DIMENSIONS, DEFAULT_DIMENSIONS};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Environment variable prefix for layered configuration
const ENV_PREFIX: &str = "VANTAGE";
const ENV_SEPARATOR: &str = "__";

/// Key/value configuration store
#[cfg_attr(test, mockall::automock)]
pub trait ConfigSource: Send + Sync {
    /// Look up a dotted key. `None` when absent.
    fn get(&self, key: &str) -> Option<Value>;
}

/// In-memory configuration source
#[derive(Debug, Clone, Default)]
pub struct StaticConfigSource {
    values: HashMap<String, Value>,
}

impl StaticConfigSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }
}

impl ConfigSource for StaticConfigSource {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }
}

impl ConfigSource for config::Config {
    fn get(&self, key: &str) -> Option<Value> {
        config::Config::get::<Value>(self, key).ok()
    }
}

/// Dotted-key lookups with defaults
#[derive(Clone)]
pub struct ConfigResolver {
    source: Arc<dyn ConfigSource>,
}

impl ConfigResolver {
    pub fn new(source: Arc<dyn ConfigSource>) -> Self {
        Self { source }
    }

    /// Resolver with no stored values; every lookup returns its default
    pub fn empty() -> Self {
        Self::new(Arc::new(StaticConfigSource::new()))
    }

    /// Raw lookup, or `default` when the key is absent
    pub fn get(&self, key: &str, default: Value) -> Value {
        match self.source.get(key) {
            Some(value) => value,
            None => {
                debug!("Config key '{}' not set, using default", key);
                default
            }
        }
    }

    /// Optional numeric lookup. Non-numeric or non-finite values count as absent.
    pub fn get_opt_f64(&self, key: &str) -> Option<f64> {
        self.source.get(key).and_then(|v| value_as_f64(&v)).filter(|v| v.is_finite())
    }

    pub fn get_f64(&self, key: &str, default: f64) -> f64 {
        self.get_opt_f64(key).unwrap_or(default)
    }

    pub fn get_string(&self, key: &str, default: &str) -> String {
        self.source
            .get(key)
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| default.to_string())
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.source.get(key) {
            Some(Value::Bool(b)) => b,
            Some(Value::String(s)) => s.parse().unwrap_or(default),
            _ => default,
        }
    }
}

impl Default for ConfigResolver {
    fn default() -> Self {
        Self::empty()
    }
}

impl std::fmt::Debug for ConfigResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigResolver").finish_non_exhaustive()
    }
}

// Environment-sourced values arrive as strings
fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Main engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Active built-in dimensions, in report order
    pub dimensions: Vec<String>,

    /// Minimum overall score for `meets_threshold`
    pub overall_threshold: f64,

    /// Default personalization mode when a request does not name one
    pub mode: PersonalizationMode,

    /// Accept `override` weights that do not sum to 1.0
    pub allow_invalid_sums: bool,

    pub cache: CacheConfig,
    pub grades: GradeScale,
    pub scoring: ScoringConfig,
    pub learning: LearningConfig,
    pub tiers: TierConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_DIMENSIONS.iter().map(|d| d.to_string()).collect(),
            overall_threshold: 0.70,
            mode: PersonalizationMode::Proportional,
            allow_invalid_sums: false,
            cache: CacheConfig::default(),
            grades: GradeScale::default(),
            scoring: ScoringConfig::default(),
            learning: LearningConfig::default(),
            tiers: TierConfig::default(),
        }
    }
}

/// Assessment cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_seconds: u64,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 3600, // 1 hour
            max_entries: 1000,
        }
    }
}

/// Dimension scoring settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Substituted when a scorer fails
    pub error_fallback_score: f64,

    /// Age at which timeliness reaches zero
    pub timeliness_window_hours: f64,

    /// Timeliness when no timestamp field is recognized
    pub timeliness_neutral_score: f64,

    /// Overall score below which the generic improvement recommendation is added
    pub improvement_program_threshold: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            error_fallback_score: 0.5,
            timeliness_window_hours: 720.0, // 30 days
            timeliness_neutral_score: 0.5,
            improvement_program_threshold: 0.70,
        }
    }
}

/// Feedback learning settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    /// Samples a pattern needs before it is eligible for tier 2
    pub min_samples: usize,

    /// Mean outcome quality a pattern needs before it is eligible
    pub min_mean_quality: f64,

    /// Confidence a candidate must exceed to be accepted
    pub min_confidence: f64,

    /// Context similarity a candidate must reach to be accepted
    pub min_similarity: f64,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            min_samples: 5,
            min_mean_quality: 0.85,
            min_confidence: 0.7,
            min_similarity: 0.5,
        }
    }
}

/// Which resolution tiers are consulted. The neutral tier is always on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierConfig {
    pub user: bool,
    pub learned: bool,
    pub contextual: bool,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            user: true,
            learned: true,
            contextual: true,
        }
    }
}

/// Build layered settings: optional TOML file, then `VANTAGE__` environment variables.
///
/// The result doubles as a [`ConfigSource`] for stored personalization keys.
pub fn load_settings(path: Option<&Path>) -> Result<config::Config> {
    let mut builder = config::Config::builder();

    if let Some(path) = path {
        info!("Loading engine configuration from {}", path.display());
        builder = builder.add_source(config::File::from(path).format(config::FileFormat::Toml));
    }

    let settings = builder
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator(ENV_SEPARATOR)
                .try_parsing(true),
        )
        .build()?;

    Ok(settings)
}

impl EngineConfig {
    /// Load from an optional TOML file with environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let settings = load_settings(path)?;
        Self::from_settings(&settings)
    }

    /// Deserialize and validate from already-built layered settings
    pub fn from_settings(settings: &config::Config) -> Result<Self> {
        let config: EngineConfig = settings.clone().try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.dimensions.is_empty() {
            return Err(invalid("dimensions: at least one dimension is required"));
        }
        for name in &self.dimensions {
            if !BUILTIN_DIMENSIONS.contains(&name.as_str()) {
                return Err(invalid(format!(
                    "dimensions: unknown built-in dimension '{}' (custom dimensions are registered on the engine)",
                    name
                )));
            }
        }

        check_unit("overall_threshold", self.overall_threshold)?;
        check_unit("scoring.error_fallback_score", self.scoring.error_fallback_score)?;
        check_unit("scoring.timeliness_neutral_score", self.scoring.timeliness_neutral_score)?;
        check_unit(
            "scoring.improvement_program_threshold",
            self.scoring.improvement_program_threshold,
        )?;
        check_unit("learning.min_mean_quality", self.learning.min_mean_quality)?;
        check_unit("learning.min_confidence", self.learning.min_confidence)?;
        check_unit("learning.min_similarity", self.learning.min_similarity)?;

        if !(self.scoring.timeliness_window_hours > 0.0) {
            return Err(invalid("scoring.timeliness_window_hours: must be positive"));
        }
        if self.cache.max_entries == 0 {
            return Err(invalid("cache.max_entries: must be at least 1"));
        }
        if self.learning.min_samples == 0 {
            return Err(invalid("learning.min_samples: must be at least 1"));
        }

        self.grades.validate()
    }
}

fn check_unit(name: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(format!("{}: must be within [0.0, 1.0], got {}", name, value)))
    }
}

pub(crate) fn invalid(msg: impl Into<String>) -> VantageError {
    VantageError::InvalidConfig(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;
    use serde_json::json;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.dimensions.len(), 6);
        assert_eq!(config.cache.ttl_seconds, 3600);
        assert_eq!(config.learning.min_samples, 5);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config = EngineConfig::from_toml(
            r#"
overall_threshold = 0.8
mode = "strict"

[cache]
max_entries = 10
"#,
        )
        .unwrap();

        assert_eq!(config.overall_threshold, 0.8);
        assert_eq!(config.mode, PersonalizationMode::Strict);
        assert_eq!(config.cache.max_entries, 10);
        assert_eq!(config.cache.ttl_seconds, 3600);
        assert_eq!(config.grades, GradeScale::default());
    }

    #[test]
    fn test_rejects_out_of_range_threshold() {
        let err = EngineConfig::from_toml("overall_threshold = 1.5").unwrap_err();
        assert!(err.to_string().contains("overall_threshold"));
    }

    #[test]
    fn test_rejects_unknown_dimension() {
        let err = EngineConfig::from_toml(r#"dimensions = ["completeness", "vibes"]"#).unwrap_err();
        assert!(err.to_string().contains("vibes"));
    }

    #[test]
    fn test_rejects_zero_cache_capacity() {
        let mut config = EngineConfig::default();
        config.cache.max_entries = 0;
        assert!(matches!(config.validate(), Err(VantageError::InvalidConfig(_))));
    }

    #[test]
    fn test_resolver_returns_default_for_missing_key() {
        let resolver = ConfigResolver::empty();
        assert_eq!(resolver.get("a.b", json!(3)), json!(3));
        assert_eq!(resolver.get_f64("a.b", 0.25), 0.25);
        assert_eq!(resolver.get_string("a.b", "x"), "x");
        assert!(resolver.get_bool("a.b", true));
    }

    #[test]
    fn test_resolver_parses_string_numbers() {
        let source = StaticConfigSource::new()
            .with("personalization.accuracy.weight", "0.4")
            .with("flag", "true")
            .with("broken", "not-a-number");
        let resolver = ConfigResolver::new(Arc::new(source));

        assert_eq!(resolver.get_opt_f64("personalization.accuracy.weight"), Some(0.4));
        assert!(resolver.get_bool("flag", false));
        assert_eq!(resolver.get_f64("broken", 0.1), 0.1);
    }

    #[test]
    fn test_resolver_consults_source_once_per_lookup() {
        let mut source = MockConfigSource::new();
        source
            .expect_get()
            .with(eq("contextual.finance.accuracy.weight_factor"))
            .times(1)
            .returning(|_| Some(json!(1.07)));

        let resolver = ConfigResolver::new(Arc::new(source));
        assert_eq!(resolver.get_f64("contextual.finance.accuracy.weight_factor", 1.0), 1.07);
    }
}
