//! Core data types for the Vantage scoring engine
//!
//! This module defines the value objects that flow through an assessment:
//! the caller's personalization context, the resolved per-dimension
//! configuration, and the immutable report produced at the end.

use crate::personalization::PersonalizationMode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A flat key/value data record being assessed
pub type Record = serde_json::Map<String, Value>;

/// Context keys that carry personalization overrides rather than business
/// attributes. They never contribute to a context signature.
const OVERRIDE_KEYS: &[&str] = &[
    "dimension_weights",
    "dimension_thresholds",
    "personalization_mode",
    "allow_invalid_sums",
];
const OVERRIDE_PREFIX: &str = "personalization.";

/// Business attributes supplied by the caller
///
/// Holds well-known attributes (`industry`, `business_size`, `risk_tolerance`,
/// `regulatory_environment`, `data_sensitivity`) alongside arbitrary custom
/// keys. Contexts are never mutated in place; [`PersonalizationContext::merge`]
/// returns a new context with the overlay applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersonalizationContext {
    attributes: BTreeMap<String, Value>,
}

impl PersonalizationContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context from a JSON object. Non-object values yield an empty context.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self {
                attributes: map.into_iter().collect(),
            },
            _ => Self::default(),
        }
    }

    /// Builder-style attribute insertion
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Get a string attribute, trimmed and lowercased
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.attributes
            .get(key)
            .and_then(Value::as_str)
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
    }

    pub fn industry(&self) -> Option<String> {
        self.get_str("industry")
    }

    pub fn business_size(&self) -> Option<String> {
        self.get_str("business_size")
    }

    pub fn risk_tolerance(&self) -> Option<String> {
        self.get_str("risk_tolerance")
    }

    pub fn regulatory_environment(&self) -> Option<String> {
        self.get_str("regulatory_environment")
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.attributes.iter()
    }

    /// Overlay `other` on top of this context.
    ///
    /// Keys in `other` win. When both sides hold a JSON object under the same
    /// key (e.g. `dimension_weights`) the objects are merged one level deep.
    pub fn merge(&self, other: &PersonalizationContext) -> PersonalizationContext {
        let mut attributes = self.attributes.clone();
        for (key, value) in &other.attributes {
            match (attributes.get_mut(key), value) {
                (Some(Value::Object(base)), Value::Object(overlay)) => {
                    for (k, v) in overlay {
                        base.insert(k.clone(), v.clone());
                    }
                }
                _ => {
                    attributes.insert(key.clone(), value.clone());
                }
            }
        }
        PersonalizationContext { attributes }
    }

    /// Attributes describing the business, without personalization overrides
    pub fn business_attributes(&self) -> BTreeMap<String, Value> {
        self.attributes
            .iter()
            .filter(|(k, _)| !k.starts_with(OVERRIDE_PREFIX) && !OVERRIDE_KEYS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Explicit user weight for a dimension, if the request carries one
    pub fn user_weight(&self, dimension: &str) -> Option<f64> {
        self.override_value(dimension, "weight", "dimension_weights")
    }

    /// Explicit user threshold for a dimension, if the request carries one
    pub fn user_threshold(&self, dimension: &str) -> Option<f64> {
        self.override_value(dimension, "threshold", "dimension_thresholds")
    }

    fn override_value(&self, dimension: &str, field: &str, object_key: &str) -> Option<f64> {
        let flat_key = format!("{}{}.{}", OVERRIDE_PREFIX, dimension, field);
        self.attributes
            .get(&flat_key)
            .and_then(Value::as_f64)
            .or_else(|| {
                self.attributes
                    .get(object_key)
                    .and_then(|v| v.get(dimension))
                    .and_then(Value::as_f64)
            })
            .filter(|v| v.is_finite())
    }

    /// Personalization mode requested by the caller, if any
    pub fn mode(&self) -> Option<PersonalizationMode> {
        self.get_str("personalization_mode")
            .and_then(|s| s.parse().ok())
    }

    pub fn allow_invalid_sums(&self) -> Option<bool> {
        self.attributes.get("allow_invalid_sums").and_then(Value::as_bool)
    }
}

/// Tier that supplied a resolved value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DimensionSource {
    User,
    Learned,
    Contextual,
    Neutral,
}

impl std::fmt::Display for DimensionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DimensionSource::User => write!(f, "user"),
            DimensionSource::Learned => write!(f, "learned"),
            DimensionSource::Contextual => write!(f, "contextual"),
            DimensionSource::Neutral => write!(f, "neutral"),
        }
    }
}

/// Caller-supplied scoring function for a custom dimension
pub trait CustomScorer: Send + Sync {
    fn score(&self, records: &[Record], context: &PersonalizationContext) -> anyhow::Result<f64>;
}

impl<F> CustomScorer for F
where
    F: Fn(&[Record], &PersonalizationContext) -> anyhow::Result<f64> + Send + Sync,
{
    fn score(&self, records: &[Record], context: &PersonalizationContext) -> anyhow::Result<f64> {
        self(records, context)
    }
}

/// Shared handle to a custom scorer
#[derive(Clone)]
pub struct ScorerRef(pub Arc<dyn CustomScorer>);

impl ScorerRef {
    pub fn new(scorer: impl CustomScorer + 'static) -> Self {
        Self(Arc::new(scorer))
    }

    /// Wrap a closure, pinning its signature for type inference
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&[Record], &PersonalizationContext) -> anyhow::Result<f64> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }
}

impl std::fmt::Debug for ScorerRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ScorerRef(..)")
    }
}

/// Resolved configuration for one dimension
#[derive(Debug, Clone, Serialize)]
pub struct DimensionSpec {
    pub name: String,
    pub weight: f64,
    pub threshold: f64,
    pub description: String,

    /// Tier that supplied the weight
    pub source: DimensionSource,

    /// Tier that supplied the threshold
    pub threshold_source: DimensionSource,

    /// Confidence in the resolved values [0.0, 1.0]
    pub confidence: f64,

    #[serde(skip)]
    pub scorer: Option<ScorerRef>,
}

impl DimensionSpec {
    /// True when scoring is delegated to a caller-supplied function
    pub fn is_custom(&self) -> bool {
        self.scorer.is_some()
    }
}

/// Letter bucket derived from the overall score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Grade {
    #[serde(rename = "A+")]
    APlus,
    A,
    #[serde(rename = "B+")]
    BPlus,
    B,
    #[serde(rename = "C+")]
    CPlus,
    C,
    D,
    F,
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::BPlus => "B+",
            Grade::B => "B",
            Grade::CPlus => "C+",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        };
        f.write_str(label)
    }
}

/// Per-dimension result inside a report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionScore {
    pub score: f64,
    pub weight: f64,
    pub threshold: f64,
    pub meets_threshold: bool,
    pub confidence: f64,
    pub source: DimensionSource,
}

/// Immutable outcome of one assessment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreReport {
    pub overall_score: f64,
    pub meets_threshold: bool,
    pub dimension_scores: BTreeMap<String, DimensionScore>,
    pub grade: Grade,
    pub recommendations: Vec<String>,

    /// Weight-averaged dimension confidence
    pub confidence: f64,
    pub mode: PersonalizationMode,
    pub warnings: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

/// Introspection view of one resolved dimension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionSummary {
    pub name: String,
    pub weight: f64,
    pub threshold: f64,
    pub source: DimensionSource,
    pub threshold_source: DimensionSource,
    pub description: String,
}

/// Result of `get_configuration_summary`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationSummary {
    pub dimensions: Vec<DimensionSummary>,
    pub overall_threshold: f64,
    pub mode: PersonalizationMode,
    pub cache_size: usize,
}
