//! Per-dimension scoring of a record sample.
//!
//! Every built-in scorer is a pure function of the records (timeliness also
//! reads the clock, injected through [`DimensionScorer::score_at`]). Ratio
//! scorers return 0.0 for an empty sample; the statistical scorers return
//! [`INSUFFICIENT_DATA_SCORE`] when the sample has nothing to measure.
//!
//! A custom scorer that returns an error, a non-finite value or panics is
//! replaced by the configured error-fallback score with confidence 0.

use crate::cache::canonical_json;
use crate::config::ScoringConfig;
use crate::error::{Result, VantageError};
use crate::scoring::validators::is_valid_field;
use crate::stats;
use crate::types::{DimensionSpec, PersonalizationContext, Record};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, warn};

/// Score for statistical dimensions when the sample has nothing to measure
pub const INSUFFICIENT_DATA_SCORE: f64 = 0.5;

const FULL_CONFIDENCE: f64 = 1.0;
const FALLBACK_CONFIDENCE: f64 = 0.0;

/// Whole name tokens that mark a timestamp (`order_date`, `last_seen_at`)
const TIMESTAMP_TOKENS: &[&str] = &["timestamp", "ts", "date", "datetime", "time", "at"];

/// Token prefixes that mark a timestamp (`updated`, `createdat`, `modified_on`)
const TIMESTAMP_PREFIXES: &[&str] = &["updated", "created", "modified", "timestamp"];

/// Smallest number read as epoch seconds (2001-09-09)
const MIN_EPOCH_SECONDS: f64 = 1e9;

/// Score and confidence for one dimension
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DimensionOutcome {
    pub score: f64,
    pub confidence: f64,
}

impl DimensionOutcome {
    fn scored(score: f64) -> Self {
        Self {
            score: score.clamp(0.0, 1.0),
            confidence: FULL_CONFIDENCE,
        }
    }
}

/// Computes [0, 1] dimension scores from flat records
#[derive(Debug, Clone)]
pub struct DimensionScorer {
    settings: ScoringConfig,
}

impl DimensionScorer {
    pub fn new(settings: ScoringConfig) -> Self {
        Self { settings }
    }

    pub fn error_fallback_score(&self) -> f64 {
        self.settings.error_fallback_score
    }

    /// Score one dimension. Never fails; errors degrade to the fallback score.
    pub fn score(
        &self,
        dimension: &str,
        records: &[Record],
        spec: &DimensionSpec,
        context: &PersonalizationContext,
    ) -> DimensionOutcome {
        self.score_at(dimension, records, spec, context, Utc::now())
    }

    /// Score one dimension against a fixed clock
    pub fn score_at(
        &self,
        dimension: &str,
        records: &[Record],
        spec: &DimensionSpec,
        context: &PersonalizationContext,
        now: DateTime<Utc>,
    ) -> DimensionOutcome {
        let result = match &spec.scorer {
            Some(scorer) => run_custom(dimension, records, context, scorer),
            None => self.builtin(dimension, records, now),
        };

        match result {
            Ok(score) => DimensionOutcome::scored(score),
            Err(e) => {
                warn!("{}; using fallback score {}", e, self.settings.error_fallback_score);
                DimensionOutcome {
                    score: self.settings.error_fallback_score.clamp(0.0, 1.0),
                    confidence: FALLBACK_CONFIDENCE,
                }
            }
        }
    }

    fn builtin(&self, dimension: &str, records: &[Record], now: DateTime<Utc>) -> Result<f64> {
        let score = match dimension {
            "completeness" => completeness(records),
            "accuracy" => accuracy(records),
            "consistency" => consistency(records),
            "uniqueness" => uniqueness(records),
            "timeliness" => timeliness(
                records,
                now,
                self.settings.timeliness_window_hours,
                self.settings.timeliness_neutral_score,
            ),
            "validity" => validity(records),
            "stability" => stability(records),
            "concentration" => concentration(records),
            "trend" => trend(records),
            "balance" => balance(records),
            _ => {
                return Err(VantageError::Scorer {
                    dimension: dimension.to_string(),
                    reason: "no scorer registered".to_string(),
                })
            }
        };
        debug!("Dimension {} scored {:.3}", dimension, score);
        Ok(score)
    }
}

fn run_custom(
    dimension: &str,
    records: &[Record],
    context: &PersonalizationContext,
    scorer: &crate::types::ScorerRef,
) -> Result<f64> {
    let failure = |reason: String| VantageError::Scorer {
        dimension: dimension.to_string(),
        reason,
    };

    let outcome = catch_unwind(AssertUnwindSafe(|| scorer.0.score(records, context)))
        .map_err(|_| failure("scorer panicked".to_string()))?;
    let value = outcome.map_err(|e| failure(e.to_string()))?;

    if value.is_finite() {
        Ok(value.clamp(0.0, 1.0))
    } else {
        Err(failure(format!("returned non-finite value {}", value)))
    }
}

/// Union of field names across all records
fn field_names(records: &[Record]) -> BTreeSet<&str> {
    records
        .iter()
        .flat_map(|r| r.keys().map(String::as_str))
        .collect()
}

/// Non-null fields over `records x distinct field names`; a field missing
/// from a record counts as null
pub fn completeness(records: &[Record]) -> f64 {
    let fields = field_names(records);
    let total = records.len() * fields.len();
    if total == 0 {
        return 0.0;
    }
    let non_null = records
        .iter()
        .flat_map(|r| r.values())
        .filter(|v| !v.is_null())
        .count();
    non_null as f64 / total as f64
}

fn passes_sanity_check(value: &Value) -> bool {
    match value {
        Value::Number(n) => n.as_f64().map(f64::is_finite).unwrap_or(false),
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Bool(_) => true,
        Value::Null => false,
    }
}

/// Non-null values that pass a type/format sanity check
pub fn accuracy(records: &[Record]) -> f64 {
    let (checked, passed) = records
        .iter()
        .flat_map(|r| r.values())
        .filter(|v| !v.is_null())
        .fold((0usize, 0usize), |(checked, passed), v| {
            (checked + 1, passed + usize::from(passes_sanity_check(v)))
        });
    if checked == 0 {
        return 0.0;
    }
    passed as f64 / checked as f64
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Fields whose non-null values share one type across every record
pub fn consistency(records: &[Record]) -> f64 {
    let mut observed: BTreeMap<&str, HashSet<&'static str>> = BTreeMap::new();
    for record in records {
        for (name, value) in record {
            let types = observed.entry(name.as_str()).or_default();
            if !value.is_null() {
                types.insert(type_name(value));
            }
        }
    }
    if observed.is_empty() {
        return 0.0;
    }
    let consistent = observed.values().filter(|types| types.len() <= 1).count();
    consistent as f64 / observed.len() as f64
}

/// Distinct record signatures over total records
pub fn uniqueness(records: &[Record]) -> f64 {
    if records.is_empty() {
        return 0.0;
    }
    let distinct: HashSet<String> = records
        .iter()
        .map(|r| canonical_json(&Value::Object(r.clone())))
        .collect();
    distinct.len() as f64 / records.len() as f64
}

fn is_timestamp_field(name: &str) -> bool {
    name.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
        .any(|token| {
            TIMESTAMP_TOKENS.contains(&token)
                || TIMESTAMP_PREFIXES.iter().any(|p| token.starts_with(p))
        })
}

/// Parse RFC 3339, common date/datetime layouts, or epoch seconds/millis
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            for layout in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
                if let Ok(naive) = NaiveDateTime::parse_from_str(s, layout) {
                    return Some(Utc.from_utc_datetime(&naive));
                }
            }
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| Utc.from_utc_datetime(&naive))
        }
        Value::Number(n) => {
            let raw = n.as_f64()?;
            // Durations and counts are not instants
            if !raw.is_finite() || raw < MIN_EPOCH_SECONDS {
                return None;
            }
            // Values past year 2286 in seconds are taken as milliseconds
            let millis = if raw > 1e10 { raw } else { raw * 1000.0 };
            Utc.timestamp_millis_opt(millis as i64).single()
        }
        _ => None,
    }
}

/// Linear decay of the most recent recognized timestamp over `window_hours`
pub fn timeliness(
    records: &[Record],
    now: DateTime<Utc>,
    window_hours: f64,
    neutral: f64,
) -> f64 {
    let latest = records
        .iter()
        .flat_map(|r| r.iter())
        .filter(|(name, _)| is_timestamp_field(name))
        .filter_map(|(_, value)| parse_timestamp(value))
        .max();

    let Some(latest) = latest else {
        return neutral;
    };
    if window_hours <= 0.0 {
        return neutral;
    }

    let age_hours = (now - latest).num_seconds() as f64 / 3600.0;
    (1.0 - age_hours.max(0.0) / window_hours).max(0.0)
}

/// Fields that pass their format validator; unknown formats pass
pub fn validity(records: &[Record]) -> f64 {
    let (checked, passed) = records
        .iter()
        .flat_map(|r| r.iter())
        .fold((0usize, 0usize), |(checked, passed), (name, value)| {
            (checked + 1, passed + usize::from(is_valid_field(name, value)))
        });
    if checked == 0 {
        return 0.0;
    }
    passed as f64 / checked as f64
}

/// Numeric series per field, in record order. Booleans are not numeric.
fn numeric_series(records: &[Record]) -> BTreeMap<&str, Vec<f64>> {
    let mut series: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for record in records {
        for (name, value) in record {
            if let Some(v) = value.as_f64().filter(|v| v.is_finite()) {
                series.entry(name.as_str()).or_default().push(v);
            }
        }
    }
    series.retain(|_, values| values.len() >= 2);
    series
}

fn mean_or_insufficient(values: impl Iterator<Item = f64>) -> f64 {
    let values: Vec<f64> = values.collect();
    stats::mean(&values).unwrap_or(INSUFFICIENT_DATA_SCORE)
}

/// `1 / (1 + mean coefficient of variation)` over numeric fields
pub fn stability(records: &[Record]) -> f64 {
    let cvs: Vec<f64> = numeric_series(records)
        .values()
        .filter_map(|v| stats::coefficient_of_variation(v))
        .collect();
    match stats::mean(&cvs) {
        Some(mean_cv) => 1.0 / (1.0 + mean_cv),
        None => INSUFFICIENT_DATA_SCORE,
    }
}

/// `1 - normalized HHI` of value counts over categorical fields
pub fn concentration(records: &[Record]) -> f64 {
    let mut counts: BTreeMap<&str, HashMap<String, f64>> = BTreeMap::new();
    for record in records {
        for (name, value) in record {
            if let Value::String(s) = value {
                *counts
                    .entry(name.as_str())
                    .or_default()
                    .entry(s.trim().to_lowercase())
                    .or_insert(0.0) += 1.0;
            }
        }
    }

    mean_or_insufficient(
        counts
            .values()
            .filter(|c| c.values().sum::<f64>() >= 2.0)
            .filter_map(|c| {
                let values: Vec<f64> = c.values().copied().collect();
                stats::normalized_herfindahl(&values)
            })
            .map(|hhi| 1.0 - hhi),
    )
}

/// `(r + 1) / 2` where r is the mean correlation of numeric fields with record order
pub fn trend(records: &[Record]) -> f64 {
    let correlations: Vec<f64> = numeric_series(records)
        .values()
        .filter_map(|values| {
            let order: Vec<f64> = (0..values.len()).map(|i| i as f64).collect();
            stats::pearson_correlation(&order, values)
        })
        .collect();
    match stats::mean(&correlations) {
        Some(r) => (r + 1.0) / 2.0,
        None => INSUFFICIENT_DATA_SCORE,
    }
}

/// `1 - Gini` over non-negative numeric fields
pub fn balance(records: &[Record]) -> f64 {
    mean_or_insufficient(
        numeric_series(records)
            .values()
            .filter_map(|values| stats::gini_coefficient(values))
            .map(|gini| 1.0 - gini),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DimensionSource, ScorerRef};
    use chrono::Duration;
    use serde_json::json;

    fn records(value: Value) -> Vec<Record> {
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_object().unwrap().clone())
            .collect()
    }

    fn spec(name: &str) -> DimensionSpec {
        DimensionSpec {
            name: name.to_string(),
            weight: 0.5,
            threshold: 0.5,
            description: String::new(),
            source: DimensionSource::Neutral,
            threshold_source: DimensionSource::Neutral,
            confidence: 0.5,
            scorer: None,
        }
    }

    fn healthy() -> Vec<Record> {
        records(json!([
            {"name": "A", "email": "a@x.com", "age": 30},
            {"name": "B", "email": "b@x.com", "age": 25}
        ]))
    }

    #[test]
    fn test_healthy_records_score_full() {
        let data = healthy();
        assert_eq!(completeness(&data), 1.0);
        assert_eq!(accuracy(&data), 1.0);
        assert_eq!(consistency(&data), 1.0);
        assert_eq!(uniqueness(&data), 1.0);
        assert_eq!(validity(&data), 1.0);
    }

    #[test]
    fn test_empty_sample() {
        assert_eq!(completeness(&[]), 0.0);
        assert_eq!(uniqueness(&[]), 0.0);
        assert_eq!(stability(&[]), INSUFFICIENT_DATA_SCORE);
        assert_eq!(timeliness(&[], Utc::now(), 720.0, 0.5), 0.5);
    }

    #[test]
    fn test_completeness_counts_missing_fields() {
        let data = records(json!([
            {"name": "A", "email": null},
            {"name": "B"}
        ]));
        // 2 non-null of 2 records x 2 fields
        assert_eq!(completeness(&data), 0.5);
    }

    #[test]
    fn test_duplicates_halve_uniqueness() {
        let data = records(json!([
            {"name": "A", "age": 1},
            {"age": 1, "name": "A"}
        ]));
        assert_eq!(uniqueness(&data), 0.5);
    }

    #[test]
    fn test_accuracy_and_consistency() {
        let data = records(json!([
            {"name": "", "age": 30, "tags": []},
            {"name": "B", "age": "thirty", "tags": ["x"]}
        ]));
        // "" and [] fail the sanity check
        assert!((accuracy(&data) - 4.0 / 6.0).abs() < 1e-9);
        // age mixes number and string
        assert!((consistency(&data) - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_validity_uses_field_heuristics() {
        let data = records(json!([
            {"email": "bad", "phone": "+1 555 123 4567", "note": "anything"}
        ]));
        assert!((validity(&data) - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_timeliness_decays_with_age() {
        let now = Utc::now();
        let fresh = records(json!([{ "updated_at": now.to_rfc3339() }]));
        assert!((timeliness(&fresh, now, 720.0, 0.5) - 1.0).abs() < 1e-6);

        let half = records(json!([{ "updated_at": (now - Duration::hours(360)).to_rfc3339() }]));
        assert!((timeliness(&half, now, 720.0, 0.5) - 0.5).abs() < 1e-6);

        let stale = records(json!([{ "created": "2001-01-01" }]));
        assert_eq!(timeliness(&stale, now, 720.0, 0.5), 0.0);

        let future = records(json!([{ "timestamp": (now + Duration::hours(5)).timestamp() }]));
        assert_eq!(timeliness(&future, now, 720.0, 0.5), 1.0);
    }

    #[test]
    fn test_timestamp_fields_match_whole_tokens() {
        for name in ["updated_at", "createdAt", "order_date", "event-time", "ts", "modified"] {
            assert!(is_timestamp_field(name), "{}", name);
        }
        for name in ["runtime", "lifetime_value", "candidate", "format", "status"] {
            assert!(!is_timestamp_field(name), "{}", name);
        }
    }

    #[test]
    fn test_small_numbers_are_not_epoch_times() {
        assert_eq!(parse_timestamp(&json!(120)), None);
        assert_eq!(parse_timestamp(&json!(5000.0)), None);
        assert!(parse_timestamp(&json!(1_700_000_000)).is_some());
        assert!(parse_timestamp(&json!(1_700_000_000_000i64)).is_some());

        let now = Utc::now();
        let durations = records(json!([{ "response_time": 120, "lifetime_value": 5000 }]));
        assert_eq!(timeliness(&durations, now, 720.0, 0.5), 0.5);
    }

    #[test]
    fn test_timeliness_uses_most_recent_timestamp() {
        let now = Utc::now();
        let data = records(json!([
            { "updated_at": "2001-01-01T00:00:00Z" },
            { "updated_at": (now - Duration::hours(72)).to_rfc3339() }
        ]));
        assert!((timeliness(&data, now, 720.0, 0.5) - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_statistical_dimensions() {
        let rising = records(json!([
            {"revenue": 10, "region": "north"},
            {"revenue": 20, "region": "north"},
            {"revenue": 30, "region": "north"}
        ]));
        assert!((trend(&rising) - 1.0).abs() < 1e-9);
        assert!((concentration(&rising) - 0.0).abs() < 1e-9);
        assert!(stability(&rising) < 1.0);
        assert!(balance(&rising) < 1.0);

        let flat = records(json!([{"revenue": 5, "region": "a"}, {"revenue": 5, "region": "b"}]));
        assert_eq!(stability(&flat), 1.0);
        assert_eq!(balance(&flat), 1.0);
        assert_eq!(concentration(&flat), 1.0);
        // Constant series has no defined correlation
        assert_eq!(trend(&flat), INSUFFICIENT_DATA_SCORE);
    }

    #[test]
    fn test_unknown_builtin_falls_back() {
        let scorer = DimensionScorer::new(ScoringConfig::default());
        let outcome = scorer.score("mystery", &healthy(), &spec("mystery"), &PersonalizationContext::new());
        assert_eq!(outcome.score, 0.5);
        assert_eq!(outcome.confidence, 0.0);
    }

    #[test]
    fn test_custom_scorer_failures_are_isolated() {
        let scorer = DimensionScorer::new(ScoringConfig {
            error_fallback_score: 0.3,
            ..ScoringConfig::default()
        });
        let ctx = PersonalizationContext::new();

        let mut failing = spec("custom");
        failing.scorer = Some(ScorerRef::from_fn(|_, _| Err(anyhow::anyhow!("upstream down"))));
        let outcome = scorer.score("custom", &healthy(), &failing, &ctx);
        assert_eq!(outcome, DimensionOutcome { score: 0.3, confidence: 0.0 });

        let mut nan = spec("custom");
        nan.scorer = Some(ScorerRef::from_fn(|_, _| Ok(f64::NAN)));
        assert_eq!(scorer.score("custom", &healthy(), &nan, &ctx).confidence, 0.0);

        let mut panicking = spec("custom");
        panicking.scorer = Some(ScorerRef::from_fn(|_, _| panic!("scorer bug")));
        assert_eq!(scorer.score("custom", &healthy(), &panicking, &ctx).score, 0.3);
    }

    #[test]
    fn test_custom_scorer_output_is_clamped() {
        let scorer = DimensionScorer::new(ScoringConfig::default());
        let mut big = spec("custom");
        big.scorer = Some(ScorerRef::from_fn(|records, _| Ok(records.len() as f64 * 10.0)));
        let outcome = scorer.score("custom", &healthy(), &big, &PersonalizationContext::new());
        assert_eq!(outcome, DimensionOutcome { score: 1.0, confidence: 1.0 });
    }
}
