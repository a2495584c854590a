//! Weighted aggregation of dimension scores into a [`ScoreReport`]

use crate::config::{invalid, EngineConfig};
use crate::error::Result;
use crate::personalization::PersonalizationMode;
use crate::scoring::dimension_scorer::DimensionOutcome;
use crate::types::{DimensionScore, DimensionSpec, Grade, ScoreReport};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Lower bounds of each letter grade; anything below `d` is F
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradeScale {
    pub a_plus: f64,
    pub a: f64,
    pub b_plus: f64,
    pub b: f64,
    pub c_plus: f64,
    pub c: f64,
    pub d: f64,
}

impl Default for GradeScale {
    fn default() -> Self {
        Self {
            a_plus: 0.95,
            a: 0.90,
            b_plus: 0.85,
            b: 0.80,
            c_plus: 0.75,
            c: 0.70,
            d: 0.60,
        }
    }
}

impl GradeScale {
    fn bounds(&self) -> [(Grade, f64); 7] {
        [
            (Grade::APlus, self.a_plus),
            (Grade::A, self.a),
            (Grade::BPlus, self.b_plus),
            (Grade::B, self.b),
            (Grade::CPlus, self.c_plus),
            (Grade::C, self.c),
            (Grade::D, self.d),
        ]
    }

    pub fn grade(&self, score: f64) -> Grade {
        self.bounds()
            .iter()
            .find(|(_, bound)| score >= *bound)
            .map(|(grade, _)| *grade)
            .unwrap_or(Grade::F)
    }

    /// Bounds must lie in [0, 1] and strictly decrease from A+ to D
    pub fn validate(&self) -> Result<()> {
        let bounds = self.bounds();
        for (grade, bound) in &bounds {
            if !(0.0..=1.0).contains(bound) {
                return Err(invalid(format!(
                    "grades: bound for {} must be within [0.0, 1.0], got {}",
                    grade, bound
                )));
            }
        }
        for pair in bounds.windows(2) {
            if pair[0].1 <= pair[1].1 {
                return Err(invalid(format!(
                    "grades: {} bound ({}) must exceed {} bound ({})",
                    pair[0].0, pair[0].1, pair[1].0, pair[1].1
                )));
            }
        }
        Ok(())
    }
}

fn remediation(dimension: &str, score: f64, threshold: f64) -> String {
    let gap = format!("{:.0}% vs target {:.0}%", score * 100.0, threshold * 100.0);
    match dimension {
        "completeness" => format!(
            "Improve completeness ({}): fill missing fields or make required fields mandatory at capture",
            gap
        ),
        "accuracy" => format!(
            "Improve accuracy ({}): correct empty strings, empty collections and malformed values at the source",
            gap
        ),
        "consistency" => format!(
            "Improve consistency ({}): enforce a single type per field across records",
            gap
        ),
        "uniqueness" => format!(
            "Improve uniqueness ({}): deduplicate records and add unique keys at ingestion",
            gap
        ),
        "timeliness" => format!(
            "Improve timeliness ({}): refresh stale data or shorten the update cycle",
            gap
        ),
        "validity" => format!(
            "Improve validity ({}): validate email, phone and URL formats on entry",
            gap
        ),
        "stability" => format!(
            "Improve stability ({}): investigate high variance in numeric fields",
            gap
        ),
        "concentration" => format!(
            "Reduce concentration ({}): diversify away from dominant categories",
            gap
        ),
        "trend" => format!(
            "Address trend ({}): numeric fields are declining across the series",
            gap
        ),
        "balance" => format!(
            "Improve balance ({}): values are unevenly distributed across records",
            gap
        ),
        other => format!("Improve {} ({}): review the inputs feeding this dimension", other, gap),
    }
}

/// Combines dimension scores and weights into an overall score and grade
#[derive(Debug, Clone)]
pub struct ScoreAggregator {
    grades: GradeScale,
    overall_threshold: f64,
    error_fallback_score: f64,
    improvement_program_threshold: f64,
}

impl ScoreAggregator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            grades: config.grades.clone(),
            overall_threshold: config.overall_threshold,
            error_fallback_score: config.scoring.error_fallback_score,
            improvement_program_threshold: config.scoring.improvement_program_threshold,
        }
    }

    pub fn grades(&self) -> &GradeScale {
        &self.grades
    }

    /// Aggregate with the default mode and no normalization warnings
    pub fn aggregate(
        &self,
        scores: &BTreeMap<String, DimensionOutcome>,
        specs: &[DimensionSpec],
    ) -> ScoreReport {
        self.aggregate_with(scores, specs, PersonalizationMode::default(), Vec::new())
    }

    /// Build a complete report. A spec with no score gets the error-fallback
    /// score at zero confidence; this never fails.
    pub fn aggregate_with(
        &self,
        scores: &BTreeMap<String, DimensionOutcome>,
        specs: &[DimensionSpec],
        mode: PersonalizationMode,
        mut warnings: Vec<String>,
    ) -> ScoreReport {
        let mut dimension_scores = BTreeMap::new();
        let mut overall = 0.0;
        let mut confidence_sum = 0.0;
        let mut weight_sum = 0.0;

        for spec in specs {
            let outcome = scores.get(&spec.name).copied().unwrap_or_else(|| {
                let msg = format!(
                    "dimension {} has no score; using fallback {}",
                    spec.name, self.error_fallback_score
                );
                warn!("{}", msg);
                warnings.push(msg);
                DimensionOutcome {
                    score: self.error_fallback_score,
                    confidence: 0.0,
                }
            });

            let score = outcome.score.clamp(0.0, 1.0);
            overall += score * spec.weight;
            confidence_sum += outcome.confidence * spec.weight;
            weight_sum += spec.weight;

            dimension_scores.insert(
                spec.name.clone(),
                DimensionScore {
                    score,
                    weight: spec.weight,
                    threshold: spec.threshold,
                    meets_threshold: score >= spec.threshold,
                    confidence: outcome.confidence,
                    source: spec.source,
                },
            );
        }

        let overall_score = overall.clamp(0.0, 1.0);
        let confidence = if weight_sum > 0.0 {
            (confidence_sum / weight_sum).clamp(0.0, 1.0)
        } else if dimension_scores.is_empty() {
            0.0
        } else {
            dimension_scores.values().map(|d| d.confidence).sum::<f64>()
                / dimension_scores.len() as f64
        };

        let grade = self.grades.grade(overall_score);
        let recommendations = self.recommendations(&dimension_scores, overall_score);

        debug!(
            "Aggregated {} dimensions: overall {:.3} ({}), {} recommendations",
            dimension_scores.len(),
            overall_score,
            grade,
            recommendations.len()
        );

        ScoreReport {
            overall_score,
            meets_threshold: overall_score >= self.overall_threshold,
            dimension_scores,
            grade,
            recommendations,
            confidence,
            mode,
            warnings,
            generated_at: Utc::now(),
        }
    }

    /// Below-threshold dimensions, largest weighted gap first
    fn recommendations(
        &self,
        dimension_scores: &BTreeMap<String, DimensionScore>,
        overall_score: f64,
    ) -> Vec<String> {
        let mut failing: Vec<(&String, &DimensionScore)> = dimension_scores
            .iter()
            .filter(|(_, d)| !d.meets_threshold)
            .collect();
        failing.sort_by(|(name_a, a), (name_b, b)| {
            let gap_a = a.weight * (a.threshold - a.score);
            let gap_b = b.weight * (b.threshold - b.score);
            gap_b
                .partial_cmp(&gap_a)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| name_a.cmp(name_b))
        });

        let mut recommendations: Vec<String> = failing
            .into_iter()
            .map(|(name, d)| remediation(name, d.score, d.threshold))
            .collect();

        if overall_score < self.improvement_program_threshold {
            recommendations.push(format!(
                "Overall score {:.0}% is below {:.0}%: establish a comprehensive improvement program covering data capture, validation and review",
                overall_score * 100.0,
                self.improvement_program_threshold * 100.0
            ));
        }
        recommendations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DimensionSource;

    fn spec(name: &str, weight: f64, threshold: f64) -> DimensionSpec {
        DimensionSpec {
            name: name.to_string(),
            weight,
            threshold,
            description: String::new(),
            source: DimensionSource::Neutral,
            threshold_source: DimensionSource::Neutral,
            confidence: 0.5,
            scorer: None,
        }
    }

    fn outcomes(pairs: &[(&str, f64)]) -> BTreeMap<String, DimensionOutcome> {
        pairs
            .iter()
            .map(|(k, s)| {
                (
                    k.to_string(),
                    DimensionOutcome {
                        score: *s,
                        confidence: 1.0,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_grade_boundaries() {
        let scale = GradeScale::default();
        assert_eq!(scale.grade(1.0), Grade::APlus);
        assert_eq!(scale.grade(0.95), Grade::APlus);
        assert_eq!(scale.grade(0.9499), Grade::A);
        assert_eq!(scale.grade(0.85), Grade::BPlus);
        assert_eq!(scale.grade(0.70), Grade::C);
        assert_eq!(scale.grade(0.60), Grade::D);
        assert_eq!(scale.grade(0.59), Grade::F);
    }

    #[test]
    fn test_non_monotonic_scale_rejected() {
        let scale = GradeScale {
            b: 0.90,
            ..GradeScale::default()
        };
        assert!(scale.validate().is_err());
        assert!(GradeScale::default().validate().is_ok());
    }

    #[test]
    fn test_weighted_overall_score() {
        let aggregator = ScoreAggregator::new(&EngineConfig::default());
        let specs = vec![spec("accuracy", 0.75, 0.5), spec("completeness", 0.25, 0.5)];
        let report = aggregator.aggregate(&outcomes(&[("accuracy", 1.0), ("completeness", 0.6)]), &specs);

        assert!((report.overall_score - 0.9).abs() < 1e-9);
        assert_eq!(report.grade, Grade::A);
        assert!(report.meets_threshold);
        assert!(report.recommendations.is_empty());
        assert_eq!(report.confidence, 1.0);
    }

    #[test]
    fn test_missing_score_uses_fallback() {
        let aggregator = ScoreAggregator::new(&EngineConfig::default());
        let specs = vec![spec("accuracy", 0.5, 0.5), spec("validity", 0.5, 0.5)];
        let report = aggregator.aggregate(&outcomes(&[("accuracy", 1.0)]), &specs);

        let validity = &report.dimension_scores["validity"];
        assert_eq!(validity.score, 0.5);
        assert_eq!(validity.confidence, 0.0);
        assert!((report.confidence - 0.5).abs() < 1e-9);
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn test_recommendations_prioritized_by_weighted_gap() {
        let aggregator = ScoreAggregator::new(&EngineConfig::default());
        let specs = vec![
            spec("accuracy", 0.2, 0.9),
            spec("uniqueness", 0.6, 0.8),
            spec("validity", 0.2, 0.5),
        ];
        let report = aggregator.aggregate(
            &outcomes(&[("accuracy", 0.4), ("uniqueness", 0.5), ("validity", 0.9)]),
            &specs,
        );

        // uniqueness gap 0.6*0.3=0.18 > accuracy gap 0.2*0.5=0.10
        assert!(report.recommendations[0].contains("uniqueness"));
        assert!(report.recommendations[1].contains("accuracy"));
        assert!(report.recommendations[2].contains("comprehensive improvement program"));
        assert_eq!(report.recommendations.len(), 3);
        assert!(!report.meets_threshold);
    }
}
