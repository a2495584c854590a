//! Property tests for weight, threshold and score invariants

use proptest::prelude::*;
use serde_json::{json, Map, Value};
use vantage_core::scoring::dimension_scorer::completeness;
use vantage_core::scoring::BUILTIN_DIMENSIONS;
use vantage_core::{EngineConfig, PersonalizationContext, Record, ScoringEngine};

const DIMENSIONS: &[&str] = &[
    "completeness",
    "accuracy",
    "consistency",
    "uniqueness",
    "timeliness",
    "validity",
];

fn mode_strategy() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("proportional"), Just("strict"), Just("additive")]
}

fn industry_strategy() -> impl Strategy<Value = Option<&'static str>> {
    prop_oneof![
        Just(None),
        Just(Some("finance")),
        Just(Some("healthcare")),
        Just(Some("retail")),
        Just(Some("zzz_unknown")),
    ]
}

fn context_strategy() -> impl Strategy<Value = PersonalizationContext> {
    (
        proptest::collection::btree_map(proptest::sample::select(DIMENSIONS), 0.0..2.0f64, 0..4),
        proptest::collection::btree_map(proptest::sample::select(DIMENSIONS), -2.0..3.0f64, 0..4),
        mode_strategy(),
        industry_strategy(),
    )
        .prop_map(|(weights, thresholds, mode, industry)| {
            let mut ctx = PersonalizationContext::new()
                .with("dimension_weights", json!(weights))
                .with("dimension_thresholds", json!(thresholds))
                .with("personalization_mode", mode);
            if let Some(industry) = industry {
                ctx = ctx.with("industry", industry);
            }
            ctx
        })
}

fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        (-1.0e6..1.0e6f64).prop_map(Value::from),
        "[a-z@. ]{0,12}".prop_map(Value::from),
    ]
}

fn records_strategy() -> impl Strategy<Value = Vec<Record>> {
    proptest::collection::vec(
        proptest::collection::btree_map("(email|phone|name|amount|updated_at|tag)", scalar_strategy(), 0..6)
            .prop_map(|fields| fields.into_iter().collect::<Record>()),
        0..8,
    )
}

proptest! {
    #[test]
    fn prop_resolved_weights_sum_to_one(ctx in context_strategy()) {
        let engine = ScoringEngine::default();
        let resolved = engine.resolve_configuration(&ctx);
        prop_assert!((resolved.weight_sum() - 1.0).abs() <= 0.01, "sum {}", resolved.weight_sum());
    }

    #[test]
    fn prop_thresholds_stay_in_unit_interval(ctx in context_strategy()) {
        let engine = ScoringEngine::default();
        for spec in engine.resolve_configuration(&ctx).specs {
            prop_assert!((0.0..=1.0).contains(&spec.threshold));
            prop_assert!(spec.weight >= 0.0);
        }
    }

    #[test]
    fn prop_scores_stay_in_unit_interval(records in records_strategy()) {
        let mut config = EngineConfig::default();
        config.dimensions = BUILTIN_DIMENSIONS.iter().map(|d| d.to_string()).collect();
        let engine = ScoringEngine::new(config).unwrap();

        let data = Value::Array(records.into_iter().map(Value::Object).collect());
        let report = engine.assess(&data, &PersonalizationContext::new());

        prop_assert!((0.0..=1.0).contains(&report.overall_score));
        for (name, d) in &report.dimension_scores {
            prop_assert!((0.0..=1.0).contains(&d.score), "{} scored {}", name, d.score);
        }
    }

    #[test]
    fn prop_completeness_never_increases_when_nulling_a_field(
        rows in 1usize..6,
        cols in 1usize..5,
        mask in proptest::collection::vec(any::<bool>(), 30),
        pick in any::<proptest::sample::Index>(),
    ) {
        let build = |mask: &[bool]| -> Vec<Record> {
            (0..rows)
                .map(|r| {
                    let mut record = Map::new();
                    for c in 0..cols {
                        let value = if mask[r * cols + c] { json!(1) } else { Value::Null };
                        record.insert(format!("f{}", c), value);
                    }
                    record
                })
                .collect()
        };

        let cells = rows * cols;
        let present: Vec<usize> = (0..cells).filter(|i| mask[*i]).collect();
        prop_assume!(!present.is_empty());

        let before = completeness(&build(&mask));
        let mut degraded = mask.clone();
        degraded[present[pick.index(present.len())]] = false;
        let after = completeness(&build(&degraded));

        prop_assert!(after < before);
    }
}
