//! Performance benchmarks for assessments
//!
//! Targets:
//! - Cached assessment: <50us (hash + lookup)
//! - Uncached assessment of 100 records: <5ms
//! - Dimension resolution: <100us per context

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::{json, Value};
use vantage_core::scoring::BUILTIN_DIMENSIONS;
use vantage_core::{EngineConfig, PersonalizationContext, ScoringEngine};

/// Generate `count` synthetic customer records
fn create_records(count: usize) -> Value {
    Value::Array(
        (0..count)
            .map(|i| {
                json!({
                    "id": i,
                    "name": format!("Customer {}", i),
                    "email": format!("customer{}@example.com", i),
                    "phone": "+1 555 010 0000",
                    "revenue": 1000.0 + (i % 17) as f64 * 12.5,
                    "region": ["north", "south", "east", "west"][i % 4],
                    "updated_at": "2024-06-01T12:00:00Z"
                })
            })
            .collect(),
    )
}

fn all_dimensions_engine() -> ScoringEngine {
    let mut config = EngineConfig::default();
    config.dimensions = BUILTIN_DIMENSIONS.iter().map(|d| d.to_string()).collect();
    // Zero TTL disables reuse so every iteration scores
    config.cache.ttl_seconds = 0;
    ScoringEngine::new(config).unwrap()
}

/// Benchmark 1: Cached vs uncached assessment
fn bench_assessment(c: &mut Criterion) {
    let mut group = c.benchmark_group("assessment");
    let ctx = PersonalizationContext::new().with("industry", "retail");

    for size in [10usize, 100, 1000] {
        let data = create_records(size);
        group.throughput(Throughput::Elements(size as u64));

        let uncached = all_dimensions_engine();
        group.bench_with_input(BenchmarkId::new("uncached", size), &data, |b, data| {
            b.iter(|| uncached.assess(black_box(data), black_box(&ctx)));
        });

        let cached = ScoringEngine::default();
        cached.assess(&data, &ctx);
        group.bench_with_input(BenchmarkId::new("cached", size), &data, |b, data| {
            b.iter(|| cached.assess(black_box(data), black_box(&ctx)));
        });
    }

    group.finish();
}

/// Benchmark 2: Tiered resolution and normalization
fn bench_resolution(c: &mut Criterion) {
    let engine = ScoringEngine::default();
    let contexts = [
        ("neutral", PersonalizationContext::new()),
        (
            "contextual",
            PersonalizationContext::new()
                .with("industry", "finance")
                .with("risk_tolerance", "low")
                .with("regulatory_environment", "sox"),
        ),
        (
            "strict_override",
            PersonalizationContext::from_value(json!({
                "dimension_weights": {"accuracy": 0.6},
                "personalization_mode": "strict"
            })),
        ),
    ];

    let mut group = c.benchmark_group("resolution");
    for (name, ctx) in &contexts {
        group.bench_function(*name, |b| {
            b.iter(|| engine.resolve_configuration(black_box(ctx)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_assessment, bench_resolution);
criterion_main!(benches);
