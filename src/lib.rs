//! Vantage - Personalized Multi-Dimensional Scoring Engine
//!
//! Scores business data along named dimensions (completeness, accuracy,
//! timeliness, ...) with weights and thresholds personalized to the caller's
//! business context:
//! - Tiered resolution of each dimension's weight and threshold
//!   (user override, learned pattern, contextual adjustment, neutral fallback)
//! - Weight normalization under four personalization modes
//! - Built-in quality and statistical scorers plus caller-supplied scorers
//! - Weighted aggregation into an overall score, grade and recommendations
//! - TTL assessment cache with bounded, oldest-first eviction
//! - Feedback learning from reported outcomes
//!
//! # Architecture
//!
//! - **Types**: Value objects (`PersonalizationContext`, `DimensionSpec`, `ScoreReport`)
//! - **Config**: Key/value lookups and typed engine settings
//! - **Personalization**: Tiered resolver, contextual table, weight normalizer
//! - **Scoring**: Dimension scorers, validators, aggregator
//! - **Evaluation**: Feedback learner and context similarity
//! - **Engine**: Composition object exposing the public operations
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use vantage_core::{PersonalizationContext, ScoringEngine};
//!
//! let engine = ScoringEngine::default();
//! let data = json!([
//!     {"name": "A", "email": "a@x.com", "age": 30},
//!     {"name": "B", "email": "b@x.com", "age": 25}
//! ]);
//!
//! let report = engine.assess(&data, &PersonalizationContext::new());
//! assert_eq!(report.dimension_scores["uniqueness"].score, 1.0);
//! assert!(report.overall_score >= 0.85);
//! ```

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod evaluation;
pub mod personalization;
pub mod scoring;
pub mod stats;
pub mod types;

// Re-export commonly used types
pub use cache::{AssessmentCache, CacheStats};
pub use config::{ConfigResolver, ConfigSource, EngineConfig, StaticConfigSource};
pub use engine::{ResolvedConfiguration, ScoringEngine, ScoringEngineBuilder};
pub use error::{Result, VantageError};
pub use evaluation::{FeedbackLearner, LearnedPattern, Similarity};
pub use personalization::{PersonalizationMode, TieredPersonalizationResolver, WeightNormalizer};
pub use scoring::{DimensionCatalog, DimensionScorer, GradeScale, ScoreAggregator};
pub use types::{
    ConfigurationSummary, CustomScorer, DimensionScore, DimensionSource, DimensionSpec,
    DimensionSummary, Grade, PersonalizationContext, Record, ScoreReport, ScorerRef,
};
