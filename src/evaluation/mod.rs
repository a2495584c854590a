//! Feedback learning for personalization.
//!
//! Callers report how well a resolved configuration worked for a context
//! (`record_outcome` on the engine). The learner groups those samples by
//! context signature and, once a group has enough high-quality samples,
//! offers its averaged weights and thresholds to tier-2 resolution.
//!
//! # Architecture
//!
//! - **FeedbackLearner**: Accumulates samples and maintains [`LearnedPattern`]s
//! - **Similarity**: Ranks stored patterns against an incoming context
//!
//! # Acceptance
//!
//! A pattern must first be *eligible* (enough samples, high enough mean
//! quality) before [`FeedbackLearner::find_similar`] returns it. The resolver
//! then applies its own bar on confidence and similarity before using it.
//!
//! # Usage
//!
//! ```rust
//! use std::collections::BTreeMap;
//! use vantage_core::config::LearningConfig;
//! use vantage_core::evaluation::FeedbackLearner;
//! use vantage_core::PersonalizationContext;
//!
//! let learner = FeedbackLearner::new(LearningConfig::default());
//! let context = PersonalizationContext::new().with("industry", "finance");
//!
//! let mut weights = BTreeMap::new();
//! weights.insert("accuracy".to_string(), 0.6);
//! weights.insert("validity".to_string(), 0.4);
//!
//! for _ in 0..5 {
//!     learner.record(&context, &weights, &BTreeMap::new(), 0.9);
//! }
//! assert_eq!(learner.find_similar(&context).len(), 1);
//! ```

pub mod feedback_learner;
pub mod similarity;

pub use feedback_learner::{FeedbackLearner, LearnedPattern};
pub use similarity::{AttributeOverlap, Similarity};
