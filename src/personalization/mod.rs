//! Personalization of dimension weights and thresholds.
//!
//! Resolution runs per dimension through four tiers (user, learned,
//! contextual, neutral); the resulting raw weights are then normalized
//! according to the request's [`PersonalizationMode`].

pub mod contextual;
pub mod normalizer;
pub mod resolver;

pub use contextual::ContextualAdjustment;
pub use normalizer::{NormalizedWeights, PersonalizationMode, RawWeight, WeightNormalizer};
pub use resolver::{TierSuggestion, TieredPersonalizationResolver};
