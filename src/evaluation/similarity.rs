//! Context similarity for learned-pattern lookup.
//!
//! The learner only needs a `similarity(a, b) -> [0, 1]` collaborator. The
//! default implementation is a Jaccard overlap of `key=value` attribute
//! pairs; richer backends plug in through the [`Similarity`] trait.

use crate::types::PersonalizationContext;
use serde_json::Value;
use std::collections::HashSet;

/// Pluggable context similarity
pub trait Similarity: Send + Sync {
    /// Similarity of two contexts in [0.0, 1.0]
    fn similarity(&self, a: &PersonalizationContext, b: &PersonalizationContext) -> f64;
}

/// Bag-of-attributes overlap (Jaccard similarity over business attributes)
#[derive(Debug, Clone, Copy, Default)]
pub struct AttributeOverlap;

impl AttributeOverlap {
    fn attribute_set(context: &PersonalizationContext) -> HashSet<String> {
        context
            .business_attributes()
            .into_iter()
            .map(|(k, v)| format!("{}={}", k.to_lowercase(), normalize_value(&v)))
            .collect()
    }
}

fn normalize_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_lowercase(),
        other => other.to_string(),
    }
}

impl Similarity for AttributeOverlap {
    fn similarity(&self, a: &PersonalizationContext, b: &PersonalizationContext) -> f64 {
        let set_a = Self::attribute_set(a);
        let set_b = Self::attribute_set(b);

        // Two default contexts describe the same (unspecified) business
        if set_a.is_empty() && set_b.is_empty() {
            return 1.0;
        }

        let intersection = set_a.intersection(&set_b).count();
        let union = set_a.union(&set_b).count();

        if union == 0 {
            0.0
        } else {
            intersection as f64 / union as f64
        }
    }
}
