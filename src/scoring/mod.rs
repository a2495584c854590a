//! Dimension scoring and aggregation.
//!
//! - [`DimensionCatalog`]: the active dimensions, built-in and custom
//! - [`DimensionScorer`]: per-dimension [0, 1] scores from a record sample
//! - [`ScoreAggregator`]: weighted overall score, grade and recommendations

pub mod aggregator;
pub mod dimension_scorer;
pub mod validators;

pub use aggregator::{GradeScale, ScoreAggregator};
pub use dimension_scorer::{DimensionOutcome, DimensionScorer};

use crate::config::EngineConfig;
use crate::types::ScorerRef;
use tracing::info;

/// Every dimension with a built-in scorer
pub const BUILTIN_DIMENSIONS: &[&str] = &[
    "completeness",
    "accuracy",
    "consistency",
    "uniqueness",
    "timeliness",
    "validity",
    "stability",
    "concentration",
    "trend",
    "balance",
];

/// Dimensions active when configuration does not name any
pub const DEFAULT_DIMENSIONS: &[&str] = &[
    "completeness",
    "accuracy",
    "consistency",
    "uniqueness",
    "timeliness",
    "validity",
];

fn builtin_description(name: &str) -> &'static str {
    match name {
        "completeness" => "Share of non-null fields across all records",
        "accuracy" => "Share of non-null values passing type and format sanity checks",
        "consistency" => "Share of fields holding a single value type across records",
        "uniqueness" => "Share of distinct records",
        "timeliness" => "Recency of the newest timestamp within the freshness window",
        "validity" => "Share of fields matching email, phone and URL formats",
        "stability" => "Inverse of the mean coefficient of variation of numeric fields",
        "concentration" => "Inverse of category concentration (HHI) in text fields",
        "trend" => "Direction of numeric fields across record order",
        "balance" => "Inverse of the Gini coefficient of numeric fields",
        _ => "Built-in dimension",
    }
}

/// One catalog entry
#[derive(Debug, Clone)]
pub struct DimensionDef {
    pub name: String,
    pub description: String,

    /// Present for custom dimensions
    pub scorer: Option<ScorerRef>,
}

impl DimensionDef {
    pub fn is_custom(&self) -> bool {
        self.scorer.is_some()
    }
}

/// Ordered set of active dimensions
#[derive(Debug, Clone, Default)]
pub struct DimensionCatalog {
    dimensions: Vec<DimensionDef>,
}

impl DimensionCatalog {
    /// Built-in dimensions named in configuration
    pub fn from_config(config: &EngineConfig) -> Self {
        let dimensions = config
            .dimensions
            .iter()
            .map(|name| DimensionDef {
                name: name.clone(),
                description: builtin_description(name).to_string(),
                scorer: None,
            })
            .collect();
        Self { dimensions }
    }

    /// Add a custom dimension. A dimension with the same name is replaced in place.
    pub fn with_custom(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        scorer: ScorerRef,
    ) -> Self {
        let def = DimensionDef {
            name: name.into(),
            description: description.into(),
            scorer: Some(scorer),
        };
        match self.dimensions.iter_mut().find(|d| d.name == def.name) {
            Some(existing) => {
                info!("Custom scorer replaces dimension '{}'", def.name);
                *existing = def;
            }
            None => self.dimensions.push(def),
        }
        self
    }

    pub fn names(&self) -> Vec<String> {
        self.dimensions.iter().map(|d| d.name.clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&DimensionDef> {
        self.dimensions.iter().find(|d| d.name == name)
    }

    pub fn is_custom(&self, name: &str) -> bool {
        self.get(name).map(DimensionDef::is_custom).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.dimensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dimensions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DimensionDef> {
        self.dimensions.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog() {
        let catalog = DimensionCatalog::from_config(&EngineConfig::default());
        assert_eq!(catalog.len(), DEFAULT_DIMENSIONS.len());
        assert_eq!(catalog.names()[0], "completeness");
        assert!(!catalog.is_custom("accuracy"));
    }

    #[test]
    fn test_custom_dimension_appends_or_replaces() {
        let catalog = DimensionCatalog::from_config(&EngineConfig::default())
            .with_custom("delight", "Customer delight", ScorerRef::from_fn(|_, _| Ok(0.8)))
            .with_custom("accuracy", "Domain accuracy", ScorerRef::from_fn(|_, _| Ok(0.1)));

        assert_eq!(catalog.len(), 7);
        assert!(catalog.is_custom("delight"));
        assert!(catalog.is_custom("accuracy"));
        assert_eq!(catalog.names()[1], "accuracy");
        assert_eq!(catalog.get("accuracy").unwrap().description, "Domain accuracy");
    }
}
