//! Weight normalization across personalization modes.
//!
//! Every mode except `override` (with invalid sums explicitly allowed) ends
//! with weights summing to 1.0 within [`SUM_TOLERANCE`]. A mode that cannot
//! meet that post-condition is recovered by re-running `proportional`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::{debug, warn};

/// Allowed deviation of the weight sum from 1.0
pub const SUM_TOLERANCE: f64 = 0.01;

/// How raw dimension weights are turned into final weights
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersonalizationMode {
    /// Divide every weight by the total
    #[default]
    Proportional,

    /// Keep user weights verbatim, share the remainder among the rest
    Strict,

    /// Scale existing weights down to make room for custom dimensions
    Additive,

    /// Use weights as given
    Override,
}

impl std::fmt::Display for PersonalizationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersonalizationMode::Proportional => write!(f, "proportional"),
            PersonalizationMode::Strict => write!(f, "strict"),
            PersonalizationMode::Additive => write!(f, "additive"),
            PersonalizationMode::Override => write!(f, "override"),
        }
    }
}

impl FromStr for PersonalizationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "proportional" => Ok(PersonalizationMode::Proportional),
            "strict" => Ok(PersonalizationMode::Strict),
            "additive" => Ok(PersonalizationMode::Additive),
            "override" => Ok(PersonalizationMode::Override),
            other => Err(format!("unknown personalization mode '{}'", other)),
        }
    }
}

/// A weight before normalization, tagged with where it came from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawWeight {
    pub value: f64,

    /// Supplied explicitly by the user (strict mode keeps it verbatim)
    pub user_supplied: bool,

    /// Belongs to a custom dimension (additive mode makes room for it)
    pub custom: bool,
}

impl RawWeight {
    pub fn new(value: f64) -> Self {
        Self {
            value,
            user_supplied: false,
            custom: false,
        }
    }

    pub fn user(value: f64) -> Self {
        Self {
            user_supplied: true,
            ..Self::new(value)
        }
    }

    pub fn custom(mut self) -> Self {
        self.custom = true;
        self
    }
}

/// Final weights plus what happened while producing them
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedWeights {
    pub weights: BTreeMap<String, f64>,

    /// Mode that actually produced the weights (after any fallback)
    pub mode: PersonalizationMode,
    pub warnings: Vec<String>,
}

impl NormalizedWeights {
    pub fn sum(&self) -> f64 {
        self.weights.values().sum()
    }
}

/// Applies a [`PersonalizationMode`] to raw weights
#[derive(Debug, Clone, Copy, Default)]
pub struct WeightNormalizer {
    allow_invalid_sums: bool,
}

impl WeightNormalizer {
    pub fn new(allow_invalid_sums: bool) -> Self {
        Self { allow_invalid_sums }
    }

    pub fn normalize(
        &self,
        raw: &BTreeMap<String, RawWeight>,
        mode: PersonalizationMode,
    ) -> NormalizedWeights {
        let mut warnings = Vec::new();
        let sanitized = sanitize(raw, &mut warnings);

        let (weights, applied) = match mode {
            PersonalizationMode::Proportional => (proportional(&values(&sanitized)), mode),
            PersonalizationMode::Strict => (strict(&sanitized, &mut warnings), mode),
            PersonalizationMode::Additive => (additive(&sanitized, &mut warnings), mode),
            PersonalizationMode::Override => {
                let weights: BTreeMap<String, f64> = sanitized
                    .iter()
                    .map(|(k, w)| (k.clone(), w.value.min(1.0)))
                    .collect();
                let sum: f64 = weights.values().sum();
                if self.allow_invalid_sums || within_tolerance(sum) || weights.is_empty() {
                    return NormalizedWeights {
                        weights,
                        mode,
                        warnings,
                    };
                }
                let msg = format!(
                    "override weights sum to {:.3}; falling back to proportional normalization",
                    sum
                );
                warn!("{}", msg);
                warnings.push(msg);
                (proportional(&weights), PersonalizationMode::Proportional)
            }
        };

        let sum: f64 = weights.values().sum();
        if weights.is_empty() || within_tolerance(sum) {
            debug!("Normalized {} weights in {} mode", weights.len(), applied);
            return NormalizedWeights {
                weights,
                mode: applied,
                warnings,
            };
        }

        let msg = format!(
            "{} weights sum to {:.3}; re-normalizing proportionally",
            applied, sum
        );
        warn!("{}", msg);
        warnings.push(msg);
        NormalizedWeights {
            weights: proportional(&weights),
            mode: applied,
            warnings,
        }
    }
}

fn within_tolerance(sum: f64) -> bool {
    (sum - 1.0).abs() <= SUM_TOLERANCE
}

/// Negative and non-finite weights count as zero
fn sanitize(
    raw: &BTreeMap<String, RawWeight>,
    warnings: &mut Vec<String>,
) -> BTreeMap<String, RawWeight> {
    raw.iter()
        .map(|(name, w)| {
            let mut w = *w;
            if !w.value.is_finite() || w.value < 0.0 {
                let msg = format!("weight for '{}' was {}; treating as 0", name, w.value);
                warn!("{}", msg);
                warnings.push(msg);
                w.value = 0.0;
            }
            (name.clone(), w)
        })
        .collect()
}

fn values(raw: &BTreeMap<String, RawWeight>) -> BTreeMap<String, f64> {
    raw.iter().map(|(k, w)| (k.clone(), w.value)).collect()
}

/// Divide by the total; equal shares when the total is zero
pub fn proportional(weights: &BTreeMap<String, f64>) -> BTreeMap<String, f64> {
    if weights.is_empty() {
        return BTreeMap::new();
    }
    let sum: f64 = weights.values().sum();
    if sum > 0.0 {
        weights.iter().map(|(k, v)| (k.clone(), v / sum)).collect()
    } else {
        let share = 1.0 / weights.len() as f64;
        weights.keys().map(|k| (k.clone(), share)).collect()
    }
}

/// Spread `budget` over `weights` proportionally, equally when they are all zero
fn distribute(weights: &BTreeMap<String, f64>, budget: f64) -> BTreeMap<String, f64> {
    proportional(weights)
        .into_iter()
        .map(|(k, share)| (k, share * budget))
        .collect()
}

fn strict(raw: &BTreeMap<String, RawWeight>, warnings: &mut Vec<String>) -> BTreeMap<String, f64> {
    let (user, rest): (BTreeMap<_, _>, BTreeMap<_, _>) =
        raw.iter().partition(|(_, w)| w.user_supplied);

    if user.is_empty() {
        return proportional(&values(raw));
    }

    let user_sum: f64 = user.values().map(|w| w.value).sum();
    let mut result: BTreeMap<String, f64> =
        user.iter().map(|(k, w)| ((*k).clone(), w.value)).collect();
    let rest: BTreeMap<String, f64> = rest.iter().map(|(k, w)| ((*k).clone(), w.value)).collect();

    if user_sum > 1.0 + SUM_TOLERANCE {
        let msg = format!(
            "user weights sum to {:.3} (> 1.0); other dimensions receive no weight",
            user_sum
        );
        warn!("{}", msg);
        warnings.push(msg);
        result.extend(rest.keys().map(|k| (k.clone(), 0.0)));
        return result;
    }

    let remaining = (1.0 - user_sum).max(0.0);
    result.extend(distribute(&rest, remaining));
    result
}

fn additive(raw: &BTreeMap<String, RawWeight>, warnings: &mut Vec<String>) -> BTreeMap<String, f64> {
    let (custom, existing): (BTreeMap<_, _>, BTreeMap<_, _>) =
        raw.iter().partition(|(_, w)| w.custom);

    if custom.is_empty() || existing.is_empty() {
        return proportional(&values(raw));
    }

    let custom: BTreeMap<String, f64> = custom.iter().map(|(k, w)| ((*k).clone(), w.value)).collect();
    let existing: BTreeMap<String, f64> =
        existing.iter().map(|(k, w)| ((*k).clone(), w.value)).collect();
    let custom_total: f64 = custom.values().sum();

    if custom_total >= 1.0 {
        let msg = format!(
            "custom dimension weights sum to {:.3}; existing dimensions receive no weight",
            custom_total
        );
        warn!("{}", msg);
        warnings.push(msg);
        let mut result = proportional(&custom);
        result.extend(existing.keys().map(|k| (k.clone(), 0.0)));
        return result;
    }

    let mut result = distribute(&existing, 1.0 - custom_total);
    result.extend(custom);
    result
}
