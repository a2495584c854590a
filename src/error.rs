//! Error types for the Vantage scoring engine
//!
//! Errors only surface from configuration loading and validation. The
//! assessment entry points on [`crate::ScoringEngine`] never return them;
//! failures there degrade into fallback scores instead.

use thiserror::Error;

/// Main error type for Vantage operations
#[derive(Error, Debug)]
pub enum VantageError {
    /// Layered configuration could not be built or deserialized
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// TOML engine configuration failed to parse
    #[error("Failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration parsed but holds out-of-range values
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A dimension scorer failed or produced a non-finite value
    #[error("Scorer '{dimension}' failed: {reason}")]
    Scorer { dimension: String, reason: String },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Result type alias for Vantage operations
pub type Result<T> = std::result::Result<T, VantageError>;

/// Convert anyhow::Error to VantageError
impl From<anyhow::Error> for VantageError {
    fn from(err: anyhow::Error) -> Self {
        VantageError::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = VantageError::Scorer {
            dimension: "accuracy".to_string(),
            reason: "returned NaN".to_string(),
        };
        assert_eq!(err.to_string(), "Scorer 'accuracy' failed: returned NaN");
    }

    #[test]
    fn test_error_conversion() {
        let toml_err = toml::from_str::<toml::Value>("not = [valid");
        assert!(toml_err.is_err());

        let vantage_err: VantageError = toml_err.unwrap_err().into();
        assert!(matches!(vantage_err, VantageError::Toml(_)));
    }

    #[test]
    fn test_anyhow_conversion() {
        let err: VantageError = anyhow::anyhow!("boom").into();
        assert_eq!(err.to_string(), "boom");
    }
}
