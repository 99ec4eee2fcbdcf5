//! Pipeline configuration.

use crate::{MetricsError, Result};
use serde::{Deserialize, Serialize};

/// Default field group holding closing prices.
pub const DEFAULT_CLOSE_FIELD: &str = "Close";

/// Default value of the first normalized observation.
pub const DEFAULT_NORMALIZATION_BASE: f64 = 100.0;

/// Configuration for [`transform_df_with`](crate::transform_df_with).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Field group that holds closing prices (default: `Close`)
    pub close_field: String,
    /// Value each series is rebased to at the first row (default: 100)
    pub normalization_base: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            close_field: DEFAULT_CLOSE_FIELD.to_string(),
            normalization_base: DEFAULT_NORMALIZATION_BASE,
        }
    }
}

impl PipelineConfig {
    /// Parse a configuration from JSON. Missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| MetricsError::malformed(format!("invalid pipeline config: {e}")))
    }

    /// Set the close field group.
    pub fn with_close_field(mut self, field: impl Into<String>) -> Self {
        self.close_field = field.into();
        self
    }

    /// Set the normalization base.
    pub const fn with_normalization_base(mut self, base: f64) -> Self {
        self.normalization_base = base;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.close_field, "Close");
        assert_eq!(config.normalization_base, 100.0);
    }

    #[test]
    fn test_config_from_partial_json() {
        let config = PipelineConfig::from_json(r#"{"normalization_base": 1.0}"#).unwrap();
        assert_eq!(config.close_field, "Close");
        assert_eq!(config.normalization_base, 1.0);
    }

    #[test]
    fn test_config_from_invalid_json() {
        let err = PipelineConfig::from_json("{not json").unwrap_err();
        assert!(matches!(err, MetricsError::MalformedInput(_)));
    }
}
