//! Error types for metric computations.
//!
//! Numeric edge cases never surface here: missing prices, division by zero
//! and logarithms of non-positive values all become null cells. Only
//! structural problems with the input are reported as errors.

use thiserror::Error;

/// Result type for metric operations.
pub type Result<T> = std::result::Result<T, MetricsError>;

/// Errors that can occur while building or transforming metric tables.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Requested series identifier is not present in the table
    #[error("Identifier not found: {0}")]
    IdentifierNotFound(String),

    /// Input table has the wrong shape or is missing an expected field
    #[error("Malformed input table: {0}")]
    MalformedInput(String),

    /// Polars DataFrame error
    #[error("DataFrame error: {0}")]
    Polars(#[from] polars::error::PolarsError),
}

impl MetricsError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedInput(reason.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = MetricsError::IdentifierNotFound("MSFT".to_string());
        assert_eq!(err.to_string(), "Identifier not found: MSFT");

        let err = MetricsError::malformed("missing `date` column");
        assert_eq!(
            err.to_string(),
            "Malformed input table: missing `date` column"
        );
    }
}
