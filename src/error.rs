// ⚠️ Error Taxonomy
// Typed errors surfaced by the engine and the CSV importer.
// Store and application plumbing keeps using anyhow, like the rest of the crate.

use thiserror::Error;

/// Errors raised by the metrics engine and the projector.
///
/// Metrics functions are total over well-formed snapshots, so in practice
/// only the projector produces these.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Errors raised while turning CSV input into well-typed rows.
///
/// `MissingColumns` rejects a whole file; every other variant is reported
/// per row and never aborts the batch.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ImportError {
    #[error("CSV must contain columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("Invalid value for '{column}': '{value}'")]
    InvalidField { column: String, value: String },

    #[error("Unknown account type '{0}' (expected checking, savings, investment or credit)")]
    UnknownAccountType(String),

    #[error("Invalid month '{0}' (expected YYYY-MM)")]
    InvalidMonth(String),

    #[error("Invalid date '{0}'")]
    InvalidDate(String),

    #[error("Share count cannot be negative: {0}")]
    NegativeShares(f64),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_columns_message_lists_columns() {
        let err = ImportError::MissingColumns(vec!["name".into(), "balance".into()]);
        assert_eq!(err.to_string(), "CSV must contain columns: name, balance");
    }

    #[test]
    fn test_invalid_configuration_message() {
        let err = EngineError::InvalidConfiguration("trials must be positive".into());
        assert!(err.to_string().contains("trials must be positive"));
    }
}
