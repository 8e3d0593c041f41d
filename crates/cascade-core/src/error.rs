use thiserror::Error;

/// Core error type for cascade operations.
#[derive(Error, Debug)]
pub enum CascadeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Version conflict: expected {expected}, stored {stored}")]
    VersionConflict { expected: u64, stored: u64 },

    #[error("Lock unavailable: {0}")]
    LockUnavailable(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Repository error: {0}")]
    Repository(String),

    #[error("Publish error: {0}")]
    Publish(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for CascadeError {
    fn from(e: serde_json::Error) -> Self {
        CascadeError::Serialization(e.to_string())
    }
}

/// Result type alias using CascadeError.
pub type Result<T> = std::result::Result<T, CascadeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_conflict_message() {
        let err = CascadeError::VersionConflict {
            expected: 3,
            stored: 5,
        };
        assert_eq!(err.to_string(), "Version conflict: expected 3, stored 5");
    }

    #[test]
    fn test_serde_error_conversion() {
        let parse_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: CascadeError = parse_err.into();
        assert!(matches!(err, CascadeError::Serialization(_)));
    }
}
