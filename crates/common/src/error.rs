//! Common error types and handling for Unitwork

use crate::db::StoreError;

/// Common result type
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for every unit-of-work operation
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Expected at most one {entity} row, found {count}")]
    MultipleResults { entity: &'static str, count: usize },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Store failure: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Mapping error: {0}")]
    Mapping(#[from] serde_json::Error),
}

impl Error {
    /// Get the stable error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::InvalidArgument(_) => "INVALID_ARGUMENT",
            Error::IllegalState(_) => "ILLEGAL_STATE",
            Error::MultipleResults { .. } => "MULTIPLE_RESULTS",
            Error::Cancelled => "CANCELLED",
            Error::Store(_) => "STORE_FAILURE",
            Error::Configuration(_) => "CONFIGURATION_ERROR",
            Error::Mapping(_) => "MAPPING_ERROR",
        }
    }

    /// Whether the error was raised by the underlying store
    pub fn is_store_failure(&self) -> bool {
        matches!(self, Error::Store(_))
    }

    /// Whether the error is a unique constraint violation reported by the store
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Error::Store(StoreError::UniqueViolation { .. }))
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::Store(StoreError::Database(err))
    }
}
