//! Error types for Tally
//!
//! One enum covers the whole import taxonomy: input validation, captured
//! pipeline failures, authorization, invalid state transitions, downstream
//! ledger failures, and the infrastructure errors underneath them.

use thiserror::Error;

use crate::models::ImportStatus;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Rejected before any import exists (bad file type, empty file, missing fields)
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("File storage error: {0}")]
    Storage(String),

    #[error("Text extraction failed: {0}")]
    Extraction(String),

    #[error("Statement parsing failed: {0}")]
    Parsing(String),

    #[error("No transactions found in statement")]
    NoTransactions,

    #[error("No categories available for user")]
    NoCategories,

    /// The import exists but belongs to someone else
    #[error("Access denied: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Cannot {operation} an import with status '{status}'")]
    InvalidStatus {
        operation: &'static str,
        status: ImportStatus,
    },

    /// A concurrent writer updated the same import first
    #[error("Concurrent modification: {0}")]
    Conflict(String),

    /// The import is confirmed but some ledger transactions may be missing
    #[error("Transaction creation failed: {0}")]
    TransactionCreation(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// Stable machine-readable code for callers
    pub fn code(&self) -> &'static str {
        match self {
            Self::Database(_) | Self::Pool(_) => "database_error",
            Self::Encryption(_) => "encryption_error",
            Self::Io(_) => "io_error",
            Self::Http(_) => "http_error",
            Self::Json(_) => "json_error",
            Self::Config(_) => "config_error",
            Self::Validation(_) => "invalid_input",
            Self::Storage(_) => "file_storage_failed",
            Self::Extraction(_) => "text_extraction_failed",
            Self::Parsing(_) => "statement_parsing_failed",
            Self::NoTransactions => "no_transactions",
            Self::NoCategories => "no_categories",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::InvalidStatus { .. } => "invalid_status",
            Self::Conflict(_) => "conflict",
            Self::TransactionCreation(_) => "transaction_creation_failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether the same request may succeed if simply retried
    ///
    /// Only stale writes and caller cancellations qualify. Everything else
    /// needs a fixed input, a fresh upload, or human intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_status_message_names_operation_and_status() {
        let err = Error::InvalidStatus {
            operation: "confirm",
            status: ImportStatus::Cancelled,
        };
        assert_eq!(
            err.to_string(),
            "Cannot confirm an import with status 'cancelled'"
        );
        assert_eq!(err.code(), "invalid_status");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_only_conflict_and_cancelled_are_retryable() {
        assert!(Error::Conflict("stale".into()).is_retryable());
        assert!(Error::Cancelled.is_retryable());
        assert!(!Error::TransactionCreation("boom".into()).is_retryable());
        assert!(!Error::Forbidden("nope".into()).is_retryable());
        assert!(!Error::NoTransactions.is_retryable());
    }

    #[test]
    fn test_downstream_failure_has_distinct_code() {
        let err = Error::TransactionCreation("1 of 2 lines pending".into());
        assert_eq!(err.code(), "transaction_creation_failed");
        assert_ne!(err.code(), Error::Parsing("x".into()).code());
    }
}
