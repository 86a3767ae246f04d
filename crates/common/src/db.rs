//! Store failure types shared by every session backend

use thiserror::Error;

/// Failures reported by the underlying store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Unique constraint {constraint} violated on {table}")]
    UniqueViolation { table: String, constraint: String },

    #[error("Row {key} not found in {table}")]
    RowNotFound { table: String, key: String },

    #[error("Session is closed")]
    SessionClosed,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Build a unique violation from a column set
    pub fn unique_violation(table: &str, columns: &[&str]) -> Self {
        StoreError::UniqueViolation {
            table: table.to_string(),
            constraint: columns.join(","),
        }
    }
}
