//! # Store Error Types Module
//!
//! Typed failures surfaced by the entity store and the bulk importer. A row
//! that does not exist is not an error: lookups return `Ok(None)` instead.

use std::path::PathBuf;

use sqlx::error::ErrorKind;
use thiserror::Error;

/// SQLSTATE for `string_data_right_truncation` (value too long for column).
const VALUE_TOO_LONG: &str = "22001";

/// Failures of entity store operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// Missing required field, wrong value kind, unknown field name, bad input row
    #[error("Validation error: {0}")]
    Validation(String),
    /// Foreign key, unique, not-null or check constraint violated
    #[error("Integrity error: {0}")]
    Integrity(String),
    /// Connection or driver failure
    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl StoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        StoreError::Validation(msg.into())
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.code().as_deref() == Some(VALUE_TOO_LONG) {
                return StoreError::Validation(db_err.message().to_string());
            }
            match db_err.kind() {
                ErrorKind::ForeignKeyViolation
                | ErrorKind::UniqueViolation
                | ErrorKind::NotNullViolation
                | ErrorKind::CheckViolation => {
                    return StoreError::Integrity(db_err.message().to_string());
                }
                _ => {}
            }
        }
        StoreError::Database(err)
    }
}

/// Failures of the two-file hierarchy import
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed {source_name}: {source}")]
    Csv {
        source_name: String,
        #[source]
        source: csv::Error,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_formatting() {
        let err = StoreError::validation("missing field name");
        assert_eq!(err.to_string(), "Validation error: missing field name");

        let err = StoreError::Integrity("violates foreign key".to_string());
        assert_eq!(err.to_string(), "Integrity error: violates foreign key");
    }

    #[test]
    fn test_non_database_sqlx_error_stays_database() {
        let err: StoreError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, StoreError::Database(_)));
    }

    #[test]
    fn test_import_error_wraps_store_error() {
        let err: ImportError = StoreError::validation("regions.csv row 2: empty name").into();
        assert_eq!(
            err.to_string(),
            "Validation error: regions.csv row 2: empty name"
        );
    }
}
