//! Error types for rowcraft.

use thiserror::Error;

/// Result type alias for rowcraft operations.
pub type OrmResult<T> = Result<T, OrmError>;

/// Error types for database operations.
#[derive(Debug, Error)]
pub enum OrmError {
    /// Database connection error.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query execution error, already rendered to text by the driver.
    #[error("Query error: {0}")]
    Query(String),

    /// Row not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unique constraint violation.
    #[error("Unique constraint violation: {0}")]
    UniqueViolation(String),

    /// Foreign key constraint violation.
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// Check constraint violation.
    #[error("Check constraint violation: {0}")]
    CheckViolation(String),

    /// Row decode/mapping error.
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Connection pool error.
    #[error("Pool error: {0}")]
    Pool(String),

    /// Query timeout error.
    #[error("Query timeout after {0:?}")]
    Timeout(std::time::Duration),

    /// A write was attempted outside of a transaction, on a router that
    /// requires writes to be scoped (see `router::ConnectionRouter::with_transaction`).
    #[error("write attempted outside of a transaction")]
    WriteOutsideTransaction,

    /// A write was attempted while the current scope is pinned to a
    /// read replica (e.g. inside `with_read_only`).
    #[error("write attempted in a read-only context")]
    WriteInReadOnlyContext,

    /// A find/relation-load result exceeded the configured hard limit.
    #[error("result set exceeded hard limit of {limit} rows (got at least {actual})")]
    LimitExceeded { limit: u64, actual: u64 },

    /// Other errors.
    #[error("{0}")]
    Other(String),
}

impl OrmError {
    /// Create a decode error for a specific column.
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a not found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a hard-limit-exceeded error.
    pub fn limit_exceeded(limit: u64, actual: u64) -> Self {
        Self::LimitExceeded { limit, actual }
    }

    /// Check if this is a unique violation error.
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation(_))
    }

    /// Check if this is a not found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

#[cfg(feature = "postgres")]
mod postgres_conv {
    use super::OrmError;

    impl From<tokio_postgres::Error> for OrmError {
        fn from(err: tokio_postgres::Error) -> Self {
            if let Some(db_err) = err.as_db_error() {
                let constraint = db_err.constraint().unwrap_or("unknown");
                let message = db_err.message();
                match db_err.code().code() {
                    "23505" => {
                        return OrmError::UniqueViolation(format!("{constraint}: {message}"));
                    }
                    "23503" => {
                        return OrmError::ForeignKeyViolation(format!("{constraint}: {message}"));
                    }
                    "23514" => {
                        return OrmError::CheckViolation(format!("{constraint}: {message}"));
                    }
                    _ => {}
                }
            }
            OrmError::Query(err.to_string())
        }
    }

    impl From<deadpool_postgres::PoolError> for OrmError {
        fn from(err: deadpool_postgres::PoolError) -> Self {
            OrmError::Pool(err.to_string())
        }
    }
}

#[cfg(feature = "mysql")]
mod mysql_conv {
    use super::OrmError;

    impl From<mysql_async::Error> for OrmError {
        fn from(err: mysql_async::Error) -> Self {
            if let mysql_async::Error::Server(ref server_err) = err {
                return match server_err.code {
                    1062 => OrmError::UniqueViolation(server_err.message.clone()),
                    1452 => OrmError::ForeignKeyViolation(server_err.message.clone()),
                    3819 => OrmError::CheckViolation(server_err.message.clone()),
                    _ => OrmError::Query(err.to_string()),
                };
            }
            OrmError::Query(err.to_string())
        }
    }
}

#[cfg(feature = "sqlite")]
mod sqlite_conv {
    use super::OrmError;

    impl From<rusqlite::Error> for OrmError {
        fn from(err: rusqlite::Error) -> Self {
            if let rusqlite::Error::SqliteFailure(ref sqlite_err, ref message) = err {
                use rusqlite::ErrorCode;
                let detail = message.clone().unwrap_or_default();
                return match sqlite_err.code {
                    ErrorCode::ConstraintViolation if detail.contains("UNIQUE") => {
                        OrmError::UniqueViolation(detail)
                    }
                    ErrorCode::ConstraintViolation if detail.contains("FOREIGN KEY") => {
                        OrmError::ForeignKeyViolation(detail)
                    }
                    ErrorCode::ConstraintViolation if detail.contains("CHECK") => {
                        OrmError::CheckViolation(detail)
                    }
                    _ => OrmError::Query(err.to_string()),
                };
            }
            OrmError::Query(err.to_string())
        }
    }

    impl From<deadpool_sqlite::PoolError> for OrmError {
        fn from(err: deadpool_sqlite::PoolError) -> Self {
            OrmError::Pool(err.to_string())
        }
    }

    impl From<deadpool_sqlite::InteractError> for OrmError {
        fn from(err: deadpool_sqlite::InteractError) -> Self {
            OrmError::Other(err.to_string())
        }
    }
}
