//! Error taxonomy surfaced by catalog operations.
//!
//! Every operation returns [`CatalogError`]. Storage-level failures
//! ([`DbError`], [`TransactionError`], [`PoolError`], [`ConnectionError`])
//! collapse into [`CatalogError::Internal`] so callers only ever branch on
//! the four classifications below.

use crate::connection::ConnectionError;
use crate::executor::DbError;
use crate::pool::PoolError;
use crate::transaction::TransactionError;
use std::fmt;

/// Result alias used across the service layer.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Caller-facing error classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// A referenced building, category or company does not exist
    NotFound(String),
    /// Malformed input: validation failures, bad geo parameters
    InvalidArgument(String),
    /// The operation would break a referential invariant
    Conflict(String),
    /// Unexpected store failure
    Internal(String),
}

impl CatalogError {
    pub fn not_found(what: impl Into<String>) -> Self {
        CatalogError::NotFound(what.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        CatalogError::InvalidArgument(msg.into())
    }

    /// HTTP status code for this classification
    pub fn status_code(&self) -> u16 {
        match self {
            CatalogError::NotFound(_) => 404,
            CatalogError::InvalidArgument(_) => 400,
            CatalogError::Conflict(_) => 409,
            CatalogError::Internal(_) => 500,
        }
    }

    /// Message without the classification prefix
    pub fn detail(&self) -> &str {
        match self {
            CatalogError::NotFound(s)
            | CatalogError::InvalidArgument(s)
            | CatalogError::Conflict(s)
            | CatalogError::Internal(s) => s,
        }
    }
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::NotFound(s) => write!(f, "Not found: {s}"),
            CatalogError::InvalidArgument(s) => write!(f, "Invalid argument: {s}"),
            CatalogError::Conflict(s) => write!(f, "Conflict: {s}"),
            CatalogError::Internal(s) => write!(f, "Internal error: {s}"),
        }
    }
}

impl std::error::Error for CatalogError {}

impl From<DbError> for CatalogError {
    fn from(err: DbError) -> Self {
        CatalogError::Internal(err.to_string())
    }
}

impl From<TransactionError> for CatalogError {
    fn from(err: TransactionError) -> Self {
        CatalogError::Internal(err.to_string())
    }
}

impl From<PoolError> for CatalogError {
    fn from(err: PoolError) -> Self {
        CatalogError::Internal(err.to_string())
    }
}

impl From<ConnectionError> for CatalogError {
    fn from(err: ConnectionError) -> Self {
        CatalogError::Internal(err.to_string())
    }
}

impl From<::config::ConfigError> for CatalogError {
    fn from(err: ::config::ConfigError) -> Self {
        CatalogError::Internal(format!("configuration: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(CatalogError::not_found("Building not found").status_code(), 404);
        assert_eq!(CatalogError::invalid("bad").status_code(), 400);
        assert_eq!(CatalogError::Conflict("busy".into()).status_code(), 409);
        assert_eq!(CatalogError::Internal("boom".into()).status_code(), 500);
    }

    #[test]
    fn test_display_and_detail() {
        let err = CatalogError::not_found("Category not found");
        assert_eq!(err.detail(), "Category not found");
        assert!(err.to_string().starts_with("Not found"));
    }

    #[test]
    fn test_db_error_maps_to_internal() {
        let err: CatalogError = DbError::QueryError("relation missing".into()).into();
        assert!(matches!(err, CatalogError::Internal(ref s) if s.contains("relation missing")));
    }
}
