//! Typed errors, their kind tags, and HTTP mapping.

use crate::response::Envelope;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// Coarse classification of a failure, carried alongside the message so callers
/// never have to pattern-match on error text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    NotConnected,
    SchemaEmpty,
    UnknownTable,
    MissingData,
    EmptyFilter,
    MissingPrimaryKeys,
    InvalidLimit,
    InvalidOrder,
    UnknownOperator,
    NoRowsAffected,
    Build,
    Config,
    Driver,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotConnected => "not_connected",
            ErrorKind::SchemaEmpty => "schema_empty",
            ErrorKind::UnknownTable => "unknown_table",
            ErrorKind::MissingData => "missing_data",
            ErrorKind::EmptyFilter => "empty_filter",
            ErrorKind::MissingPrimaryKeys => "missing_primary_keys",
            ErrorKind::InvalidLimit => "invalid_limit",
            ErrorKind::InvalidOrder => "invalid_order",
            ErrorKind::UnknownOperator => "unknown_operator",
            ErrorKind::NoRowsAffected => "no_rows_affected",
            ErrorKind::Build => "build_error",
            ErrorKind::Config => "config_error",
            ErrorKind::Driver => "database_error",
        }
    }
}

#[derive(Error, Debug)]
pub enum CrudError {
    #[error("not connected to database")]
    NotConnected,
    #[error("database does not contain any table in schema '{0}' or you lack the rights to list them")]
    SchemaEmpty(String),
    #[error("unknown table: {0}")]
    UnknownTable(String),
    #[error("missing data: {0}")]
    MissingData(String),
    #[error("refusing to touch every row: no filter given")]
    EmptyFilter,
    #[error("missing primary keys in row ({})", .0.join(", "))]
    MissingPrimaryKeys(Vec<String>),
    #[error("limit value \"{0}\" is not a valid number")]
    InvalidLimit(String),
    #[error("order should be true or false, got \"{0}\"")]
    InvalidOrder(String),
    #[error("where operator not recognised: {0}")]
    UnknownOperator(String),
    #[error("no rows in result set for {0}")]
    NoRowsAffected(String),
    #[error("query build: {0}")]
    Build(String),
    #[error("config: {0}")]
    Config(String),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
}

impl CrudError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CrudError::NotConnected => ErrorKind::NotConnected,
            CrudError::SchemaEmpty(_) => ErrorKind::SchemaEmpty,
            CrudError::UnknownTable(_) => ErrorKind::UnknownTable,
            CrudError::MissingData(_) => ErrorKind::MissingData,
            CrudError::EmptyFilter => ErrorKind::EmptyFilter,
            CrudError::MissingPrimaryKeys(_) => ErrorKind::MissingPrimaryKeys,
            CrudError::InvalidLimit(_) => ErrorKind::InvalidLimit,
            CrudError::InvalidOrder(_) => ErrorKind::InvalidOrder,
            CrudError::UnknownOperator(_) => ErrorKind::UnknownOperator,
            CrudError::NoRowsAffected(_) => ErrorKind::NoRowsAffected,
            CrudError::Build(_) => ErrorKind::Build,
            CrudError::Config(_) => ErrorKind::Config,
            CrudError::Db(_) => ErrorKind::Driver,
        }
    }

    /// HTTP status for the transport layer. Constraint violations are told apart
    /// from other driver failures by the database's own error class.
    pub fn status_code(&self) -> StatusCode {
        match self {
            CrudError::NoRowsAffected(_) | CrudError::UnknownTable(_) => StatusCode::NOT_FOUND,
            CrudError::MissingData(_)
            | CrudError::EmptyFilter
            | CrudError::MissingPrimaryKeys(_)
            | CrudError::InvalidLimit(_)
            | CrudError::InvalidOrder(_)
            | CrudError::UnknownOperator(_) => StatusCode::BAD_REQUEST,
            CrudError::Db(sqlx::Error::RowNotFound) => StatusCode::NOT_FOUND,
            CrudError::Db(sqlx::Error::Database(e)) if is_constraint_violation(e.code().as_deref(), e.message()) => {
                StatusCode::CONFLICT
            }
            CrudError::NotConnected
            | CrudError::SchemaEmpty(_)
            | CrudError::Build(_)
            | CrudError::Config(_)
            | CrudError::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// SQLSTATE class 23 is "integrity constraint violation"; the message check keeps
/// drivers that omit the code on the same footing.
fn is_constraint_violation(code: Option<&str>, message: &str) -> bool {
    code.map(|c| c.starts_with("23")).unwrap_or(false) || message.contains("violates")
}

impl IntoResponse for CrudError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        tracing::warn!(kind = self.kind().as_str(), status = status.as_u16(), "{}", self);
        let body: Envelope<()> = Envelope::failure(self.kind(), self.to_string());
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_primary_keys_lists_every_column() {
        let err = CrudError::MissingPrimaryKeys(vec!["id".into(), "tenant".into()]);
        assert_eq!(err.to_string(), "missing primary keys in row (id, tenant)");
        assert_eq!(err.kind(), ErrorKind::MissingPrimaryKeys);
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn no_rows_affected_keeps_legacy_wording() {
        let err = CrudError::NoRowsAffected("{\"id\":5}".into());
        assert!(err.to_string().contains("no rows in result set"));
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn invalid_limit_names_the_value() {
        let err = CrudError::InvalidLimit("abc".into());
        assert!(err.to_string().contains("\"abc\""));
        assert_eq!(err.kind().as_str(), "invalid_limit");
    }

    #[test]
    fn driver_errors_default_to_internal() {
        let err = CrudError::Db(sqlx::Error::PoolClosed);
        assert_eq!(err.kind(), ErrorKind::Driver);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(CrudError::Db(sqlx::Error::RowNotFound).status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn constraint_class_detection() {
        assert!(is_constraint_violation(Some("23505"), "duplicate key"));
        assert!(is_constraint_violation(None, "insert violates foreign key constraint"));
        assert!(!is_constraint_violation(Some("42P01"), "relation does not exist"));
    }
}
