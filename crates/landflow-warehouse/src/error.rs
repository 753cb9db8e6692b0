//! Warehouse errors

use thiserror::Error;

/// SQLSTATE for `duplicate_schema`
pub const DUPLICATE_SCHEMA: &str = "42P06";
/// SQLSTATE for `duplicate_table`
pub const DUPLICATE_TABLE: &str = "42P07";

#[derive(Error, Debug)]
pub enum WarehouseError {
    /// A schema or table with that name is already there
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Statement failed: {message}\n  {statement}")]
    Statement { statement: String, message: String },

    #[error("Cannot connect to warehouse: {0}")]
    Connection(String),
}

impl WarehouseError {
    /// Classify a driver error raised while running `statement`
    pub fn from_sqlx(statement: &str, err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) => match db.code().as_deref() {
                Some(DUPLICATE_SCHEMA) | Some(DUPLICATE_TABLE) => {
                    Self::AlreadyExists(db.message().to_string())
                }
                _ => Self::Statement {
                    statement: statement.to_string(),
                    message: db.message().to_string(),
                },
            },
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed => Self::Connection(err.to_string()),
            _ => Self::Statement {
                statement: statement.to_string(),
                message: err.to_string(),
            },
        }
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }
}

pub type Result<T> = std::result::Result<T, WarehouseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_timeout_is_connection_error() {
        let err = WarehouseError::from_sqlx("SELECT 1", sqlx::Error::PoolTimedOut);
        assert!(matches!(err, WarehouseError::Connection(_)));
    }

    #[test]
    fn test_other_driver_errors_keep_statement() {
        let err = WarehouseError::from_sqlx("SELECT 1", sqlx::Error::RowNotFound);
        match err {
            WarehouseError::Statement { statement, .. } => assert_eq!(statement, "SELECT 1"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
