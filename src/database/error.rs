use crate::error::{AppError, AppErrorKind, InfrastructureError};
use thiserror::Error;

/// Postgres SQLSTATE for `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseErrorKind {
    /// Pool exhausted, connection dropped, or I/O failure
    Connection { message: String },
    UniqueViolation {
        constraint: Option<String>,
        message: String,
    },
    NotFound,
    /// A stored value could not be mapped back into a domain type
    Decode { message: String },
    Migration { message: String },
    Unknown { message: String },
}

#[derive(Debug, Clone, Error)]
#[error("{}", .kind.describe())]
pub struct DatabaseError {
    pub kind: DatabaseErrorKind,
}

impl DatabaseErrorKind {
    fn describe(&self) -> String {
        match self {
            DatabaseErrorKind::Connection { message } => {
                format!("database connection error: {}", message)
            }
            DatabaseErrorKind::UniqueViolation { constraint, message } => format!(
                "unique constraint violated ({}): {}",
                constraint.as_deref().unwrap_or("unknown"),
                message
            ),
            DatabaseErrorKind::NotFound => "row not found".to_string(),
            DatabaseErrorKind::Decode { message } => format!("decode error: {}", message),
            DatabaseErrorKind::Migration { message } => format!("migration failed: {}", message),
            DatabaseErrorKind::Unknown { message } => format!("database error: {}", message),
        }
    }
}

impl DatabaseError {
    pub fn new(kind: DatabaseErrorKind) -> Self {
        Self { kind }
    }

    pub fn from_sqlx(err: sqlx::Error) -> Self {
        let kind = match &err {
            sqlx::Error::RowNotFound => DatabaseErrorKind::NotFound,
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                DatabaseErrorKind::Connection {
                    message: err.to_string(),
                }
            }
            sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                DatabaseErrorKind::UniqueViolation {
                    constraint: db_err.constraint().map(str::to_string),
                    message: db_err.message().to_string(),
                }
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                DatabaseErrorKind::Decode {
                    message: err.to_string(),
                }
            }
            _ => DatabaseErrorKind::Unknown {
                message: err.to_string(),
            },
        };
        Self::new(kind)
    }

    pub fn from_migrate(err: sqlx::migrate::MigrateError) -> Self {
        Self::new(DatabaseErrorKind::Migration {
            message: err.to_string(),
        })
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self.kind, DatabaseErrorKind::UniqueViolation { .. })
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, DatabaseErrorKind::Connection { .. })
    }
}

impl From<DatabaseError> for AppError {
    fn from(err: DatabaseError) -> Self {
        let is_retryable = err.is_retryable();
        AppError::new(AppErrorKind::Infrastructure(InfrastructureError::Database {
            message: err.to_string(),
            is_retryable,
        }))
    }
}
