//! Error taxonomy for the learn core.
//!
//! Every engine operation returns [`LearnError`]. Storage backends report
//! [`StorageError`], which the engine wraps into `LearnError::Persistence`
//! together with a correlation id that is logged alongside the cause and is the
//! only storage-related detail an end user ever sees.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use diesel::result::DatabaseErrorKind;
use log::error;
use uuid::Uuid;

use super::codes::CodeTarget;

pub type StoreResult<T> = Result<T, StorageError>;
pub type LearnResult<T> = Result<T, LearnError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("unique constraint {constraint} violated")]
    UniqueViolation { constraint: String },
    #[error("foreign key constraint {constraint} violated")]
    ForeignKeyViolation { constraint: String },
    #[error("check constraint {constraint} violated")]
    CheckViolation { constraint: String },
    #[error("not-null constraint violated on {column}")]
    NotNullViolation { column: String },
    #[error("connection error: {0}")]
    Connection(String),
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    pub fn unique(constraint: &str) -> Self {
        Self::UniqueViolation {
            constraint: constraint.to_string(),
        }
    }

    pub fn foreign_key(constraint: &str) -> Self {
        Self::ForeignKeyViolation {
            constraint: constraint.to_string(),
        }
    }

    pub fn check(constraint: &str) -> Self {
        Self::CheckViolation {
            constraint: constraint.to_string(),
        }
    }

    pub fn is_unique_violation(&self, name: &str) -> bool {
        matches!(self, Self::UniqueViolation { constraint } if constraint == name)
    }
}

impl From<diesel::result::Error> for StorageError {
    fn from(err: diesel::result::Error) -> Self {
        match err {
            diesel::result::Error::DatabaseError(kind, info) => {
                let constraint = info.constraint_name().unwrap_or("unknown").to_string();
                match kind {
                    DatabaseErrorKind::UniqueViolation => Self::UniqueViolation { constraint },
                    DatabaseErrorKind::ForeignKeyViolation => {
                        Self::ForeignKeyViolation { constraint }
                    }
                    DatabaseErrorKind::CheckViolation => Self::CheckViolation { constraint },
                    DatabaseErrorKind::NotNullViolation => Self::NotNullViolation {
                        column: info.column_name().unwrap_or("unknown").to_string(),
                    },
                    DatabaseErrorKind::ClosedConnection
                    | DatabaseErrorKind::UnableToSendCommand => {
                        Self::Connection(info.message().to_string())
                    }
                    _ => Self::Backend(info.message().to_string()),
                }
            }
            other => Self::Backend(other.to_string()),
        }
    }
}

impl From<diesel::r2d2::PoolError> for StorageError {
    fn from(err: diesel::r2d2::PoolError) -> Self {
        Self::Connection(err.to_string())
    }
}

/// The error kinds callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    Conflict,
    Validation,
    Upstream,
    Persistence,
}

#[derive(Debug, thiserror::Error)]
pub enum LearnError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("could not allocate a unique {target} access code after {attempts} attempts")]
    CodeSpaceExhausted { target: CodeTarget, attempts: u32 },
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("question source failed: {0}")]
    Upstream(String),
    #[error("{operation} failed (ref {correlation_id}): {source}")]
    Persistence {
        operation: &'static str,
        correlation_id: Uuid,
        #[source]
        source: StorageError,
    },
}

impl LearnError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn persistence(operation: &'static str, source: StorageError) -> Self {
        Self::Persistence {
            operation,
            correlation_id: Uuid::new_v4(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::Conflict(_) | Self::CodeSpaceExhausted { .. } => ErrorKind::Conflict,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Upstream(_) => ErrorKind::Upstream,
            Self::Persistence { .. } => ErrorKind::Persistence,
        }
    }

    /// Relabels a persistence failure with the operation that was running.
    /// Other kinds pass through untouched.
    pub fn during(self, op: &'static str) -> Self {
        match self {
            Self::Persistence {
                correlation_id,
                source,
                ..
            } => Self::Persistence {
                operation: op,
                correlation_id,
                source,
            },
            other => other,
        }
    }

    pub fn storage_cause(&self) -> Option<&StorageError> {
        match self {
            Self::Persistence { source, .. } => Some(source),
            _ => None,
        }
    }

    pub fn is_unique_violation(&self, constraint: &str) -> bool {
        self.storage_cause()
            .is_some_and(|cause| cause.is_unique_violation(constraint))
    }
}

impl From<StorageError> for LearnError {
    fn from(err: StorageError) -> Self {
        Self::persistence("storage operation", err)
    }
}

impl From<diesel::result::Error> for LearnError {
    fn from(err: diesel::result::Error) -> Self {
        StorageError::from(err).into()
    }
}

impl IntoResponse for LearnError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::NotFound { .. } => (StatusCode::NOT_FOUND, self.to_string()),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            Self::CodeSpaceExhausted { .. } => {
                error!("{}", self);
                (StatusCode::CONFLICT, self.to_string())
            }
            Self::Validation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            Self::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            Self::Persistence {
                operation,
                correlation_id,
                source,
            } => {
                error!("{} failed (ref {}): {}", operation, correlation_id, source);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("{operation} failed, reference {correlation_id}"),
                )
            }
        };

        (
            status,
            Json(serde_json::json!({
                "success": false,
                "error": message
            })),
        )
            .into_response()
    }
}
