use serde::Serialize;
use thiserror::Error;

/// A single field-level validation failure.
///
/// Returns-engine validation collects every per-line failure into one
/// `Error::Validation(Vec<FieldError>)` rather than stopping at the first.
#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
    pub code: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            code: code.into(),
        }
    }
}

/// Business-rule conflict codes from the error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictCode {
    InsufficientStock,
    InsufficientUnits,
    Overbooked,
    ExcessiveReturnQuantity,
    InvalidTransition,
    ExtensionLimitExceeded,
    ReturnWindowExpired,
}

impl ConflictCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictCode::InsufficientStock => "INSUFFICIENT_STOCK",
            ConflictCode::InsufficientUnits => "INSUFFICIENT_UNITS",
            ConflictCode::Overbooked => "OVERBOOKED",
            ConflictCode::ExcessiveReturnQuantity => "EXCESSIVE_RETURN_QUANTITY",
            ConflictCode::InvalidTransition => "INVALID_TRANSITION",
            ConflictCode::ExtensionLimitExceeded => "EXTENSION_LIMIT_EXCEEDED",
            ConflictCode::ReturnWindowExpired => "RETURN_WINDOW_EXPIRED",
        }
    }
}

impl std::fmt::Display for ConflictCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("validation failed: {0:?}")]
    Validation(Vec<FieldError>),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict [{code}]: {message}")]
    Conflict { code: ConflictCode, message: String },

    #[error("integrity violation: {0}")]
    Integrity(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn validation(field: impl Into<String>, message: impl Into<String>, code: impl Into<String>) -> Self {
        Error::Validation(vec![FieldError::new(field, message, code)])
    }

    pub fn conflict(code: ConflictCode, message: impl Into<String>) -> Self {
        Error::Conflict { code, message: message.into() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Error::NotFound(message.into())
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Error::NotFound(_) => 404,
            Error::Conflict { .. } => 409,
            Error::Validation(_) => 400,
            Error::Transient(_) => 503,
            Error::Integrity(_) => 500,
            Error::InvalidConfiguration(_) => 500,
            _ => 500,
        }
    }

    /// Whether the enclosing operation should be retried per the
    /// concurrency model's deadlock/serialization-failure policy.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transient(_) => true,
            Error::Database(sqlx::Error::Database(db_err)) => {
                matches!(db_err.code().as_deref(), Some("40001") | Some("40P01"))
            }
            Error::Database(sqlx::Error::PoolTimedOut) => true,
            _ => false,
        }
    }

    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            Error::Validation(errors) => errors,
            _ => &[],
        }
    }
}

/// Wire representation of an error, per the external contract in §6.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    pub details: Vec<FieldError>,
}

impl From<&Error> for ErrorResponse {
    fn from(err: &Error) -> Self {
        let (code, message) = match err {
            Error::Validation(_) => ("VALIDATION_ERROR".to_string(), err.to_string()),
            Error::NotFound(m) => ("NOT_FOUND".to_string(), m.clone()),
            Error::Conflict { code, message } => (code.as_str().to_string(), message.clone()),
            Error::Integrity(m) => ("INTEGRITY_ERROR".to_string(), m.clone()),
            Error::Transient(m) => ("TRANSIENT_ERROR".to_string(), m.clone()),
            _ => ("INTERNAL_ERROR".to_string(), "an internal error occurred".to_string()),
        };
        ErrorResponse {
            code,
            message,
            details: err.field_errors().to_vec(),
        }
    }
}

/// Attach additional context to a fallible result, converting into the
/// crate's `Error` type along the way.
pub trait ErrorExt<T> {
    fn context(self, message: &str) -> Result<T>;
}

impl<T, E: Into<Error>> ErrorExt<T> for std::result::Result<T, E> {
    fn context(self, message: &str) -> Result<T> {
        self.map_err(|e| {
            let err: Error = e.into();
            Error::Internal(format!("{message}: {err}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_code_round_trips_through_display() {
        assert_eq!(ConflictCode::InsufficientUnits.to_string(), "INSUFFICIENT_UNITS");
    }

    #[test]
    fn status_codes_match_taxonomy() {
        assert_eq!(Error::not_found("x").status_code(), 404);
        assert_eq!(Error::conflict(ConflictCode::Overbooked, "x").status_code(), 409);
        assert_eq!(Error::validation("f", "m", "c").status_code(), 400);
    }

    #[test]
    fn validation_collects_multiple_field_errors() {
        let err = Error::Validation(vec![
            FieldError::new("items[0].item_id", "not found", "ITEM_NOT_FOUND"),
            FieldError::new("items[1].quantity", "exceeds available", "EXCESSIVE_RETURN_QUANTITY"),
        ]);
        assert_eq!(err.field_errors().len(), 2);
    }
}
