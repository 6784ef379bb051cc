//! Engine error types
//!
//! Error codes:
//! - MISSING_OR_WRONG_PARAMS (422)
//! - INVALID_OPERATOR (422)
//! - AMBIGUOUS_OR_MISSING_FIELD (422)
//! - INVALID_ID_STRATEGY (422)
//! - NOT_FOUND (404)
//! - UNEXPECTED_TABLE_STRUCTURE (500)
//! - TIMEOUT (500)
//! - INTERNAL_ERROR (500)
//!
//! Callers are expected to branch on [`ErrorCode`], never on the message text.

use std::fmt;

use crate::storage::StoreError;

/// Machine-checkable error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Caller misuse: absent filters, malformed join criteria, bad input shape
    MissingOrWrongParams,
    /// Operator text outside the supported set
    InvalidOperator,
    /// Field name matches zero or several table fields
    AmbiguousOrMissingField,
    /// Unknown ID generation strategy
    InvalidIdStrategy,
    /// Store, sheet or record absent
    NotFound,
    /// Table lacks a column the operation requires
    UnexpectedTableStructure,
    /// Writer lock not acquired within the wait budget
    Timeout,
    /// Any other failure, wrapping the original cause
    InternalError,
}

impl ErrorCode {
    /// Returns the stable string code
    pub fn code(&self) -> &'static str {
        match self {
            ErrorCode::MissingOrWrongParams => "MISSING_OR_WRONG_PARAMS",
            ErrorCode::InvalidOperator => "INVALID_OPERATOR",
            ErrorCode::AmbiguousOrMissingField => "AMBIGUOUS_OR_MISSING_FIELD",
            ErrorCode::InvalidIdStrategy => "INVALID_ID_STRATEGY",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::UnexpectedTableStructure => "UNEXPECTED_TABLE_STRUCTURE",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Returns the status number attached to this kind
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorCode::NotFound => 404,
            code if code.is_param_error() => 422,
            _ => 500,
        }
    }

    /// Returns true for the caller-misuse family (`MissingOrWrongParams` and its refinements)
    pub fn is_param_error(&self) -> bool {
        matches!(
            self,
            ErrorCode::MissingOrWrongParams
                | ErrorCode::InvalidOperator
                | ErrorCode::AmbiguousOrMissingField
                | ErrorCode::InvalidIdStrategy
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Engine error with kind, message and optional context
#[derive(Debug, Clone)]
pub struct DbError {
    code: ErrorCode,
    message: String,
    context: Option<String>,
}

impl DbError {
    fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: None,
        }
    }

    /// Create a missing-or-wrong-params error
    pub fn missing_or_wrong_params(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::MissingOrWrongParams, reason)
    }

    /// Create an invalid operator error
    pub fn invalid_operator(operator: &str) -> Self {
        Self::new(
            ErrorCode::InvalidOperator,
            format!("Unknown comparison operator: {}", operator),
        )
    }

    /// Create an ambiguous-or-missing field error
    pub fn ambiguous_or_missing_field(field: &str, matches: usize) -> Self {
        let reason = if matches == 0 { "missing" } else { "ambiguous" };
        Self::new(
            ErrorCode::AmbiguousOrMissingField,
            format!("Field name is {}: {}", reason, field),
        )
    }

    /// Create an invalid id strategy error
    pub fn invalid_id_strategy(strategy: &str) -> Self {
        Self::new(
            ErrorCode::InvalidIdStrategy,
            format!("ID strategy type not valid: {}", strategy),
        )
    }

    /// The sequential strategy has no exact id left after `last`
    pub fn sequence_exhausted(last: u64) -> Self {
        Self::new(
            ErrorCode::InvalidIdStrategy,
            format!("Sequential id cannot advance past {}", last),
        )
    }

    /// Create a not found error
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, what)
    }

    /// Create an unexpected table structure error
    pub fn unexpected_table_structure(missing_column: &str) -> Self {
        Self::new(
            ErrorCode::UnexpectedTableStructure,
            format!("Table has no '{}' column", missing_column),
        )
    }

    /// Create a lock timeout error
    pub fn timeout(waited_ms: u128) -> Self {
        Self::new(
            ErrorCode::Timeout,
            format!("Writer lock not acquired after {} ms", waited_ms),
        )
    }

    /// Create an internal error
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, reason)
    }

    /// Re-raise any error as `InternalError`, keeping the original message.
    ///
    /// The original code is kept as context.
    pub fn into_internal(self) -> Self {
        if self.code == ErrorCode::InternalError {
            return self;
        }
        Self {
            code: ErrorCode::InternalError,
            message: self.message,
            context: Some(format!("caused by {}", self.code)),
        }
    }

    /// Attach context (sheet name, field, ...)
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Returns the error code
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the context if any
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    /// Returns the status number of the error kind
    pub fn status_code(&self) -> u16 {
        self.code.status_code()
    }
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(ref context) = self.context {
            write!(f, " ({})", context)?;
        }
        Ok(())
    }
}

impl std::error::Error for DbError {}

impl From<StoreError> for DbError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::StoreNotFound(_) | StoreError::SheetNotFound { .. } => {
                DbError::not_found(err.to_string())
            }
            other => DbError::internal(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for DbError {
    fn from(e: serde_json::Error) -> Self {
        DbError::missing_or_wrong_params(e.to_string())
    }
}

/// Result type for engine operations
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            ErrorCode::MissingOrWrongParams.code(),
            "MISSING_OR_WRONG_PARAMS"
        );
        assert_eq!(ErrorCode::NotFound.code(), "NOT_FOUND");
        assert_eq!(ErrorCode::Timeout.code(), "TIMEOUT");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ErrorCode::NotFound.status_code(), 404);
        assert_eq!(ErrorCode::InvalidOperator.status_code(), 422);
        assert_eq!(ErrorCode::AmbiguousOrMissingField.status_code(), 422);
        assert_eq!(ErrorCode::Timeout.status_code(), 500);
        assert_eq!(ErrorCode::UnexpectedTableStructure.status_code(), 500);
    }

    #[test]
    fn test_param_family() {
        assert!(ErrorCode::InvalidIdStrategy.is_param_error());
        assert!(!ErrorCode::InternalError.is_param_error());
        assert!(!ErrorCode::NotFound.is_param_error());
    }

    #[test]
    fn test_into_internal_keeps_message() {
        let err = DbError::not_found("sheet users").into_internal();
        assert_eq!(err.code(), ErrorCode::InternalError);
        assert_eq!(err.message(), "sheet users");
        assert_eq!(err.context(), Some("caused by NOT_FOUND"));
    }

    #[test]
    fn test_display() {
        let err = DbError::invalid_operator("~~");
        let display = format!("{}", err);
        assert!(display.contains("INVALID_OPERATOR"));
        assert!(display.contains("~~"));
    }

    #[test]
    fn test_store_error_conversion() {
        let err: DbError = StoreError::SheetNotFound {
            store_id: "s1".into(),
            sheet: "users".into(),
        }
        .into();
        assert_eq!(err.code(), ErrorCode::NotFound);

        let err: DbError = StoreError::RowOutOfRange(9).into();
        assert_eq!(err.code(), ErrorCode::InternalError);
    }
}
