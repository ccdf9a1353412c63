use thiserror::Error;

use labstock_auth::AuthzError;

use crate::command_dispatcher::DispatchError;

/// Workflow-level error taxonomy. Each variant maps to one HTTP status.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StockError {
    #[error("unauthorized: {0}")]
    Authorization(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(String),

    /// Request or order already decided.
    #[error("invalid state: {0}")]
    State(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl StockError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Stable machine-readable code used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            StockError::Authorization(_) => "unauthorized",
            StockError::NotFound(_) => "not_found",
            StockError::Validation(_) => "validation_error",
            StockError::State(_) => "invalid_state",
            StockError::Conflict(_) => "conflict",
            StockError::Persistence(_) => "internal_error",
        }
    }
}

impl From<DispatchError> for StockError {
    fn from(value: DispatchError) -> Self {
        match value {
            DispatchError::Validation(msg) => StockError::Validation(msg),
            DispatchError::InvalidState(msg) => StockError::State(msg),
            DispatchError::Conflict(msg) => StockError::Conflict(msg),
            DispatchError::Concurrency(msg) => StockError::Conflict(format!("concurrent update, retry: {msg}")),
            DispatchError::NotFound => StockError::NotFound("resource".to_string()),
            other @ (DispatchError::InvariantViolation(_)
            | DispatchError::StreamIntegrity(_)
            | DispatchError::Deserialize(_)
            | DispatchError::Store(_)
            | DispatchError::Publish(_)) => StockError::Persistence(other.to_string()),
        }
    }
}

impl From<AuthzError> for StockError {
    fn from(value: AuthzError) -> Self {
        StockError::Authorization(value.to_string())
    }
}

/// Attach a resource name to a bare `NotFound`.
pub(crate) trait NotFoundContext<T> {
    fn or_not_found(self, what: &str) -> Result<T, StockError>;
}

impl<T> NotFoundContext<T> for Result<T, DispatchError> {
    fn or_not_found(self, what: &str) -> Result<T, StockError> {
        self.map_err(|err| match err {
            DispatchError::NotFound => StockError::not_found(what),
            other => StockError::from(other),
        })
    }
}
