//! Domain error model.

use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

/// Why an aggregate refused a command.
///
/// Only deterministic business outcomes live here. Storage, transport and
/// authorization failures belong to the layers that own them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Bad input: empty name, non-positive usage quantity, negative receipt.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The command does not fit the stream it was routed to.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// The request or order already left its open state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// The stream has no registered item, request or order.
    #[error("not found")]
    NotFound,

    /// Duplicate registration, an already applied reconciliation source or a
    /// stale expected version.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }
}
