//! Domain error model.

use rust_decimal::Decimal;
use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Coarse classification of a [`DomainError`].
///
/// Validation errors are client-caused and never retried automatically.
/// Conflicts are business-rule violations surfaced verbatim so the caller can
/// decide what to do next.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
}

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures. Storage
/// concerns belong to the infrastructure layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed request (missing field, unknown movement type, ...).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Quantity is zero, non-finite, unparsable or has the wrong sign.
    #[error("bad quantity: {0}")]
    BadQuantity(String),

    /// A referenced entity is unknown or a value failed validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A receiving line does not belong to the order or is malformed.
    #[error("invalid receiving line: {0}")]
    InvalidLine(String),

    /// An identifier could not be parsed.
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// An ISSUE would take a location's stock below zero.
    #[error("insufficient quantity: requested {requested}, available {available}")]
    InsufficientQuantity {
        requested: Decimal,
        available: Decimal,
    },

    #[error("purchase order not found")]
    OrderNotFound,

    #[error("purchase order is already closed")]
    OrderAlreadyClosed,

    #[error("discrepancy is already closed")]
    AlreadyClosed,

    /// A requested resource was not found.
    #[error("{0} not found")]
    NotFound(String),

    /// A state transition was not allowed or a concurrent writer won.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn bad_quantity(msg: impl Into<String>) -> Self {
        Self::BadQuantity(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_line(msg: impl Into<String>) -> Self {
        Self::InvalidLine(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn insufficient(requested: Decimal, available: Decimal) -> Self {
        Self::InsufficientQuantity {
            requested,
            available,
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Stable, wire-level error code.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::BadRequest(_) => "BAD_REQUEST",
            DomainError::BadQuantity(_) => "BAD_QTY",
            DomainError::Validation(_) => "VALIDATION",
            DomainError::InvalidLine(_) => "INVALID_LINE",
            DomainError::InvalidId(_) => "INVALID_ID",
            DomainError::InsufficientQuantity { .. } => "INSUFFICIENT_QTY",
            DomainError::OrderNotFound => "ORDER_NOT_FOUND",
            DomainError::OrderAlreadyClosed => "ORDER_ALREADY_CLOSED",
            DomainError::AlreadyClosed => "ALREADY_CLOSED",
            DomainError::NotFound(_) => "NOT_FOUND",
            DomainError::Conflict(_) => "CONFLICT",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::BadRequest(_)
            | DomainError::BadQuantity(_)
            | DomainError::Validation(_)
            | DomainError::InvalidLine(_)
            | DomainError::InvalidId(_) => ErrorKind::Validation,
            DomainError::InsufficientQuantity { .. }
            | DomainError::OrderAlreadyClosed
            | DomainError::AlreadyClosed
            | DomainError::Conflict(_) => ErrorKind::Conflict,
            DomainError::OrderNotFound | DomainError::NotFound(_) => ErrorKind::NotFound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_the_wire_taxonomy() {
        assert_eq!(DomainError::bad_quantity("zero").code(), "BAD_QTY");
        assert_eq!(
            DomainError::insufficient(Decimal::from(5), Decimal::from(4)).code(),
            "INSUFFICIENT_QTY"
        );
        assert_eq!(DomainError::OrderAlreadyClosed.code(), "ORDER_ALREADY_CLOSED");
    }

    #[test]
    fn insufficient_quantity_is_a_conflict() {
        let err = DomainError::insufficient(Decimal::from(31), Decimal::from(30));
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(
            err.to_string(),
            "insufficient quantity: requested 31, available 30"
        );
    }

    #[test]
    fn line_errors_are_client_errors() {
        assert_eq!(DomainError::invalid_line("x").kind(), ErrorKind::Validation);
        assert_eq!(DomainError::OrderNotFound.kind(), ErrorKind::NotFound);
    }
}
