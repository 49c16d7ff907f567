use thiserror::Error;

use stockledger_core::{DomainError, ErrorKind};

use crate::store::StoreError;

/// Service-level error: a deterministic domain rejection or a storage failure.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Optimistic retries exhausted under sustained contention.
    #[error("gave up after {attempts} attempts: {last}")]
    Contention { attempts: u32, last: String },
}

/// Broad class of a service error, used by transports to pick a status.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorClass {
    Domain(ErrorKind),
    Conflict,
    Storage,
}

impl LedgerError {
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::Domain(e) => e.code(),
            LedgerError::Store(StoreError::Concurrency(_))
            | LedgerError::Store(StoreError::DuplicateOperation(_))
            | LedgerError::Store(StoreError::Duplicate(_))
            | LedgerError::Contention { .. } => "CONFLICT",
            LedgerError::Store(StoreError::Corrupt(_)) | LedgerError::Store(StoreError::Backend(_)) => {
                "STORAGE"
            }
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            LedgerError::Domain(e) => ErrorClass::Domain(e.kind()),
            LedgerError::Store(StoreError::Corrupt(_)) | LedgerError::Store(StoreError::Backend(_)) => {
                ErrorClass::Storage
            }
            LedgerError::Store(_) | LedgerError::Contention { .. } => ErrorClass::Conflict,
        }
    }

    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            LedgerError::Domain(e) => Some(e),
            _ => None,
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
