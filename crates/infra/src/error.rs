//! Infrastructure and operation-level error types.
//!
//! ```text
//! StoreError ──► CommitError ──► OperationError ──► ErrorBody (caller-facing)
//!                    ▲
//! DomainError ───────┘
//! ```

use thiserror::Error;

use corebank_core::{DomainError, ErrorBody};

/// Failure reported by a `BankStore`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Optimistic version mismatch on an update or delete.
    #[error("concurrency conflict: {0}")]
    Conflict(String),

    /// A unique index (account number, transaction reference, active rule) was violated.
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    /// A referenced row is missing, or a delete is restricted by dependent rows.
    #[error("foreign key constraint violated: {0}")]
    ForeignKey(String),

    #[error("record not found: {0}")]
    NotFound(String),

    /// Connectivity failure or poisoned lock.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for DomainError {
    fn from(value: StoreError) -> Self {
        match value {
            // Both are resolved by re-reading state and trying again.
            StoreError::Conflict(msg) | StoreError::UniqueViolation(msg) => {
                DomainError::Conflict(msg)
            }
            StoreError::ForeignKey(msg) => DomainError::Validation(msg),
            StoreError::NotFound(msg) => DomainError::NotFound(msg),
            StoreError::Unavailable(msg) => DomainError::InvalidState(msg),
        }
    }
}

/// Failure of the commit pipeline.
#[derive(Debug, Error)]
pub enum CommitError {
    /// Nothing was written.
    #[error(transparent)]
    Business(#[from] DomainError),

    /// Business data is durable but its audit rows could not be written.
    #[error("business data committed but audit write failed: {source}")]
    AuditWrite {
        #[source]
        source: StoreError,
    },

    /// Cancelled before the store was touched.
    #[error("commit cancelled")]
    Cancelled,
}

/// Result type returned by every mutating core operation.
pub type OperationResult<T> = Result<T, OperationError>;

/// What a caller of a core operation sees.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OperationError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The operation's effects are committed; only its audit trail is missing.
    #[error("operation committed but audit write failed: {0}")]
    AuditWrite(String),

    #[error("operation cancelled before commit")]
    Cancelled,
}

impl From<CommitError> for OperationError {
    fn from(value: CommitError) -> Self {
        match value {
            CommitError::Business(e) => OperationError::Domain(e),
            CommitError::AuditWrite { source } => OperationError::AuditWrite(source.to_string()),
            CommitError::Cancelled => OperationError::Cancelled,
        }
    }
}

impl OperationError {
    pub fn code(&self) -> &'static str {
        match self {
            OperationError::Domain(e) => e.code(),
            OperationError::AuditWrite(_) => "audit_write_failed",
            OperationError::Cancelled => "cancelled",
        }
    }

    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            OperationError::Domain(e) => Some(e),
            _ => None,
        }
    }

    pub fn to_body(&self, diagnostics: bool) -> ErrorBody {
        match self {
            OperationError::Domain(e) => e.to_body(diagnostics),
            OperationError::AuditWrite(detail) => ErrorBody {
                code: self.code().to_string(),
                message: "operation completed but could not be audited".to_string(),
                details: diagnostics.then(|| detail.clone()),
            },
            OperationError::Cancelled => ErrorBody {
                code: self.code().to_string(),
                message: self.to_string(),
                details: None,
            },
        }
    }
}
