//! Domain error model.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// This is the closed set of failures every core operation can report. Business-rule
/// violations (`Validation`, `NotFound`, `InsufficientFunds`) are returned to callers as
/// values so the collaborator layer can map them uniformly. `InvalidState` and `Crypto`
/// are fatal for the current operation and must never be retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed input (amount <= 0, bad currency code, missing field).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Account, rule or transaction is absent (or inactive).
    #[error("not found: {0}")]
    NotFound(String),

    /// A withdrawal or transfer exceeds the available balance.
    #[error("insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds {
        available: Decimal,
        requested: Decimal,
    },

    /// Optimistic version mismatch; the caller may retry.
    #[error("concurrency conflict: {0}")]
    Conflict(String),

    /// Stored data violates an invariant (data corruption, not user error).
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Cipher misconfiguration or decryption failure.
    #[error("crypto failure: {0}")]
    Crypto(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn insufficient_funds(available: Decimal, requested: Decimal) -> Self {
        Self::InsufficientFunds {
            available,
            requested,
        }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn crypto(msg: impl Into<String>) -> Self {
        Self::Crypto(msg.into())
    }

    /// Stable machine-readable code for this failure.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::Validation(_) => "validation_error",
            DomainError::NotFound(_) => "not_found",
            DomainError::InsufficientFunds { .. } => "insufficient_funds",
            DomainError::Conflict(_) => "concurrency_conflict",
            DomainError::InvalidState(_) => "invalid_state",
            DomainError::Crypto(_) => "crypto_error",
        }
    }

    /// Only optimistic conflicts are worth retrying; everything else is deterministic.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DomainError::Conflict(_))
    }

    /// Fatal failures indicate corruption or misconfiguration.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DomainError::InvalidState(_) | DomainError::Crypto(_))
    }

    /// Render a user-facing error body.
    ///
    /// Internal details of fatal errors are only exposed when `diagnostics` is set.
    pub fn to_body(&self, diagnostics: bool) -> ErrorBody {
        if self.is_fatal() {
            return ErrorBody {
                code: self.code().to_string(),
                message: "internal error".to_string(),
                details: diagnostics.then(|| self.to_string()),
            };
        }

        let details = match self {
            DomainError::InsufficientFunds {
                available,
                requested,
            } => Some(format!("available={available}, requested={requested}")),
            _ => None,
        };

        ErrorBody {
            code: self.code().to_string(),
            message: self.to_string(),
            details,
        }
    }
}

/// Serializable failure payload: stable code, safe message, optional details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}
