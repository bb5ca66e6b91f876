//! Banking module (accounts, ledger records, interest, audit model).
//!
//! Pure domain logic only: no IO, no persistence concerns.

pub mod account;
pub mod audit;
pub mod interest;
pub mod transaction;

pub use account::{Account, AccountNumber, EncodedAccountNumber};
pub use audit::{AuditAction, AuditContext, AuditEntry, EntityChange};
pub use interest::{CompoundingPeriod, InterestRate, InterestRule, ScheduledInterest};
pub use transaction::{Transaction, TransactionKind, TransactionReference};
