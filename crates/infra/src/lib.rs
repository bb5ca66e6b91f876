//! Banking core services: accounts, ledger, interest, audit and the transactional outbox.
//!
//! Every write goes through [`database::Database`], which commits a [`UnitOfWork`] as one
//! atomic batch, records its audit trail and delivers its events.

pub mod account_store;
pub mod audit;
pub mod bank;
pub mod cipher;
pub mod config;
pub mod context;
pub mod database;
pub mod error;
pub mod interest_engine;
pub mod interest_rules;
pub mod ledger;
pub mod outbox;
pub mod queries;
pub mod retry;
pub mod store;
pub mod unit_of_work;
pub mod workers;

#[cfg(test)]
mod integration_tests;

pub use account_store::{AccountStore, OpenedAccount};
pub use audit::{AuditRecorder, PendingAudit};
pub use bank::CoreBank;
pub use cipher::AccountNumberCipher;
pub use config::{ConfigError, CoreConfig, EncryptionConfig};
pub use context::OperationContext;
pub use database::Database;
pub use error::{CommitError, OperationError, OperationResult, StoreError};
pub use interest_engine::{InterestAccrualEngine, InterestRun};
pub use interest_rules::InterestRuleStore;
pub use ledger::TransactionLedger;
pub use outbox::{InMemoryOwnerDirectory, OutboxDispatcher, OutboxRecord, OwnerDirectory};
pub use queries::BankQueries;
pub use retry::{BackoffStrategy, RetryPolicy};
pub use store::{BankStore, CommitReceipt, InMemoryBankStore, WriteBatch};
pub use unit_of_work::UnitOfWork;
pub use workers::{EventSubscriberWorker, InterestScheduler, OutboxRelay, WorkerHandle};
