//! Storage abstraction for accounts, ledger records, interest, audit and outbox rows.
//!
//! Writes go through exactly one entry point, [`BankStore::apply`], which takes a
//! [`WriteBatch`]. A batch can only be assembled by a `UnitOfWork` inside this crate, so
//! every business mutation passes through the commit pipeline (and thus the audit
//! recorder). The audit log has its own append-only entry point because it is written
//! after the business commit.

mod in_memory;

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use corebank_banking::{
    Account, AuditEntry, EncodedAccountNumber, InterestRule, ScheduledInterest, Transaction,
};
use corebank_core::{
    AccountId, Currency, ExpectedVersion, InterestRuleId, Page, PageRequest, TransactionId, UserId,
};

use crate::error::StoreError;
use crate::outbox::OutboxRecord;

pub use in_memory::InMemoryBankStore;

/// An account row to update, guarded by the version observed when it was read.
#[derive(Debug, Clone)]
pub struct AccountWrite {
    pub account: Account,
    pub expected: ExpectedVersion,
}

/// An atomic set of writes.
///
/// Stores must apply all of it or none of it.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    account_inserts: Vec<Account>,
    account_updates: Vec<AccountWrite>,
    account_deletes: Vec<AccountWrite>,
    transactions: Vec<Transaction>,
    rule_inserts: Vec<InterestRule>,
    rule_updates: Vec<InterestRule>,
    scheduled_interest: Vec<ScheduledInterest>,
    outbox: Vec<OutboxRecord>,
}

impl WriteBatch {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        account_inserts: Vec<Account>,
        account_updates: Vec<AccountWrite>,
        account_deletes: Vec<AccountWrite>,
        transactions: Vec<Transaction>,
        rule_inserts: Vec<InterestRule>,
        rule_updates: Vec<InterestRule>,
        scheduled_interest: Vec<ScheduledInterest>,
        outbox: Vec<OutboxRecord>,
    ) -> Self {
        Self {
            account_inserts,
            account_updates,
            account_deletes,
            transactions,
            rule_inserts,
            rule_updates,
            scheduled_interest,
            outbox,
        }
    }

    pub fn account_inserts(&self) -> &[Account] {
        &self.account_inserts
    }

    pub fn account_updates(&self) -> &[AccountWrite] {
        &self.account_updates
    }

    pub fn account_deletes(&self) -> &[AccountWrite] {
        &self.account_deletes
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn rule_inserts(&self) -> &[InterestRule] {
        &self.rule_inserts
    }

    pub fn rule_updates(&self) -> &[InterestRule] {
        &self.rule_updates
    }

    pub fn scheduled_interest(&self) -> &[ScheduledInterest] {
        &self.scheduled_interest
    }

    pub fn outbox(&self) -> &[OutboxRecord] {
        &self.outbox
    }

    pub fn is_empty(&self) -> bool {
        self.account_inserts.is_empty()
            && self.account_updates.is_empty()
            && self.account_deletes.is_empty()
            && self.transactions.is_empty()
            && self.rule_inserts.is_empty()
            && self.rule_updates.is_empty()
            && self.scheduled_interest.is_empty()
            && self.outbox.is_empty()
    }
}

/// Identifiers assigned by the store while applying a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitReceipt {
    /// Ledger position of every inserted transaction.
    pub transaction_sequences: HashMap<TransactionId, u64>,
    /// New version of every inserted or updated account.
    pub account_versions: HashMap<AccountId, u64>,
    /// Outbox position of every enqueued event.
    pub outbox_sequences: HashMap<Uuid, u64>,
}

/// Persistence port for the banking core.
///
/// Listing methods return newest-first pages.
pub trait BankStore: Send + Sync {
    fn account(&self, id: AccountId) -> Result<Option<Account>, StoreError>;

    fn account_by_number(
        &self,
        number: &EncodedAccountNumber,
    ) -> Result<Option<Account>, StoreError>;

    /// Accounts owned by `owner`, oldest first.
    fn accounts_owned_by(&self, owner: UserId) -> Result<Vec<Account>, StoreError>;

    fn active_accounts_in(&self, currency: &Currency) -> Result<Vec<Account>, StoreError>;

    fn transaction(&self, id: TransactionId) -> Result<Option<Transaction>, StoreError>;

    fn transactions_for(
        &self,
        account: AccountId,
        page: PageRequest,
    ) -> Result<Page<Transaction>, StoreError>;

    fn interest_rule(&self, id: InterestRuleId) -> Result<Option<InterestRule>, StoreError>;

    fn interest_rules(&self) -> Result<Vec<InterestRule>, StoreError>;

    fn latest_scheduled_interest(
        &self,
        account: AccountId,
        rule: InterestRuleId,
    ) -> Result<Option<ScheduledInterest>, StoreError>;

    fn scheduled_interest(&self, page: PageRequest) -> Result<Page<ScheduledInterest>, StoreError>;

    /// Apply a batch atomically, checking versions and constraints first.
    fn apply(&self, batch: WriteBatch) -> Result<CommitReceipt, StoreError>;

    /// Append audit rows, returning the ids assigned to them in order.
    fn append_audit(&self, entries: Vec<AuditEntry>) -> Result<Vec<u64>, StoreError>;

    fn audit_log(&self, page: PageRequest) -> Result<Page<AuditEntry>, StoreError>;

    /// Undelivered outbox rows in commit order.
    fn pending_outbox(&self, limit: usize) -> Result<Vec<OutboxRecord>, StoreError>;

    /// Mark rows delivered. Delivered rows no longer carry plaintext account numbers.
    fn mark_dispatched(&self, ids: &[Uuid]) -> Result<(), StoreError>;
}

impl<S> BankStore for Arc<S>
where
    S: BankStore + ?Sized,
{
    fn account(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        (**self).account(id)
    }

    fn account_by_number(
        &self,
        number: &EncodedAccountNumber,
    ) -> Result<Option<Account>, StoreError> {
        (**self).account_by_number(number)
    }

    fn accounts_owned_by(&self, owner: UserId) -> Result<Vec<Account>, StoreError> {
        (**self).accounts_owned_by(owner)
    }

    fn active_accounts_in(&self, currency: &Currency) -> Result<Vec<Account>, StoreError> {
        (**self).active_accounts_in(currency)
    }

    fn transaction(&self, id: TransactionId) -> Result<Option<Transaction>, StoreError> {
        (**self).transaction(id)
    }

    fn transactions_for(
        &self,
        account: AccountId,
        page: PageRequest,
    ) -> Result<Page<Transaction>, StoreError> {
        (**self).transactions_for(account, page)
    }

    fn interest_rule(&self, id: InterestRuleId) -> Result<Option<InterestRule>, StoreError> {
        (**self).interest_rule(id)
    }

    fn interest_rules(&self) -> Result<Vec<InterestRule>, StoreError> {
        (**self).interest_rules()
    }

    fn latest_scheduled_interest(
        &self,
        account: AccountId,
        rule: InterestRuleId,
    ) -> Result<Option<ScheduledInterest>, StoreError> {
        (**self).latest_scheduled_interest(account, rule)
    }

    fn scheduled_interest(&self, page: PageRequest) -> Result<Page<ScheduledInterest>, StoreError> {
        (**self).scheduled_interest(page)
    }

    fn apply(&self, batch: WriteBatch) -> Result<CommitReceipt, StoreError> {
        (**self).apply(batch)
    }

    fn append_audit(&self, entries: Vec<AuditEntry>) -> Result<Vec<u64>, StoreError> {
        (**self).append_audit(entries)
    }

    fn audit_log(&self, page: PageRequest) -> Result<Page<AuditEntry>, StoreError> {
        (**self).audit_log(page)
    }

    fn pending_outbox(&self, limit: usize) -> Result<Vec<OutboxRecord>, StoreError> {
        (**self).pending_outbox(limit)
    }

    fn mark_dispatched(&self, ids: &[Uuid]) -> Result<(), StoreError> {
        (**self).mark_dispatched(ids)
    }
}
