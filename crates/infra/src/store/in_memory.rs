use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use uuid::Uuid;

use corebank_banking::{
    Account, AuditEntry, EncodedAccountNumber, InterestRule, ScheduledInterest, Transaction,
};
use corebank_core::{
    AccountId, AggregateRoot, Currency, InterestRuleId, Page, PageRequest, TransactionId, UserId,
};

use super::{BankStore, CommitReceipt, WriteBatch};
use crate::error::StoreError;
use crate::outbox::OutboxRecord;

#[derive(Debug, Default)]
struct State {
    accounts: HashMap<AccountId, Account>,
    account_numbers: HashMap<EncodedAccountNumber, AccountId>,
    /// Ledger order; position `i` holds sequence `i + 1`.
    transactions: Vec<Transaction>,
    transaction_index: HashMap<TransactionId, usize>,
    references: HashSet<String>,
    rules: HashMap<InterestRuleId, InterestRule>,
    scheduled: Vec<ScheduledInterest>,
    audit: Vec<AuditEntry>,
    outbox: Vec<OutboxRecord>,
}

/// In-memory store with the constraints of the relational layout: unique account number
/// index, restricted deletes, append-only ledger and audit log.
///
/// Intended for tests/dev. A single writer lock makes `apply` atomic.
#[derive(Debug, Default)]
pub struct InMemoryBankStore {
    state: RwLock<State>,
}

impl InMemoryBankStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
    }
}

impl State {
    /// Check every constraint the batch touches without mutating anything.
    fn validate(&self, batch: &WriteBatch) -> Result<(), StoreError> {
        let deleted: HashSet<AccountId> =
            batch.account_deletes().iter().map(|w| w.account.id_typed()).collect();
        let inserted: HashSet<AccountId> =
            batch.account_inserts().iter().map(|a| a.id_typed()).collect();
        let account_exists = |id: AccountId| {
            (self.accounts.contains_key(&id) && !deleted.contains(&id)) || inserted.contains(&id)
        };

        let mut new_numbers = HashSet::new();
        for account in batch.account_inserts() {
            if self.accounts.contains_key(&account.id_typed()) {
                return Err(StoreError::UniqueViolation(format!(
                    "account {} already exists",
                    account.id_typed()
                )));
            }
            let number = account.account_number();
            if self.account_numbers.contains_key(number) || !new_numbers.insert(number.clone()) {
                return Err(StoreError::UniqueViolation(
                    "account number already in use".to_string(),
                ));
            }
        }

        for write in batch.account_updates().iter().chain(batch.account_deletes()) {
            let id = write.account.id_typed();
            let current = self
                .accounts
                .get(&id)
                .ok_or_else(|| StoreError::NotFound(format!("account {id}")))?;
            if !write.expected.matches(current.version()) {
                return Err(StoreError::Conflict(format!(
                    "account {id}: expected {:?}, found {}",
                    write.expected,
                    current.version()
                )));
            }
        }

        for write in batch.account_updates() {
            let id = write.account.id_typed();
            if let Some(owner) = self.account_numbers.get(write.account.account_number()) {
                if *owner != id {
                    return Err(StoreError::UniqueViolation(
                        "account number already in use".to_string(),
                    ));
                }
            }
        }

        for write in batch.account_deletes() {
            let id = write.account.id_typed();
            if self.transactions.iter().any(|t| t.involves(id))
                || batch.transactions().iter().any(|t| t.involves(id))
            {
                return Err(StoreError::ForeignKey(format!(
                    "account {id} is referenced by transactions"
                )));
            }
            if self.scheduled.iter().any(|s| s.account_id() == id)
                || batch.scheduled_interest().iter().any(|s| s.account_id() == id)
            {
                return Err(StoreError::ForeignKey(format!(
                    "account {id} is referenced by applied interest"
                )));
            }
        }

        let mut new_references = HashSet::new();
        for tx in batch.transactions() {
            if self.transaction_index.contains_key(&tx.id_typed()) {
                return Err(StoreError::UniqueViolation(format!(
                    "transaction {} already exists",
                    tx.id_typed()
                )));
            }
            let reference = tx.reference().as_str();
            if self.references.contains(reference) || !new_references.insert(reference) {
                return Err(StoreError::UniqueViolation(format!(
                    "transaction reference {reference} already used"
                )));
            }
            for side in [tx.from_account_id(), tx.to_account_id()].into_iter().flatten() {
                if !account_exists(side) {
                    return Err(StoreError::ForeignKey(format!(
                        "transaction references missing account {side}"
                    )));
                }
            }
        }

        let mut rules = self.rules.clone();
        for rule in batch.rule_updates() {
            if !rules.contains_key(&rule.id_typed()) {
                return Err(StoreError::NotFound(format!("interest rule {}", rule.id_typed())));
            }
            rules.insert(rule.id_typed(), rule.clone());
        }
        for rule in batch.rule_inserts() {
            if rules.insert(rule.id_typed(), rule.clone()).is_some() {
                return Err(StoreError::UniqueViolation(format!(
                    "interest rule {} already exists",
                    rule.id_typed()
                )));
            }
        }
        let mut active_per_currency: HashMap<&Currency, usize> = HashMap::new();
        for rule in rules.values().filter(|r| r.is_active()) {
            let count = active_per_currency.entry(rule.currency()).or_default();
            *count += 1;
            if *count > 1 {
                return Err(StoreError::UniqueViolation(format!(
                    "an active interest rule for {} already exists",
                    rule.currency()
                )));
            }
        }

        for (i, accrual) in batch.scheduled_interest().iter().enumerate() {
            if !account_exists(accrual.account_id()) {
                return Err(StoreError::ForeignKey(format!(
                    "applied interest references missing account {}",
                    accrual.account_id()
                )));
            }
            let Some(rule) = rules.get(&accrual.rule_id()) else {
                return Err(StoreError::ForeignKey(format!(
                    "applied interest references missing rule {}",
                    accrual.rule_id()
                )));
            };
            // One accrual per (account, rule, compounding period).
            let same_series = |s: &&ScheduledInterest| {
                s.account_id() == accrual.account_id() && s.rule_id() == accrual.rule_id()
            };
            let latest = self
                .scheduled
                .iter()
                .chain(&batch.scheduled_interest()[..i])
                .filter(same_series)
                .map(ScheduledInterest::applied_at)
                .max();
            if !rule.compounding().is_due(latest, accrual.applied_at()) {
                return Err(StoreError::UniqueViolation(format!(
                    "interest for account {} under rule {} already applied this period",
                    accrual.account_id(),
                    accrual.rule_id()
                )));
            }
        }

        Ok(())
    }

    fn commit(&mut self, batch: WriteBatch) -> CommitReceipt {
        let mut receipt = CommitReceipt::default();

        for account in batch.account_inserts() {
            let account = account.clone().committed_at_version(1);
            receipt.account_versions.insert(account.id_typed(), 1);
            self.account_numbers
                .insert(account.account_number().clone(), account.id_typed());
            self.accounts.insert(account.id_typed(), account);
        }

        for write in batch.account_updates() {
            let id = write.account.id_typed();
            let next = self.accounts.get(&id).map(|a| a.version() + 1).unwrap_or(1);
            if let Some(previous) = self.accounts.get(&id) {
                self.account_numbers.remove(previous.account_number());
            }
            let account = write.account.clone().committed_at_version(next);
            receipt.account_versions.insert(id, next);
            self.account_numbers
                .insert(account.account_number().clone(), id);
            self.accounts.insert(id, account);
        }

        for write in batch.account_deletes() {
            if let Some(removed) = self.accounts.remove(&write.account.id_typed()) {
                self.account_numbers.remove(removed.account_number());
            }
        }

        for tx in batch.transactions() {
            let sequence = self.transactions.len() as u64 + 1;
            let tx = tx.clone().committed_at_sequence(sequence);
            receipt.transaction_sequences.insert(tx.id_typed(), sequence);
            self.references.insert(tx.reference().as_str().to_string());
            self.transaction_index
                .insert(tx.id_typed(), self.transactions.len());
            self.transactions.push(tx);
        }

        for rule in batch.rule_inserts().iter().chain(batch.rule_updates()) {
            self.rules.insert(rule.id_typed(), rule.clone());
        }

        self.scheduled
            .extend(batch.scheduled_interest().iter().cloned());

        let recorded_at = Utc::now();
        for record in batch.outbox() {
            let sequence = self.outbox.len() as u64 + 1;
            receipt.outbox_sequences.insert(record.id, sequence);
            self.outbox
                .push(record.clone().committed(sequence, recorded_at));
        }

        receipt
    }
}

fn newest_first<T: Clone>(items: &[T], page: PageRequest) -> Page<T> {
    page.paginate(items.iter().rev().cloned().collect())
}

impl BankStore for InMemoryBankStore {
    fn account(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        Ok(self.read()?.accounts.get(&id).cloned())
    }

    fn account_by_number(
        &self,
        number: &EncodedAccountNumber,
    ) -> Result<Option<Account>, StoreError> {
        let state = self.read()?;
        Ok(state
            .account_numbers
            .get(number)
            .and_then(|id| state.accounts.get(id))
            .cloned())
    }

    fn accounts_owned_by(&self, owner: UserId) -> Result<Vec<Account>, StoreError> {
        let state = self.read()?;
        let mut owned: Vec<Account> = state
            .accounts
            .values()
            .filter(|a| a.owner_id() == owner)
            .cloned()
            .collect();
        owned.sort_by_key(|a| (a.created_at(), a.id_typed()));
        Ok(owned)
    }

    fn active_accounts_in(&self, currency: &Currency) -> Result<Vec<Account>, StoreError> {
        let state = self.read()?;
        let mut accounts: Vec<Account> = state
            .accounts
            .values()
            .filter(|a| a.is_active() && a.currency() == currency)
            .cloned()
            .collect();
        accounts.sort_by_key(|a| (a.created_at(), a.id_typed()));
        Ok(accounts)
    }

    fn transaction(&self, id: TransactionId) -> Result<Option<Transaction>, StoreError> {
        let state = self.read()?;
        Ok(state
            .transaction_index
            .get(&id)
            .and_then(|i| state.transactions.get(*i))
            .cloned())
    }

    fn transactions_for(
        &self,
        account: AccountId,
        page: PageRequest,
    ) -> Result<Page<Transaction>, StoreError> {
        let state = self.read()?;
        let involved: Vec<Transaction> = state
            .transactions
            .iter()
            .filter(|t| t.involves(account))
            .cloned()
            .collect();
        Ok(newest_first(&involved, page))
    }

    fn interest_rule(&self, id: InterestRuleId) -> Result<Option<InterestRule>, StoreError> {
        Ok(self.read()?.rules.get(&id).cloned())
    }

    fn interest_rules(&self) -> Result<Vec<InterestRule>, StoreError> {
        let mut rules: Vec<InterestRule> = self.read()?.rules.values().cloned().collect();
        rules.sort_by_key(|r| (r.created_at(), r.id_typed()));
        Ok(rules)
    }

    fn latest_scheduled_interest(
        &self,
        account: AccountId,
        rule: InterestRuleId,
    ) -> Result<Option<ScheduledInterest>, StoreError> {
        let state = self.read()?;
        Ok(state
            .scheduled
            .iter()
            .filter(|s| s.account_id() == account && s.rule_id() == rule)
            .max_by_key(|s| s.applied_at())
            .cloned())
    }

    fn scheduled_interest(&self, page: PageRequest) -> Result<Page<ScheduledInterest>, StoreError> {
        Ok(newest_first(&self.read()?.scheduled, page))
    }

    fn apply(&self, batch: WriteBatch) -> Result<CommitReceipt, StoreError> {
        if batch.is_empty() {
            return Ok(CommitReceipt::default());
        }

        let mut state = self.write()?;
        state.validate(&batch)?;
        Ok(state.commit(batch))
    }

    fn append_audit(&self, entries: Vec<AuditEntry>) -> Result<Vec<u64>, StoreError> {
        let mut state = self.write()?;
        let mut ids = Vec::with_capacity(entries.len());
        for mut entry in entries {
            let id = state.audit.len() as u64 + 1;
            entry.id = Some(id);
            state.audit.push(entry);
            ids.push(id);
        }
        Ok(ids)
    }

    fn audit_log(&self, page: PageRequest) -> Result<Page<AuditEntry>, StoreError> {
        Ok(newest_first(&self.read()?.audit, page))
    }

    fn pending_outbox(&self, limit: usize) -> Result<Vec<OutboxRecord>, StoreError> {
        Ok(self
            .read()?
            .outbox
            .iter()
            .filter(|r| !r.is_dispatched())
            .take(limit)
            .cloned()
            .collect())
    }

    fn mark_dispatched(&self, ids: &[Uuid]) -> Result<(), StoreError> {
        let wanted: HashSet<&Uuid> = ids.iter().collect();
        let now = Utc::now();
        let mut state = self.write()?;
        for record in state.outbox.iter_mut().filter(|r| wanted.contains(&r.id)) {
            record.mark_dispatched(now);
        }
        Ok(())
    }
}
