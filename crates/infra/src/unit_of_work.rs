//! Explicit change set for one business operation.
//!
//! Operations record what they intend to write (with the state they read it from); the
//! commit pipeline derives both the store batch and the audit diff from the same record,
//! so an operation cannot write without being audited.

use std::collections::HashMap;

use corebank_banking::{
    Account, AuditContext, EntityChange, InterestRule, ScheduledInterest, Transaction,
};
use corebank_core::{AccountId, AggregateRoot, ExpectedVersion, InterestRuleId};
use corebank_events::BankingEvent;

use crate::outbox::OutboxRecord;
use crate::store::{AccountWrite, WriteBatch};

#[derive(Debug, Clone)]
struct Modified<T> {
    before: T,
    after: T,
}

#[derive(Debug, Clone)]
pub struct UnitOfWork {
    context: AuditContext,
    account_inserts: Vec<Account>,
    account_updates: Vec<Modified<Account>>,
    account_update_index: HashMap<AccountId, usize>,
    account_deletes: Vec<Account>,
    transactions: Vec<Transaction>,
    rule_inserts: Vec<InterestRule>,
    rule_updates: Vec<Modified<InterestRule>>,
    rule_update_index: HashMap<InterestRuleId, usize>,
    scheduled_interest: Vec<ScheduledInterest>,
    events: Vec<BankingEvent>,
}

impl UnitOfWork {
    pub fn new(context: AuditContext) -> Self {
        Self {
            context,
            account_inserts: Vec::new(),
            account_updates: Vec::new(),
            account_update_index: HashMap::new(),
            account_deletes: Vec::new(),
            transactions: Vec::new(),
            rule_inserts: Vec::new(),
            rule_updates: Vec::new(),
            rule_update_index: HashMap::new(),
            scheduled_interest: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn context(&self) -> &AuditContext {
        &self.context
    }

    pub fn add_account(&mut self, account: Account) {
        self.account_inserts.push(account);
    }

    /// Record a new state for an account read as `before`.
    ///
    /// Repeated updates of the same account collapse into one write guarded by the first
    /// observed version.
    pub fn update_account(&mut self, before: &Account, after: Account) {
        let id = after.id_typed();
        match self.account_update_index.get(&id) {
            Some(&i) => self.account_updates[i].after = after,
            None => {
                self.account_update_index
                    .insert(id, self.account_updates.len());
                self.account_updates.push(Modified {
                    before: before.clone(),
                    after,
                });
            }
        }
    }

    /// The pending state of an account in this unit of work, if it was updated.
    pub fn pending_account(&self, id: AccountId) -> Option<&Account> {
        self.account_update_index
            .get(&id)
            .map(|&i| &self.account_updates[i].after)
    }

    pub fn remove_account(&mut self, account: Account) {
        self.account_deletes.push(account);
    }

    pub fn record_transaction(&mut self, transaction: Transaction) {
        self.transactions.push(transaction);
    }

    pub fn add_rule(&mut self, rule: InterestRule) {
        self.rule_inserts.push(rule);
    }

    pub fn update_rule(&mut self, before: &InterestRule, after: InterestRule) {
        let id = after.id_typed();
        match self.rule_update_index.get(&id) {
            Some(&i) => self.rule_updates[i].after = after,
            None => {
                self.rule_update_index.insert(id, self.rule_updates.len());
                self.rule_updates.push(Modified {
                    before: before.clone(),
                    after,
                });
            }
        }
    }

    pub fn record_scheduled_interest(&mut self, accrual: ScheduledInterest) {
        self.scheduled_interest.push(accrual);
    }

    /// Queue an event; it is written to the outbox in the same commit.
    pub fn publish(&mut self, event: BankingEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[BankingEvent] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.account_inserts.is_empty()
            && self.account_updates.is_empty()
            && self.account_deletes.is_empty()
            && self.transactions.is_empty()
            && self.rule_inserts.is_empty()
            && self.rule_updates.is_empty()
            && self.scheduled_interest.is_empty()
            && self.events.is_empty()
    }

    /// Every audited mutation in this unit of work, in a stable order.
    pub(crate) fn changes(&self) -> Vec<EntityChange> {
        let mut changes = Vec::new();
        changes.extend(self.account_inserts.iter().map(EntityChange::added));
        changes.extend(
            self.account_updates
                .iter()
                .map(|m| EntityChange::modified(&m.before, &m.after)),
        );
        changes.extend(self.account_deletes.iter().map(EntityChange::deleted));
        changes.extend(self.transactions.iter().map(EntityChange::added));
        changes.extend(self.rule_inserts.iter().map(EntityChange::added));
        changes.extend(
            self.rule_updates
                .iter()
                .map(|m| EntityChange::modified(&m.before, &m.after)),
        );
        changes.extend(self.scheduled_interest.iter().map(EntityChange::added));
        changes
    }

    pub(crate) fn into_batch(self) -> WriteBatch {
        let account_updates = self
            .account_updates
            .into_iter()
            .map(|m| AccountWrite {
                expected: ExpectedVersion::Exact(m.before.version()),
                account: m.after,
            })
            .collect();
        let account_deletes = self
            .account_deletes
            .into_iter()
            .map(|a| AccountWrite {
                expected: ExpectedVersion::Exact(a.version()),
                account: a,
            })
            .collect();

        WriteBatch::new(
            self.account_inserts,
            account_updates,
            account_deletes,
            self.transactions,
            self.rule_inserts,
            self.rule_updates.into_iter().map(|m| m.after).collect(),
            self.scheduled_interest,
            self.events.into_iter().map(OutboxRecord::pending).collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use corebank_banking::{AuditAction, EncodedAccountNumber};
    use corebank_core::{Currency, Money, UserId};
    use rust_decimal_macros::dec;

    fn account() -> Account {
        Account::open(
            UserId::new(),
            EncodedAccountNumber::new("enc"),
            Currency::parse("EGP").unwrap(),
            dec!(10),
            Utc::now(),
        )
        .unwrap()
        .committed_at_version(4)
    }

    #[test]
    fn repeated_updates_collapse_into_one_guarded_write() {
        let original = account();
        let mut uow = UnitOfWork::new(AuditContext::anonymous());

        let mut first = original.clone();
        first.credit(Money::positive(dec!(1)).unwrap()).unwrap();
        uow.update_account(&original, first.clone());

        let mut second = first.clone();
        second.credit(Money::positive(dec!(2)).unwrap()).unwrap();
        uow.update_account(&first, second);

        assert_eq!(
            uow.pending_account(original.id_typed()).unwrap().balance().value(),
            dec!(13)
        );

        let changes = uow.changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].action(), AuditAction::Modified);

        let batch = uow.into_batch();
        assert_eq!(batch.account_updates().len(), 1);
        assert_eq!(batch.account_updates()[0].expected, ExpectedVersion::Exact(4));
    }

    #[test]
    fn events_become_outbox_rows() {
        let mut uow = UnitOfWork::new(AuditContext::anonymous());
        assert!(uow.is_empty());
        uow.publish(BankingEvent::BalanceChanged(corebank_events::BalanceChanged {
            user_id: UserId::new(),
            email: None,
            account_id: AccountId::new(),
            amount_changed: dec!(1),
            new_balance: dec!(1),
            reason: "Deposit".to_string(),
            occurred_at: Utc::now(),
        }));
        assert!(uow.changes().is_empty());
        assert_eq!(uow.into_batch().outbox().len(), 1);
    }
}
