//! Audit recorder: turns a unit of work into audit rows at the commit boundary.
//!
//! Capture happens before the business batch is applied (the diff needs the
//! pre-commit state); identifiers the store assigns during the commit are resolved into
//! the captured rows afterwards, and the rows are appended in a follow-up write.

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tracing::debug;

use corebank_banking::{AuditEntry, Transaction};
use corebank_core::Audited;

use crate::error::StoreError;
use crate::store::{BankStore, CommitReceipt};
use crate::unit_of_work::UnitOfWork;

/// Audit rows captured for one commit, awaiting commit-assigned identifiers.
#[derive(Debug, Clone, Default)]
pub struct PendingAudit {
    entries: Vec<AuditEntry>,
}

impl PendingAudit {
    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct AuditRecorder<S> {
    store: S,
}

impl<S: BankStore> AuditRecorder<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Diff every audited entity in the unit of work. Entities without a net change
    /// produce no row.
    pub fn capture(&self, uow: &UnitOfWork, now: DateTime<Utc>) -> PendingAudit {
        let entries = uow
            .changes()
            .into_iter()
            .filter_map(|change| change.into_entry(uow.context(), now))
            .collect();
        PendingAudit { entries }
    }

    /// Resolve commit-assigned identifiers and append the rows. Returns how many were
    /// written.
    pub fn persist(
        &self,
        mut pending: PendingAudit,
        receipt: &CommitReceipt,
    ) -> Result<usize, StoreError> {
        if pending.is_empty() {
            return Ok(0);
        }

        for entry in &mut pending.entries {
            if entry.entity_type != Transaction::ENTITY_TYPE {
                continue;
            }
            let sequence = receipt
                .transaction_sequences
                .iter()
                .find(|(id, _)| id.to_string() == entry.entity_id)
                .map(|(_, seq)| *seq);
            if let Some(sequence) = sequence {
                entry.resolve_committed_field("Sequence", JsonValue::from(sequence));
            }
        }

        let ids = self.store.append_audit(pending.entries)?;
        debug!(rows = ids.len(), "audit rows appended");
        Ok(ids.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use corebank_banking::{Account, AuditAction, AuditContext, EncodedAccountNumber};
    use corebank_core::{Currency, Money, PageRequest, UserId};
    use rust_decimal_macros::dec;

    use crate::store::InMemoryBankStore;

    #[test]
    fn transaction_rows_carry_the_committed_sequence() {
        let store = Arc::new(InMemoryBankStore::new());
        let recorder = AuditRecorder::new(store.clone());
        let owner = UserId::new();
        let account = Account::open(
            owner,
            EncodedAccountNumber::new("enc"),
            Currency::parse("EGP").unwrap(),
            dec!(0),
            Utc::now(),
        )
        .unwrap();
        let tx = Transaction::deposit(
            account.id_typed(),
            Money::positive(dec!(5)).unwrap(),
            None,
            owner,
            Utc::now(),
        )
        .unwrap();

        let mut uow = UnitOfWork::new(AuditContext::for_user(owner));
        uow.add_account(account);
        uow.record_transaction(tx);

        let pending = recorder.capture(&uow, Utc::now());
        assert_eq!(pending.entries().len(), 2);
        assert!(
            pending
                .entries()
                .iter()
                .all(|e| e.action == AuditAction::Added)
        );

        let receipt = store.apply(uow.into_batch()).unwrap();
        assert_eq!(recorder.persist(pending, &receipt).unwrap(), 2);

        let log = store.audit_log(PageRequest::new(1, 10).unwrap()).unwrap();
        let tx_row = log
            .items
            .iter()
            .find(|e| e.entity_type == "Transaction")
            .unwrap();
        assert_eq!(tx_row.new_values["Sequence"], JsonValue::from(1u64));
        assert!(tx_row.id.is_some());
    }
}
