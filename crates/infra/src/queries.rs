//! Read-side queries. Listings are newest first.

use corebank_banking::{AuditEntry, ScheduledInterest, Transaction};
use corebank_core::{AccountId, DomainError, DomainResult, Page, PageRequest, TransactionId};

use crate::store::BankStore;

#[derive(Debug, Clone)]
pub struct BankQueries<S> {
    store: S,
}

impl<S: BankStore> BankQueries<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn list_audit_log(&self, page: i64, page_size: i64) -> DomainResult<Page<AuditEntry>> {
        let request = PageRequest::new(page, page_size)?;
        Ok(self.store.audit_log(request)?)
    }

    pub fn list_scheduled_interest(
        &self,
        page: i64,
        page_size: i64,
    ) -> DomainResult<Page<ScheduledInterest>> {
        let request = PageRequest::new(page, page_size)?;
        Ok(self.store.scheduled_interest(request)?)
    }

    pub fn get_transaction(&self, id: TransactionId) -> DomainResult<Transaction> {
        self.store
            .transaction(id)?
            .ok_or_else(|| DomainError::not_found(format!("transaction {id}")))
    }

    pub fn list_transactions_for_account(
        &self,
        account: AccountId,
        page: i64,
        page_size: i64,
    ) -> DomainResult<Page<Transaction>> {
        let request = PageRequest::new(page, page_size)?;
        if self.store.account(account)?.is_none() {
            return Err(DomainError::not_found(format!("account {account}")));
        }
        Ok(self.store.transactions_for(account, request)?)
    }
}
