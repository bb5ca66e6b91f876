//! Money movement: deposit, withdraw and transfer.
//!
//! Each operation reads the accounts it touches, records the new balances guarded by the
//! versions it read, appends one transaction row and queues its `BalanceChanged` events,
//! then commits all of it as one batch. A stale read aborts the whole batch and the
//! operation is re-run from fresh state (bounded by the retry policy). Every attempt
//! mints a new transaction reference.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, instrument, warn};

use corebank_banking::{Account, Transaction};
use corebank_core::{DomainError, DomainResult, Money, UserId};
use corebank_events::banking::{
    REASON_DEPOSIT, REASON_TRANSFER_RECEIVED, REASON_TRANSFER_SENT, REASON_WITHDRAW,
};
use corebank_events::{BalanceChanged, BankingEvent, EventBus, EventEnvelope};

use crate::account_store::AccountStore;
use crate::context::OperationContext;
use crate::database::Database;
use crate::error::OperationResult;
use crate::store::BankStore;
use crate::unit_of_work::UnitOfWork;

#[derive(Debug)]
pub struct TransactionLedger<S, B> {
    db: Arc<Database<S, B>>,
    accounts: Arc<AccountStore<S, B>>,
}

impl<S, B> TransactionLedger<S, B>
where
    S: BankStore + Clone,
    B: EventBus<EventEnvelope<BankingEvent>>,
{
    pub fn new(db: Arc<Database<S, B>>, accounts: Arc<AccountStore<S, B>>) -> Self {
        Self { db, accounts }
    }

    #[instrument(skip_all, fields(amount = %amount))]
    pub fn deposit(
        &self,
        ctx: &OperationContext,
        account_number: &str,
        amount: Decimal,
        description: Option<&str>,
    ) -> OperationResult<bool> {
        let amount = Money::positive(amount)?;

        let (reference, _) = self.db.run(ctx, |uow| {
            let before = self.active_account(account_number)?;
            let mut after = before.clone();
            after.credit(amount)?;

            let tx = Transaction::deposit(
                before.id_typed(),
                amount,
                description.map(str::to_string),
                executed_by(ctx, &before),
                Utc::now(),
            )?;
            let reference = tx.reference().clone();

            balance_changed(uow, &after, amount.value(), REASON_DEPOSIT);
            uow.update_account(&before, after);
            uow.record_transaction(tx);
            Ok(reference)
        })?;

        info!(%reference, "deposit committed");
        Ok(true)
    }

    #[instrument(skip_all, fields(amount = %amount))]
    pub fn withdraw(
        &self,
        ctx: &OperationContext,
        account_number: &str,
        amount: Decimal,
        description: Option<&str>,
    ) -> OperationResult<bool> {
        let amount = Money::positive(amount)?;

        let result = self.db.run(ctx, |uow| {
            let before = self.active_account(account_number)?;
            let mut after = before.clone();
            after.debit(amount)?;

            let tx = Transaction::withdraw(
                before.id_typed(),
                amount,
                description.map(str::to_string),
                executed_by(ctx, &before),
                Utc::now(),
            )?;
            let reference = tx.reference().clone();

            balance_changed(uow, &after, -amount.value(), REASON_WITHDRAW);
            uow.update_account(&before, after);
            uow.record_transaction(tx);
            Ok(reference)
        });

        match result {
            Ok((reference, _)) => {
                info!(%reference, "withdrawal committed");
                Ok(true)
            }
            Err(err) => {
                warn!(code = err.code(), "withdrawal rejected");
                Err(err)
            }
        }
    }

    /// Move `amount` from the sender's account to the recipient's active account in the
    /// same currency. Both balances change in one commit or neither does.
    #[instrument(skip_all, fields(amount = %amount, to_user = %to_user))]
    pub fn transfer(
        &self,
        ctx: &OperationContext,
        from_account_number: &str,
        to_user: UserId,
        amount: Decimal,
        description: Option<&str>,
    ) -> OperationResult<bool> {
        let amount = Money::positive(amount)?;

        let result = self.db.run(ctx, |uow| {
            let sender_before = self.active_account(from_account_number)?;
            let recipient_before = self
                .accounts
                .get_active_for_owner(to_user, sender_before.currency())?;
            if recipient_before.id_typed() == sender_before.id_typed() {
                return Err(DomainError::validation("cannot transfer to the same account"));
            }

            let mut sender_after = sender_before.clone();
            sender_after.debit(amount)?;
            let mut recipient_after = recipient_before.clone();
            recipient_after.credit(amount)?;

            let tx = Transaction::transfer(
                sender_before.id_typed(),
                recipient_before.id_typed(),
                amount,
                description.map(str::to_string),
                executed_by(ctx, &sender_before),
                Utc::now(),
            )?;
            let reference = tx.reference().clone();

            balance_changed(uow, &sender_after, -amount.value(), REASON_TRANSFER_SENT);
            balance_changed(uow, &recipient_after, amount.value(), REASON_TRANSFER_RECEIVED);
            uow.update_account(&sender_before, sender_after);
            uow.update_account(&recipient_before, recipient_after);
            uow.record_transaction(tx);
            Ok(reference)
        });

        match result {
            Ok((reference, _)) => {
                info!(%reference, "transfer committed");
                Ok(true)
            }
            Err(err) => {
                warn!(code = err.code(), "transfer rejected");
                Err(err)
            }
        }
    }

    fn active_account(&self, account_number: &str) -> DomainResult<Account> {
        let account = self.accounts.get_by_number(account_number)?;
        account.ensure_active()?;
        Ok(account)
    }
}

/// The acting user, or the account owner for calls without an authenticated actor.
fn executed_by(ctx: &OperationContext, account: &Account) -> UserId {
    ctx.actor().unwrap_or_else(|| account.owner_id())
}

fn balance_changed(uow: &mut UnitOfWork, after: &Account, delta: Decimal, reason: &str) {
    uow.publish(BankingEvent::BalanceChanged(BalanceChanged {
        user_id: after.owner_id(),
        email: None,
        account_id: after.id_typed(),
        amount_changed: delta,
        new_balance: after.balance().value(),
        reason: reason.to_string(),
        occurred_at: Utc::now(),
    }));
}
