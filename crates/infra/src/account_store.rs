//! Account lifecycle and invariant-checked reads.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{error, info, warn};

use corebank_banking::{Account, AccountNumber, EncodedAccountNumber};
use corebank_core::{AccountId, Currency, DomainError, DomainResult, UserId};
use corebank_events::{AccountOpened, BankingEvent, EventBus, EventEnvelope};

use crate::cipher::AccountNumberCipher;
use crate::context::OperationContext;
use crate::database::Database;
use crate::error::OperationResult;
use crate::retry::RetryPolicy;
use crate::store::BankStore;

/// Bounded attempts at generating an unused account number.
pub const DEFAULT_NUMBER_ATTEMPTS: u32 = 10;

/// An account as handed back to its owner right after opening.
#[derive(Debug, Clone)]
pub struct OpenedAccount {
    pub account: Account,
    pub number: AccountNumber,
}

#[derive(Debug)]
pub struct AccountStore<S, B> {
    db: Arc<Database<S, B>>,
    cipher: Arc<AccountNumberCipher>,
    number_attempts: u32,
}

impl<S, B> AccountStore<S, B>
where
    S: BankStore + Clone,
    B: EventBus<EventEnvelope<BankingEvent>>,
{
    pub fn new(db: Arc<Database<S, B>>, cipher: Arc<AccountNumberCipher>) -> Self {
        Self {
            db,
            cipher,
            number_attempts: DEFAULT_NUMBER_ATTEMPTS,
        }
    }

    pub fn with_number_attempts(mut self, attempts: u32) -> Self {
        self.number_attempts = attempts.max(1);
        self
    }

    pub fn cipher(&self) -> &AccountNumberCipher {
        &self.cipher
    }

    /// Open an account with a freshly generated, unique account number.
    ///
    /// Collisions on the number index are retried with a new candidate, up to the
    /// configured number of attempts.
    pub fn open(
        &self,
        ctx: &OperationContext,
        owner_id: UserId,
        currency: &str,
        initial_balance: Decimal,
    ) -> OperationResult<OpenedAccount> {
        let currency = Currency::parse(currency)?;
        if initial_balance < Decimal::ZERO {
            return Err(DomainError::validation("initial balance cannot be negative").into());
        }

        let policy = RetryPolicy::fixed(self.number_attempts.saturating_sub(1), Duration::ZERO);
        let mut rng = rand::thread_rng();

        let (opened, receipt) = self.db.run_with(ctx, &policy, |uow| {
            let number = AccountNumber::generate(&mut rng);
            let encoded = self.cipher.encode(&number)?;
            let account = Account::open(
                owner_id,
                encoded,
                currency.clone(),
                initial_balance,
                Utc::now(),
            )?;

            uow.add_account(account.clone());
            uow.publish(BankingEvent::AccountOpened(AccountOpened {
                user_id: owner_id,
                email: None,
                account_id: account.id_typed(),
                account_number: number.as_str().to_string(),
                balance: account.balance().value(),
                occurred_at: account.created_at(),
            }));

            Ok(OpenedAccount { account, number })
        })?;

        let version = receipt
            .account_versions
            .get(&opened.account.id_typed())
            .copied()
            .unwrap_or(1);
        let account = opened.account.committed_at_version(version);

        info!(
            account_id = %account.id_typed(),
            owner_id = %owner_id,
            currency = %account.currency(),
            "account opened"
        );

        Ok(OpenedAccount {
            account,
            number: opened.number,
        })
    }

    /// Load an account, treating invariant violations as data corruption.
    pub fn get_by_id(&self, id: AccountId) -> DomainResult<Account> {
        let account = self
            .db
            .store()
            .account(id)?
            .ok_or_else(|| DomainError::not_found(format!("account {id}")))?;
        self.check_integrity(&account)?;
        Ok(account)
    }

    pub fn get_by_encoded_number(&self, encoded: &EncodedAccountNumber) -> DomainResult<Account> {
        let account = self
            .db
            .store()
            .account_by_number(encoded)?
            .ok_or_else(|| DomainError::not_found("account not found"))?;
        if account.account_number() != encoded {
            return self.corrupted(&account, "number index points at a different account");
        }
        self.check_integrity(&account)?;
        Ok(account)
    }

    /// Look up by plaintext account number (as supplied by a customer).
    pub fn get_by_number(&self, number: &str) -> DomainResult<Account> {
        let number = AccountNumber::parse(number)?;
        let encoded = self.cipher.encode(&number)?;
        self.get_by_encoded_number(&encoded)
    }

    /// The active account `owner` holds in `currency`, oldest first.
    pub fn get_active_for_owner(&self, owner: UserId, currency: &Currency) -> DomainResult<Account> {
        let account = self
            .db
            .store()
            .accounts_owned_by(owner)?
            .into_iter()
            .find(|a| a.is_active() && a.currency() == currency)
            .ok_or_else(|| {
                DomainError::not_found(format!("user {owner} has no active {currency} account"))
            })?;
        self.check_integrity(&account)?;
        Ok(account)
    }

    /// Plaintext account number of a stored account.
    pub fn reveal_number(&self, account: &Account) -> DomainResult<AccountNumber> {
        self.cipher.decode(account.account_number())
    }

    /// Deactivate an account. Closed accounts are invisible to money movement.
    pub fn close(&self, ctx: &OperationContext, id: AccountId) -> OperationResult<()> {
        self.db.run(ctx, |uow| {
            let before = self.get_by_id(id)?;
            let mut after = before.clone();
            after.close();
            uow.update_account(&before, after);
            Ok(())
        })?;
        info!(account_id = %id, "account closed");
        Ok(())
    }

    /// Hard delete. Rejected while transactions reference the account.
    pub fn remove(&self, ctx: &OperationContext, id: AccountId) -> OperationResult<()> {
        let result = self.db.run(ctx, |uow| {
            let account = self
                .db
                .store()
                .account(id)?
                .ok_or_else(|| DomainError::not_found(format!("account {id}")))?;
            uow.remove_account(account);
            Ok(())
        });

        match result {
            Ok(_) => {
                info!(account_id = %id, "account removed");
                Ok(())
            }
            Err(err) => {
                warn!(account_id = %id, error = %err, "account removal rejected");
                Err(err)
            }
        }
    }

    fn check_integrity(&self, account: &Account) -> DomainResult<()> {
        if let Err(err) = account.verify_integrity() {
            error!(account_id = %account.id_typed(), error = %err, "stored account failed integrity check");
            return Err(err);
        }
        if let Err(err) = self.cipher.decode(account.account_number()) {
            return self.corrupted(account, &format!("account number is not decodable: {err}"));
        }
        Ok(())
    }

    fn corrupted<T>(&self, account: &Account, reason: &str) -> DomainResult<T> {
        error!(account_id = %account.id_typed(), reason, "stored account failed integrity check");
        Err(DomainError::invalid_state(format!(
            "account {}: {reason}",
            account.id_typed()
        )))
    }
}
