use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use corebank_core::{AccountId, Audited, DomainError, DomainResult, Entity, Money, TransactionId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionKind {
    Deposit,
    Withdraw,
    Transfer,
}

impl core::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            TransactionKind::Deposit => "Deposit",
            TransactionKind::Withdraw => "Withdraw",
            TransactionKind::Transfer => "Transfer",
        };
        f.write_str(s)
    }
}

/// Unique reference of a ledger transaction.
///
/// A fresh reference is minted for every attempt, so a retried call produces a new row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionReference(String);

impl TransactionReference {
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for TransactionReference {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An immutable ledger record.
///
/// Deposits and withdrawals reference the same account on both sides; transfers carry
/// distinct sender and recipient. `sequence` is the ledger position assigned by the store
/// at commit and is `None` until then.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    id: TransactionId,
    from_account_id: Option<AccountId>,
    to_account_id: Option<AccountId>,
    amount: Money,
    kind: TransactionKind,
    reference: TransactionReference,
    description: Option<String>,
    executed_by: UserId,
    executed_at: DateTime<Utc>,
    sequence: Option<u64>,
}

impl Transaction {
    fn build(
        from: AccountId,
        to: AccountId,
        amount: Money,
        kind: TransactionKind,
        description: Option<String>,
        executed_by: UserId,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if amount.is_zero() {
            return Err(DomainError::validation("amount must be greater than zero"));
        }

        Ok(Self {
            id: TransactionId::new(),
            from_account_id: Some(from),
            to_account_id: Some(to),
            amount,
            kind,
            reference: TransactionReference::generate(),
            description: description.filter(|d| !d.trim().is_empty()),
            executed_by,
            executed_at: now,
            sequence: None,
        })
    }

    pub fn deposit(
        account: AccountId,
        amount: Money,
        description: Option<String>,
        executed_by: UserId,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        Self::build(account, account, amount, TransactionKind::Deposit, description, executed_by, now)
    }

    pub fn withdraw(
        account: AccountId,
        amount: Money,
        description: Option<String>,
        executed_by: UserId,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        Self::build(account, account, amount, TransactionKind::Withdraw, description, executed_by, now)
    }

    pub fn transfer(
        from: AccountId,
        to: AccountId,
        amount: Money,
        description: Option<String>,
        executed_by: UserId,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if from == to {
            return Err(DomainError::validation("cannot transfer to the same account"));
        }
        Self::build(from, to, amount, TransactionKind::Transfer, description, executed_by, now)
    }

    pub fn id_typed(&self) -> TransactionId {
        self.id
    }

    pub fn from_account_id(&self) -> Option<AccountId> {
        self.from_account_id
    }

    pub fn to_account_id(&self) -> Option<AccountId> {
        self.to_account_id
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn kind(&self) -> TransactionKind {
        self.kind
    }

    pub fn reference(&self) -> &TransactionReference {
        &self.reference
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn executed_by(&self) -> UserId {
        self.executed_by
    }

    pub fn executed_at(&self) -> DateTime<Utc> {
        self.executed_at
    }

    pub fn sequence(&self) -> Option<u64> {
        self.sequence
    }

    pub fn involves(&self, account: AccountId) -> bool {
        self.from_account_id == Some(account) || self.to_account_id == Some(account)
    }

    /// Record the ledger position assigned by the store at commit.
    pub fn committed_at_sequence(mut self, sequence: u64) -> Self {
        self.sequence = Some(sequence);
        self
    }
}

impl Entity for Transaction {
    type Id = TransactionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Audited for Transaction {
    const ENTITY_TYPE: &'static str = "Transaction";
}
