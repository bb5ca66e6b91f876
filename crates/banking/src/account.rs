use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use corebank_core::{
    AccountId, AggregateRoot, Audited, Currency, DomainError, DomainResult, Entity, Money, UserId,
};

const ACCOUNT_NUMBER_PREFIX: &str = "ACC-";
const ACCOUNT_NUMBER_MIN: u32 = 10_000_000;
const ACCOUNT_NUMBER_MAX: u32 = 99_999_999;

/// Plaintext account number, e.g. "ACC-12345678".
///
/// Only ever handed to the owner (in `AccountOpened`) and to the cipher. Storage and logs
/// see the encoded form.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct AccountNumber(String);

impl AccountNumber {
    /// 8 to 24 characters of uppercase letters, digits and dashes.
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let len = raw.len();
        if !(8..=24).contains(&len) {
            return Err(DomainError::validation(
                "account number must be between 8 and 24 characters",
            ));
        }
        if !raw
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'-')
        {
            return Err(DomainError::validation(
                "account number must be alphanumeric and may include dashes",
            ));
        }
        Ok(Self(raw.to_string()))
    }

    /// Random candidate; uniqueness is enforced by the store, not here.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let n = rng.gen_range(ACCOUNT_NUMBER_MIN..=ACCOUNT_NUMBER_MAX);
        Self(format!("{ACCOUNT_NUMBER_PREFIX}{n}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Debug for AccountNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("AccountNumber(***)")
    }
}

/// Deterministically encoded account number; the storage lookup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncodedAccountNumber(String);

impl EncodedAccountNumber {
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for EncodedAccountNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Aggregate root: a customer's bank account.
///
/// # Invariants
/// - balance >= 0 (enforced by `Money`)
/// - `version` is bumped by the store on every committed mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    id: AccountId,
    owner_id: UserId,
    account_number: EncodedAccountNumber,
    currency: Currency,
    balance: Money,
    active: bool,
    created_at: DateTime<Utc>,
    version: u64,
}

impl Account {
    /// A freshly opened, active account at version 0 (not yet committed).
    pub fn open(
        owner_id: UserId,
        account_number: EncodedAccountNumber,
        currency: Currency,
        initial_balance: Decimal,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if owner_id.is_nil() {
            return Err(DomainError::validation("owner id cannot be empty"));
        }
        let balance = Money::new(initial_balance)
            .map_err(|_| DomainError::validation("initial balance cannot be negative"))?;

        Ok(Self {
            id: AccountId::new(),
            owner_id,
            account_number,
            currency,
            balance,
            active: true,
            created_at: now,
            version: 0,
        })
    }

    pub fn id_typed(&self) -> AccountId {
        self.id
    }

    pub fn owner_id(&self) -> UserId {
        self.owner_id
    }

    pub fn account_number(&self) -> &EncodedAccountNumber {
        &self.account_number
    }

    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    pub fn balance(&self) -> Money {
        self.balance
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Inactive accounts are indistinguishable from missing ones for money movement.
    pub fn ensure_active(&self) -> DomainResult<()> {
        if self.active {
            Ok(())
        } else {
            Err(DomainError::not_found(format!("account {} is not active", self.id)))
        }
    }

    pub fn credit(&mut self, amount: Money) -> DomainResult<()> {
        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or_else(|| DomainError::validation("balance overflow"))?;
        Ok(())
    }

    pub fn debit(&mut self, amount: Money) -> DomainResult<()> {
        self.balance = self.balance.checked_sub(amount).ok_or_else(|| {
            DomainError::insufficient_funds(self.balance.value(), amount.value())
        })?;
        Ok(())
    }

    pub fn close(&mut self) {
        self.active = false;
    }

    /// Record the version assigned by the store at commit.
    pub fn committed_at_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// Invariant check for a record loaded from storage.
    pub fn verify_integrity(&self) -> DomainResult<()> {
        if self.owner_id.is_nil() {
            return Err(DomainError::invalid_state(format!(
                "account {} has no owner",
                self.id
            )));
        }
        if self.account_number.as_str().trim().is_empty() {
            return Err(DomainError::invalid_state(format!(
                "account {} has an empty account number",
                self.id
            )));
        }
        if self.balance.value() < Decimal::ZERO {
            return Err(DomainError::invalid_state(format!(
                "account {} has a negative balance",
                self.id
            )));
        }
        if self.created_at.timestamp() <= 0 {
            return Err(DomainError::invalid_state(format!(
                "account {} has no creation date",
                self.id
            )));
        }
        Ok(())
    }
}

impl Entity for Account {
    type Id = AccountId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl AggregateRoot for Account {
    type Id = AccountId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Audited for Account {
    const ENTITY_TYPE: &'static str = "BankAccount";
    const UNAUDITED_FIELDS: &'static [&'static str] = &["version"];
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rust_decimal_macros::dec;

    fn egp() -> Currency {
        Currency::parse("EGP").unwrap()
    }

    fn open_with(balance: Decimal) -> Account {
        Account::open(
            UserId::new(),
            EncodedAccountNumber::new("enc"),
            egp(),
            balance,
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn open_rejects_negative_initial_balance() {
        let err = Account::open(
            UserId::new(),
            EncodedAccountNumber::new("enc"),
            egp(),
            dec!(-1),
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn new_account_is_active_at_version_zero() {
        let account = open_with(dec!(100.00));
        assert!(account.is_active());
        assert_eq!(account.version(), 0);
        assert_eq!(account.balance().value(), dec!(100.00));
    }

    #[test]
    fn debit_beyond_balance_is_insufficient_funds() {
        let mut account = open_with(dec!(100.00));
        let err = account
            .debit(Money::positive(dec!(150.00)).unwrap())
            .unwrap_err();
        assert_eq!(err, DomainError::insufficient_funds(dec!(100.00), dec!(150.00)));
        assert_eq!(account.balance().value(), dec!(100.00));
    }

    #[test]
    fn closed_account_is_not_found_for_money_movement() {
        let mut account = open_with(dec!(1));
        account.close();
        assert!(matches!(account.ensure_active(), Err(DomainError::NotFound(_))));
    }

    #[test]
    fn generated_numbers_are_well_formed() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..100 {
            let n = AccountNumber::generate(&mut rng);
            assert!(n.as_str().starts_with("ACC-"));
            assert_eq!(n.as_str().len(), 12);
            assert!(AccountNumber::parse(n.as_str()).is_ok());
        }
    }

    #[test]
    fn account_number_format_is_validated() {
        assert!(AccountNumber::parse("ACC-1234").is_ok());
        assert!(AccountNumber::parse("acc-12345678").is_err());
        assert!(AccountNumber::parse("SHORT").is_err());
        assert!(AccountNumber::parse("ACC-1234567890123456789012").is_err());
    }

    #[test]
    fn account_number_debug_is_redacted() {
        let n = AccountNumber::parse("ACC-12345678").unwrap();
        assert_eq!(format!("{n:?}"), "AccountNumber(***)");
    }

    #[test]
    fn audit_snapshot_excludes_version() {
        let account = open_with(dec!(5)).committed_at_version(3);
        let snap = account.snapshot();
        assert!(snap.contains_key("Balance"));
        assert!(snap.contains_key("OwnerId"));
        assert!(!snap.contains_key("Version"));
        assert!(!snap.contains_key("version"));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Credit(i64),
        Debit(i64),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1i64..100_000).prop_map(Op::Credit),
            (1i64..100_000).prop_map(Op::Debit),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: no sequence of credits and debits can drive a balance below zero,
        /// and rejected debits leave the balance untouched.
        #[test]
        fn balance_never_negative(ops in prop::collection::vec(op_strategy(), 1..50)) {
            let mut account = open_with(Decimal::ZERO);
            for op in ops {
                let before = account.balance();
                match op {
                    Op::Credit(cents) => {
                        account.credit(Money::positive(Decimal::new(cents, 2)).unwrap()).unwrap();
                    }
                    Op::Debit(cents) => {
                        if account.debit(Money::positive(Decimal::new(cents, 2)).unwrap()).is_err() {
                            prop_assert_eq!(account.balance(), before);
                        }
                    }
                }
                prop_assert!(account.balance().value() >= Decimal::ZERO);
            }
        }
    }
}
