//! Interest rules, compounding eligibility and the accrual record.

use chrono::{DateTime, Months, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use corebank_core::{
    AccountId, Audited, Currency, DomainError, DomainResult, Entity, InterestRuleId, Money,
    ScheduledInterestId, ValueObject,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompoundingPeriod {
    Daily,
    Monthly,
    Yearly,
}

impl CompoundingPeriod {
    /// Whether a new accrual is due, given the last time this (account, rule) pair was
    /// credited. `None` means never, which is always due.
    ///
    /// Comparison is by calendar date (UTC):
    /// - Daily: last date < today
    /// - Monthly: last date + 1 month <= today
    /// - Yearly: last date + 1 year <= today
    pub fn is_due(self, last_applied: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        let Some(last) = last_applied else {
            return true;
        };

        let last = last.date_naive();
        let today = now.date_naive();

        match self {
            CompoundingPeriod::Daily => last < today,
            CompoundingPeriod::Monthly => last
                .checked_add_months(Months::new(1))
                .is_some_and(|next| next <= today),
            CompoundingPeriod::Yearly => last
                .checked_add_months(Months::new(12))
                .is_some_and(|next| next <= today),
        }
    }
}

impl core::fmt::Display for CompoundingPeriod {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            CompoundingPeriod::Daily => "Daily",
            CompoundingPeriod::Monthly => "Monthly",
            CompoundingPeriod::Yearly => "Yearly",
        };
        f.write_str(s)
    }
}

/// Interest rate stored as a fraction: 5% is `0.05`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InterestRate(Decimal);

impl InterestRate {
    /// Accepts a percentage in (0, 100].
    pub fn from_percentage(percentage: Decimal) -> DomainResult<Self> {
        if percentage <= Decimal::ZERO || percentage > Decimal::ONE_HUNDRED {
            return Err(DomainError::validation(format!(
                "interest rate must be greater than 0% and at most 100%, got {percentage}%"
            )));
        }
        Ok(Self(percentage / Decimal::ONE_HUNDRED))
    }

    pub fn fraction(&self) -> Decimal {
        self.0
    }

    pub fn percentage(&self) -> Decimal {
        self.0 * Decimal::ONE_HUNDRED
    }
}

impl ValueObject for InterestRate {}

/// Entity: the interest policy applied to every active account of a currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterestRule {
    id: InterestRuleId,
    currency: Currency,
    rate: InterestRate,
    compounding: CompoundingPeriod,
    active: bool,
    created_at: DateTime<Utc>,
}

impl InterestRule {
    pub fn create(
        currency: Currency,
        rate: InterestRate,
        compounding: CompoundingPeriod,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: InterestRuleId::new(),
            currency,
            rate,
            compounding,
            active: true,
            created_at: now,
        }
    }

    pub fn id_typed(&self) -> InterestRuleId {
        self.id
    }

    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    pub fn rate(&self) -> InterestRate {
        self.rate
    }

    pub fn compounding(&self) -> CompoundingPeriod {
        self.compounding
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn deactivate(&mut self) {
        self.active = false;
    }

    /// `balance * rate`, rounded to the money scale.
    pub fn interest_for(&self, balance: Money) -> DomainResult<Money> {
        balance.scaled_by(self.rate.fraction())
    }
}

impl Entity for InterestRule {
    type Id = InterestRuleId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Audited for InterestRule {
    const ENTITY_TYPE: &'static str = "InterestRule";
}

/// Accrual record; its existence for (account, rule, period) is the idempotency marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledInterest {
    id: ScheduledInterestId,
    account_id: AccountId,
    rule_id: InterestRuleId,
    amount: Money,
    applied_at: DateTime<Utc>,
}

impl ScheduledInterest {
    pub fn record(
        account_id: AccountId,
        rule_id: InterestRuleId,
        amount: Money,
        applied_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ScheduledInterestId::new(),
            account_id,
            rule_id,
            amount,
            applied_at,
        }
    }

    pub fn id_typed(&self) -> ScheduledInterestId {
        self.id
    }

    pub fn account_id(&self) -> AccountId {
        self.account_id
    }

    pub fn rule_id(&self) -> InterestRuleId {
        self.rule_id
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn applied_at(&self) -> DateTime<Utc> {
        self.applied_at
    }
}

impl Entity for ScheduledInterest {
    type Id = ScheduledInterestId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Audited for ScheduledInterest {
    const ENTITY_TYPE: &'static str = "ScheduledInterest";
}
