//! Banking domain events consumed by notification collaborators.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use corebank_core::{AccountId, UserId};

use crate::event::Event;

pub const REASON_DEPOSIT: &str = "Deposit";
pub const REASON_WITHDRAW: &str = "Withdraw";
pub const REASON_TRANSFER_SENT: &str = "Transfer Sent";
pub const REASON_TRANSFER_RECEIVED: &str = "Transfer Received";

/// Reason recorded for an interest credit, e.g. "Interest Applied (Daily)".
pub fn interest_reason(period: impl core::fmt::Display) -> String {
    format!("Interest Applied ({period})")
}

/// A balance moved. `amount_changed` is signed: negative for debits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceChanged {
    pub user_id: UserId,
    pub email: Option<String>,
    pub account_id: AccountId,
    pub amount_changed: Decimal,
    pub new_balance: Decimal,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// A new account was opened. Carries the plaintext account number for the owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountOpened {
    pub user_id: UserId,
    pub email: Option<String>,
    pub account_id: AccountId,
    pub account_number: String,
    pub balance: Decimal,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BankingEvent {
    BalanceChanged(BalanceChanged),
    AccountOpened(AccountOpened),
}

impl BankingEvent {
    pub fn user_id(&self) -> UserId {
        match self {
            BankingEvent::BalanceChanged(e) => e.user_id,
            BankingEvent::AccountOpened(e) => e.user_id,
        }
    }

    pub fn account_id(&self) -> AccountId {
        match self {
            BankingEvent::BalanceChanged(e) => e.account_id,
            BankingEvent::AccountOpened(e) => e.account_id,
        }
    }

    /// Clear payload fields that must not outlive delivery: the plaintext account number.
    pub fn redact_delivered(&mut self) {
        if let BankingEvent::AccountOpened(e) = self {
            e.account_number.clear();
        }
    }

    /// Fill in the owner's contact address once it has been resolved.
    pub fn with_email(mut self, email: Option<String>) -> Self {
        match &mut self {
            BankingEvent::BalanceChanged(e) => e.email = email,
            BankingEvent::AccountOpened(e) => e.email = email,
        }
        self
    }
}

impl Event for BankingEvent {
    fn event_type(&self) -> &'static str {
        match self {
            BankingEvent::BalanceChanged(_) => "banking.balance_changed",
            BankingEvent::AccountOpened(_) => "banking.account_opened",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            BankingEvent::BalanceChanged(e) => e.occurred_at,
            BankingEvent::AccountOpened(e) => e.occurred_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn serializes_with_type_tag() {
        let ev = BankingEvent::BalanceChanged(BalanceChanged {
            user_id: UserId::new(),
            email: None,
            account_id: AccountId::new(),
            amount_changed: dec!(-40.00),
            new_balance: dec!(60.00),
            reason: REASON_TRANSFER_SENT.to_string(),
            occurred_at: Utc::now(),
        });

        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "balance_changed");
        assert_eq!(json["reason"], "Transfer Sent");

        let back: BankingEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, ev);
        assert_eq!(back.event_type(), "banking.balance_changed");
    }

    #[test]
    fn redaction_clears_only_the_account_number() {
        let opened = AccountOpened {
            user_id: UserId::new(),
            email: Some("owner@example.com".to_string()),
            account_id: AccountId::new(),
            account_number: "ACC-12345678".to_string(),
            balance: dec!(10),
            occurred_at: Utc::now(),
        };
        let mut ev = BankingEvent::AccountOpened(opened.clone());
        ev.redact_delivered();
        assert_eq!(
            ev,
            BankingEvent::AccountOpened(AccountOpened {
                account_number: String::new(),
                ..opened
            })
        );
    }

    #[test]
    fn interest_reason_names_the_period() {
        assert_eq!(interest_reason("Monthly"), "Interest Applied (Monthly)");
    }
}
