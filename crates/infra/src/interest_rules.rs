use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::info;

use corebank_banking::{CompoundingPeriod, InterestRate, InterestRule};
use corebank_core::{Currency, DomainError, DomainResult, InterestRuleId};
use corebank_events::{BankingEvent, EventBus, EventEnvelope};

use crate::context::OperationContext;
use crate::database::Database;
use crate::error::OperationResult;
use crate::store::BankStore;

/// Interest rule management. At most one active rule exists per currency.
#[derive(Debug)]
pub struct InterestRuleStore<S, B> {
    db: Arc<Database<S, B>>,
}

impl<S, B> InterestRuleStore<S, B>
where
    S: BankStore + Clone,
    B: EventBus<EventEnvelope<BankingEvent>>,
{
    pub fn new(db: Arc<Database<S, B>>) -> Self {
        Self { db }
    }

    /// `percentage` is the human-facing rate: `5` means 5%.
    pub fn create(
        &self,
        ctx: &OperationContext,
        currency: &str,
        percentage: Decimal,
        compounding: CompoundingPeriod,
    ) -> OperationResult<InterestRule> {
        let currency = Currency::parse(currency)?;
        let rate = InterestRate::from_percentage(percentage)?;

        let (rule, _) = self.db.run(ctx, |uow| {
            if self.active_for(&currency)?.is_some() {
                return Err(DomainError::validation(format!(
                    "an active interest rule for {currency} already exists"
                )));
            }
            let rule = InterestRule::create(currency.clone(), rate, compounding, Utc::now());
            uow.add_rule(rule.clone());
            Ok(rule)
        })?;

        info!(
            rule_id = %rule.id_typed(),
            currency = %rule.currency(),
            rate = %rule.rate().percentage(),
            compounding = %rule.compounding(),
            "interest rule created"
        );
        Ok(rule)
    }

    pub fn deactivate(&self, ctx: &OperationContext, id: InterestRuleId) -> OperationResult<()> {
        self.db.run(ctx, |uow| {
            let before = self.get(id)?;
            if !before.is_active() {
                return Ok(());
            }
            let mut after = before.clone();
            after.deactivate();
            uow.update_rule(&before, after);
            Ok(())
        })?;
        info!(rule_id = %id, "interest rule deactivated");
        Ok(())
    }

    pub fn get(&self, id: InterestRuleId) -> DomainResult<InterestRule> {
        self.db
            .store()
            .interest_rule(id)?
            .ok_or_else(|| DomainError::not_found(format!("interest rule {id}")))
    }

    pub fn list_active(&self) -> DomainResult<Vec<InterestRule>> {
        Ok(self
            .db
            .store()
            .interest_rules()?
            .into_iter()
            .filter(InterestRule::is_active)
            .collect())
    }

    fn active_for(&self, currency: &Currency) -> DomainResult<Option<InterestRule>> {
        Ok(self
            .list_active()?
            .into_iter()
            .find(|r| r.currency() == currency))
    }
}
