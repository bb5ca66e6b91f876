//! Interest accrual engine.
//!
//! A sweep loads every active rule, finds the active accounts in the rule's currency,
//! and credits those whose compounding period has elapsed since the last accrual row for
//! the (account, rule) pair. All accruals of a sweep are committed together: either the
//! whole sweep lands or none of it does, so an interrupted run is simply re-invoked.
//!
//! Re-running within the same period is a no-op because eligibility is derived from the
//! accrual rows the previous run committed.
//! Overlapping sweeps are settled by the store, which accepts one accrual row per
//! (account, rule, period); the losing commit is a conflict and its retry finds nothing due.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use corebank_banking::{Account, InterestRule, ScheduledInterest};
use corebank_core::{AccountId, DomainResult, Money};
use corebank_events::banking::interest_reason;
use corebank_events::{BalanceChanged, BankingEvent, EventBus, EventEnvelope};

use crate::context::OperationContext;
use crate::database::Database;
use crate::error::OperationResult;
use crate::store::BankStore;
use crate::unit_of_work::UnitOfWork;

/// Outcome of one committed sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterestRun {
    pub rules_processed: usize,
    /// Rules skipped because loading their accounts or accrual history failed.
    pub rules_failed: usize,
    /// Accrual rows written (including zero-interest rows).
    pub accruals_recorded: usize,
    /// Distinct accounts whose balance increased.
    pub accounts_credited: usize,
}

struct Accrual {
    stored: Account,
    credited: Account,
    interest: Money,
    record: ScheduledInterest,
}

#[derive(Debug)]
pub struct InterestAccrualEngine<S, B> {
    db: Arc<Database<S, B>>,
}

impl<S, B> InterestAccrualEngine<S, B>
where
    S: BankStore + Clone,
    B: EventBus<EventEnvelope<BankingEvent>>,
{
    pub fn new(db: Arc<Database<S, B>>) -> Self {
        Self { db }
    }

    /// Scheduler entry point. Best effort: failures are logged, never returned.
    ///
    /// Returns the number of accounts credited.
    pub fn apply_interest(&self, ctx: &OperationContext, now: DateTime<Utc>) -> usize {
        match self.try_apply_interest(ctx, now) {
            Ok(run) => {
                info!(
                    rules = run.rules_processed,
                    failed_rules = run.rules_failed,
                    accruals = run.accruals_recorded,
                    credited = run.accounts_credited,
                    "interest sweep committed"
                );
                run.accounts_credited
            }
            Err(err) => {
                error!(code = err.code(), error = %err, "interest sweep failed; nothing applied");
                0
            }
        }
    }

    /// Run one sweep and report what it did.
    ///
    /// A conflicting concurrent write on any swept account aborts the commit; the sweep
    /// is then recomputed from fresh state.
    pub fn try_apply_interest(
        &self,
        ctx: &OperationContext,
        now: DateTime<Utc>,
    ) -> OperationResult<InterestRun> {
        let (run, _) = self.db.run(ctx, |uow| self.sweep(uow, now))?;
        Ok(run)
    }

    fn sweep(&self, uow: &mut UnitOfWork, now: DateTime<Utc>) -> DomainResult<InterestRun> {
        let rules: Vec<InterestRule> = self
            .db
            .store()
            .interest_rules()?
            .into_iter()
            .filter(InterestRule::is_active)
            .collect();

        let mut run = InterestRun::default();
        let mut credited: HashSet<AccountId> = HashSet::new();

        for rule in &rules {
            let accruals = match self.accrue(rule, uow, now) {
                Ok(accruals) => accruals,
                Err(err) => {
                    warn!(rule_id = %rule.id_typed(), error = %err, "skipping interest rule");
                    run.rules_failed += 1;
                    continue;
                }
            };
            run.rules_processed += 1;

            for accrual in accruals {
                run.accruals_recorded += 1;
                uow.record_scheduled_interest(accrual.record);
                if accrual.interest.is_zero() {
                    continue;
                }

                let account_id = accrual.credited.id_typed();
                debug!(
                    %account_id,
                    rule_id = %rule.id_typed(),
                    interest = %accrual.interest,
                    "interest accrued"
                );
                uow.publish(BankingEvent::BalanceChanged(BalanceChanged {
                    user_id: accrual.credited.owner_id(),
                    email: None,
                    account_id,
                    amount_changed: accrual.interest.value(),
                    new_balance: accrual.credited.balance().value(),
                    reason: interest_reason(rule.compounding()),
                    occurred_at: now,
                }));
                uow.update_account(&accrual.stored, accrual.credited);
                credited.insert(account_id);
            }
        }

        run.accounts_credited = credited.len();
        Ok(run)
    }

    /// Compute every accrual one rule produces, without touching the unit of work.
    fn accrue(
        &self,
        rule: &InterestRule,
        uow: &UnitOfWork,
        now: DateTime<Utc>,
    ) -> DomainResult<Vec<Accrual>> {
        let store = self.db.store();
        let mut accruals = Vec::new();

        for stored in store.active_accounts_in(rule.currency())? {
            if let Err(err) = stored.verify_integrity() {
                error!(account_id = %stored.id_typed(), error = %err, "skipping corrupted account");
                continue;
            }

            let last = store
                .latest_scheduled_interest(stored.id_typed(), rule.id_typed())?
                .map(|s| s.applied_at());
            if !rule.compounding().is_due(last, now) {
                continue;
            }

            // Another rule may already have credited this account in the same sweep.
            let mut credited = uow
                .pending_account(stored.id_typed())
                .cloned()
                .unwrap_or_else(|| stored.clone());
            let interest = rule.interest_for(credited.balance())?;
            credited.credit(interest)?;

            accruals.push(Accrual {
                record: ScheduledInterest::record(stored.id_typed(), rule.id_typed(), interest, now),
                stored,
                credited,
                interest,
            });
        }

        Ok(accruals)
    }
}
