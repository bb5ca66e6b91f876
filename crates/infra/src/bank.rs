//! Wiring of the banking services over one store, bus and cipher.

use std::io;
use std::sync::Arc;

use corebank_events::{BankingEvent, EventBus, EventEnvelope};

use crate::account_store::AccountStore;
use crate::cipher::AccountNumberCipher;
use crate::config::CoreConfig;
use crate::database::Database;
use crate::interest_engine::InterestAccrualEngine;
use crate::interest_rules::InterestRuleStore;
use crate::ledger::TransactionLedger;
use crate::outbox::OwnerDirectory;
use crate::queries::BankQueries;
use crate::store::BankStore;
use crate::workers::{InterestScheduler, OutboxRelay, WorkerHandle};

#[derive(Debug)]
pub struct CoreBank<S, B> {
    db: Arc<Database<S, B>>,
    accounts: Arc<AccountStore<S, B>>,
    ledger: TransactionLedger<S, B>,
    rules: InterestRuleStore<S, B>,
    interest: Arc<InterestAccrualEngine<S, B>>,
    queries: BankQueries<S>,
}

impl<S, B> CoreBank<S, B>
where
    S: BankStore + Clone + 'static,
    B: EventBus<EventEnvelope<BankingEvent>> + 'static,
{
    pub fn new(
        config: &CoreConfig,
        store: S,
        bus: B,
        directory: Arc<dyn OwnerDirectory>,
        cipher: AccountNumberCipher,
    ) -> Self {
        let db = Arc::new(
            Database::new(store.clone(), bus, directory)
                .with_retry_policy(config.conflict_retry_policy()),
        );
        let accounts = Arc::new(
            AccountStore::new(Arc::clone(&db), Arc::new(cipher))
                .with_number_attempts(config.account_number_attempts),
        );

        Self {
            ledger: TransactionLedger::new(Arc::clone(&db), Arc::clone(&accounts)),
            rules: InterestRuleStore::new(Arc::clone(&db)),
            interest: Arc::new(InterestAccrualEngine::new(Arc::clone(&db))),
            queries: BankQueries::new(store),
            accounts,
            db,
        }
    }

    pub fn database(&self) -> &Database<S, B> {
        &self.db
    }

    pub fn accounts(&self) -> &AccountStore<S, B> {
        &self.accounts
    }

    pub fn ledger(&self) -> &TransactionLedger<S, B> {
        &self.ledger
    }

    pub fn interest_rules(&self) -> &InterestRuleStore<S, B> {
        &self.rules
    }

    pub fn interest(&self) -> &InterestAccrualEngine<S, B> {
        &self.interest
    }

    pub fn queries(&self) -> &BankQueries<S> {
        &self.queries
    }

    /// Start the interest scheduler and the outbox relay.
    pub fn spawn_workers(&self, config: &CoreConfig) -> io::Result<Vec<WorkerHandle>> {
        let scheduler = InterestScheduler::spawn(Arc::clone(&self.interest), config.interest_interval)?;
        let relay = match OutboxRelay::spawn(Arc::clone(&self.db), config.outbox_interval) {
            Ok(relay) => relay,
            Err(err) => {
                scheduler.shutdown();
                return Err(err);
            }
        };
        Ok(vec![scheduler, relay])
    }
}
