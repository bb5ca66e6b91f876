use std::io;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::info;

use corebank_events::{BankingEvent, EventBus, EventEnvelope};

use super::{WorkerHandle, run_periodically, spawn_worker};
use crate::context::OperationContext;
use crate::interest_engine::InterestAccrualEngine;
use crate::store::BankStore;

/// Timer that invokes the interest sweep.
///
/// Firing more often than the shortest compounding period is harmless: a sweep within
/// an already-accrued period is a no-op.
#[derive(Debug)]
pub struct InterestScheduler;

impl InterestScheduler {
    pub fn spawn<S, B>(
        engine: Arc<InterestAccrualEngine<S, B>>,
        interval: Duration,
    ) -> io::Result<WorkerHandle>
    where
        S: BankStore + Clone + 'static,
        B: EventBus<EventEnvelope<BankingEvent>> + 'static,
    {
        spawn_worker("interest-scheduler", move |shutdown_rx| {
            info!(interval_secs = interval.as_secs(), "interest scheduler started");
            run_periodically("interest-scheduler", interval, shutdown_rx, || {
                engine.apply_interest(&OperationContext::system(), Utc::now());
            });
        })
    }
}
