use std::io;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use corebank_events::{BankingEvent, EventBus, EventEnvelope};

use super::{WorkerHandle, run_periodically, spawn_worker};
use crate::database::Database;
use crate::store::BankStore;

/// Periodically delivers outbox rows that the post-commit dispatch did not.
#[derive(Debug)]
pub struct OutboxRelay;

impl OutboxRelay {
    pub fn spawn<S, B>(db: Arc<Database<S, B>>, interval: Duration) -> io::Result<WorkerHandle>
    where
        S: BankStore + Clone + 'static,
        B: EventBus<EventEnvelope<BankingEvent>> + 'static,
    {
        spawn_worker("outbox-relay", move |shutdown_rx| {
            run_periodically("outbox-relay", interval, shutdown_rx, || {
                match db.outbox().dispatch_pending() {
                    Ok(0) => {}
                    Ok(n) => debug!(delivered = n, "outbox relay delivered events"),
                    Err(err) => warn!(error = %err, "outbox relay failed; will retry"),
                }
            });
        })
    }
}
