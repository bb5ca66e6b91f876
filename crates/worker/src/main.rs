//! Background process: runs the interest scheduler and the outbox relay over the
//! in-memory store, and logs every delivered banking event.
//!
//! Stops on `quit` or end of standard input.

use std::convert::Infallible;
use std::io::{self, BufRead};
use std::sync::Arc;

use anyhow::Context;

use corebank_events::{BankingEvent, EventEnvelope, InMemoryEventBus};
use corebank_infra::{
    AccountNumberCipher, CoreBank, CoreConfig, EventSubscriberWorker, InMemoryBankStore,
    InMemoryOwnerDirectory,
};

const DEV_KEY: [u8; 32] = [0x42; 32];
const DEV_IV: [u8; 16] = [0x24; 16];

fn main() -> anyhow::Result<()> {
    corebank_observability::init();

    let config = CoreConfig::from_env().context("invalid configuration")?;
    let cipher = match config.cipher() {
        Some(cipher) => cipher.context("invalid account number key material")?,
        None => {
            tracing::warn!("COREBANK_ENCRYPTION_KEY not set; using insecure dev key");
            AccountNumberCipher::new(&DEV_KEY, &DEV_IV)?
        }
    };

    let bus: Arc<InMemoryEventBus<EventEnvelope<BankingEvent>>> = Arc::new(InMemoryEventBus::new());
    let bank = CoreBank::new(
        &config,
        Arc::new(InMemoryBankStore::new()),
        Arc::clone(&bus),
        Arc::new(InMemoryOwnerDirectory::new()),
        cipher,
    );

    let notifier = EventSubscriberWorker::spawn(
        "notifications",
        bus.as_ref(),
        |env: EventEnvelope<BankingEvent>| {
            tracing::info!(
                sequence = env.sequence_number(),
                user_id = %env.payload().user_id(),
                account_id = %env.payload().account_id(),
                "banking event delivered"
            );
            Ok::<(), Infallible>(())
        },
    )
    .context("failed to start notification worker")?;
    let workers = bank
        .spawn_workers(&config)
        .context("failed to start background workers")?;

    tracing::info!(
        interest_interval_secs = config.interest_interval.as_secs(),
        "worker running; type 'quit' or close stdin to stop"
    );
    wait_for_quit();

    for worker in workers {
        tracing::info!(worker = worker.name(), "stopping");
        worker.shutdown();
    }
    notifier.shutdown();
    tracing::info!("worker stopped");
    Ok(())
}

fn wait_for_quit() {
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        match line {
            Ok(l) if l.trim().eq_ignore_ascii_case("quit") => return,
            Ok(_) => continue,
            Err(_) => return,
        }
    }
}
