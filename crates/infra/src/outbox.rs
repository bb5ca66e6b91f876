//! Transactional outbox.
//!
//! Events are written as outbox rows in the same atomic batch as the business mutation
//! that caused them, then published to the bus by the dispatcher:
//!
//! ```text
//! commit(state + outbox rows) ──► OutboxDispatcher ──► EventBus ──► subscribers
//!                                      ▲
//!                            OutboxRelay (periodic)
//! ```
//!
//! A row is marked dispatched only after the bus accepted it. A crash between publish
//! and mark means the row is published again: delivery is at-least-once and subscribers
//! deduplicate on `EventEnvelope::event_id`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use corebank_core::UserId;
use corebank_events::{BankingEvent, Event, EventBus, EventEnvelope};

use crate::error::StoreError;
use crate::store::BankStore;

const DEFAULT_BATCH_SIZE: usize = 100;

/// A persisted event intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxRecord {
    pub id: Uuid,
    /// Position in the outbox, assigned at commit (0 until then).
    pub sequence: u64,
    pub event: BankingEvent,
    pub recorded_at: DateTime<Utc>,
    pub dispatched_at: Option<DateTime<Utc>>,
}

impl OutboxRecord {
    pub(crate) fn pending(event: BankingEvent) -> Self {
        let recorded_at = event.occurred_at();
        Self {
            id: Uuid::now_v7(),
            sequence: 0,
            event,
            recorded_at,
            dispatched_at: None,
        }
    }

    /// The stored form of this row, as written by a store at commit.
    pub fn committed(mut self, sequence: u64, recorded_at: DateTime<Utc>) -> Self {
        self.sequence = sequence;
        self.recorded_at = recorded_at;
        self
    }

    /// Stamp delivery once and drop sensitive payload fields.
    pub fn mark_dispatched(&mut self, at: DateTime<Utc>) {
        if self.dispatched_at.is_none() {
            self.dispatched_at = Some(at);
            self.event.redact_delivered();
        }
    }

    pub fn is_dispatched(&self) -> bool {
        self.dispatched_at.is_some()
    }
}

/// Resolves an owner's contact address for notification events.
pub trait OwnerDirectory: Send + Sync {
    fn email_of(&self, user: UserId) -> Option<String>;
}

#[derive(Debug, Default)]
pub struct InMemoryOwnerDirectory {
    emails: RwLock<HashMap<UserId, String>>,
}

impl InMemoryOwnerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, user: UserId, email: impl Into<String>) {
        if let Ok(mut emails) = self.emails.write() {
            emails.insert(user, email.into());
        }
    }
}

impl OwnerDirectory for InMemoryOwnerDirectory {
    fn email_of(&self, user: UserId) -> Option<String> {
        self.emails.read().ok()?.get(&user).cloned()
    }
}

/// Publishes committed outbox rows to the bus.
pub struct OutboxDispatcher<S, B> {
    store: S,
    bus: B,
    directory: Arc<dyn OwnerDirectory>,
    batch_size: usize,
    // One dispatch at a time per process keeps bus order equal to outbox order.
    in_flight: Mutex<()>,
}

impl<S, B> core::fmt::Debug for OutboxDispatcher<S, B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("OutboxDispatcher")
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

impl<S, B> OutboxDispatcher<S, B>
where
    S: BankStore,
    B: EventBus<EventEnvelope<BankingEvent>>,
{
    pub fn new(store: S, bus: B, directory: Arc<dyn OwnerDirectory>) -> Self {
        Self {
            store,
            bus,
            directory,
            batch_size: DEFAULT_BATCH_SIZE,
            in_flight: Mutex::new(()),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Publish every pending row, in commit order. Returns how many were delivered.
    ///
    /// Stops at the first publish failure; the remaining rows stay pending for the relay.
    pub fn dispatch_pending(&self) -> Result<usize, StoreError> {
        let _guard = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut delivered = 0;
        loop {
            let pending = self.store.pending_outbox(self.batch_size)?;
            if pending.is_empty() {
                return Ok(delivered);
            }

            let fetched = pending.len();
            let mut published = Vec::with_capacity(fetched);
            let mut failed = false;
            for record in pending {
                let email = self.directory.email_of(record.event.user_id());
                let envelope = EventEnvelope::new(
                    record.id,
                    record.sequence,
                    record.recorded_at,
                    record.event.with_email(email),
                );
                let event_type = envelope.payload().event_type();

                match self.bus.publish(envelope) {
                    Ok(()) => {
                        debug!(event_id = %record.id, sequence = record.sequence, event_type, "outbox event published");
                        published.push(record.id);
                    }
                    Err(err) => {
                        warn!(event_id = %record.id, error = ?err, "outbox publish failed; will retry");
                        failed = true;
                        break;
                    }
                }
            }

            self.store.mark_dispatched(&published)?;
            delivered += published.len();

            if failed || fetched < self.batch_size {
                return Ok(delivered);
            }
        }
    }
}
