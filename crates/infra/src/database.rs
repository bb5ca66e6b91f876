//! Commit pipeline: the single write path of the banking core.
//!
//! ```text
//! UnitOfWork
//!   ↓
//! 1. Capture audit diff (pre-commit state)
//!   ↓
//! 2. Apply batch atomically (versions checked, outbox rows written)
//!   ↓
//! 3. Resolve commit-assigned ids and append audit rows
//!   ↓
//! 4. Dispatch outbox rows to the bus (best effort; the relay catches up)
//! ```
//!
//! If step 2 fails nothing is written and nothing is published. If step 3 fails the
//! business data is already durable, so the failure is reported as
//! `CommitError::AuditWrite` rather than as a business failure.

use std::sync::Arc;
use std::thread;

use chrono::Utc;
use tracing::{debug, error, warn};

use corebank_core::{Cancellation, DomainError, DomainResult};
use corebank_events::{BankingEvent, EventBus, EventEnvelope};

use crate::audit::AuditRecorder;
use crate::context::OperationContext;
use crate::error::{CommitError, OperationError, OperationResult};
use crate::outbox::{OutboxDispatcher, OwnerDirectory};
use crate::retry::RetryPolicy;
use crate::store::{BankStore, CommitReceipt};
use crate::unit_of_work::UnitOfWork;

#[derive(Debug)]
pub struct Database<S, B> {
    store: S,
    recorder: AuditRecorder<S>,
    outbox: OutboxDispatcher<S, B>,
    retry: RetryPolicy,
    dispatch_on_commit: bool,
}

impl<S, B> Database<S, B>
where
    S: BankStore + Clone,
    B: EventBus<EventEnvelope<BankingEvent>>,
{
    pub fn new(store: S, bus: B, directory: Arc<dyn OwnerDirectory>) -> Self {
        Self {
            recorder: AuditRecorder::new(store.clone()),
            outbox: OutboxDispatcher::new(store.clone(), bus, directory),
            store,
            retry: RetryPolicy::default(),
            dispatch_on_commit: true,
        }
    }

    /// Policy for retrying optimistic-concurrency conflicts.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// When disabled, events are only delivered by the outbox relay.
    pub fn with_dispatch_on_commit(mut self, enabled: bool) -> Self {
        self.dispatch_on_commit = enabled;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn outbox(&self) -> &OutboxDispatcher<S, B> {
        &self.outbox
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Commit a unit of work through the full pipeline.
    pub fn commit(
        &self,
        uow: UnitOfWork,
        cancellation: &Cancellation,
    ) -> Result<CommitReceipt, CommitError> {
        if cancellation.is_cancelled() {
            return Err(CommitError::Cancelled);
        }

        let pending = self.recorder.capture(&uow, Utc::now());
        let receipt = self
            .store
            .apply(uow.into_batch())
            .map_err(DomainError::from)?;

        let audited = self.recorder.persist(pending, &receipt);

        if self.dispatch_on_commit {
            if let Err(err) = self.outbox.dispatch_pending() {
                warn!(error = %err, "post-commit outbox dispatch failed; relay will retry");
            }
        }

        match audited {
            Ok(_) => Ok(receipt),
            Err(source) => {
                error!(error = %source, "business commit succeeded but audit write failed");
                Err(CommitError::AuditWrite { source })
            }
        }
    }

    /// Run `op` against a fresh unit of work and commit it, retrying on conflicts with
    /// the configured policy.
    ///
    /// `op` is re-run from scratch on every attempt, so it must re-read whatever state it
    /// depends on.
    pub fn run<T>(
        &self,
        ctx: &OperationContext,
        op: impl FnMut(&mut UnitOfWork) -> DomainResult<T>,
    ) -> OperationResult<(T, CommitReceipt)> {
        self.run_with(ctx, &self.retry, op)
    }

    pub fn run_with<T>(
        &self,
        ctx: &OperationContext,
        policy: &RetryPolicy,
        mut op: impl FnMut(&mut UnitOfWork) -> DomainResult<T>,
    ) -> OperationResult<(T, CommitReceipt)> {
        let mut retries = 0;
        loop {
            if ctx.is_cancelled() {
                return Err(OperationError::Cancelled);
            }

            let mut uow = UnitOfWork::new(ctx.audit.clone());
            let value = op(&mut uow).inspect_err(log_if_fatal)?;

            match self.commit(uow, &ctx.cancellation) {
                Ok(receipt) => return Ok((value, receipt)),
                Err(CommitError::Business(err))
                    if err.is_retryable() && policy.should_retry(retries) =>
                {
                    retries += 1;
                    let delay = policy.delay_for_attempt(retries);
                    debug!(attempt = retries, ?delay, error = %err, "retrying after conflict");
                    thread::sleep(delay);
                }
                Err(CommitError::Business(err)) => {
                    log_if_fatal(&err);
                    return Err(err.into());
                }
                Err(other) => return Err(other.into()),
            }
        }
    }
}

fn log_if_fatal(err: &DomainError) {
    if err.is_fatal() {
        error!(code = err.code(), error = %err, "fatal error; operation aborted");
    }
}
