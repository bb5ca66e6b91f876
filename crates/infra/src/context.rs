use corebank_banking::AuditContext;
use corebank_core::{Cancellation, UserId};

/// Per-call context: who is acting (for audit rows) and a cancellation signal.
#[derive(Debug, Clone, Default)]
pub struct OperationContext {
    pub audit: AuditContext,
    pub cancellation: Cancellation,
}

impl OperationContext {
    /// Work initiated by the system itself (scheduler, relay).
    pub fn system() -> Self {
        Self::default()
    }

    pub fn for_user(actor: UserId) -> Self {
        Self {
            audit: AuditContext::for_user(actor),
            cancellation: Cancellation::new(),
        }
    }

    pub fn with_request(
        mut self,
        ip_address: impl Into<String>,
        user_agent: impl Into<String>,
    ) -> Self {
        self.audit = self.audit.with_request(ip_address, user_agent);
        self
    }

    pub fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn actor(&self) -> Option<UserId> {
        self.audit.actor
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}
