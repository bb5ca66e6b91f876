//! Audit trail model and the pure before/after diff.
//!
//! Changes are described explicitly (`EntityChange`) by whoever mutates an entity; the
//! diff turns one change into at most one `AuditEntry`. No IO happens here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use corebank_core::{Audited, FieldMap, UserId};

const ANONYMOUS_ACTOR: &str = "anonymous";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditAction {
    Added,
    Modified,
    Deleted,
}

impl core::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            AuditAction::Added => "Added",
            AuditAction::Modified => "Modified",
            AuditAction::Deleted => "Deleted",
        };
        f.write_str(s)
    }
}

/// Who caused a change and from where.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditContext {
    pub actor: Option<UserId>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl AuditContext {
    /// System-initiated work (scheduler, relay).
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn for_user(actor: UserId) -> Self {
        Self {
            actor: Some(actor),
            ..Self::default()
        }
    }

    pub fn with_request(
        mut self,
        ip_address: impl Into<String>,
        user_agent: impl Into<String>,
    ) -> Self {
        self.ip_address = Some(ip_address.into());
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn actor_label(&self) -> String {
        self.actor
            .map(|a| a.to_string())
            .unwrap_or_else(|| ANONYMOUS_ACTOR.to_string())
    }
}

/// Append-only audit row.
///
/// `id` is assigned by the store when the row is appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Option<u64>,
    pub action: AuditAction,
    pub actor: String,
    pub entity_type: String,
    pub entity_id: String,
    pub old_values: FieldMap,
    pub new_values: FieldMap,
    pub changed_fields: Vec<String>,
    pub recorded_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl AuditEntry {
    /// Fill in a value the store only assigned at commit (e.g. a ledger sequence).
    ///
    /// Only touches the side of the entry that describes the committed state.
    pub fn resolve_committed_field(&mut self, field: &str, value: JsonValue) {
        if self.action == AuditAction::Deleted {
            return;
        }
        if let Some(slot) = self.new_values.get_mut(field) {
            *slot = value;
        }
    }
}

/// One intended mutation of an audited entity, as recorded by a unit of work.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityChange {
    entity_type: &'static str,
    entity_id: String,
    before: Option<FieldMap>,
    after: Option<FieldMap>,
}

impl EntityChange {
    pub fn added<T: Audited>(entity: &T) -> Self {
        Self {
            entity_type: T::ENTITY_TYPE,
            entity_id: entity.id().to_string(),
            before: None,
            after: Some(entity.snapshot()),
        }
    }

    pub fn modified<T: Audited>(before: &T, after: &T) -> Self {
        Self {
            entity_type: T::ENTITY_TYPE,
            entity_id: after.id().to_string(),
            before: Some(before.snapshot()),
            after: Some(after.snapshot()),
        }
    }

    pub fn deleted<T: Audited>(entity: &T) -> Self {
        Self {
            entity_type: T::ENTITY_TYPE,
            entity_id: entity.id().to_string(),
            before: Some(entity.snapshot()),
            after: None,
        }
    }

    pub fn entity_type(&self) -> &'static str {
        self.entity_type
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn action(&self) -> AuditAction {
        match (&self.before, &self.after) {
            (None, _) => AuditAction::Added,
            (Some(_), Some(_)) => AuditAction::Modified,
            (Some(_), None) => AuditAction::Deleted,
        }
    }

    /// Build the audit row for this change, or `None` when nothing changed.
    pub fn into_entry(self, ctx: &AuditContext, recorded_at: DateTime<Utc>) -> Option<AuditEntry> {
        let action = self.action();
        let (old_values, new_values, changed_fields) = match (self.before, self.after) {
            (None, Some(after)) => (FieldMap::new(), after, Vec::new()),
            (Some(before), None) => (before, FieldMap::new(), Vec::new()),
            (Some(before), Some(after)) => {
                let (old, new, changed) = diff_fields(&before, &after);
                if changed.is_empty() {
                    return None;
                }
                (old, new, changed)
            }
            (None, None) => return None,
        };

        Some(AuditEntry {
            id: None,
            action,
            actor: ctx.actor_label(),
            entity_type: self.entity_type.to_string(),
            entity_id: self.entity_id,
            old_values,
            new_values,
            changed_fields,
            recorded_at,
            ip_address: ctx.ip_address.clone(),
            user_agent: ctx.user_agent.clone(),
        })
    }
}

/// Old and new values of every field that differs, plus the field names.
fn diff_fields(before: &FieldMap, after: &FieldMap) -> (FieldMap, FieldMap, Vec<String>) {
    let mut old = FieldMap::new();
    let mut new = FieldMap::new();
    let mut changed = Vec::new();

    let names = before.keys().chain(after.keys().filter(|k| !before.contains_key(*k)));
    for name in names {
        let b = before.get(name).unwrap_or(&JsonValue::Null);
        let a = after.get(name).unwrap_or(&JsonValue::Null);
        if b != a {
            old.insert(name.clone(), b.clone());
            new.insert(name.clone(), a.clone());
            changed.push(name.clone());
        }
    }
    changed.sort();

    (old, new, changed)
}
