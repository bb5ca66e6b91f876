//! Entity trait: identity + continuity across state changes.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value as JsonValue;

/// Field name -> value snapshot of an entity, ordered by field name.
pub type FieldMap = BTreeMap<String, JsonValue>;

/// Audit rows name fields in PascalCase (`owner_id` -> `OwnerId`).
pub fn audit_field_name(field: &str) -> String {
    field
        .split('_')
        .filter(|part| !part.is_empty())
        .flat_map(|part| {
            let mut chars = part.chars();
            chars
                .next()
                .map(|first| first.to_ascii_uppercase())
                .into_iter()
                .chain(chars)
        })
        .collect()
}

/// Entity marker + minimal interface.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug + core::fmt::Display;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}

/// An entity whose mutations are captured in the audit log.
///
/// The snapshot is derived from the entity's serde representation, so every serialized
/// field participates in diffs. Keys are renamed with [`audit_field_name`].
pub trait Audited: Entity + Serialize {
    /// Entity type name recorded in audit rows (e.g. "BankAccount").
    const ENTITY_TYPE: &'static str;

    /// Serialized (serde) field names left out of audit snapshots, e.g. versions.
    const UNAUDITED_FIELDS: &'static [&'static str] = &[];

    fn snapshot(&self) -> FieldMap {
        match serde_json::to_value(self) {
            Ok(JsonValue::Object(map)) => map
                .into_iter()
                .filter(|(k, _)| !Self::UNAUDITED_FIELDS.contains(&k.as_str()))
                .map(|(k, v)| (audit_field_name(&k), v))
                .collect(),
            Ok(other) => BTreeMap::from([("Value".to_string(), other)]),
            Err(e) => BTreeMap::from([(
                "SnapshotError".to_string(),
                JsonValue::String(e.to_string()),
            )]),
        }
    }
}
