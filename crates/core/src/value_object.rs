//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects have **no identity**; two instances with the same attribute values are
/// interchangeable. They are immutable: "changing" one means constructing a new value.
///
/// - **Value Object**: `Money`, `Currency`, `InterestRate`
/// - **Entity**: `Account`, `InterestRule` (identified by their ids)
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
