//! `corebank-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod aggregate;
pub mod cancellation;
pub mod entity;
pub mod error;
pub mod id;
pub mod money;
pub mod page;
pub mod value_object;

pub use aggregate::{AggregateRoot, ExpectedVersion};
pub use cancellation::Cancellation;
pub use entity::{Audited, Entity, FieldMap, audit_field_name};
pub use error::{DomainError, DomainResult, ErrorBody};
pub use id::{AccountId, InterestRuleId, ScheduledInterestId, TransactionId, UserId};
pub use money::{Currency, MONEY_SCALE, Money};
pub use page::{Page, PageRequest};
pub use value_object::ValueObject;
