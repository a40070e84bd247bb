//! `bizdesk-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives shared by every bounded
//! context: identifiers, the domain error model, aggregate traits and the
//! money/quantity value objects. No infrastructure concerns live here.

pub mod aggregate;
pub mod error;
pub mod id;
pub mod money;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::{AggregateId, TenantId, UserId};
pub use money::{BPS_SCALE, Money, Quantity, apply_bps, validate_currency};
pub use value_object::ValueObject;
