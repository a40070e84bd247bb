//! Value object marker.

/// Immutable value compared by its attributes, never by identity.
///
/// `Money` and `Quantity` are the value objects of this crate; the line and
/// totals types in the catalog crate implement it as well.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
