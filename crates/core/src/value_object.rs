//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable domain values compared entirely by their
/// attributes: a `Quantity` of 4.5 tablets is the same 4.5 tablets
/// wherever it appears. To "modify" one, construct a new value.
///
/// The bounds keep value objects cheap to copy, comparable, and debuggable.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
