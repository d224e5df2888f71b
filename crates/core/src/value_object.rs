//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**. Two permissions
/// built from the same patterns are the same permission, no matter which role
/// contributed them.
///
/// ## Value Object vs Entity
///
/// - **Value Object**: `Permission { operation: "self:*:*", resource: "self:user:@me" }`
/// - **Entity**: `Role { id: RoleId(3), name: "user", .. }` (identity matters)
pub trait ValueObject: Clone + PartialEq + Eq + core::hash::Hash + core::fmt::Debug {}
