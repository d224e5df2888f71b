//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Roles and principals are entities: renaming a role or changing its
/// permission list does not make it a different role.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
