use std::borrow::Cow;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use gatehouse_core::{UserId, ValueObject};

use crate::matcher::{self, WILDCARD};

/// Operation URN (`scope:category:action`), concrete or pattern.
///
/// e.g. `admin:users:create`, `self:2fa:setup`, `*:*:*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Operation(Cow<'static, str>);

/// Resource URN, concrete or pattern.
///
/// e.g. `self:user:@me`, `org:42:team:7`, `*`. The `@me` segment is resolved
/// to the requesting principal's id before matching.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Resource(Cow<'static, str>);

macro_rules! impl_urn {
    ($t:ty) => {
        impl $t {
            pub fn new(urn: impl Into<Cow<'static, str>>) -> Self {
                Self(urn.into())
            }

            /// The universal match-all pattern.
            pub fn any() -> Self {
                Self(Cow::Borrowed(WILDCARD))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_wildcard(&self) -> bool {
                self.as_str() == WILDCARD
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&'static str> for $t {
            fn from(value: &'static str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $t {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }

        impl ValueObject for $t {}
    };
}

impl_urn!(Operation);
impl_urn!(Resource);

impl Resource {
    /// Resolve `@me` segments against the requesting principal.
    pub fn for_principal(&self, user_id: UserId) -> Resource {
        Resource::new(matcher::resolve_self(self.as_str(), user_id))
    }
}

/// A stored grant: an (operation pattern, resource pattern) pair.
///
/// Permissions are compared and de-duplicated by the pair; two roles granting
/// the same patterns grant the same permission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permission {
    #[serde(rename = "operation_pattern")]
    pub operation: Operation,
    #[serde(rename = "resource_pattern")]
    pub resource: Resource,
}

impl ValueObject for Permission {}

impl Permission {
    pub fn new(operation: impl Into<Operation>, resource: impl Into<Resource>) -> Self {
        Self {
            operation: operation.into(),
            resource: resource.into(),
        }
    }

    /// The root grant: every operation on every resource.
    pub fn root() -> Self {
        Self::new("*:*:*", "*")
    }

    /// Display key (`operation|resource`). Not unique when a pattern
    /// contains `|`; compare permissions directly instead.
    pub fn key(&self) -> String {
        format!("{}|{}", self.operation, self.resource)
    }

    /// Literal two-axis match; `@me` is not resolved here.
    pub fn matches(&self, operation: &str, resource: &str) -> bool {
        matcher::matches(self.operation.as_str(), operation)
            && matcher::matches(self.resource.as_str(), resource)
    }

    /// Two-axis match for a request made by `user_id`.
    ///
    /// `@me` segments in both the stored pattern and the requested resource
    /// are resolved to the principal's id first.
    pub fn matches_for(&self, user_id: UserId, operation: &str, resource: &str) -> bool {
        if !matcher::matches(self.operation.as_str(), operation) {
            return false;
        }

        let pattern = matcher::resolve_self(self.resource.as_str(), user_id);
        let requested = matcher::resolve_self(resource, user_id);
        matcher::matches(&pattern, &requested)
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} on {}", self.operation, self.resource)
    }
}

/// Merge `incoming` into `into`, skipping permissions already present.
///
/// First-seen order is preserved.
pub fn merge_unique(into: &mut Vec<Permission>, incoming: impl IntoIterator<Item = Permission>) {
    let mut seen: HashSet<Permission> = into.iter().cloned().collect();
    for permission in incoming {
        if !seen.contains(&permission) {
            seen.insert(permission.clone());
            into.push(permission);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_shape_uses_pattern_field_names() {
        let json = serde_json::to_value(Permission::new("self:*:*", "self:user:@me")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "operation_pattern": "self:*:*",
                "resource_pattern": "self:user:@me"
            })
        );
    }

    #[test]
    fn key_joins_both_patterns() {
        assert_eq!(Permission::root().key(), "*:*:*|*");
    }

    #[test]
    fn self_scoped_grant_only_matches_own_resource() {
        let me = UserId::new(7);
        let grant = Permission::new("self:*:*", "self:user:@me");

        assert!(grant.matches_for(me, "self:profile:update", "self:user:7"));
        assert!(grant.matches_for(me, "self:profile:update", "self:user:@me"));
        assert!(!grant.matches_for(me, "self:profile:update", "self:user:8"));
        assert!(!grant.matches("self:profile:update", "self:user:7"));
    }

    #[test]
    fn merge_unique_keeps_first_seen_order() {
        let mut perms = vec![Permission::new("a:b:c", "*"), Permission::new("x:y:z", "*")];
        merge_unique(
            &mut perms,
            vec![Permission::new("x:y:z", "*"), Permission::new("d:e:f", "*")],
        );

        let keys: Vec<String> = perms.iter().map(Permission::key).collect();
        assert_eq!(keys, vec!["a:b:c|*", "x:y:z|*", "d:e:f|*"]);
    }

    #[test]
    fn merge_unique_keeps_pairs_that_share_a_display_key() {
        let mut perms = vec![Permission::new("a|b", "c")];
        merge_unique(&mut perms, vec![Permission::new("a", "b|c"), Permission::new("a|b", "c")]);

        assert_eq!(perms, vec![Permission::new("a|b", "c"), Permission::new("a", "b|c")]);
        assert_eq!(perms[0].key(), perms[1].key());
    }

    #[test]
    fn for_principal_resolves_self_token() {
        let res = Resource::new("self:user:@me").for_principal(UserId::new(3));
        assert_eq!(res.as_str(), "self:user:3");
    }
}
