use serde::{Deserialize, Serialize};

use gatehouse_core::{Entity, UserId};

use crate::permissions::merge_unique;
use crate::{Permission, Role};

/// Authorization projection of a user: identity plus assigned roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: UserId,
    pub username: String,
    pub roles: Vec<Role>,
}

impl Principal {
    pub fn new(id: UserId, username: impl Into<String>, roles: Vec<Role>) -> Self {
        Self {
            id,
            username: username.into(),
            roles,
        }
    }

    /// Names of the explicitly assigned roles, in assignment order.
    pub fn role_names(&self) -> Vec<String> {
        self.roles.iter().map(|r| r.name.clone()).collect()
    }

    pub fn has_role(&self, name: &str) -> bool {
        self.roles.iter().any(|r| r.name == name)
    }

    /// De-duplicated union of every permission across the assigned roles.
    pub fn permissions(&self) -> Vec<Permission> {
        let mut permissions = Vec::new();
        for role in &self.roles {
            merge_unique(&mut permissions, role.permissions.iter().cloned());
        }
        permissions
    }

    /// True iff some assigned role grants a permission matching both axes.
    pub fn has_permission(&self, operation: &str, resource: &str) -> bool {
        self.roles
            .iter()
            .flat_map(|r| r.permissions.iter())
            .any(|p| p.matches_for(self.id, operation, resource))
    }

    /// Operation-only check.
    ///
    /// Queries with the universal resource `*`, which the matcher compares
    /// against each grant's own resource pattern. A grant scoped to a narrower
    /// resource therefore does not satisfy this check; only grants whose
    /// resource pattern is itself `*` do.
    pub fn has_operation_permission(&self, operation: &str) -> bool {
        self.has_permission(operation, "*")
    }
}

impl Entity for Principal {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Effective (role names, permissions) set of a principal.
///
/// This is what the resolver produces and what the cache stores.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSet {
    pub roles: Vec<String>,
    pub permissions: Vec<Permission>,
}

impl PermissionSet {
    pub fn new(roles: Vec<String>, permissions: Vec<Permission>) -> Self {
        Self { roles, permissions }
    }

    pub fn has_role(&self, name: &str) -> bool {
        self.roles.iter().any(|r| r == name)
    }

    /// The first grant allowing `user_id` to perform `operation` on `resource`.
    pub fn matching(&self, user_id: UserId, operation: &str, resource: &str) -> Option<&Permission> {
        self.permissions
            .iter()
            .find(|p| p.matches_for(user_id, operation, resource))
    }

    pub fn allows(&self, user_id: UserId, operation: &str, resource: &str) -> bool {
        self.matching(user_id, operation, resource).is_some()
    }

    /// Operation-only check with the same literal semantics as
    /// [`Principal::has_operation_permission`].
    pub fn allows_operation(&self, user_id: UserId, operation: &str) -> bool {
        self.allows(user_id, operation, "*")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatehouse_core::RoleId;
    use proptest::prelude::*;

    fn principal_with(roles: Vec<Role>) -> Principal {
        Principal::new(UserId::new(5), "alice", roles)
    }

    #[test]
    fn admin_grant_covers_three_segment_resources() {
        let p = principal_with(vec![Role::admin(RoleId::new(1))]);

        assert!(p.has_permission("admin:users:delete", "admin:user:5"));
        assert!(!p.has_permission("admin:users:delete", "org:42:team:7"));
    }

    #[test]
    fn operation_only_check_requires_universal_resource_pattern() {
        let scoped = principal_with(vec![Role::new(
            RoleId::new(2),
            "reporter",
            vec![Permission::new("reports:*:read", "org:42:report:*")],
        )]);
        assert!(!scoped.has_operation_permission("reports:sales:read"));

        let universal = principal_with(vec![Role::new(
            RoleId::new(3),
            "auditor",
            vec![Permission::new("reports:*:read", "*")],
        )]);
        assert!(universal.has_operation_permission("reports:sales:read"));

        // `*:*:*` is a three-segment pattern, not the universal one.
        let admin = principal_with(vec![Role::admin(RoleId::new(1))]);
        assert!(!admin.has_operation_permission("admin:users:create"));
    }

    #[test]
    fn permissions_are_deduplicated_across_roles() {
        let shared = Permission::new("org:*:read", "org:*");
        let p = principal_with(vec![
            Role::new(RoleId::new(1), "a", vec![shared.clone()]),
            Role::new(RoleId::new(2), "b", vec![shared.clone(), Permission::new("x:y:z", "*")]),
        ]);

        assert_eq!(p.permissions(), vec![shared, Permission::new("x:y:z", "*")]);
        assert_eq!(p.role_names(), vec!["a", "b"]);
    }

    #[test]
    fn permission_set_allows_self_scoped_resources() {
        let set = PermissionSet::new(
            vec!["user".into()],
            vec![Permission::new("self:*:*", "self:user:@me")],
        );
        let me = UserId::new(11);

        assert!(set.allows(me, "self:profile:update", "self:user:11"));
        assert!(!set.allows(me, "self:profile:update", "self:user:12"));
        assert!(set.has_role("user"));
    }

    fn pattern_segment() -> impl Strategy<Value = String> {
        prop_oneof![Just("*".to_string()), "[ab]"]
    }

    fn pattern() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("*".to_string()),
            prop::collection::vec(pattern_segment(), 1..4).prop_map(|s| s.join(":")),
        ]
    }

    fn value() -> impl Strategy<Value = String> {
        prop::collection::vec("[ab]", 1..4).prop_map(|s| s.join(":"))
    }

    fn brute_force(perms: &[(String, String)], op: &str, res: &str) -> bool {
        perms.iter().any(|(po, pr)| {
            let axis = |p: &str, v: &str| {
                if p == "*" {
                    return true;
                }
                let ps: Vec<&str> = p.split(':').collect();
                let vs: Vec<&str> = v.split(':').collect();
                ps.len() == vs.len() && ps.iter().zip(&vs).all(|(a, b)| *a == "*" || a == b)
            };
            axis(po, op) && axis(pr, res)
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: `has_permission` agrees with a brute-force scan.
        #[test]
        fn has_permission_matches_brute_force(
            grants in prop::collection::vec((pattern(), pattern()), 0..6),
            op in value(),
            res in value(),
        ) {
            let role = Role::new(
                RoleId::new(1),
                "generated",
                grants.iter().map(|(o, r)| Permission::new(o.clone(), r.clone())).collect(),
            );
            let p = principal_with(vec![role]);

            prop_assert_eq!(p.has_permission(&op, &res), brute_force(&grants, &op, &res));
        }
    }
}
