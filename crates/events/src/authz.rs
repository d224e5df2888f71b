//! Grant-change events consumed by the invalidation channel.

use serde::{Deserialize, Serialize};

use gatehouse_core::{RoleId, UserId};

use crate::Event;

/// A user's role assignment was replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRoleAssigned {
    pub user_id: UserId,
    pub role_ids: Vec<RoleId>,
}

/// A user was deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDeleted {
    pub user_id: UserId,
}

/// A role's permission list was replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePermissionsChanged {
    pub role_id: RoleId,
}

/// All events that can make a cached permission set stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthzEvent {
    UserRoleAssigned(UserRoleAssigned),
    UserDeleted(UserDeleted),
    RolePermissionsChanged(RolePermissionsChanged),
}

impl AuthzEvent {
    pub fn user_role_assigned(user_id: UserId, role_ids: Vec<RoleId>) -> Self {
        Self::UserRoleAssigned(UserRoleAssigned { user_id, role_ids })
    }

    pub fn user_deleted(user_id: UserId) -> Self {
        Self::UserDeleted(UserDeleted { user_id })
    }

    pub fn role_permissions_changed(role_id: RoleId) -> Self {
        Self::RolePermissionsChanged(RolePermissionsChanged { role_id })
    }
}

impl Event for AuthzEvent {
    fn event_type(&self) -> &'static str {
        match self {
            AuthzEvent::UserRoleAssigned(_) => "authz.user.roles_assigned",
            AuthzEvent::UserDeleted(_) => "authz.user.deleted",
            AuthzEvent::RolePermissionsChanged(_) => "authz.role.permissions_changed",
        }
    }

    fn version(&self) -> u32 {
        1
    }
}
