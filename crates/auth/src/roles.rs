use serde::{Deserialize, Serialize};

use gatehouse_core::{DomainError, DomainResult, Entity, RoleId};

use crate::Permission;

/// Role name reported for the root account.
pub const ROOT_ROLE: &str = "root";

/// Role every authenticated principal holds implicitly.
pub const DEFAULT_ROLE: &str = "user";

/// Role name of the built-in administrator.
pub const ADMIN_ROLE: &str = "admin";

/// A named bundle of permissions.
///
/// Roles are singletons keyed by `name`. System roles ship with the product
/// and cannot be deleted through normal mutation paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub display_name: String,
    pub is_system: bool,
    pub permissions: Vec<Permission>,
}

impl Role {
    pub fn new(id: RoleId, name: impl Into<String>, permissions: Vec<Permission>) -> Self {
        let name = name.into();
        Self {
            id,
            display_name: name.clone(),
            name,
            is_system: false,
            permissions,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    pub fn system(mut self) -> Self {
        self.is_system = true;
        self
    }

    /// Built-in administrator: every operation on every three-segment resource.
    pub fn admin(id: RoleId) -> Self {
        Self::new(id, ADMIN_ROLE, vec![Permission::new("*:*:*", "*:*:*")])
            .with_display_name("Administrator")
            .system()
    }

    /// Built-in default role: self-service on the principal's own record.
    pub fn default_user(id: RoleId) -> Self {
        Self::new(id, DEFAULT_ROLE, vec![Permission::new("self:*:*", "self:user:@me")])
            .with_display_name("User")
            .system()
    }

    /// Reject deletion of system roles.
    pub fn ensure_deletable(&self) -> DomainResult<()> {
        if self.is_system {
            return Err(DomainError::invariant(format!(
                "role '{}' is a system role and cannot be deleted",
                self.name
            )));
        }
        Ok(())
    }
}

impl Entity for Role {
    type Id = RoleId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.name)
    }
}
