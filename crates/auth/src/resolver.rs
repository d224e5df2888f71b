//! Effective permission resolution.
//!
//! ```text
//! principal store ──► root bypass? ──yes──► (["root"], [("*:*:*", "*")])
//!                          │no
//!                          ▼
//!               explicit roles + permissions
//!                          │
//!                          ▼
//!       default role merged in (unless already assigned)
//! ```

use tracing::{debug, instrument, warn};

use gatehouse_core::UserId;

use crate::permissions::merge_unique;
use crate::roles::ROOT_ROLE;
use crate::store::{PrincipalStore, RoleStore, StoreError};
use crate::{AuthzError, AuthzSettings, Permission, PermissionSet, Principal};

/// Computes a principal's effective permission set from the stores.
#[derive(Debug, Clone)]
pub struct PermissionResolver<P, R> {
    principals: P,
    roles: R,
    root_username: String,
    default_role: String,
}

impl<P, R> PermissionResolver<P, R>
where
    P: PrincipalStore,
    R: RoleStore,
{
    pub fn new(principals: P, roles: R, settings: &AuthzSettings) -> Self {
        Self {
            principals,
            roles,
            root_username: settings.root_username.clone(),
            default_role: settings.default_role.clone(),
        }
    }

    pub fn principals(&self) -> &P {
        &self.principals
    }

    /// Load a principal; an unknown principal is a hard error.
    pub async fn load_principal(&self, user_id: UserId) -> Result<Principal, AuthzError> {
        self.principals
            .get_by_id_with_roles(user_id)
            .await
            .map_err(|err| match err {
                StoreError::NotFound { .. } => AuthzError::PrincipalNotFound(user_id),
                StoreError::Backend(msg) => AuthzError::Store(msg),
            })
    }

    /// Resolve the effective (role names, permissions) of `user_id`.
    #[instrument(skip(self), fields(user_id = %user_id), err)]
    pub async fn resolve(&self, user_id: UserId) -> Result<PermissionSet, AuthzError> {
        let principal = self.load_principal(user_id).await?;
        Ok(self.resolve_principal(&principal).await)
    }

    /// Resolve an already loaded principal.
    ///
    /// Never fails: a missing default role degrades to "no implicit grants".
    pub async fn resolve_principal(&self, principal: &Principal) -> PermissionSet {
        if principal.username == self.root_username {
            debug!(user_id = %principal.id, "root bypass");
            return PermissionSet::new(vec![ROOT_ROLE.to_string()], vec![Permission::root()]);
        }

        let mut roles = principal.role_names();
        let mut permissions = principal.permissions();

        if !roles.iter().any(|r| *r == self.default_role) {
            roles.push(self.default_role.clone());

            match self.roles.find_by_name(&self.default_role).await {
                Ok(default_role) => merge_unique(&mut permissions, default_role.permissions),
                Err(err) => warn!(
                    user_id = %principal.id,
                    role = %self.default_role,
                    error = %err,
                    "default role lookup failed; resolving without implicit grants"
                ),
            }
        }

        PermissionSet::new(roles, permissions)
    }
}
