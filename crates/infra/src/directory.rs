//! In-memory source of truth for principals and roles (tests/dev).
//!
//! Implements both store contracts the resolver reads through, plus the
//! mutations the grant service performs.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use gatehouse_auth::{Permission, Principal, PrincipalStore, Role, RoleStore, StoreError};
use gatehouse_core::{RoleId, UserId};

#[derive(Debug, Clone)]
struct UserRecord {
    username: String,
    role_ids: Vec<RoleId>,
}

#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    users: RwLock<HashMap<UserId, UserRecord>>,
    roles: RwLock<HashMap<RoleId, Role>>,
}

fn poisoned() -> StoreError {
    StoreError::Backend("directory lock poisoned".into())
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn users(&self) -> Result<RwLockReadGuard<'_, HashMap<UserId, UserRecord>>, StoreError> {
        self.users.read().map_err(|_| poisoned())
    }

    fn users_mut(&self) -> Result<RwLockWriteGuard<'_, HashMap<UserId, UserRecord>>, StoreError> {
        self.users.write().map_err(|_| poisoned())
    }

    fn roles(&self) -> Result<RwLockReadGuard<'_, HashMap<RoleId, Role>>, StoreError> {
        self.roles.read().map_err(|_| poisoned())
    }

    fn roles_mut(&self) -> Result<RwLockWriteGuard<'_, HashMap<RoleId, Role>>, StoreError> {
        self.roles.write().map_err(|_| poisoned())
    }

    /// Insert or replace a role definition.
    pub fn upsert_role(&self, role: Role) -> Result<(), StoreError> {
        self.roles_mut()?.insert(role.id, role);
        Ok(())
    }

    pub fn role(&self, role_id: RoleId) -> Result<Role, StoreError> {
        self.roles()?
            .get(&role_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("role", role_id))
    }

    /// Register a user with no explicit roles.
    pub fn create_user(&self, user_id: UserId, username: impl Into<String>) -> Result<(), StoreError> {
        self.users_mut()?.insert(
            user_id,
            UserRecord {
                username: username.into(),
                role_ids: Vec::new(),
            },
        );
        Ok(())
    }

    /// Replace the explicit role assignments of a user.
    pub fn set_user_roles(&self, user_id: UserId, role_ids: Vec<RoleId>) -> Result<(), StoreError> {
        {
            let roles = self.roles()?;
            if let Some(missing) = role_ids.iter().find(|id| !roles.contains_key(id)) {
                return Err(StoreError::not_found("role", missing));
            }
        }

        let mut users = self.users_mut()?;
        let user = users
            .get_mut(&user_id)
            .ok_or_else(|| StoreError::not_found("user", user_id))?;
        user.role_ids = role_ids;
        Ok(())
    }

    pub fn remove_user(&self, user_id: UserId) -> Result<(), StoreError> {
        self.users_mut()?
            .remove(&user_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("user", user_id))
    }

    pub fn set_role_permissions(
        &self,
        role_id: RoleId,
        permissions: Vec<Permission>,
    ) -> Result<(), StoreError> {
        let mut roles = self.roles_mut()?;
        let role = roles
            .get_mut(&role_id)
            .ok_or_else(|| StoreError::not_found("role", role_id))?;
        role.permissions = permissions;
        Ok(())
    }

    /// Delete a role and strip it from its holders.
    ///
    /// Returns each former holder with its remaining role ids.
    pub fn remove_role(&self, role_id: RoleId) -> Result<Vec<(UserId, Vec<RoleId>)>, StoreError> {
        self.roles_mut()?
            .remove(&role_id)
            .ok_or_else(|| StoreError::not_found("role", role_id))?;

        let mut users = self.users_mut()?;
        let mut holders: Vec<(UserId, Vec<RoleId>)> = users
            .iter_mut()
            .filter(|(_, u)| u.role_ids.contains(&role_id))
            .map(|(id, u)| {
                u.role_ids.retain(|r| *r != role_id);
                (*id, u.role_ids.clone())
            })
            .collect();
        holders.sort_by_key(|(id, _)| *id);
        Ok(holders)
    }
}

#[async_trait]
impl PrincipalStore for InMemoryDirectory {
    async fn get_by_id_with_roles(&self, user_id: UserId) -> Result<Principal, StoreError> {
        let user = self
            .users()?
            .get(&user_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("principal", user_id))?;

        let roles = self.roles()?;
        let assigned = user
            .role_ids
            .iter()
            .filter_map(|id| roles.get(id).cloned())
            .collect();

        Ok(Principal::new(user_id, user.username, assigned))
    }

    async fn get_user_ids_by_role(&self, role_id: RoleId) -> Result<Vec<UserId>, StoreError> {
        let mut ids: Vec<UserId> = self
            .users()?
            .iter()
            .filter(|(_, u)| u.role_ids.contains(&role_id))
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        Ok(ids)
    }
}

#[async_trait]
impl RoleStore for InMemoryDirectory {
    async fn find_by_name(&self, name: &str) -> Result<Role, StoreError> {
        self.roles()?
            .values()
            .find(|r| r.name == name)
            .cloned()
            .ok_or_else(|| StoreError::not_found("role", name))
    }
}
