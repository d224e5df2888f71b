//! Contracts for the principal and role sources of truth.
//!
//! The relational mapping lives with the collaborators that own the tables;
//! this subsystem only reads through these traits.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use gatehouse_core::{RoleId, UserId};

use crate::{Principal, Role};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Read access to principals and their role assignments.
#[async_trait]
pub trait PrincipalStore: Send + Sync {
    /// Load a principal together with its assigned roles (and their permissions).
    async fn get_by_id_with_roles(&self, user_id: UserId) -> Result<Principal, StoreError>;

    /// Every principal currently holding `role_id`.
    async fn get_user_ids_by_role(&self, role_id: RoleId) -> Result<Vec<UserId>, StoreError>;
}

/// Read access to role definitions.
#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn find_by_name(&self, name: &str) -> Result<Role, StoreError>;
}

#[async_trait]
impl<S> PrincipalStore for Arc<S>
where
    S: PrincipalStore + ?Sized,
{
    async fn get_by_id_with_roles(&self, user_id: UserId) -> Result<Principal, StoreError> {
        (**self).get_by_id_with_roles(user_id).await
    }

    async fn get_user_ids_by_role(&self, role_id: RoleId) -> Result<Vec<UserId>, StoreError> {
        (**self).get_user_ids_by_role(role_id).await
    }
}

#[async_trait]
impl<S> RoleStore for Arc<S>
where
    S: RoleStore + ?Sized,
{
    async fn find_by_name(&self, name: &str) -> Result<Role, StoreError> {
        (**self).find_by_name(name).await
    }
}
