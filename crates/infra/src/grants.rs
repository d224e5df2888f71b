//! Grant mutations: write the directory, then announce the change.
//!
//! ```text
//! GrantService::assign_roles
//!   ↓
//! 1. Directory write (fails the command on error)
//!   ↓
//! 2. Publish AuthzEvent (logged and swallowed on error)
//!   ↓
//! 3. Invalidation worker drops the affected cache entries
//! ```

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument};

use gatehouse_auth::{AuthzEventPublisher, Permission, StoreError};
use gatehouse_core::{DomainError, RoleId, UserId};
use gatehouse_events::{AuthzEvent, EventBus, EventEnvelope};

use crate::directory::InMemoryDirectory;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GrantError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct GrantService<B> {
    directory: Arc<InMemoryDirectory>,
    publisher: AuthzEventPublisher<B>,
}

impl<B> GrantService<B>
where
    B: EventBus<EventEnvelope<AuthzEvent>>,
{
    pub fn new(directory: Arc<InMemoryDirectory>, bus: B) -> Self {
        Self {
            directory,
            publisher: AuthzEventPublisher::new(bus),
        }
    }

    pub fn directory(&self) -> &Arc<InMemoryDirectory> {
        &self.directory
    }

    /// Replace a user's explicit roles.
    #[instrument(skip(self), fields(user_id = %user_id), err)]
    pub fn assign_roles(&self, user_id: UserId, role_ids: Vec<RoleId>) -> Result<(), GrantError> {
        self.directory.set_user_roles(user_id, role_ids.clone())?;
        self.publisher.publish(AuthzEvent::user_role_assigned(user_id, role_ids));
        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %user_id), err)]
    pub fn delete_user(&self, user_id: UserId) -> Result<(), GrantError> {
        self.directory.remove_user(user_id)?;
        self.publisher.publish(AuthzEvent::user_deleted(user_id));
        Ok(())
    }

    #[instrument(skip(self, permissions), fields(role_id = %role_id), err)]
    pub fn set_role_permissions(
        &self,
        role_id: RoleId,
        permissions: Vec<Permission>,
    ) -> Result<(), GrantError> {
        self.directory.set_role_permissions(role_id, permissions)?;
        self.publisher.publish(AuthzEvent::role_permissions_changed(role_id));
        Ok(())
    }

    /// Delete a non-system role. Each former holder gets a role-assignment
    /// event carrying its remaining roles.
    #[instrument(skip(self), fields(role_id = %role_id), err)]
    pub fn delete_role(&self, role_id: RoleId) -> Result<(), GrantError> {
        self.directory.role(role_id)?.ensure_deletable()?;

        let holders = self.directory.remove_role(role_id)?;
        info!(holders = holders.len(), "role deleted");

        for (user_id, remaining) in holders {
            self.publisher.publish(AuthzEvent::user_role_assigned(user_id, remaining));
        }
        Ok(())
    }
}
