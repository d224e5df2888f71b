use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument};

use gatehouse_core::UserId;

use crate::cache::{CacheError, KeyValueStore};
use crate::cached_resolver::CachedPermissionResolver;
use crate::store::{PrincipalStore, RoleStore};
use crate::{Operation, Permission, PermissionSet, Resource};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    /// The principal holds no grant covering the request.
    #[error("permission denied")]
    PermissionDenied,

    /// The principal does not exist; callers must deny.
    #[error("principal not found: {0}")]
    PrincipalNotFound(UserId),

    /// The principal store failed.
    #[error("principal store unavailable: {0}")]
    Store(String),

    /// The permission cache failed on read.
    #[error("permission cache unavailable: {0}")]
    Cache(String),
}

impl AuthzError {
    /// Infrastructure failures should surface as 5xx, not as a denial.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, AuthzError::Store(_) | AuthzError::Cache(_))
    }
}

impl From<CacheError> for AuthzError {
    fn from(value: CacheError) -> Self {
        AuthzError::Cache(value.to_string())
    }
}

/// Command-side authorization contract (checked at the command boundary).
///
/// Resources may use `@me`; it is resolved against the acting principal.
pub trait RequiresPermission {
    fn required_permissions(&self) -> Vec<(Operation, Resource)>;
}

/// Auditable record of one authorization decision.
///
/// Meant for logs and admin tooling; end users only ever see
/// "permission denied".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorizationExplanation {
    pub user_id: UserId,
    pub operation: String,
    /// Requested resource with `@me` resolved.
    pub resource: String,
    pub granted: bool,
    pub roles: Vec<String>,
    /// The first grant that matched, if any.
    pub matched: Option<Permission>,
}

/// Single entry point for "may user X do O on R?".
#[derive(Debug, Clone)]
pub struct Authorizer<S, P, R> {
    resolver: CachedPermissionResolver<S, P, R>,
}

impl<S, P, R> Authorizer<S, P, R>
where
    S: KeyValueStore + Clone + 'static,
    P: PrincipalStore,
    R: RoleStore,
{
    pub fn new(resolver: CachedPermissionResolver<S, P, R>) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &CachedPermissionResolver<S, P, R> {
        &self.resolver
    }

    pub async fn permissions(&self, user_id: UserId) -> Result<PermissionSet, AuthzError> {
        self.resolver.resolve(user_id).await
    }

    /// `Ok(false)` is a denial; `Err` means no decision could be made.
    #[instrument(
        skip(self, operation, resource),
        fields(user_id = %user_id, operation = %operation, resource = %resource)
    )]
    pub async fn authorize(
        &self,
        user_id: UserId,
        operation: &Operation,
        resource: &Resource,
    ) -> Result<bool, AuthzError> {
        let set = self.resolver.resolve(user_id).await?;
        let allowed = set.allows(user_id, operation.as_str(), resource.as_str());
        if !allowed {
            debug!("authorization denied");
        }
        Ok(allowed)
    }

    /// Like [`Self::authorize`], with a denial mapped to [`AuthzError::PermissionDenied`].
    pub async fn require(
        &self,
        user_id: UserId,
        operation: &Operation,
        resource: &Resource,
    ) -> Result<(), AuthzError> {
        if self.authorize(user_id, operation, resource).await? {
            Ok(())
        } else {
            Err(AuthzError::PermissionDenied)
        }
    }

    /// Check every permission a command declares; the first denial wins.
    pub async fn authorize_command<C>(&self, user_id: UserId, command: &C) -> Result<(), AuthzError>
    where
        C: RequiresPermission + ?Sized,
    {
        for (operation, resource) in command.required_permissions() {
            self.require(user_id, &operation, &resource).await?;
        }
        Ok(())
    }

    pub async fn explain(
        &self,
        user_id: UserId,
        operation: &Operation,
        resource: &Resource,
    ) -> Result<AuthorizationExplanation, AuthzError> {
        let set = self.resolver.resolve(user_id).await?;
        let matched = set
            .matching(user_id, operation.as_str(), resource.as_str())
            .cloned();

        Ok(AuthorizationExplanation {
            user_id,
            operation: operation.to_string(),
            resource: resource.for_principal(user_id).to_string(),
            granted: matched.is_some(),
            roles: set.roles,
            matched,
        })
    }
}
