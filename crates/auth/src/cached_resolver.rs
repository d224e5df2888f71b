//! Read-through composition of the permission cache and the resolver.

use tracing::{debug, instrument, warn};

use gatehouse_core::UserId;

use crate::background::BackgroundTasks;
use crate::cache::{KeyValueStore, PermissionCache, PrincipalCache};
use crate::resolver::PermissionResolver;
use crate::store::{PrincipalStore, RoleStore};
use crate::{AuthzError, AuthzSettings, PermissionSet, Principal};

/// Cache-aside permission resolution.
///
/// ```text
/// get(perms) ──hit──► return
///     │miss
///     ▼
/// get(principal) ──miss──► principal store ──► set(principal)
///     │
///     ▼
/// resolve ──► set(perms) ──► return
/// ```
///
/// Concurrent misses for the same principal both resolve and both write; the
/// result is identical, so the last writer wins harmlessly.
#[derive(Debug, Clone)]
pub struct CachedPermissionResolver<S, P, R> {
    resolver: PermissionResolver<P, R>,
    permissions: PermissionCache<S>,
    principals: PrincipalCache<S>,
    background: Option<BackgroundTasks>,
}

impl<S, P, R> CachedPermissionResolver<S, P, R>
where
    S: KeyValueStore + Clone + 'static,
    P: PrincipalStore,
    R: RoleStore,
{
    pub fn new(store: S, principals: P, roles: R, settings: &AuthzSettings) -> Self {
        Self {
            resolver: PermissionResolver::new(principals, roles, settings),
            permissions: PermissionCache::new(store.clone(), settings),
            principals: PrincipalCache::new(store, settings),
            background: None,
        }
    }

    /// Write the secondary principal cache through `tasks` instead of inline.
    pub fn with_background(mut self, tasks: BackgroundTasks) -> Self {
        self.background = Some(tasks);
        self
    }

    pub fn permission_cache(&self) -> &PermissionCache<S> {
        &self.permissions
    }

    pub fn principal_cache(&self) -> &PrincipalCache<S> {
        &self.principals
    }

    pub fn resolver(&self) -> &PermissionResolver<P, R> {
        &self.resolver
    }

    /// Effective permission set of `user_id`, served from cache when possible.
    ///
    /// Cache read failures are returned as [`AuthzError::Cache`]; a cache
    /// write failure after a successful resolve is logged and the resolved
    /// set is returned anyway.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn resolve(&self, user_id: UserId) -> Result<PermissionSet, AuthzError> {
        if let Some(set) = self.permissions.get(user_id).await? {
            debug!("permission cache hit");
            return Ok(set);
        }

        debug!("permission cache miss");
        let principal = self.principal(user_id).await?;
        let set = self.resolver.resolve_principal(&principal).await;

        if let Err(err) = self.permissions.set(user_id, &set).await {
            warn!(error = %err, "failed to cache resolved permissions");
        }

        Ok(set)
    }

    /// Full principal with roles, served from the secondary cache when possible.
    pub async fn principal(&self, user_id: UserId) -> Result<Principal, AuthzError> {
        if let Some(principal) = self.principals.get(user_id).await? {
            return Ok(principal);
        }

        let principal = self.resolver.load_principal(user_id).await?;
        self.remember_principal(&principal).await;
        Ok(principal)
    }

    async fn remember_principal(&self, principal: &Principal) {
        match &self.background {
            Some(tasks) => {
                let cache = self.principals.clone();
                let principal = principal.clone();
                tasks.dispatch_fallible("cache.principal.write", async move {
                    cache.set(&principal).await
                });
            }
            None => {
                if let Err(err) = self.principals.set(principal).await {
                    warn!(user_id = %principal.id, error = %err, "failed to cache principal");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use gatehouse_core::RoleId;

    use super::*;
    use crate::cache::MemoryKeyValueStore;
    use crate::cache::tests::FlakyStore;
    use crate::resolver::tests::FakeDirectory;
    use crate::{Permission, Role};

    type Dir = Arc<FakeDirectory>;

    fn directory() -> Dir {
        let dir = Arc::new(FakeDirectory::with_default_role());
        dir.add_principal(Principal::new(
            UserId::new(5),
            "alice",
            vec![Role::admin(RoleId::new(1))],
        ));
        dir
    }

    fn resolver_over<S>(store: S, dir: &Dir) -> CachedPermissionResolver<S, Dir, Dir>
    where
        S: KeyValueStore + Clone + 'static,
    {
        CachedPermissionResolver::new(store, dir.clone(), dir.clone(), &AuthzSettings::default())
    }

    #[tokio::test]
    async fn second_lookup_is_served_from_cache() {
        let dir = directory();
        let r = resolver_over(Arc::new(MemoryKeyValueStore::default()), &dir);

        let first = r.resolve(UserId::new(5)).await.unwrap();
        let second = r.resolve(UserId::new(5)).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(dir.loads(), 1);
    }

    #[tokio::test]
    async fn miss_populates_the_principal_cache_too() {
        let dir = directory();
        let r = resolver_over(Arc::new(MemoryKeyValueStore::default()), &dir);

        r.resolve(UserId::new(5)).await.unwrap();
        let principal = r.principal(UserId::new(5)).await.unwrap();

        assert_eq!(principal.username, "alice");
        assert_eq!(dir.loads(), 1);
    }

    #[tokio::test]
    async fn background_principal_write_lands_after_flush() {
        let dir = directory();
        let (tasks, _join) = BackgroundTasks::spawn(16);
        let r = resolver_over(Arc::new(MemoryKeyValueStore::default()), &dir)
            .with_background(tasks.clone());

        r.resolve(UserId::new(5)).await.unwrap();
        assert!(tasks.flush().await);

        assert!(r.principal_cache().get(UserId::new(5)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn permission_invalidation_repopulates_from_the_principal_cache() {
        let dir = directory();
        let r = resolver_over(Arc::new(MemoryKeyValueStore::default()), &dir);
        r.resolve(UserId::new(5)).await.unwrap();

        r.permission_cache().invalidate_user(UserId::new(5)).await.unwrap();
        r.resolve(UserId::new(5)).await.unwrap();

        assert_eq!(dir.loads(), 1);
    }

    #[tokio::test]
    async fn cache_read_failure_is_not_treated_as_a_miss() {
        let dir = directory();
        let store = Arc::new(FlakyStore::default());
        let r = resolver_over(store.clone(), &dir);
        store.fail_reads(true);

        let err = r.resolve(UserId::new(5)).await.unwrap_err();

        assert!(matches!(err, AuthzError::Cache(_)));
        assert_eq!(dir.loads(), 0);
    }

    #[tokio::test]
    async fn cache_write_failure_still_returns_the_resolved_set() {
        let dir = directory();
        let store = Arc::new(FlakyStore::default());
        let r = resolver_over(store.clone(), &dir);
        store.fail_writes(true);

        let set = r.resolve(UserId::new(5)).await.unwrap();

        assert_eq!(set.roles, vec!["admin", "user"]);
        assert!(set.permissions.contains(&Permission::new("*:*:*", "*:*:*")));

        // Nothing was cached, so the next call resolves again.
        r.resolve(UserId::new(5)).await.unwrap();
        assert_eq!(dir.loads(), 2);
    }
}
