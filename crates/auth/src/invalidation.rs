//! Event-driven cache invalidation.
//!
//! Every cached entry derived from a principal is dropped when that
//! principal's grants may have changed; the next check repopulates it.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use gatehouse_core::{RoleId, UserId};
use gatehouse_events::{AuthzEvent, Event};

use crate::AuthzSettings;
use crate::background::BackgroundTasks;
use crate::cache::{KeyValueStore, PermissionCache, PrincipalCache};
use crate::store::{PrincipalStore, RoleStore};

/// Removes stale permission sets (and the principals they were derived from).
///
/// Failures are logged and otherwise ignored: a missed invalidation is
/// bounded by the cache TTL.
///
/// `directory` answers both "who holds role R" and "which role is the
/// default role", since every principal holds the default role implicitly.
#[derive(Debug, Clone)]
pub struct PermissionInvalidator<S, P> {
    permissions: PermissionCache<S>,
    principals: PrincipalCache<S>,
    directory: P,
    default_role: String,
}

impl<S, P> PermissionInvalidator<S, P>
where
    S: KeyValueStore + Clone,
    P: PrincipalStore + RoleStore,
{
    pub fn new(store: S, directory: P, settings: &AuthzSettings) -> Self {
        Self {
            permissions: PermissionCache::new(store.clone(), settings),
            principals: PrincipalCache::new(store, settings),
            directory,
            default_role: settings.default_role.clone(),
        }
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn on_user_roles_changed(&self, user_id: UserId) {
        self.drop_users(&[user_id]).await;
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn on_user_deleted(&self, user_id: UserId) {
        self.drop_users(&[user_id]).await;
    }

    /// Membership is expanded now, not when the event was raised.
    ///
    /// The default role has no explicit membership list, so editing it
    /// clears every cached set.
    #[instrument(skip(self), fields(role_id = %role_id))]
    pub async fn on_role_permissions_changed(&self, role_id: RoleId) {
        match self.directory.find_by_name(&self.default_role).await {
            Ok(default_role) if default_role.id == role_id => {
                debug!(role = %self.default_role, "default role changed; clearing every cached set");
                self.invalidate_all().await;
                return;
            }
            Ok(_) => {}
            Err(err) if err.is_not_found() => {}
            Err(err) => {
                warn!(error = %err, "default role lookup failed; clearing every cached set");
                self.invalidate_all().await;
                return;
            }
        }

        let holders = match self.directory.get_user_ids_by_role(role_id).await {
            Ok(holders) => holders,
            Err(err) => {
                warn!(error = %err, "role membership lookup failed; entries expire by TTL");
                return;
            }
        };

        debug!(holders = holders.len(), "invalidating role holders");
        self.drop_users(&holders).await;
    }

    pub async fn invalidate_all(&self) {
        if let Err(err) = self.permissions.invalidate_all().await {
            warn!(error = %err, "failed to clear permission cache");
        }
        if let Err(err) = self.principals.invalidate_all().await {
            warn!(error = %err, "failed to clear principal cache");
        }
    }

    pub async fn handle(&self, event: &AuthzEvent) {
        match event {
            AuthzEvent::UserRoleAssigned(e) => self.on_user_roles_changed(e.user_id).await,
            AuthzEvent::UserDeleted(e) => self.on_user_deleted(e.user_id).await,
            AuthzEvent::RolePermissionsChanged(e) => {
                self.on_role_permissions_changed(e.role_id).await
            }
        }
    }

    async fn drop_users(&self, user_ids: &[UserId]) {
        if user_ids.is_empty() {
            return;
        }
        if let Err(err) = self.permissions.invalidate_users(user_ids).await {
            warn!(error = %err, count = user_ids.len(), "failed to invalidate permission sets");
        }
        if let Err(err) = self.principals.invalidate_users(user_ids).await {
            warn!(error = %err, count = user_ids.len(), "failed to invalidate cached principals");
        }
    }
}

impl<S, P> PermissionInvalidator<S, P>
where
    S: KeyValueStore + Clone + 'static,
    P: PrincipalStore + RoleStore + 'static,
{
    /// Handle `event` on the background queue. Returns `false` if the queue
    /// dropped it.
    pub fn notify(self: &Arc<Self>, tasks: &BackgroundTasks, event: AuthzEvent) -> bool {
        let this = Arc::clone(self);
        tasks.dispatch(event.event_type(), async move { this.handle(&event).await })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::cache::MemoryKeyValueStore;
    use crate::cache::tests::FlakyStore;
    use crate::resolver::tests::FakeDirectory;
    use crate::{Permission, PermissionSet, Principal, Role};

    type Store = Arc<MemoryKeyValueStore>;

    fn set_for(roles: &[&str]) -> PermissionSet {
        PermissionSet::new(
            roles.iter().map(|r| r.to_string()).collect(),
            vec![Permission::new("billing:invoice:read", "*")],
        )
    }

    struct Fixture {
        dir: Arc<FakeDirectory>,
        cache: PermissionCache<Store>,
        invalidator: Arc<PermissionInvalidator<Store, Arc<FakeDirectory>>>,
    }

    fn fixture() -> Fixture {
        let store: Store = Arc::new(MemoryKeyValueStore::default());
        let dir = Arc::new(FakeDirectory::with_default_role());
        let settings = AuthzSettings::default();
        Fixture {
            cache: PermissionCache::new(store.clone(), &settings),
            invalidator: Arc::new(PermissionInvalidator::new(store, dir.clone(), &settings)),
            dir,
        }
    }

    #[tokio::test]
    async fn role_change_drops_every_holder() {
        let f = fixture();
        let billing = Role::new(RoleId::new(7), "billing", vec![]);
        for id in 1..=50 {
            f.dir.add_principal(Principal::new(UserId::new(id), format!("u{id}"), vec![billing.clone()]));
            f.cache.set(UserId::new(id), &set_for(&["billing", "user"])).await.unwrap();
        }
        f.dir.add_principal(Principal::new(UserId::new(51), "bystander", vec![]));
        f.cache.set(UserId::new(51), &set_for(&["user"])).await.unwrap();

        f.invalidator.on_role_permissions_changed(RoleId::new(7)).await;

        for id in 1..=50 {
            assert!(f.cache.get(UserId::new(id)).await.unwrap().is_none(), "user {id}");
        }
        assert!(f.cache.get(UserId::new(51)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn default_role_change_drops_implicit_holders() {
        let f = fixture();
        for id in 1..=3 {
            f.dir.add_principal(Principal::new(UserId::new(id), format!("u{id}"), vec![]));
            f.cache.set(UserId::new(id), &set_for(&["user"])).await.unwrap();
        }

        // FakeDirectory::with_default_role registers `user` as role 2.
        f.invalidator
            .handle(&AuthzEvent::role_permissions_changed(RoleId::new(2)))
            .await;

        for id in 1..=3 {
            assert!(f.cache.get(UserId::new(id)).await.unwrap().is_none(), "user {id}");
        }
    }

    #[tokio::test]
    async fn user_events_drop_only_that_user() {
        let f = fixture();
        f.cache.set(UserId::new(1), &set_for(&["user"])).await.unwrap();
        f.cache.set(UserId::new(2), &set_for(&["user"])).await.unwrap();

        f.invalidator.handle(&AuthzEvent::user_deleted(UserId::new(1))).await;

        assert!(f.cache.get(UserId::new(1)).await.unwrap().is_none());
        assert!(f.cache.get(UserId::new(2)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn membership_lookup_failure_is_swallowed() {
        let f = fixture();
        f.cache.set(UserId::new(1), &set_for(&["user"])).await.unwrap();
        f.dir.fail_backend.store(true, Ordering::SeqCst);

        f.invalidator
            .handle(&AuthzEvent::role_permissions_changed(RoleId::new(7)))
            .await;

        assert!(f.cache.get(UserId::new(1)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_failure_is_swallowed() {
        let store = Arc::new(FlakyStore::default());
        let settings = AuthzSettings::default();
        let invalidator = PermissionInvalidator::new(
            store.clone(),
            Arc::new(FakeDirectory::with_default_role()),
            &settings,
        );
        store.fail_writes(true);

        invalidator.on_user_roles_changed(UserId::new(4)).await;
        invalidator.invalidate_all().await;
    }

    #[tokio::test]
    async fn notify_runs_on_the_background_queue() {
        let f = fixture();
        let (tasks, _join) = BackgroundTasks::spawn(8);
        f.cache.set(UserId::new(9), &set_for(&["user"])).await.unwrap();

        assert!(f.invalidator.notify(&tasks, AuthzEvent::user_role_assigned(UserId::new(9), vec![])));
        assert!(tasks.flush().await);

        assert!(f.cache.get(UserId::new(9)).await.unwrap().is_none());
    }
}
