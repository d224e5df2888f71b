use serde::{Deserialize, Serialize};
use tracing::debug;

use gatehouse_core::UserId;

use super::{CacheError, KeyValueStore, Namespace};
use crate::{AuthzSettings, Permission, PermissionSet};

/// Cached body of a permission set (`{user_id, roles, permissions}`).
#[derive(Debug, Serialize, Deserialize)]
struct CachedPermissionSet {
    user_id: UserId,
    roles: Vec<String>,
    permissions: Vec<Permission>,
}

/// Raw permission-set cache keyed by principal id.
///
/// Entries are only ever replaced wholesale.
#[derive(Debug, Clone)]
pub struct PermissionCache<S> {
    ns: Namespace<S>,
}

impl<S: KeyValueStore> PermissionCache<S> {
    pub fn new(store: S, settings: &AuthzSettings) -> Self {
        Self {
            ns: Namespace::new(store, &settings.key_prefix, "perms", settings.cache_ttl),
        }
    }

    pub fn key(&self, user_id: UserId) -> String {
        self.ns.key(user_id)
    }

    /// Cached set of `user_id`, or `None` on a miss.
    ///
    /// Unusable entries (undecodable, foreign schema, expired, empty role
    /// list, written for another principal) count as misses and are deleted.
    /// Store failures are returned, never mapped to a miss.
    pub async fn get(&self, user_id: UserId) -> Result<Option<PermissionSet>, CacheError> {
        let cached = self
            .ns
            .read(user_id, |c: &CachedPermissionSet| {
                c.user_id == user_id && !c.roles.is_empty()
            })
            .await?;

        Ok(cached.map(|c| PermissionSet::new(c.roles, c.permissions)))
    }

    /// Overwrite the cached set with a fresh TTL.
    pub async fn set(&self, user_id: UserId, set: &PermissionSet) -> Result<(), CacheError> {
        let body = CachedPermissionSet {
            user_id,
            roles: set.roles.clone(),
            permissions: set.permissions.clone(),
        };
        self.ns.write(user_id, &body).await
    }

    pub async fn invalidate_user(&self, user_id: UserId) -> Result<(), CacheError> {
        self.ns.remove(&[user_id]).await
    }

    pub async fn invalidate_users(&self, user_ids: &[UserId]) -> Result<(), CacheError> {
        debug!(count = user_ids.len(), "invalidating cached permission sets");
        self.ns.remove(user_ids).await
    }

    pub async fn invalidate_all(&self) -> Result<(), CacheError> {
        self.ns.clear().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::cache::MemoryKeyValueStore;
    use crate::cache::tests::FlakyStore;

    fn sample_set() -> PermissionSet {
        PermissionSet::new(
            vec!["admin".into(), "user".into()],
            vec![
                Permission::new("*:*:*", "*:*:*"),
                Permission::new("self:*:*", "self:user:@me"),
            ],
        )
    }

    fn cache_over<S: KeyValueStore>(store: S) -> PermissionCache<S> {
        PermissionCache::new(store, &AuthzSettings::default())
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let cache = cache_over(MemoryKeyValueStore::default());
        let u = UserId::new(5);

        cache.set(u, &sample_set()).await.unwrap();

        assert_eq!(cache.get(u).await.unwrap(), Some(sample_set()));
    }

    #[tokio::test]
    async fn invalidate_user_turns_next_get_into_a_miss() {
        let cache = cache_over(MemoryKeyValueStore::default());
        let u = UserId::new(5);
        cache.set(u, &sample_set()).await.unwrap();

        cache.invalidate_user(u).await.unwrap();

        assert_eq!(cache.get(u).await.unwrap(), None);
        // Deleting again is a no-op.
        cache.invalidate_user(u).await.unwrap();
    }

    #[tokio::test]
    async fn invalidate_all_clears_every_principal() {
        let cache = cache_over(MemoryKeyValueStore::default());
        for id in 1..=3 {
            cache.set(UserId::new(id), &sample_set()).await.unwrap();
        }

        cache.invalidate_all().await.unwrap();

        for id in 1..=3 {
            assert_eq!(cache.get(UserId::new(id)).await.unwrap(), None);
        }
    }

    #[tokio::test]
    async fn corrupt_payload_is_a_miss_and_self_heals() {
        let store = Arc::new(MemoryKeyValueStore::default());
        let cache = cache_over(store.clone());
        let u = UserId::new(8);
        store
            .set_with_ttl(&cache.key(u), "{not json".into(), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(cache.get(u).await.unwrap(), None);
        assert_eq!(store.get(&cache.key(u)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn empty_role_list_counts_as_a_miss() {
        let cache = cache_over(MemoryKeyValueStore::default());
        let u = UserId::new(9);
        cache.set(u, &PermissionSet::default()).await.unwrap();

        assert_eq!(cache.get(u).await.unwrap(), None);
    }

    #[tokio::test]
    async fn wire_payload_is_versioned() {
        let store = Arc::new(MemoryKeyValueStore::default());
        let cache = cache_over(store.clone());
        let u = UserId::new(3);
        cache.set(u, &sample_set()).await.unwrap();

        let raw = store.get("gatehouse:authz:perms:3").await.unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();

        assert_eq!(json["version"], 1);
        assert_eq!(json["user_id"], 3);
        assert_eq!(json["roles"], serde_json::json!(["admin", "user"]));
        assert_eq!(json["permissions"][1]["resource_pattern"], "self:user:@me");
        assert!(json["expires_at"].is_string());
    }

    #[tokio::test]
    async fn read_failures_propagate_instead_of_reporting_a_miss() {
        let store = Arc::new(FlakyStore::default());
        let cache = cache_over(store.clone());
        store.fail_reads(true);

        let err = cache.get(UserId::new(1)).await.unwrap_err();

        assert!(matches!(err, CacheError::Backend(_)));
    }
}
