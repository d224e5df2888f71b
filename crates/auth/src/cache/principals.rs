use serde::{Deserialize, Serialize};

use gatehouse_core::UserId;

use super::{CacheError, KeyValueStore, Namespace};
use crate::{AuthzSettings, Principal};

#[derive(Debug, Serialize, Deserialize)]
struct CachedPrincipal {
    principal: Principal,
}

/// Secondary cache of fully loaded principals.
///
/// Populated alongside the permission cache so a full principal fetch later in
/// the same request lifecycle skips the database. Shares the permission
/// cache's TTL and invalidation triggers.
#[derive(Debug, Clone)]
pub struct PrincipalCache<S> {
    ns: Namespace<S>,
}

impl<S: KeyValueStore> PrincipalCache<S> {
    pub fn new(store: S, settings: &AuthzSettings) -> Self {
        Self {
            ns: Namespace::new(store, &settings.key_prefix, "principal", settings.cache_ttl),
        }
    }

    pub async fn get(&self, user_id: UserId) -> Result<Option<Principal>, CacheError> {
        let cached = self
            .ns
            .read(user_id, |c: &CachedPrincipal| c.principal.id == user_id)
            .await?;
        Ok(cached.map(|c| c.principal))
    }

    pub async fn set(&self, principal: &Principal) -> Result<(), CacheError> {
        let body = CachedPrincipal {
            principal: principal.clone(),
        };
        self.ns.write(principal.id, &body).await
    }

    pub async fn invalidate_users(&self, user_ids: &[UserId]) -> Result<(), CacheError> {
        self.ns.remove(user_ids).await
    }

    pub async fn invalidate_all(&self) -> Result<(), CacheError> {
        self.ns.clear().await
    }
}

#[cfg(test)]
mod tests {
    use gatehouse_core::RoleId;

    use super::*;
    use crate::Role;
    use crate::cache::MemoryKeyValueStore;

    #[tokio::test]
    async fn principal_round_trips_with_roles() {
        let cache = PrincipalCache::new(MemoryKeyValueStore::default(), &AuthzSettings::default());
        let p = Principal::new(UserId::new(4), "dana", vec![Role::admin(RoleId::new(1))]);

        cache.set(&p).await.unwrap();
        assert_eq!(cache.get(p.id).await.unwrap(), Some(p.clone()));

        cache.invalidate_users(&[p.id]).await.unwrap();
        assert_eq!(cache.get(p.id).await.unwrap(), None);
    }
}
