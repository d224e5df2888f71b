//! Cache-aside storage for resolved permission sets and principals.
//!
//! The backing store is a shared key-value store with server-side TTL
//! (Redis in production, [`MemoryKeyValueStore`] in tests and single-node
//! setups). Its locking is its own concern; callers never lock around it.
//!
//! Payloads are versioned JSON. A reader that finds an entry it cannot decode,
//! an entry written under another schema version, or an entry past its
//! `expires_at` treats it as a miss and deletes it.

mod memory;
mod permissions;
mod principals;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use gatehouse_core::UserId;

pub use memory::MemoryKeyValueStore;
pub use permissions::PermissionCache;
pub use principals::PrincipalCache;

/// Schema version written into every cache payload.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The store could not be reached or rejected the command.
    #[error("cache backend error: {0}")]
    Backend(String),

    /// A payload could not be encoded for writing.
    #[error("cache payload encoding failed: {0}")]
    Encode(String),
}

/// Shared key-value store with per-key expiry.
///
/// Reading an absent key is `Ok(None)`, never an error. Deleting an absent
/// key is a no-op.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Overwrite `key` and reset its expiry, atomically.
    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, keys: &[String]) -> Result<(), CacheError>;

    /// Delete every key starting with `prefix`.
    async fn delete_prefix(&self, prefix: &str) -> Result<(), CacheError>;
}

#[async_trait]
impl<S> KeyValueStore for Arc<S>
where
    S: KeyValueStore + ?Sized,
{
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        (**self).get(key).await
    }

    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        (**self).set_with_ttl(key, value, ttl).await
    }

    async fn delete(&self, keys: &[String]) -> Result<(), CacheError> {
        (**self).delete(keys).await
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<(), CacheError> {
        (**self).delete_prefix(prefix).await
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct VersionedEntry<T> {
    version: u32,
    expires_at: DateTime<Utc>,
    #[serde(flatten)]
    body: T,
}

/// One key namespace (`{prefix}{kind}:{user_id}`) of a [`KeyValueStore`].
#[derive(Debug, Clone)]
struct Namespace<S> {
    store: S,
    prefix: String,
    ttl: Duration,
}

impl<S: KeyValueStore> Namespace<S> {
    fn new(store: S, key_prefix: &str, kind: &str, ttl: Duration) -> Self {
        Self {
            store,
            prefix: format!("{key_prefix}{kind}:"),
            ttl,
        }
    }

    fn key(&self, user_id: UserId) -> String {
        format!("{}{}", self.prefix, user_id)
    }

    /// Read and validate an entry; anything unusable is deleted and reported as a miss.
    async fn read<T, F>(&self, user_id: UserId, accept: F) -> Result<Option<T>, CacheError>
    where
        T: DeserializeOwned,
        F: FnOnce(&T) -> bool,
    {
        let key = self.key(user_id);
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(None);
        };

        let entry = match serde_json::from_str::<VersionedEntry<T>>(&raw) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(key = %key, error = %err, "discarding undecodable cache entry");
                self.discard(key).await;
                return Ok(None);
            }
        };

        if entry.version != SCHEMA_VERSION {
            warn!(key = %key, version = entry.version, "discarding cache entry with foreign schema version");
            self.discard(key).await;
            return Ok(None);
        }

        if entry.expires_at <= Utc::now() || !accept(&entry.body) {
            self.discard(key).await;
            return Ok(None);
        }

        Ok(Some(entry.body))
    }

    async fn write<T: Serialize>(&self, user_id: UserId, body: &T) -> Result<(), CacheError> {
        let ttl_ms = i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX);
        let entry = VersionedEntry {
            version: SCHEMA_VERSION,
            expires_at: Utc::now() + chrono::Duration::milliseconds(ttl_ms),
            body,
        };
        let payload = serde_json::to_string(&entry).map_err(|e| CacheError::Encode(e.to_string()))?;

        self.store.set_with_ttl(&self.key(user_id), payload, self.ttl).await
    }

    async fn remove(&self, user_ids: &[UserId]) -> Result<(), CacheError> {
        if user_ids.is_empty() {
            return Ok(());
        }
        let keys: Vec<String> = user_ids.iter().map(|id| self.key(*id)).collect();
        self.store.delete(&keys).await
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.store.delete_prefix(&self.prefix).await
    }

    async fn discard(&self, key: String) {
        if let Err(err) = self.store.delete(&[key]).await {
            warn!(error = %err, "failed to delete unusable cache entry");
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    /// Store wrapper with switchable read/write failures.
    #[derive(Default)]
    pub(crate) struct FlakyStore {
        pub inner: MemoryKeyValueStore,
        pub fail_reads: AtomicBool,
        pub fail_writes: AtomicBool,
    }

    impl FlakyStore {
        pub(crate) fn fail_reads(&self, on: bool) {
            self.fail_reads.store(on, Ordering::SeqCst);
        }

        pub(crate) fn fail_writes(&self, on: bool) {
            self.fail_writes.store(on, Ordering::SeqCst);
        }

        fn check(flag: &AtomicBool) -> Result<(), CacheError> {
            if flag.load(Ordering::SeqCst) {
                return Err(CacheError::Backend("connection reset".into()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl KeyValueStore for FlakyStore {
        async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
            Self::check(&self.fail_reads)?;
            self.inner.get(key).await
        }

        async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
            Self::check(&self.fail_writes)?;
            self.inner.set_with_ttl(key, value, ttl).await
        }

        async fn delete(&self, keys: &[String]) -> Result<(), CacheError> {
            Self::check(&self.fail_writes)?;
            self.inner.delete(keys).await
        }

        async fn delete_prefix(&self, prefix: &str) -> Result<(), CacheError> {
            Self::check(&self.fail_writes)?;
            self.inner.delete_prefix(prefix).await
        }
    }

    #[tokio::test]
    async fn namespace_keys_are_prefixed_by_kind() {
        let ns = Namespace::new(MemoryKeyValueStore::default(), "gh:", "perms", Duration::from_secs(60));
        assert_eq!(ns.key(UserId::new(12)), "gh:perms:12");
    }

    #[tokio::test]
    async fn foreign_schema_version_is_a_miss_and_is_deleted() {
        let store = Arc::new(MemoryKeyValueStore::default());
        let ns = Namespace::new(store.clone(), "gh:", "perms", Duration::from_secs(60));
        store
            .set_with_ttl(
                "gh:perms:1",
                r#"{"version":99,"expires_at":"2999-01-01T00:00:00Z","roles":["user"]}"#.into(),
                Duration::from_secs(60),
            )
            .await
            .unwrap();

        let read: Option<serde_json::Value> = ns.read(UserId::new(1), |_| true).await.unwrap();

        assert!(read.is_none());
        assert_eq!(store.get("gh:perms:1").await.unwrap(), None);
    }
}
