//! Redis-backed key-value store.
//!
//! One multiplexed connection (`ConnectionManager`) is shared by every
//! clone; it reconnects on its own after a dropped link.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::{debug, instrument};

use gatehouse_auth::{CacheError, KeyValueStore};

/// Keys fetched per `SCAN` round trip during prefix deletion.
const SCAN_BATCH: usize = 500;

#[derive(Clone)]
pub struct RedisKeyValueStore {
    conn: ConnectionManager,
}

impl core::fmt::Debug for RedisKeyValueStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RedisKeyValueStore").finish_non_exhaustive()
    }
}

fn backend(err: redis::RedisError) -> CacheError {
    CacheError::Backend(err.to_string())
}

/// Escape glob metacharacters so `prefix` matches literally in `SCAN MATCH`.
fn glob_escape(prefix: &str) -> String {
    let mut out = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('*');
    out
}

/// Redis `EXPIRE` has second granularity; never round down to "no expiry".
fn ttl_secs(ttl: Duration) -> i64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    i64::try_from(secs.max(1)).unwrap_or(i64::MAX)
}

impl RedisKeyValueStore {
    pub async fn connect(redis_url: impl AsRef<str>) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url.as_ref()).map_err(backend)?;
        let conn = ConnectionManager::new(client).await.map_err(backend)?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl KeyValueStore for RedisKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(backend)
    }

    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .set(key, value)
            .ignore()
            .expire(key, ttl_secs(ttl))
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(backend)
    }

    async fn delete(&self, keys: &[String]) -> Result<(), CacheError> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(keys).await.map_err(backend)
    }

    #[instrument(skip(self), err)]
    async fn delete_prefix(&self, prefix: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let pattern = glob_escape(prefix);
        let mut cursor: u64 = 0;
        let mut removed = 0usize;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(backend)?;

            if !keys.is_empty() {
                removed += keys.len();
                conn.del::<_, ()>(&keys).await.map_err(backend)?;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!(removed, "prefix cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_pattern_matches_prefix_literally() {
        assert_eq!(glob_escape("gatehouse:authz:perms:"), "gatehouse:authz:perms:*");
        assert_eq!(glob_escape("a*b?[c]"), r"a\*b\?\[c\]*");
    }

    #[test]
    fn ttl_rounds_up_to_whole_seconds() {
        assert_eq!(ttl_secs(Duration::from_secs(300)), 300);
        assert_eq!(ttl_secs(Duration::from_millis(1500)), 2);
        assert_eq!(ttl_secs(Duration::from_millis(10)), 1);
        assert_eq!(ttl_secs(Duration::ZERO), 1);
    }
}
