use std::time::Duration;

use crate::roles::{DEFAULT_ROLE, ROOT_ROLE};

/// Default lifetime of a cached permission set.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Default namespace for cache keys.
pub const DEFAULT_KEY_PREFIX: &str = "gatehouse:authz:";

/// Tunables of the authorization core.
///
/// Loaded from the environment by `gatehouse-infra`; tests build it directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthzSettings {
    /// Username of the account that bypasses RBAC entirely.
    pub root_username: String,
    /// Role merged into every non-root principal's effective set.
    pub default_role: String,
    /// Lifetime of cached permission sets and cached principals.
    pub cache_ttl: Duration,
    /// Namespace prepended to every cache key.
    pub key_prefix: String,
}

impl Default for AuthzSettings {
    fn default() -> Self {
        Self {
            root_username: ROOT_ROLE.to_string(),
            default_role: DEFAULT_ROLE.to_string(),
            cache_ttl: DEFAULT_CACHE_TTL,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }
}
