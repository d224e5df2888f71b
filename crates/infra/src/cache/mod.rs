//! Key-value store backends for the permission cache.
//!
//! The in-memory backend lives in `gatehouse-auth`; this module adds the
//! networked ones.

#[cfg(feature = "redis")]
pub mod redis;

#[cfg(feature = "redis")]
pub use self::redis::RedisKeyValueStore;
