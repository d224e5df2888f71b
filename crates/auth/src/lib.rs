//! `gatehouse-auth`: authorization core of the identity backend.
//!
//! Answers "may principal X perform operation O on resource R?" from role
//! grants, caches the answer's inputs per principal, and drops them again
//! when grant-change events arrive.
//!
//! This crate is decoupled from HTTP and from any concrete storage; stores
//! and the cache backend are traits.

pub mod authorize;
pub mod background;
pub mod cache;
pub mod cached_resolver;
pub mod invalidation;
pub mod matcher;
pub mod permissions;
pub mod principal;
pub mod publisher;
pub mod resolver;
pub mod roles;
pub mod settings;
pub mod store;

pub use authorize::{AuthorizationExplanation, Authorizer, AuthzError, RequiresPermission};
pub use background::BackgroundTasks;
pub use cache::{CacheError, KeyValueStore, MemoryKeyValueStore, PermissionCache, PrincipalCache};
pub use cached_resolver::CachedPermissionResolver;
pub use invalidation::PermissionInvalidator;
pub use permissions::{Operation, Permission, Resource};
pub use principal::{PermissionSet, Principal};
pub use publisher::AuthzEventPublisher;
pub use resolver::PermissionResolver;
pub use roles::{ADMIN_ROLE, DEFAULT_ROLE, ROOT_ROLE, Role};
pub use settings::AuthzSettings;
pub use store::{PrincipalStore, RoleStore, StoreError};
