//! Process wiring: turns a [`GatehouseConfig`] into running components.
//!
//! ```text
//! GatehouseConfig
//!   ├─ redis_url?            → RedisKeyValueStore | MemoryKeyValueStore(cache_capacity)
//!   ├─ redis_url?            → RedisPubSubEventBus(invalidation_channel) | in-memory bus
//!   ├─ background_queue      → BackgroundTasks
//!   └─ authz                 → resolver, caches, invalidator
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::info;

use gatehouse_auth::{
    Authorizer, BackgroundTasks, CachedPermissionResolver, KeyValueStore, MemoryKeyValueStore,
    PermissionInvalidator,
};

use crate::config::GatehouseConfig;
use crate::directory::InMemoryDirectory;
use crate::event_bus::AuthzBus;
use crate::grants::GrantService;
use crate::workers::{InvalidationWorker, WorkerHandle};

/// Cache backend chosen at startup.
pub type SharedStore = Arc<dyn KeyValueStore>;

type Directory = Arc<InMemoryDirectory>;

pub type GatehouseAuthorizer = Authorizer<SharedStore, Directory, Directory>;
pub type GatehouseInvalidator = PermissionInvalidator<SharedStore, Directory>;

/// Running authorization subsystem.
pub struct Gatehouse {
    config: GatehouseConfig,
    authorizer: GatehouseAuthorizer,
    grants: GrantService<AuthzBus>,
    invalidator: Arc<GatehouseInvalidator>,
    background: BackgroundTasks,
    drain: JoinHandle<()>,
    worker: WorkerHandle,
}

impl core::fmt::Debug for Gatehouse {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Gatehouse")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Load configuration from the environment, then [`build`].
pub async fn start_from_env(directory: Directory) -> Result<Gatehouse> {
    let config = GatehouseConfig::from_env().context("loading gatehouse configuration")?;
    build(config, directory).await
}

/// Wire every component. Must run inside a tokio runtime.
pub async fn build(config: GatehouseConfig, directory: Directory) -> Result<Gatehouse> {
    let store = open_store(&config).await?;
    let bus = open_bus(&config)?;
    let (background, drain) = BackgroundTasks::spawn(config.background_queue);

    let invalidator = Arc::new(PermissionInvalidator::new(
        store.clone(),
        directory.clone(),
        &config.authz,
    ));
    let worker = InvalidationWorker::spawn(
        "authz-invalidation",
        bus.clone(),
        invalidator.clone(),
        Handle::current(),
    )
    .context("starting invalidation worker")?;

    let resolver = CachedPermissionResolver::new(store, directory.clone(), directory.clone(), &config.authz)
        .with_background(background.clone());

    info!(
        redis = config.redis_url.is_some(),
        ttl_secs = config.authz.cache_ttl.as_secs(),
        "gatehouse started"
    );

    Ok(Gatehouse {
        authorizer: Authorizer::new(resolver),
        grants: GrantService::new(directory, bus),
        invalidator,
        background,
        drain,
        worker,
        config,
    })
}

async fn open_store(config: &GatehouseConfig) -> Result<SharedStore> {
    match &config.redis_url {
        None => {
            let store: SharedStore = Arc::new(MemoryKeyValueStore::new(config.cache_capacity));
            Ok(store)
        }
        #[cfg(feature = "redis")]
        Some(url) => {
            let store = crate::cache::RedisKeyValueStore::connect(url)
                .await
                .context("connecting to the redis cache")?;
            let store: SharedStore = Arc::new(store);
            Ok(store)
        }
        #[cfg(not(feature = "redis"))]
        Some(_) => anyhow::bail!("GATEHOUSE_REDIS_URL is set but the `redis` feature is disabled"),
    }
}

fn open_bus(config: &GatehouseConfig) -> Result<AuthzBus> {
    match &config.redis_url {
        None => Ok(AuthzBus::in_memory()),
        #[cfg(feature = "redis")]
        Some(url) => {
            let bus = crate::event_bus::RedisPubSubEventBus::new(url, config.invalidation_channel.clone())
                .context("opening the invalidation channel")?;
            Ok(AuthzBus::Redis(bus))
        }
        #[cfg(not(feature = "redis"))]
        Some(_) => anyhow::bail!("GATEHOUSE_REDIS_URL is set but the `redis` feature is disabled"),
    }
}

impl Gatehouse {
    pub fn config(&self) -> &GatehouseConfig {
        &self.config
    }

    pub fn authorizer(&self) -> &GatehouseAuthorizer {
        &self.authorizer
    }

    pub fn grants(&self) -> &GrantService<AuthzBus> {
        &self.grants
    }

    pub fn invalidator(&self) -> &Arc<GatehouseInvalidator> {
        &self.invalidator
    }

    pub fn background(&self) -> &BackgroundTasks {
        &self.background
    }

    /// Stop the worker, then let queued background writes finish.
    pub async fn shutdown(self) {
        let Gatehouse {
            authorizer,
            grants,
            invalidator,
            background,
            drain,
            worker,
            ..
        } = self;

        let _ = tokio::task::spawn_blocking(move || worker.shutdown()).await;
        background.flush().await;

        drop((authorizer, grants, invalidator, background));
        let _ = drain.await;
        info!("gatehouse stopped");
    }
}
