use std::sync::Arc;
use std::time::Instant;

use crate::config::Settings;
use crate::continuation::{ContinuationScheduler, HttpContinuationScheduler};
use crate::coordinator::BroadcastCoordinator;
use crate::error::AppError;
use crate::gateway::{create_gateway, TransportGateway};
use crate::lease::{create_lease_store, LeaseKeeper};
use crate::logship::{create_blob_store, LogShipper};
use crate::redis::RedisPool;
use crate::registry::{create_registry_store, RegistryStore};
use crate::router::EventRouter;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub registry: Arc<dyn RegistryStore>,
    pub gateway: Arc<dyn TransportGateway>,
    pub lease_keeper: Arc<LeaseKeeper>,
    pub scheduler: Arc<dyn ContinuationScheduler>,
    pub router: Arc<EventRouter>,
    pub coordinator: Arc<BroadcastCoordinator>,
    pub log_shipper: Arc<LogShipper>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(settings: Settings) -> Result<Self, AppError> {
        let needs_redis =
            settings.registry.backend == "redis" || settings.lease.backend == "redis";
        let redis_pool = if needs_redis {
            match RedisPool::new(settings.redis.clone()) {
                Ok(pool) => Some(Arc::new(pool)),
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "Failed to create Redis pool, falling back to memory backends"
                    );
                    None
                }
            }
        } else {
            None
        };

        let registry = create_registry_store(&settings.registry, redis_pool.clone());
        let lease_store = create_lease_store(&settings.lease, redis_pool);
        let lease_keeper = Arc::new(LeaseKeeper::new(lease_store, settings.lease.clone()));
        let gateway = create_gateway(&settings.gateway)
            .map_err(|e| AppError::Internal(format!("Failed to build gateway: {}", e)))?;
        let scheduler: Arc<dyn ContinuationScheduler> = Arc::new(
            HttpContinuationScheduler::new(&settings.continuation)
                .map_err(|e| AppError::Internal(format!("Failed to build scheduler: {}", e)))?,
        );
        let blob_store = create_blob_store(&settings.logship);
        let log_shipper = Arc::new(LogShipper::new(blob_store, settings.logship.clone()));

        Ok(Self::from_parts(
            settings,
            registry,
            gateway,
            lease_keeper,
            scheduler,
            log_shipper,
        ))
    }

    /// Assemble the state from pre-built components.
    pub fn from_parts(
        settings: Settings,
        registry: Arc<dyn RegistryStore>,
        gateway: Arc<dyn TransportGateway>,
        lease_keeper: Arc<LeaseKeeper>,
        scheduler: Arc<dyn ContinuationScheduler>,
        log_shipper: Arc<LogShipper>,
    ) -> Self {
        let router = Arc::new(EventRouter::new(
            registry.clone(),
            gateway.clone(),
            scheduler.clone(),
        ));
        let coordinator = Arc::new(BroadcastCoordinator::new(
            registry.clone(),
            gateway.clone(),
            scheduler.clone(),
            lease_keeper.clone(),
            settings.coordinator.clone(),
            settings.lease.lock_id.clone(),
        ));

        Self {
            settings: Arc::new(settings),
            registry,
            gateway,
            lease_keeper,
            scheduler,
            router,
            coordinator,
            log_shipper,
            start_time: Instant::now(),
        }
    }
}
