mod settings;

pub use settings::{
    ContentConfig, ContinuationConfig, CoordinatorConfig, GatewayConfig, LeaseConfig,
    LogShipConfig, OtelConfig, RedisConfig, RegistryConfig, ServerConfig, Settings,
};
