use std::env;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub lease: LeaseConfig,
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub continuation: ContinuationConfig,
    #[serde(default)]
    pub content: ContentConfig,
    #[serde(default)]
    pub logship: LogShipConfig,
    #[serde(default)]
    pub otel: OtelConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
    /// Prefix shared by registry and lease keys.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    /// Storage backend: "memory" or "redis"
    #[serde(default = "default_memory_backend")]
    pub backend: String,
    /// Rows returned per scan page
    #[serde(default = "default_scan_page_size")]
    pub scan_page_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeaseConfig {
    /// Storage backend: "memory" or "redis"
    #[serde(default = "default_memory_backend")]
    pub backend: String,
    /// Identifier of the single broadcaster lease
    #[serde(default = "default_lock_id")]
    pub lock_id: String,
    /// Lease expires this long after its last renewal
    #[serde(default = "default_lease_max_age")]
    pub max_age_secs: u64,
    /// Renewal cadence; must be materially smaller than max_age_secs
    #[serde(default = "default_lease_heartbeat")]
    pub heartbeat_secs: u64,
}

impl LeaseConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoordinatorConfig {
    /// Pause between full registry passes
    #[serde(default = "default_scan_interval_ms")]
    pub scan_interval_ms: u64,
    /// Rows older than this are presumed dead and evicted.
    /// Default is the transport's 120-minute session cap plus slack.
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,
    /// Wall-clock ceiling the platform enforces on one invocation
    #[serde(default = "default_quantum")]
    pub quantum_secs: u64,
    /// Hand off to a successor this long before the quantum expires
    #[serde(default = "default_quantum_safety_margin")]
    pub quantum_safety_margin_secs: u64,
}

impl CoordinatorConfig {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }

    pub fn stale_after(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.stale_after_secs as i64)
    }

    /// Elapsed time after which this instance must reschedule itself.
    pub fn reinvoke_after(&self) -> Duration {
        Duration::from_secs(self.quantum_secs.saturating_sub(self.quantum_safety_margin_secs))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Transport backend: "local" or "http"
    #[serde(default = "default_local_backend")]
    pub backend: String,
    /// Management API base URL (http backend only)
    #[serde(default)]
    pub endpoint: String,
    #[serde(default = "default_gateway_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContinuationConfig {
    /// Invocation endpoint of this handler, used for self-invocation
    #[serde(default = "default_continuation_target")]
    pub target_url: String,
    #[serde(default = "default_continuation_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentConfig {
    #[serde(default = "default_assets_dir")]
    pub assets_dir: String,
    #[serde(default = "default_index_file")]
    pub index_file: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogShipConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Blob store backend: "memory" or "fs"
    #[serde(default = "default_memory_backend")]
    pub backend: String,
    #[serde(default = "default_flush_interval")]
    pub flush_interval_secs: u64,
    /// Prefix for shipped object keys
    #[serde(default = "default_logship_prefix")]
    pub key_prefix: String,
    /// Target directory for the "fs" backend
    #[serde(default = "default_logship_dir")]
    pub output_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_otel_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_otel_service_name")]
    pub service_name: String,
    #[serde(default = "default_sampling_ratio")]
    pub sampling_ratio: f64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8081
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_key_prefix() -> String {
    "pulse".to_string()
}

fn default_memory_backend() -> String {
    "memory".to_string()
}

fn default_local_backend() -> String {
    "local".to_string()
}

fn default_scan_page_size() -> usize {
    64
}

fn default_lock_id() -> String {
    "broadcast-coordinator".to_string()
}

fn default_lease_max_age() -> u64 {
    10
}

fn default_lease_heartbeat() -> u64 {
    5
}

fn default_scan_interval_ms() -> u64 {
    1000
}

fn default_stale_after() -> u64 {
    130 * 60
}

fn default_quantum() -> u64 {
    15 * 60
}

fn default_quantum_safety_margin() -> u64 {
    60
}

fn default_gateway_timeout() -> u64 {
    5
}

fn default_continuation_target() -> String {
    "http://127.0.0.1:8081/invoke".to_string()
}

fn default_continuation_timeout() -> u64 {
    10
}

fn default_assets_dir() -> String {
    "public".to_string()
}

fn default_index_file() -> String {
    "index.html".to_string()
}

fn default_true() -> bool {
    true
}

fn default_flush_interval() -> u64 {
    30
}

fn default_logship_prefix() -> String {
    "invocation-logs".to_string()
}

fn default_logship_dir() -> String {
    "logs".to_string()
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otel_service_name() -> String {
    "pulse-broadcast-service".to_string()
}

fn default_sampling_ratio() -> f64 {
    1.0
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            // Start with default values
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8081)?
            .set_default("redis.url", "redis://localhost:6379")?
            .set_default("registry.backend", "memory")?
            .set_default("lease.backend", "memory")?
            .set_default("gateway.backend", "local")?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables
            // SERVER_HOST, SERVER_PORT, REDIS_URL, LEASE_MAX_AGE_SECS, etc.
            .add_source(
                Environment::default()
                    .separator("_")
                    .try_parsing(true)
                    .list_separator(","),
            );

        builder.build()?.try_deserialize()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: vec![],
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            key_prefix: default_key_prefix(),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            scan_page_size: default_scan_page_size(),
        }
    }
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            lock_id: default_lock_id(),
            max_age_secs: default_lease_max_age(),
            heartbeat_secs: default_lease_heartbeat(),
        }
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            scan_interval_ms: default_scan_interval_ms(),
            stale_after_secs: default_stale_after(),
            quantum_secs: default_quantum(),
            quantum_safety_margin_secs: default_quantum_safety_margin(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            backend: default_local_backend(),
            endpoint: String::new(),
            request_timeout_secs: default_gateway_timeout(),
        }
    }
}

impl Default for ContinuationConfig {
    fn default() -> Self {
        Self {
            target_url: default_continuation_target(),
            request_timeout_secs: default_continuation_timeout(),
        }
    }
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            assets_dir: default_assets_dir(),
            index_file: default_index_file(),
        }
    }
}

impl Default for LogShipConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            backend: default_memory_backend(),
            flush_interval_secs: default_flush_interval(),
            key_prefix: default_logship_prefix(),
            output_dir: default_logship_dir(),
        }
    }
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_otel_endpoint(),
            service_name: default_otel_service_name(),
            sampling_ratio: default_sampling_ratio(),
        }
    }
}
