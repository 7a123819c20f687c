//! Application settings and configuration structures.

use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::application::services::rate_limit_service::Limit;
use crate::infrastructure::messaging::{ExhaustedPolicy, StreamOptions};

/// Root configuration structure containing all application settings.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Server configuration (host, port)
    pub server: ServerSettings,

    /// Database configuration (PostgreSQL)
    pub database: DatabaseSettings,

    /// Redis configuration
    pub redis: RedisSettings,

    /// Snowflake ID generator settings
    pub snowflake: SnowflakeSettings,

    /// Friend graph settings
    pub friends: FriendSettings,

    /// Event stream consumer settings
    pub events: EventSettings,

    /// Presence and fanout settings
    pub presence: PresenceSettings,

    /// Rate limiting configuration
    pub rate_limit: RateLimitSettings,

    /// Background maintenance settings
    pub maintenance: MaintenanceSettings,

    /// Current environment (development, staging, production)
    pub environment: String,
}

/// Server binding configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    /// Host address to bind to (e.g., "0.0.0.0")
    pub host: String,

    /// Port number to listen on
    pub port: u16,
}

/// PostgreSQL database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// Database connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections to maintain
    pub min_connections: u32,

    /// Connection acquire timeout in seconds
    pub acquire_timeout: u64,

    /// Apply pending migrations on startup
    pub migrate: bool,
}

/// Redis configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisSettings {
    /// Redis connection URL
    pub url: String,

    /// Prefix applied to every KV key (presence, rate limit counters)
    pub key_prefix: Option<String>,
}

/// Snowflake ID generator configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SnowflakeSettings {
    /// Machine/worker ID (0-1023)
    pub machine_id: u16,

    /// Custom epoch timestamp in milliseconds
    pub epoch: u64,
}

/// Friend graph configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FriendSettings {
    /// How long an invitation stays acceptable, in hours
    pub invitation_duration_hours: i64,
}

/// Event stream configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EventSettings {
    /// Consumer group name
    pub group: String,

    /// Streams per subject
    pub partitions: u32,

    /// Seconds before an unacknowledged delivery is handed out again
    pub ack_wait_secs: u64,

    /// Deliveries before the exhaustion policy applies
    pub max_deliver: u32,

    /// Entries fetched per read
    pub batch_size: usize,

    /// Blocking read timeout in milliseconds
    pub block_ms: u64,

    /// What to do with entries that ran out of deliveries
    pub exhausted: ExhaustedPolicy,
}

/// Presence configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PresenceSettings {
    /// Presence record lifetime in seconds
    pub ttl_secs: u64,

    /// Upper bound on one detached fanout, in milliseconds
    pub fanout_timeout_ms: u64,
}

/// One rate limit tag: at most `limit` hits over the trailing
/// `expiration_secs`, counted in `period_secs` buckets.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TagLimitSettings {
    pub limit: i64,
    pub period_secs: u64,
    pub expiration_secs: u64,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitSettings {
    /// Per client IP
    pub ip: TagLimitSettings,

    /// Per authenticated user
    pub user: TagLimitSettings,

    /// Per (user, IP) pair
    pub user_ip: TagLimitSettings,
}

/// Background maintenance configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MaintenanceSettings {
    /// Seconds between deleted-user purge sweeps
    pub purge_interval_secs: u64,

    /// Seconds between expired invitation sweeps
    pub invitation_gc_interval_secs: u64,

    /// Rows fetched per drain page
    pub page_size: usize,
}

impl Settings {
    /// Load settings from environment variables and configuration files.
    ///
    /// The loading order is:
    /// 1. Built-in defaults
    /// 2. config/default.toml (base configuration)
    /// 3. config/{RUN_ENV}.toml (environment-specific overrides)
    /// 4. Environment variables (highest priority)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if configuration cannot be loaded or parsed,
    /// or if a rate limit or stream setting is zero.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        // Determine the running environment
        let environment = std::env::var("RUN_ENV").unwrap_or_else(|_| "development".into());

        Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("database.acquire_timeout", 30)?
            .set_default("database.migrate", true)?
            .set_default("snowflake.machine_id", 1)?
            .set_default("snowflake.epoch", 1420070400000_u64)?
            .set_default("friends.invitation_duration_hours", 72)?
            .set_default("events.group", "chat-core")?
            .set_default("events.partitions", 1)?
            .set_default("events.ack_wait_secs", 15)?
            .set_default("events.max_deliver", 30)?
            .set_default("events.batch_size", 32)?
            .set_default("events.block_ms", 2000)?
            .set_default("events.exhausted", "dead_letter")?
            .set_default("presence.ttl_secs", 60)?
            .set_default("presence.fanout_timeout_ms", 5000)?
            .set_default("rate_limit.ip.limit", 240)?
            .set_default("rate_limit.ip.period_secs", 15)?
            .set_default("rate_limit.ip.expiration_secs", 60)?
            .set_default("rate_limit.user.limit", 120)?
            .set_default("rate_limit.user.period_secs", 15)?
            .set_default("rate_limit.user.expiration_secs", 60)?
            .set_default("rate_limit.user_ip.limit", 120)?
            .set_default("rate_limit.user_ip.period_secs", 15)?
            .set_default("rate_limit.user_ip.expiration_secs", 60)?
            .set_default("maintenance.purge_interval_secs", 60)?
            .set_default("maintenance.invitation_gc_interval_secs", 3600)?
            .set_default("maintenance.page_size", 256)?
            // Load from config files
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Load from environment variables
            // APP__SERVER__PORT=3000 -> server.port = 3000
            .add_source(
                Environment::default()
                    .prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            // Map simple environment variables
            .set_override_option("server.host", std::env::var("SERVER_HOST").ok())?
            .set_override_option("server.port", std::env::var("SERVER_PORT").ok())?
            .set_override_option("database.url", std::env::var("DATABASE_URL").ok())?
            .set_override_option("redis.url", std::env::var("REDIS_URL").ok())?
            .set_override_option(
                "snowflake.machine_id",
                std::env::var("SNOWFLAKE_MACHINE_ID").ok(),
            )?
            .build()?
            .try_deserialize()
            .and_then(|settings: Self| {
                settings.validate()?;
                Ok(settings)
            })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (name, tag) in [
            ("ip", &self.rate_limit.ip),
            ("user", &self.rate_limit.user),
            ("user_ip", &self.rate_limit.user_ip),
        ] {
            if tag.period_secs == 0 || tag.expiration_secs == 0 {
                return Err(ConfigError::Message(format!(
                    "rate_limit.{}: period and expiration must be positive",
                    name
                )));
            }
        }
        if self.events.partitions == 0 || self.events.max_deliver == 0 {
            return Err(ConfigError::Message(
                "events: partitions and max_deliver must be positive".into(),
            ));
        }
        if self.maintenance.page_size == 0 {
            return Err(ConfigError::Message(
                "maintenance.page_size must be positive".into(),
            ));
        }
        if self.snowflake.machine_id > 1023 {
            return Err(ConfigError::Message(
                "snowflake.machine_id must be in 0..=1023".into(),
            ));
        }
        Ok(())
    }

    /// Get the full server address as a string.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl FriendSettings {
    pub fn invitation_duration(&self) -> chrono::Duration {
        chrono::Duration::hours(self.invitation_duration_hours)
    }
}

impl EventSettings {
    pub fn stream_options(&self) -> StreamOptions {
        StreamOptions {
            partitions: self.partitions,
            ack_wait: Duration::from_secs(self.ack_wait_secs),
            max_deliver: self.max_deliver,
            batch_size: self.batch_size,
            block: Duration::from_millis(self.block_ms),
            exhausted: self.exhausted,
        }
    }
}

impl PresenceSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn fanout_timeout(&self) -> Duration {
        Duration::from_millis(self.fanout_timeout_ms)
    }
}

impl From<TagLimitSettings> for Limit {
    fn from(s: TagLimitSettings) -> Self {
        Limit {
            limit: s.limit,
            period: Duration::from_secs(s.period_secs),
            expiration: Duration::from_secs(s.expiration_secs),
        }
    }
}
