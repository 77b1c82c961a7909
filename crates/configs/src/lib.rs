//! # configs
//!
//! Layered runtime configuration: built-in defaults, then an optional
//! `bloodbridge.toml`, then `BLOODBRIDGE__SECTION__KEY` environment
//! variables. A `.env` file is read into the environment first.
//!
//! Values are validated once at load; the rest of the program can trust them.

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

pub const ENV_PREFIX: &str = "BLOODBRIDGE";
pub const CONFIG_FILE: &str = "bloodbridge";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

fn invalid(key: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { key, reason: reason.into() }
}

mod defaults {
    pub fn host() -> String { "0.0.0.0".to_string() }
    pub fn port() -> u16 { 8080 }

    pub fn max_connections() -> u32 { 10 }

    pub fn cooldown_days() -> u32 { 90 }
    pub fn radius_ladder_km() -> Vec<f64> { vec![10.0, 15.0, 20.0] }
    pub fn geofence_radius_m() -> f64 { 300.0 }
    pub fn nearby_bank_radius_km() -> f64 { 15.0 }
    pub fn max_write_attempts() -> u32 { 5 }
    pub fn dispatch_timeout_secs() -> u64 { 10 }

    pub fn scheduler_enabled() -> bool { true }
    pub fn interval_secs() -> u64 { 300 }

    pub fn portal_url() -> String { "http://localhost:3000".to_string() }

    pub fn log_filter() -> String { "info,sqlx=warn,tower_http=info".to_string() }
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "defaults::host")]
    pub host: String,
    #[serde(default = "defaults::port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: defaults::host(), port: defaults::port() }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Without a `url` the engine runs on the in-memory store.
#[derive(Debug, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default, deserialize_with = "secret")]
    pub url: Option<SecretString>,
    #[serde(default = "defaults::max_connections")]
    pub max_connections: u32,
    /// JSON array of accounts loaded into the store at startup.
    #[serde(default)]
    pub seed_file: Option<String>,
}

fn secret<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<SecretString>, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.map(SecretString::from))
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: None, max_connections: defaults::max_connections(), seed_file: None }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatchingConfig {
    #[serde(default = "defaults::cooldown_days")]
    pub cooldown_days: u32,
    /// Search radius per escalation stage, three strictly increasing values.
    #[serde(default = "defaults::radius_ladder_km")]
    pub radius_ladder_km: Vec<f64>,
    #[serde(default = "defaults::geofence_radius_m")]
    pub geofence_radius_m: f64,
    #[serde(default = "defaults::nearby_bank_radius_km")]
    pub nearby_bank_radius_km: f64,
    #[serde(default = "defaults::max_write_attempts")]
    pub max_write_attempts: u32,
    #[serde(default = "defaults::dispatch_timeout_secs")]
    pub dispatch_timeout_secs: u64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            cooldown_days: defaults::cooldown_days(),
            radius_ladder_km: defaults::radius_ladder_km(),
            geofence_radius_m: defaults::geofence_radius_m(),
            nearby_bank_radius_km: defaults::nearby_bank_radius_km(),
            max_write_attempts: defaults::max_write_attempts(),
            dispatch_timeout_secs: defaults::dispatch_timeout_secs(),
        }
    }
}

impl MatchingConfig {
    /// The ladder as a fixed array; only valid after [`AppConfig::validate`].
    pub fn ladder(&self) -> Result<[f64; 3], ConfigError> {
        <[f64; 3]>::try_from(self.radius_ladder_km.as_slice())
            .map_err(|_| invalid("matching.radius_ladder_km", "expected exactly three radii"))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "defaults::scheduler_enabled")]
    pub enabled: bool,
    /// Sweep period; also how long a new request waits before its first escalation.
    #[serde(default = "defaults::interval_secs")]
    pub interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { enabled: defaults::scheduler_enabled(), interval_secs: defaults::interval_secs() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub disaster_mode: bool,
    #[serde(default = "defaults::portal_url")]
    pub portal_url: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self { disaster_mode: false, portal_url: defaults::portal_url() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
    /// Used when `RUST_LOG` is not set.
    #[serde(default = "defaults::log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { format: LogFormat::default(), filter: defaults::log_filter() }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// `BLOODBRIDGE__MATCHING__COOLDOWN_DAYS=60` style variables; the ladder
/// takes a comma-separated list.
pub fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("matching.radius_ladder_km")
}

impl AppConfig {
    /// Reads `.env`, `bloodbridge.toml` (if present) and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_builder(
            Config::builder()
                .add_source(File::with_name(CONFIG_FILE).required(false))
                .add_source(environment()),
        )
    }

    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let ladder = self.matching.ladder()?;
        if ladder.iter().any(|r| !r.is_finite() || *r <= 0.0) {
            return Err(invalid("matching.radius_ladder_km", "radii must be positive"));
        }
        if !ladder.windows(2).all(|w| w[0] < w[1]) {
            return Err(invalid("matching.radius_ladder_km", "radii must be strictly increasing"));
        }
        if !(self.matching.geofence_radius_m.is_finite() && self.matching.geofence_radius_m > 0.0) {
            return Err(invalid("matching.geofence_radius_m", "must be positive"));
        }
        if !(self.matching.nearby_bank_radius_km.is_finite() && self.matching.nearby_bank_radius_km > 0.0) {
            return Err(invalid("matching.nearby_bank_radius_km", "must be positive"));
        }
        if self.matching.max_write_attempts == 0 {
            return Err(invalid("matching.max_write_attempts", "must be at least 1"));
        }
        if self.matching.dispatch_timeout_secs == 0 {
            return Err(invalid("matching.dispatch_timeout_secs", "must be at least 1"));
        }
        if self.scheduler.interval_secs == 0 {
            return Err(invalid("scheduler.interval_secs", "must be at least 1"));
        }
        if self.database.max_connections == 0 {
            return Err(invalid("database.max_connections", "must be at least 1"));
        }
        if self.notifications.portal_url.trim().is_empty() {
            return Err(invalid("notifications.portal_url", "must not be empty"));
        }
        Ok(())
    }
}
