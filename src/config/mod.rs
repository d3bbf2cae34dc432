pub mod runtime;
pub use runtime::{engine_snapshot, new_engine_config, update_threshold, SharedEngineConfig};

use crate::decision::EngineConfig;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

/// Environment variable naming the TOML config file
pub const CONFIG_PATH_ENV: &str = "CHARGE_MANAGER_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "charge-manager.toml";

/// Complete application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub tesla: TeslaConfig,
    #[serde(default)]
    pub ioniq: IoniqConfig,
}

/// Web server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Update and cleanup job configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// How often vehicles are polled and recommendations recomputed
    #[serde(default = "default_update_interval")]
    pub update_interval_minutes: u64,
    /// Local hour (0-23) for the daily history cleanup
    #[serde(default = "default_cleanup_hour")]
    pub cleanup_hour: u32,
    /// History older than this is deleted by the cleanup job
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
    /// Readings older than this are flagged stale
    #[serde(default = "default_max_reading_age")]
    pub max_reading_age_minutes: i64,
}

fn default_update_interval() -> u64 {
    60
}

fn default_cleanup_hour() -> u32 {
    3
}

fn default_retention_days() -> i64 {
    90
}

fn default_max_reading_age() -> i64 {
    120
}

/// Longest accepted update interval (one week)
pub const MAX_UPDATE_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

/// Longest accepted history retention (100 years)
pub const MAX_RETENTION_DAYS: i64 = 36_500;

impl SchedulerConfig {
    /// Reject values the jobs cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_UPDATE_INTERVAL_MINUTES).contains(&self.update_interval_minutes) {
            bail!(
                "update_interval_minutes must be between 1 and {}, got {}",
                MAX_UPDATE_INTERVAL_MINUTES,
                self.update_interval_minutes
            );
        }
        if self.cleanup_hour > 23 {
            bail!("cleanup_hour must be between 0 and 23, got {}", self.cleanup_hour);
        }
        if !(1..=MAX_RETENTION_DAYS).contains(&self.retention_days) {
            bail!(
                "retention_days must be between 1 and {}, got {}",
                MAX_RETENTION_DAYS,
                self.retention_days
            );
        }
        if self.max_reading_age_minutes < 1 {
            bail!(
                "max_reading_age_minutes must be at least 1, got {}",
                self.max_reading_age_minutes
            );
        }
        Ok(())
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            update_interval_minutes: default_update_interval(),
            cleanup_hour: default_cleanup_hour(),
            retention_days: default_retention_days(),
            max_reading_age_minutes: default_max_reading_age(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("data/charging_manager.db")
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

/// Cloud vehicle API source configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TeslaConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Fabricate readings instead of calling the API
    #[serde(default = "default_true")]
    pub mock_mode: bool,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    /// Bootstrap refresh token; stored credentials take precedence once present
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// VIN of the vehicle to track (first vehicle on the account if unset)
    #[serde(default)]
    pub vin: Option<String>,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    /// How long a fetched reading is served from cache
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_seconds: u64,
    #[serde(default)]
    pub home_latitude: Option<f64>,
    #[serde(default)]
    pub home_longitude: Option<f64>,
    #[serde(default = "default_home_radius")]
    pub home_radius_km: f64,
    /// Resolve street addresses for live readings
    #[serde(default)]
    pub geocode: bool,
    #[serde(default = "default_geocode_url")]
    pub geocode_url: String,
}

fn default_true() -> bool {
    true
}

fn default_api_base() -> String {
    "https://fleet-api.prd.eu.vn.cloud.tesla.com".to_string()
}

fn default_token_url() -> String {
    "https://auth.tesla.com/oauth2/v3/token".to_string()
}

fn default_cache_ttl() -> u64 {
    300
}

fn default_home_radius() -> f64 {
    0.5
}

fn default_geocode_url() -> String {
    "https://nominatim.openstreetmap.org".to_string()
}

impl Default for TeslaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mock_mode: true,
            client_id: String::new(),
            client_secret: String::new(),
            refresh_token: None,
            vin: None,
            api_base: default_api_base(),
            token_url: default_token_url(),
            cache_ttl_seconds: default_cache_ttl(),
            home_latitude: None,
            home_longitude: None,
            home_radius_km: default_home_radius(),
            geocode: false,
            geocode_url: default_geocode_url(),
        }
    }
}

/// Secondary vehicle source configuration
#[derive(Debug, Clone, Deserialize)]
pub struct IoniqConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub mock_mode: bool,
}

impl Default for IoniqConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mock_mode: true,
        }
    }
}

impl AppConfig {
    /// Load from the file named by `CHARGE_MANAGER_CONFIG` (or `charge-manager.toml`),
    /// falling back to defaults when it does not exist, then apply env overrides.
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        let mut config = if Path::new(&path).exists() {
            info!(path = %path, "Loading configuration file");
            load_config(&path)?
        } else {
            info!(path = %path, "No configuration file, using defaults");
            AppConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.scheduler
            .validate()
            .context("Invalid [scheduler] configuration")
    }

    /// Apply `CHARGE_MANAGER_*` environment variables. Unparseable values are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = env_parse("CHARGE_MANAGER_MOCK_MODE") {
            self.tesla.mock_mode = v;
        }
        if let Some(v) = env_parse("CHARGE_MANAGER_UPDATE_INTERVAL_MINUTES") {
            self.scheduler.update_interval_minutes = v;
        }
        if let Some(v) = env_parse("CHARGE_MANAGER_CHARGE_THRESHOLD_PERCENT") {
            self.engine.charge_threshold = v;
        }
        if let Some(v) = env_parse("CHARGE_MANAGER_MINIMUM_CHARGE_PERCENT") {
            self.engine.minimum_charge = v;
        }
        if let Some(v) = env_parse::<String>("CHARGE_MANAGER_DATABASE_PATH") {
            self.database.path = PathBuf::from(v);
        }
        if let Some(v) = env_parse("CHARGE_MANAGER_HOST") {
            self.server.host = v;
        }
        if let Some(v) = env_parse("CHARGE_MANAGER_PORT") {
            self.server.port = v;
        }
        if let Some(v) = env_parse("CHARGE_MANAGER_TESLA_CLIENT_ID") {
            self.tesla.client_id = v;
        }
        if let Some(v) = env_parse("CHARGE_MANAGER_TESLA_CLIENT_SECRET") {
            self.tesla.client_secret = v;
        }
        if let Some(v) = env_parse("CHARGE_MANAGER_TESLA_REFRESH_TOKEN") {
            self.tesla.refresh_token = Some(v);
        }
        if let Some(v) = env_parse("CHARGE_MANAGER_TESLA_VIN") {
            self.tesla.vin = Some(v);
        }
        if let Some(v) = env_parse("CHARGE_MANAGER_IONIQ_ENABLED") {
            self.ioniq.enabled = v;
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<AppConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path))?;
    let config: AppConfig = toml::from_str(&contents).context("Failed to parse config file")?;
    Ok(config)
}
