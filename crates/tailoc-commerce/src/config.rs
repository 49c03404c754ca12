//! # Commerce Configuration
//!
//! Configuration for the database pool, cache TTLs and transaction policy.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TAILOC_DATABASE_PATH=/var/lib/tailoc/tailoc.db                     │
//! │     TAILOC_TX_TIMEOUT_MS=5000                                          │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/tailoc/commerce.toml (Linux)                             │
//! │     ~/Library/Application Support/vn.tailoc.commerce/commerce.toml     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "tailoc.db"
//! max_connections = 5
//!
//! [cache]
//! key_prefix = "cache:"
//! product_ttl_secs = 3600
//! user_orders_ttl_secs = 1800
//!
//! [transactions]
//! max_retries = 3
//! timeout_ms = 30000
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use tailoc_cache::CacheConfig;
use tailoc_db::{DbConfig, TransactionOptions};

use crate::error::{CommerceError, CommerceResult};

// =============================================================================
// Database Settings
// =============================================================================

/// `[database]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file, or `:memory:`.
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long SQLite waits on a locked database before reporting busy.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("tailoc.db")
}

fn default_max_connections() -> u32 {
    5
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_database_path(),
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl DatabaseSettings {
    /// Pool configuration for these settings.
    pub fn db_config(&self) -> DbConfig {
        let config = if self.path.as_os_str() == ":memory:" {
            DbConfig::in_memory()
        } else {
            DbConfig::new(self.path.clone()).max_connections(self.max_connections)
        };
        config.busy_timeout(Duration::from_millis(self.busy_timeout_ms))
    }
}

// =============================================================================
// Cache Settings
// =============================================================================

/// `[cache]` section. TTLs are in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,

    #[serde(default = "default_ttl_secs")]
    pub product_ttl_secs: u64,

    #[serde(default = "default_list_ttl_secs")]
    pub product_list_ttl_secs: u64,

    #[serde(default = "default_inventory_ttl_secs")]
    pub inventory_ttl_secs: u64,

    #[serde(default = "default_list_ttl_secs")]
    pub user_orders_ttl_secs: u64,
}

fn default_key_prefix() -> String {
    "cache:".to_string()
}

fn default_ttl_secs() -> u64 {
    3_600
}

fn default_list_ttl_secs() -> u64 {
    1_800
}

fn default_inventory_ttl_secs() -> u64 {
    60
}

impl Default for CacheSettings {
    fn default() -> Self {
        CacheSettings {
            key_prefix: default_key_prefix(),
            default_ttl_secs: default_ttl_secs(),
            product_ttl_secs: default_ttl_secs(),
            product_list_ttl_secs: default_list_ttl_secs(),
            inventory_ttl_secs: default_inventory_ttl_secs(),
            user_orders_ttl_secs: default_list_ttl_secs(),
        }
    }
}

impl CacheSettings {
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new()
            .key_prefix(self.key_prefix.clone())
            .default_ttl(Duration::from_secs(self.default_ttl_secs))
    }

    pub fn product_ttl(&self) -> Duration {
        Duration::from_secs(self.product_ttl_secs)
    }

    pub fn product_list_ttl(&self) -> Duration {
        Duration::from_secs(self.product_list_ttl_secs)
    }

    pub fn inventory_ttl(&self) -> Duration {
        Duration::from_secs(self.inventory_ttl_secs)
    }

    pub fn user_orders_ttl(&self) -> Duration {
        Duration::from_secs(self.user_orders_ttl_secs)
    }
}

// =============================================================================
// Transaction Settings
// =============================================================================

/// `[transactions]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionSettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Budget for the whole call, retries included.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_initial_backoff_ms() -> u64 {
    100
}

fn default_max_backoff_ms() -> u64 {
    10_000
}

impl Default for TransactionSettings {
    fn default() -> Self {
        TransactionSettings {
            max_retries: default_max_retries(),
            timeout_ms: default_timeout_ms(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl TransactionSettings {
    pub fn options(&self) -> TransactionOptions {
        TransactionOptions::default()
            .max_retries(self.max_retries)
            .timeout(Duration::from_millis(self.timeout_ms))
            .initial_backoff(Duration::from_millis(self.initial_backoff_ms))
            .max_backoff(Duration::from_millis(self.max_backoff_ms))
    }
}

// =============================================================================
// Event Settings
// =============================================================================

/// `[events]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSettings {
    /// Events a slow subscriber may fall behind before it starts missing them.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_channel_capacity() -> usize {
    256
}

impl Default for EventSettings {
    fn default() -> Self {
        EventSettings {
            channel_capacity: default_channel_capacity(),
        }
    }
}

// =============================================================================
// Commerce Config
// =============================================================================

/// Complete configuration, passed explicitly to [`crate::CommerceContext`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommerceConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub transactions: TransactionSettings,

    #[serde(default)]
    pub events: EventSettings,
}

impl CommerceConfig {
    /// Defaults with an in-memory database. Used by tests and dry runs.
    pub fn in_memory() -> Self {
        let mut config = Self::default();
        config.database.path = PathBuf::from(":memory:");
        config
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (commerce.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> CommerceResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading commerce config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> CommerceResult<()> {
        if self.database.path.as_os_str().is_empty() {
            return Err(CommerceError::InvalidConfig(
                "database.path must not be empty".into(),
            ));
        }

        if self.database.max_connections == 0 {
            return Err(CommerceError::InvalidConfig(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        if self.cache.default_ttl_secs == 0 {
            return Err(CommerceError::InvalidConfig(
                "cache.default_ttl_secs must be greater than 0".into(),
            ));
        }

        if self.transactions.timeout_ms == 0 {
            return Err(CommerceError::InvalidConfig(
                "transactions.timeout_ms must be greater than 0".into(),
            ));
        }

        if self.transactions.initial_backoff_ms > self.transactions.max_backoff_ms {
            return Err(CommerceError::InvalidConfig(format!(
                "transactions.initial_backoff_ms ({}) exceeds max_backoff_ms ({})",
                self.transactions.initial_backoff_ms, self.transactions.max_backoff_ms
            )));
        }

        if self.events.channel_capacity == 0 {
            return Err(CommerceError::InvalidConfig(
                "events.channel_capacity must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("TAILOC_DATABASE_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Some(max) = env_parse::<u32>("TAILOC_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = max;
        }

        if let Ok(prefix) = std::env::var("TAILOC_CACHE_PREFIX") {
            self.cache.key_prefix = prefix;
        }

        if let Some(ttl) = env_parse::<u64>("TAILOC_CACHE_TTL_SECS") {
            self.cache.default_ttl_secs = ttl;
        }

        if let Some(retries) = env_parse::<u32>("TAILOC_TX_MAX_RETRIES") {
            debug!(max_retries = retries, "Overriding transaction retries from environment");
            self.transactions.max_retries = retries;
        }

        if let Some(timeout) = env_parse::<u64>("TAILOC_TX_TIMEOUT_MS") {
            debug!(timeout_ms = timeout, "Overriding transaction timeout from environment");
            self.transactions.timeout_ms = timeout;
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("vn", "tailoc", "commerce")
            .map(|dirs| dirs.config_dir().join("commerce.toml"))
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(variable = name, value = %raw, "Ignoring unparsable environment override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CommerceConfig::default();
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.cache.key_prefix, "cache:");
        assert_eq!(config.transactions.max_retries, 3);
        assert_eq!(config.transactions.options().timeout, Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = CommerceConfig::default();

        config.transactions.timeout_ms = 0;
        assert!(config.validate().is_err());

        config.transactions.timeout_ms = 1_000;
        config.transactions.initial_backoff_ms = 20_000;
        assert!(config.validate().is_err());

        config.transactions.initial_backoff_ms = 50;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: CommerceConfig = toml::from_str(
            r#"
            [transactions]
            timeout_ms = 2000
            "#,
        )
        .unwrap();

        assert_eq!(config.transactions.timeout_ms, 2_000);
        assert_eq!(config.transactions.max_retries, 3);
        assert_eq!(config.cache.user_orders_ttl_secs, 1_800);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("commerce.toml");
        std::fs::write(
            &path,
            "[database]\npath = \":memory:\"\n\n[cache]\nkey_prefix = \"shop:\"\n",
        )
        .unwrap();

        let config = CommerceConfig::load(Some(path)).unwrap();
        assert_eq!(config.cache.key_prefix, "shop:");
        assert!(config.database.db_config().is_in_memory());
    }

    #[test]
    fn test_invalid_toml_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("commerce.toml");
        std::fs::write(&path, "[transactions\n").unwrap();

        let err = CommerceConfig::load(Some(path)).unwrap_err();
        assert!(matches!(err, CommerceError::ConfigLoadFailed(_)));
    }

    #[test]
    fn test_toml_serialization() {
        let toml_str = toml::to_string_pretty(&CommerceConfig::default()).unwrap();
        assert!(toml_str.contains("[database]"));
        assert!(toml_str.contains("[transactions]"));
    }
}
