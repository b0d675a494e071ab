//! # Engine Configuration
//!
//! Configuration management for the order & inventory engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority (highest wins)                │
//! │                                                                         │
//! │  3. Environment variables   BISTRO_DB_PATH, BISTRO_STOCK_POLICY, ...  │
//! │            ▲                                                            │
//! │  2. Config file             <config dir>/bistro/engine.toml            │
//! │            ▲                                                            │
//! │  1. Defaults                EngineConfig::default()                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # engine.toml
//! [database]
//! path = "/var/lib/bistro/ledger.db"
//! max_connections = 5
//! busy_timeout_secs = 5
//!
//! [idempotency]
//! ttl_secs = 86400
//!
//! [stock]
//! policy = "allow_oversell"  # allow_oversell | reject_insufficient
//!
//! [hub]
//! buffer = 64
//!
//! [device]
//! id = "till-1"
//! ```

use bistro_core::DEFAULT_IDEMPOTENCY_TTL_SECS;
use bistro_db::DbConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};

// =============================================================================
// Stock Policy
// =============================================================================

/// What order creation does when a sale would take stock below zero.
///
/// ```text
/// stock(pommes) = 1, cart asks for 3
///
/// ALLOW_OVERSELL (default)      REJECT_INSUFFICIENT
/// ────────────────────────      ───────────────────
/// order created                 InsufficientStock, nothing written
/// stock(pommes) = -2            stock(pommes) = 1
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockPolicy {
    /// Sell regardless; the kitchen corrects stock afterwards.
    #[default]
    AllowOversell,

    /// Refuse the whole order if any product would go negative.
    RejectInsufficient,
}

impl std::fmt::Display for StockPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StockPolicy::AllowOversell => write!(f, "allow_oversell"),
            StockPolicy::RejectInsufficient => write!(f, "reject_insufficient"),
        }
    }
}

impl std::str::FromStr for StockPolicy {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "allow_oversell" | "oversell" | "allow" => Ok(StockPolicy::AllowOversell),
            "reject_insufficient" | "reject" | "strict" => Ok(StockPolicy::RejectInsufficient),
            other => Err(EngineError::Config(format!(
                "Unknown stock policy: '{}'. Valid options: allow_oversell, reject_insufficient",
                other
            ))),
        }
    }
}

// =============================================================================
// Sections
// =============================================================================

/// Database settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file path, or `:memory:`.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    /// Pool size.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long SQLite waits on a locked database (seconds).
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_secs: u64,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./bistro_ledger.db")
}

fn default_max_connections() -> u32 {
    5
}

fn default_busy_timeout() -> u64 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
            busy_timeout_secs: default_busy_timeout(),
        }
    }
}

/// Idempotency guard settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencySettings {
    /// How long a stored response is replayed (seconds).
    #[serde(default = "default_ttl")]
    pub ttl_secs: u64,
}

fn default_ttl() -> u64 {
    DEFAULT_IDEMPOTENCY_TTL_SECS
}

impl Default for IdempotencySettings {
    fn default() -> Self {
        IdempotencySettings {
            ttl_secs: default_ttl(),
        }
    }
}

/// Stock settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StockSettings {
    /// Oversell policy for order creation.
    #[serde(default)]
    pub policy: StockPolicy,
}

/// Realtime stock hub settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubSettings {
    /// Per-subscriber buffer. A full buffer drops events for that subscriber.
    #[serde(default = "default_hub_buffer")]
    pub buffer: usize,
}

fn default_hub_buffer() -> usize {
    64
}

impl Default for HubSettings {
    fn default() -> Self {
        HubSettings {
            buffer: default_hub_buffer(),
        }
    }
}

/// The till or kiosk this engine runs on.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// Stamped on payments and ledger entries written by this engine.
    #[serde(default)]
    pub id: Option<String>,
}

// =============================================================================
// Main Engine Configuration
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub idempotency: IdempotencySettings,

    #[serde(default)]
    pub stock: StockSettings,

    #[serde(default)]
    pub hub: HubSettings,

    #[serde(default)]
    pub device: DeviceSettings,
}

impl EngineConfig {
    /// Creates a config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults with an in-memory database. Used by tests.
    pub fn in_memory() -> Self {
        let mut config = Self::default();
        config.database.path = PathBuf::from(":memory:");
        config.database.max_connections = 1;
        config
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (engine.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> EngineResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading engine config from file");
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

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load engine config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> EngineResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| EngineError::Config("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Engine config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> EngineResult<()> {
        if self.database.path.as_os_str().is_empty() {
            return Err(EngineError::Config("database.path must not be empty".into()));
        }

        if self.database.max_connections == 0 {
            return Err(EngineError::Config(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        if self.idempotency.ttl_secs == 0 {
            return Err(EngineError::Config(
                "idempotency.ttl_secs must be greater than 0".into(),
            ));
        }

        if self.hub.buffer == 0 {
            return Err(EngineError::Config("hub.buffer must be greater than 0".into()));
        }

        if matches!(self.device.id.as_deref(), Some(id) if id.trim().is_empty()) {
            return Err(EngineError::Config("device.id must not be blank".into()));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("BISTRO_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Ok(max) = std::env::var("BISTRO_DB_MAX_CONNECTIONS") {
            if let Ok(m) = max.parse::<u32>() {
                self.database.max_connections = m;
            }
        }

        if let Ok(ttl) = std::env::var("BISTRO_IDEMPOTENCY_TTL_SECS") {
            if let Ok(t) = ttl.parse::<u64>() {
                debug!(ttl_secs = t, "Overriding idempotency TTL from environment");
                self.idempotency.ttl_secs = t;
            }
        }

        if let Ok(policy) = std::env::var("BISTRO_STOCK_POLICY") {
            match policy.parse() {
                Ok(parsed) => {
                    debug!(policy = %policy, "Overriding stock policy from environment");
                    self.stock.policy = parsed;
                }
                Err(_) => warn!(policy = %policy, "Unknown stock policy in environment"),
            }
        }

        if let Ok(buffer) = std::env::var("BISTRO_HUB_BUFFER") {
            if let Ok(b) = buffer.parse::<usize>() {
                self.hub.buffer = b;
            }
        }

        if let Ok(id) = std::env::var("BISTRO_DEVICE_ID") {
            debug!(device_id = %id, "Overriding device ID from environment");
            self.device.id = Some(id);
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "bistro", "ledger")
            .map(|dirs| dirs.config_dir().join("engine.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Pool configuration for [`bistro_db::Database::new`].
    pub fn to_db_config(&self) -> DbConfig {
        let config = if self.database.path.as_os_str() == ":memory:" {
            DbConfig::in_memory()
        } else {
            DbConfig::new(self.database.path.clone()).max_connections(self.database.max_connections)
        };
        config.busy_timeout(Duration::from_secs(self.database.busy_timeout_secs))
    }

    /// Idempotency record lifetime.
    pub fn idempotency_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.idempotency.ttl_secs).unwrap_or(i64::MAX))
    }

    /// Returns the stock policy.
    pub fn stock_policy(&self) -> StockPolicy {
        self.stock.policy
    }

    /// Returns the device id, if configured.
    pub fn device_id(&self) -> Option<&str> {
        self.device.id.as_deref()
    }
}
