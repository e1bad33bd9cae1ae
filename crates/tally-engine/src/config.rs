//! # Engine Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TALLY_TERMINAL_ID=POS-02                                           │
//! │     TALLY_TAX_RATE_BPS=1650                                            │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/tally/tally.toml (Linux)                                 │
//! │     ~/Library/Application Support/com.tally.pos/tally.toml (macOS)     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     POS-01, 15 % tax, memory store                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [terminal]
//! id = "POS-01"
//! name = "Register 1"
//!
//! [pricing]
//! tax_rate_bps = 1500
//!
//! [orders]
//! walk_in_customer_id = "walk-in"
//! dedupe_window_secs = 30
//! idempotency_ttl_secs = 86400
//!
//! [returns]
//! approval_threshold_cents = 50000
//!
//! [storage]
//! backend = "sqlite"   # memory | sqlite
//! sqlite_path = "tally.db"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use tally_core::validation::validate_tax_rate_bps;
use tally_core::{Money, TaxRate, WALK_IN_CUSTOMER_ID};

use crate::error::{EngineError, EngineResult};

// =============================================================================
// Sections
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalConfig {
    /// Scopes order numbers (`POS-01-000042`).
    pub id: String,
    pub name: String,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        TerminalConfig {
            id: "POS-01".to_string(),
            name: "Register 1".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Consumption tax in basis points (1500 = 15 %).
    pub tax_rate_bps: u32,
}

impl Default for PricingConfig {
    fn default() -> Self {
        PricingConfig { tax_rate_bps: 1500 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderConfig {
    pub walk_in_customer_id: String,

    /// How long an identical cart on the same session is treated as a retry
    /// of the same create call.
    pub dedupe_window_secs: u64,

    /// How long a client idempotency key keeps pointing at its order.
    pub idempotency_ttl_secs: u64,
}

impl Default for OrderConfig {
    fn default() -> Self {
        OrderConfig {
            walk_in_customer_id: WALK_IN_CUSTOMER_ID.to_string(),
            dedupe_window_secs: 30,
            idempotency_ttl_secs: 86_400,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnConfig {
    /// Refunds above this wait for a supervisor. Unset: every refund is
    /// settled immediately.
    pub approval_threshold_cents: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Sqlite,
}

impl std::str::FromStr for StorageBackend {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "sqlite" => Ok(StorageBackend::Sqlite),
            _ => Err(EngineError::Config(format!("unknown storage backend: {s}"))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub sqlite_path: Option<PathBuf>,
}

// =============================================================================
// EngineConfig
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub terminal: TerminalConfig,

    #[serde(default)]
    pub pricing: PricingConfig,

    #[serde(default)]
    pub orders: OrderConfig,

    #[serde(default)]
    pub returns: ReturnConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

impl EngineConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (tally.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> EngineResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading engine config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = Self::from_toml(&contents)?;
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

    pub fn from_toml(contents: &str) -> EngineResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> EngineResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| EngineError::Config("no config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Engine config saved");
        Ok(())
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.terminal.id.trim().is_empty() {
            return Err(EngineError::Config("terminal.id must not be empty".into()));
        }

        validate_tax_rate_bps(self.pricing.tax_rate_bps)
            .map_err(|e| EngineError::Config(e.to_string()))?;

        if self.orders.walk_in_customer_id.trim().is_empty() {
            return Err(EngineError::Config(
                "orders.walk_in_customer_id must not be empty".into(),
            ));
        }

        if matches!(self.returns.approval_threshold_cents, Some(c) if c < 0) {
            return Err(EngineError::Config(
                "returns.approval_threshold_cents must not be negative".into(),
            ));
        }

        if self.storage.backend == StorageBackend::Sqlite && self.storage.sqlite_path.is_none() {
            return Err(EngineError::Config(
                "storage.sqlite_path is required for the sqlite backend".into(),
            ));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies `TALLY_*` overrides read through `var`.
    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(id) = var("TALLY_TERMINAL_ID") {
            debug!(terminal_id = %id, "Overriding terminal ID from environment");
            self.terminal.id = id;
        }

        if let Some(name) = var("TALLY_TERMINAL_NAME") {
            self.terminal.name = name;
        }

        if let Some(rate) = var("TALLY_TAX_RATE_BPS") {
            match rate.parse::<u32>() {
                Ok(bps) => self.pricing.tax_rate_bps = bps,
                Err(_) => warn!(value = %rate, "Ignoring unparsable TALLY_TAX_RATE_BPS"),
            }
        }

        if let Some(window) = var("TALLY_DEDUPE_WINDOW_SECS") {
            match window.parse::<u64>() {
                Ok(secs) => self.orders.dedupe_window_secs = secs,
                Err(_) => warn!(value = %window, "Ignoring unparsable TALLY_DEDUPE_WINDOW_SECS"),
            }
        }

        if let Some(ttl) = var("TALLY_IDEMPOTENCY_TTL_SECS") {
            match ttl.parse::<u64>() {
                Ok(secs) => self.orders.idempotency_ttl_secs = secs,
                Err(_) => warn!(value = %ttl, "Ignoring unparsable TALLY_IDEMPOTENCY_TTL_SECS"),
            }
        }

        if let Some(threshold) = var("TALLY_RETURN_APPROVAL_THRESHOLD_CENTS") {
            match threshold.parse::<i64>() {
                Ok(cents) => self.returns.approval_threshold_cents = Some(cents),
                Err(_) => warn!(
                    value = %threshold,
                    "Ignoring unparsable TALLY_RETURN_APPROVAL_THRESHOLD_CENTS"
                ),
            }
        }

        if let Some(backend) = var("TALLY_STORAGE_BACKEND") {
            match backend.parse() {
                Ok(parsed) => self.storage.backend = parsed,
                Err(_) => warn!(backend = %backend, "Unknown storage backend in environment"),
            }
        }

        if let Some(path) = var("TALLY_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.storage.sqlite_path = Some(PathBuf::from(path));
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "tally", "pos")
            .map(|dirs| dirs.config_dir().join("tally.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn terminal_id(&self) -> &str {
        &self.terminal.id
    }

    pub fn tax_rate(&self) -> TaxRate {
        TaxRate::from_bps(self.pricing.tax_rate_bps)
    }

    pub fn approval_threshold(&self) -> Option<Money> {
        self.returns.approval_threshold_cents.map(Money::from_cents)
    }

    pub fn dedupe_window(&self) -> chrono::Duration {
        seconds(self.orders.dedupe_window_secs)
    }

    pub fn idempotency_ttl(&self) -> chrono::Duration {
        seconds(self.orders.idempotency_ttl_secs)
    }
}

/// Config seconds as a duration, saturating at chrono's upper bound.
fn seconds(secs: u64) -> chrono::Duration {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::Duration::MAX)
}
