//! # Catalog Configuration
//!
//! Runtime settings for the persistence layer.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     VITRINE_DB_PATH=/var/lib/vitrine/catalog.db                        │
//! │     VITRINE_LOW_STOCK_THRESHOLD=10                                     │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/vitrine/catalog.toml (Linux)                             │
//! │     ~/Library/Application Support/com.vitrine.catalog/catalog.toml     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "vitrine.db"
//! max_connections = 5
//! min_connections = 1
//! connect_timeout_secs = 30
//!
//! [identifiers]
//! max_attempts = 5
//!
//! [inventory]
//! default_low_stock_threshold = 5
//!
//! [media]
//! base_url = "https://cdn.example.com/media"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use vitrine_core::storage::PublicUrlResolver;
use vitrine_core::DEFAULT_LOW_STOCK_THRESHOLD;

use crate::error::{DbError, DbResult};
use crate::pool::DbConfig;

// =============================================================================
// Sections
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("vitrine.db")
}

fn default_max_connections() -> u32 {
    5
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout() -> u64 {
    30
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

/// Slug / SKU allocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifierSettings {
    /// Allocation attempts before a unique violation reaches the caller.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_max_attempts() -> u32 {
    5
}

impl Default for IdentifierSettings {
    fn default() -> Self {
        IdentifierSettings {
            max_attempts: default_max_attempts(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventorySettings {
    /// Threshold for new stock rows that don't specify one.
    #[serde(default = "default_low_stock_threshold")]
    pub default_low_stock_threshold: i64,
}

fn default_low_stock_threshold() -> i64 {
    DEFAULT_LOW_STOCK_THRESHOLD
}

impl Default for InventorySettings {
    fn default() -> Self {
        InventorySettings {
            default_low_stock_threshold: default_low_stock_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaSettings {
    /// Public prefix joined with stored relative paths.
    #[serde(default = "default_media_base_url")]
    pub base_url: String,
}

fn default_media_base_url() -> String {
    "/storage".to_string()
}

impl Default for MediaSettings {
    fn default() -> Self {
        MediaSettings {
            base_url: default_media_base_url(),
        }
    }
}

// =============================================================================
// CatalogConfig
// =============================================================================

/// Complete catalog configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub identifiers: IdentifierSettings,

    #[serde(default)]
    pub inventory: InventorySettings,

    #[serde(default)]
    pub media: MediaSettings,
}

impl CatalogConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (catalog.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> DbResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading catalog config from file");
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
            warn!("Failed to load catalog config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> DbResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| DbError::Config("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Catalog config saved");
        Ok(())
    }

    pub fn validate(&self) -> DbResult<()> {
        if self.database.max_connections == 0 {
            return Err(DbError::Config(
                "database.max_connections must be greater than 0".into(),
            ));
        }
        if self.database.min_connections > self.database.max_connections {
            return Err(DbError::Config(
                "database.min_connections must not exceed max_connections".into(),
            ));
        }
        if self.identifiers.max_attempts == 0 {
            return Err(DbError::Config(
                "identifiers.max_attempts must be greater than 0".into(),
            ));
        }
        if self.inventory.default_low_stock_threshold < 0 {
            return Err(DbError::Config(
                "inventory.default_low_stock_threshold must not be negative".into(),
            ));
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("VITRINE_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Ok(max) = std::env::var("VITRINE_DB_MAX_CONNECTIONS") {
            if let Ok(m) = max.parse::<u32>() {
                self.database.max_connections = m;
            }
        }

        if let Ok(attempts) = std::env::var("VITRINE_ID_MAX_ATTEMPTS") {
            if let Ok(a) = attempts.parse::<u32>() {
                self.identifiers.max_attempts = a;
            }
        }

        if let Ok(threshold) = std::env::var("VITRINE_LOW_STOCK_THRESHOLD") {
            match threshold.parse::<i64>() {
                Ok(t) => self.inventory.default_low_stock_threshold = t,
                Err(_) => warn!(value = %threshold, "Ignoring non-numeric low stock threshold"),
            }
        }

        if let Ok(url) = std::env::var("VITRINE_MEDIA_BASE_URL") {
            self.media.base_url = url;
        }
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "vitrine", "catalog")
            .map(|dirs| dirs.config_dir().join("catalog.toml"))
    }

    // =========================================================================
    // Derived Settings
    // =========================================================================

    /// Pool configuration for [`crate::Database::new`].
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(self.database.path.clone())
            .max_connections(self.database.max_connections)
            .min_connections(self.database.min_connections)
            .connect_timeout(Duration::from_secs(self.database.connect_timeout_secs))
            .id_max_attempts(self.identifiers.max_attempts)
            .default_low_stock_threshold(self.inventory.default_low_stock_threshold)
    }

    pub fn url_resolver(&self) -> PublicUrlResolver {
        PublicUrlResolver::new(self.media.base_url.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vitrine_core::storage::StorageUrlResolver;

    #[test]
    fn test_defaults_are_valid() {
        let config = CatalogConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.identifiers.max_attempts, 5);
        assert_eq!(config.inventory.default_low_stock_threshold, 5);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.toml");
        std::fs::write(
            &path,
            "[inventory]\ndefault_low_stock_threshold = 12\n\n[media]\nbase_url = \"https://cdn.test\"\n",
        )
        .unwrap();

        let config = CatalogConfig::load(Some(path)).unwrap();
        assert_eq!(config.inventory.default_low_stock_threshold, 12);
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(
            config.url_resolver().url_for("a/b.png"),
            "https://cdn.test/a/b.png"
        );
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("catalog.toml");

        let mut config = CatalogConfig::default();
        config.identifiers.max_attempts = 9;
        config.save(Some(path.clone())).unwrap();

        let loaded = CatalogConfig::load(Some(path)).unwrap();
        assert_eq!(loaded.identifiers.max_attempts, 9);
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let mut config = CatalogConfig::default();
        config.identifiers.max_attempts = 0;
        assert!(matches!(config.validate(), Err(DbError::Config(_))));
    }

    #[test]
    fn test_db_config_carries_policy() {
        let mut config = CatalogConfig::default();
        config.inventory.default_low_stock_threshold = 8;
        let db_config = config.db_config();
        assert_eq!(db_config.default_low_stock_threshold, 8);
        assert_eq!(db_config.id_max_attempts, 5);
    }
}
