//! Configuration file support.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/bbms/config.toml`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub inventory: InventoryConfig,

    #[serde(default)]
    pub donors: DonorConfig,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Thresholds for the derived inventory warnings
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct InventoryConfig {
    /// Records with fewer free units than this are flagged as low stock
    #[serde(default = "default_low_stock_threshold")]
    pub low_stock_threshold: u32,

    #[serde(default = "default_near_expiry_days")]
    pub near_expiry_days: i64,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            low_stock_threshold: default_low_stock_threshold(),
            near_expiry_days: default_near_expiry_days(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DonorConfig {
    /// Minimum days between two donations
    #[serde(default = "default_donation_interval_days")]
    pub donation_interval_days: i64,
}

impl Default for DonorConfig {
    fn default() -> Self {
        Self {
            donation_interval_days: default_donation_interval_days(),
        }
    }
}

/// Locations of the data files under one data directory
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataPaths {
    pub inventory: PathBuf,
    pub requests: PathBuf,
    pub tests: PathBuf,
    pub donors: PathBuf,
    pub recipients: PathBuf,
}

impl DataPaths {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            inventory: data_dir.join("inventory.csv"),
            requests: data_dir.join("requests.csv"),
            tests: data_dir.join("tests.csv"),
            donors: data_dir.join("donors.csv"),
            recipients: data_dir.join("recipients.csv"),
        }
    }
}

// Default value functions
fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(|| {
        std::env::var_os("HOME")
            .map(|home| PathBuf::from(home).join(".local/share"))
            .unwrap_or_else(|| PathBuf::from("."))
    });
    base.join("bbms")
}

fn default_low_stock_threshold() -> u32 {
    5
}

fn default_near_expiry_days() -> i64 {
    7
}

fn default_donation_interval_days() -> i64 {
    90
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!(
                "No config file found at {:?}, using defaults",
                config_path
            );
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.inventory.near_expiry_days < 0 {
            return Err(Error::Config(format!(
                "near_expiry_days must not be negative (got {})",
                self.inventory.near_expiry_days
            )));
        }
        if self.donors.donation_interval_days < 0 {
            return Err(Error::Config(format!(
                "donation_interval_days must not be negative (got {})",
                self.donors.donation_interval_days
            )));
        }
        Ok(())
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir().unwrap_or_else(|| {
            std::env::var_os("HOME")
                .map(|home| PathBuf::from(home).join(".config"))
                .unwrap_or_else(|| PathBuf::from("."))
        });
        base.join("bbms").join("config.toml")
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }

    pub fn paths(&self) -> DataPaths {
        DataPaths::new(&self.data.data_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.inventory.low_stock_threshold, 5);
        assert_eq!(config.inventory.near_expiry_days, 7);
        assert_eq!(config.donors.donation_interval_days, 90);
        assert!(config.data.data_dir.ends_with("bbms"));
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
[inventory]
low_stock_threshold = 12
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.inventory.low_stock_threshold, 12);
        assert_eq!(config.inventory.near_expiry_days, 7); // default
    }

    #[test]
    fn test_save_and_load_from_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("bbms/config.toml");

        let mut config = Config::default();
        config.data.data_dir = temp_dir.path().join("data");
        config.inventory.near_expiry_days = 3;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.inventory.near_expiry_days, 3);
        assert_eq!(loaded.paths().inventory, temp_dir.path().join("data/inventory.csv"));
    }

    #[test]
    fn test_negative_window_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[inventory]\nnear_expiry_days = -1\n").unwrap();

        assert!(matches!(Config::load_from(&path), Err(Error::Config(_))));
    }
}
