/// Application configuration management
/// Stores connection and backup defaults in ~/.config/tenant-backup/config.toml

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::catalog::TablePatterns;
use crate::core::connection::PgTools;
use crate::utils::{CONFIG_DIR_NAME, CONFIG_FILE_NAME, DEFAULT_BATCH_SIZE, DEFAULT_JOBS, DEFAULT_PORT};

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub connection: ConnectionSection,
    pub backup: BackupSection,
    pub tools: ToolsSection,
    pub tables: TablePatterns,
}

/// Connection defaults, overridden by command line flags and PG* variables
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSection {
    pub host: Option<String>,
    pub database: Option<String>,
    pub username: Option<String>,
    pub port: Option<u16>,
    pub jobs: Option<u32>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupSection {
    pub batch_size: Option<usize>,
    /// Where scratch directories are created, system temp dir when unset
    pub scratch_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    pub pg_dump: Option<String>,
    pub pg_restore: Option<String>,
}

impl AppConfig {
    /// Get config file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join(CONFIG_DIR_NAME);

        Ok(config_dir.join(CONFIG_FILE_NAME))
    }

    /// Load configuration from the default location, or defaults if absent
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from an explicit file, which must exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(anyhow!("config file not found at {}", path.display()));
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    pub fn port(&self) -> u16 {
        self.connection.port.unwrap_or(DEFAULT_PORT)
    }

    pub fn jobs(&self) -> u32 {
        self.connection.jobs.unwrap_or(DEFAULT_JOBS)
    }

    pub fn batch_size(&self) -> usize {
        self.backup.batch_size.unwrap_or(DEFAULT_BATCH_SIZE)
    }

    pub fn pg_tools(&self) -> PgTools {
        let defaults = PgTools::default();
        PgTools {
            pg_dump: self.tools.pg_dump.clone().unwrap_or(defaults.pg_dump),
            pg_restore: self.tools.pg_restore.clone().unwrap_or(defaults.pg_restore),
        }
    }
}
