//! Configuration loading and root folder resolution

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "CIFONAUTA_ROOT_FOLDER";

/// Default database file name inside the root folder
pub const DEFAULT_DATABASE_FILE: &str = "cifonauta.db";

/// Default WoRMS REST endpoint
pub const DEFAULT_WORMS_BASE_URL: &str = "https://www.marinespecies.org/rest";

/// Settings read from `config.toml`
///
/// Every field is optional in the file; missing values fall back to
/// the compiled defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub root_folder: Option<PathBuf>,
    pub log_level: String,
    pub database_file: String,
    pub event_bus_capacity: usize,
    pub worms: WormsConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            log_level: "info".to_string(),
            database_file: DEFAULT_DATABASE_FILE.to_string(),
            event_bus_capacity: 256,
            worms: WormsConfig::default(),
        }
    }
}

/// `[worms]` table of the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WormsConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    /// Attempts per request before giving up
    pub max_attempts: u32,
}

impl Default for WormsConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_WORMS_BASE_URL.to_string(),
            timeout_secs: 30,
            max_attempts: 3,
        }
    }
}

impl TomlConfig {
    /// Parse config from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load config from a file path
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load config from the platform location, or defaults
    ///
    /// A missing or malformed file never aborts startup.
    pub fn load_or_default() -> Self {
        let Some(path) = default_config_path() else {
            return Self::default();
        };
        if !path.exists() {
            debug!("No config file at {}, using defaults", path.display());
            return Self::default();
        }
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!("Ignoring config file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Database file path under the given root folder
    pub fn database_path(&self, root_folder: &Path) -> PathBuf {
        root_folder.join(&self.database_file)
    }
}

/// Platform config file location (`~/.config/cifonauta/config.toml` on Linux)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("cifonauta").join("config.toml"))
}

/// Root folder resolution in priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub struct RootFolderResolver<'a> {
    cli_arg: Option<&'a Path>,
    config: &'a TomlConfig,
}

impl<'a> RootFolderResolver<'a> {
    pub fn new(cli_arg: Option<&'a Path>, config: &'a TomlConfig) -> Self {
        Self { cli_arg, config }
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = self.cli_arg {
            return path.to_path_buf();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.is_empty() {
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.config.root_folder {
            return path.clone();
        }

        default_root_folder()
    }
}

/// Get OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("cifonauta"))
        .unwrap_or_else(|| PathBuf::from("./cifonauta_data"))
}
