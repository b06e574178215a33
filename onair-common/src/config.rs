//! Configuration file loading and root folder resolution

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable consulted for the root folder
pub const ROOT_FOLDER_ENV: &str = "ONAIR_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DEFAULT_DB_FILE: &str = "onair.db";

/// Contents of `config.toml`
///
/// Every key is optional; missing keys fall through to the next source.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    pub root_folder: Option<PathBuf>,
    pub database: Option<PathBuf>,
    pub log_filter: Option<String>,
}

impl TomlConfig {
    /// Parse a TOML document
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid config.toml: {}", e)))
    }

    /// Read and parse a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Load the platform config file, or an empty config if none exists
    pub fn load_default() -> Self {
        match find_config_file() {
            Some(path) => match Self::load(&path) {
                Ok(config) => {
                    debug!("Loaded config file {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Ignoring config file {}: {}", path.display(), e);
                    Self::default()
                }
            },
            None => Self::default(),
        }
    }
}

/// Root folder resolution, highest priority first:
/// 1. Command-line argument
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent default
pub fn resolve_root_folder(cli_arg: Option<&Path>, env_var_name: &str, toml: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// Database path: explicit argument, then config file, then `<root>/onair.db`
pub fn resolve_db_path(cli_arg: Option<&Path>, root_folder: &Path, toml: &TomlConfig) -> PathBuf {
    cli_arg
        .map(Path::to_path_buf)
        .or_else(|| toml.database.clone())
        .unwrap_or_else(|| root_folder.join(DEFAULT_DB_FILE))
}

/// Locate the platform configuration file, if one exists
fn find_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("onair").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/onair/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// OS-dependent default root folder
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/onair (or /var/lib/onair for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("onair"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/onair"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("onair"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/onair"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("onair"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\onair"))
    } else {
        PathBuf::from("./onair_data")
    }
}
