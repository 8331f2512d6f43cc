use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use library::SyncConfig;
use serde::{Deserialize, Serialize};

pub const CONFIG_VERSION: u32 = 1;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub version: u32,
    /// Holds the thumbnail directory; relative to the config file.
    pub library_root: String,
    pub database_path: String,
    /// Registered with the indexer on every start.
    pub paths: Vec<String>,
    pub watch_paths: bool,
    pub watch_debounce_secs: u64,
    pub status_interval_secs: u64,
    pub sync: SyncConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            library_root: "library".to_string(),
            database_path: "library.db".to_string(),
            paths: Vec::new(),
            watch_paths: true,
            watch_debounce_secs: 2,
            status_interval_secs: 30,
            sync: SyncConfig::default(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "io error: {}", err),
            ConfigError::Yaml(err) => write!(f, "yaml error: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Yaml(err)
    }
}

pub fn config_path_from_env() -> PathBuf {
    match env::var("INDEXD_CONFIG") {
        Ok(value) if !value.trim().is_empty() => PathBuf::from(value),
        _ => default_config_path(),
    }
}

fn default_config_path() -> PathBuf {
    match env::current_exe() {
        Ok(exe) => exe
            .parent()
            .map(|dir| dir.join("config.yaml"))
            .unwrap_or_else(|| PathBuf::from("config.yaml")),
        Err(_) => PathBuf::from("config.yaml"),
    }
}

pub fn load_or_create_config(path: &Path) -> Result<(DaemonConfig, bool), ConfigError> {
    if path.exists() {
        let contents = fs::read_to_string(path)?;
        let mut config: DaemonConfig = serde_yaml::from_str(&contents)?;
        if config.version < CONFIG_VERSION {
            config.version = CONFIG_VERSION;
        }
        if config.library_root.trim().is_empty() {
            config.library_root = "library".to_string();
        }
        if config.database_path.trim().is_empty() {
            config.database_path = "library.db".to_string();
        }
        if config.watch_debounce_secs == 0 {
            config.watch_debounce_secs = 2;
        }
        config.paths.retain(|path| !path.trim().is_empty());
        return Ok((config, false));
    }

    let config = DaemonConfig::default();
    save_config(path, &config)?;
    Ok((config, true))
}

pub fn save_config(path: &Path, config: &DaemonConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let contents = serde_yaml::to_string(config)?;
    fs::write(path, contents)?;
    Ok(())
}

pub fn resolve_path(config_path: &Path, value: &str) -> PathBuf {
    let raw = PathBuf::from(value.trim());
    if raw.is_absolute() {
        return raw;
    }
    let base = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    base.join(raw)
}
