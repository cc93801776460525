use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::app::error::AppError;

pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_POOL_WORKERS: usize = 4;
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 5000;
pub const DEFAULT_FORCED_GRACE_MS: u64 = 2000;
pub const DEFAULT_APP_PACKAGE: &str = "com.displaytuner.app";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandSettings {
    pub timeout_ms: u64,
    /// Prepended to every command line, e.g. `["adb", "-s", "SERIAL", "shell"]`.
    /// Empty means the command's own program is spawned directly.
    pub launcher: Vec<String>,
    /// Directory the program token is resolved against when no launcher is set.
    pub tool_dir: String,
}

impl Default for CommandSettings {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_COMMAND_TIMEOUT_MS,
            launcher: Vec::new(),
            tool_dir: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PoolSettings {
    pub workers: usize,
    pub shutdown_grace_ms: u64,
    pub forced_grace_ms: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            workers: DEFAULT_POOL_WORKERS,
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
            forced_grace_ms: DEFAULT_FORCED_GRACE_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceSettings {
    /// Package whose permission grants are inspected through `dumpsys package`.
    pub app_package: String,
    pub unkillable_packages: Vec<String>,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            app_package: DEFAULT_APP_PACKAGE.to_string(),
            unkillable_packages: default_unkillable_packages(),
        }
    }
}

pub fn default_unkillable_packages() -> Vec<String> {
    [
        DEFAULT_APP_PACKAGE,
        "com.topjohnwu.magisk",
        "eu.chainfire.supersu-1",
        "com.android.systemui",
        "android",
        "com.android.phone",
    ]
    .iter()
    .map(|pkg| pkg.to_string())
    .collect()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StoreSettings {
    /// Location of the preference file; empty selects the default path.
    pub preferences_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TunerConfig {
    #[serde(default)]
    pub command: CommandSettings,
    #[serde(default)]
    pub pool: PoolSettings,
    #[serde(default)]
    pub device: DeviceSettings,
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub version: String,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            command: CommandSettings::default(),
            pool: PoolSettings::default(),
            device: DeviceSettings::default(),
            store: StoreSettings::default(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl TunerConfig {
    pub fn preferences_path(&self) -> PathBuf {
        let configured = self.store.preferences_path.trim();
        if configured.is_empty() {
            home_dir().join(".display_tuner_prefs.json")
        } else {
            PathBuf::from(configured)
        }
    }

    pub fn tool_dir(&self) -> Option<PathBuf> {
        let trimmed = self.command.tool_dir.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(PathBuf::from(trimmed))
        }
    }
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("DISPLAY_TUNER_CONFIG_PATH") {
        return PathBuf::from(path);
    }
    home_dir().join(".display_tuner_config.json")
}

pub fn backup_config_path() -> PathBuf {
    home_dir().join(".display_tuner_config.backup.json")
}

pub fn load_config() -> Result<TunerConfig, AppError> {
    load_config_from_path(&config_path())
}

pub fn save_config(config: &TunerConfig) -> Result<(), AppError> {
    save_config_to_path(config, &config_path(), &backup_config_path())
}

pub fn load_config_from_path(path: &Path) -> Result<TunerConfig, AppError> {
    if !path.exists() {
        return Ok(TunerConfig::default());
    }
    let raw = fs::read_to_string(path)
        .map_err(|err| AppError::io(format!("Failed to read config: {err}"), ""))?;
    let config: TunerConfig = serde_json::from_str(&raw)
        .map_err(|err| AppError::parse(format!("Failed to parse config: {err}"), ""))?;
    Ok(validate_config(config))
}

pub fn save_config_to_path(
    config: &TunerConfig,
    path: &Path,
    backup_path: &Path,
) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    if path.exists() {
        let _ = fs::copy(path, backup_path);
    }
    let payload = serde_json::to_string_pretty(config)
        .map_err(|err| AppError::system(format!("Failed to serialize config: {err}"), ""))?;
    fs::write(path, payload)
        .map_err(|err| AppError::io(format!("Failed to write config: {err}"), ""))?;
    Ok(())
}

fn validate_config(mut config: TunerConfig) -> TunerConfig {
    if config.command.timeout_ms < 100 {
        config.command.timeout_ms = DEFAULT_COMMAND_TIMEOUT_MS;
    }
    if config.pool.workers == 0 || config.pool.workers > 64 {
        config.pool.workers = DEFAULT_POOL_WORKERS;
    }
    if config.pool.shutdown_grace_ms == 0 {
        config.pool.shutdown_grace_ms = DEFAULT_SHUTDOWN_GRACE_MS;
    }
    if config.device.app_package.trim().is_empty() {
        config.device.app_package = DEFAULT_APP_PACKAGE.to_string();
    }
    config
        .command
        .launcher
        .retain(|part| !part.trim().is_empty());
    config
}
