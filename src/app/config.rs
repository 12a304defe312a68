use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::app::error::AppError;

pub const DEFAULT_LOG_DIR_PREFIX: &str = "monkey_logs";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AdbSettings {
    pub command_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonkeySettings {
    pub event_count: u32,
    pub throttle_ms: u32,
    pub ignore_timeouts: bool,
    pub pct_majornav: u8,
    pub pct_appswitch: u8,
    pub kill_process_after_error: bool,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub extra_args: String,
}

impl Default for MonkeySettings {
    fn default() -> Self {
        Self {
            event_count: 80_000,
            throttle_ms: 100,
            ignore_timeouts: true,
            pct_majornav: 10,
            pct_appswitch: 0,
            kill_process_after_error: true,
            seed: None,
            extra_args: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogcatSettings {
    pub filter: String,
    pub setup_timeout_secs: u64,
}

impl Default for LogcatSettings {
    fn default() -> Self {
        Self {
            filter: "*:W".to_string(),
            setup_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSettings {
    pub iterations: u32,
    pub log_root: String,
    pub log_dir_prefix: String,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            iterations: 1,
            log_root: String::new(),
            log_dir_prefix: DEFAULT_LOG_DIR_PREFIX.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingSettings {
    pub log_level: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            log_level: "INFO".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub adb: AdbSettings,
    #[serde(default)]
    pub monkey: MonkeySettings,
    #[serde(default)]
    pub logcat: LogcatSettings,
    #[serde(default)]
    pub run: RunSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("MONKEY_MASTER_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".monkey_master_config.json")
}

pub fn backup_config_path(path: &Path) -> PathBuf {
    path.with_extension("backup.json")
}

pub fn load_config(trace_id: &str) -> Result<AppConfig, AppError> {
    load_config_from_path(&config_path(), trace_id)
}

pub fn load_config_from_path(path: &Path, trace_id: &str) -> Result<AppConfig, AppError> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let raw = fs::read_to_string(path)
        .map_err(|err| AppError::system(format!("Failed to read config: {err}"), trace_id))?;
    let config: AppConfig = serde_json::from_str(&raw)
        .map_err(|err| AppError::validation(format!("Failed to parse config: {err}"), trace_id))?;
    Ok(validate_config(config))
}

pub fn save_config_to_path(config: &AppConfig, path: &Path, trace_id: &str) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|err| {
                AppError::system(format!("Failed to create config dir: {err}"), trace_id)
            })?;
        }
    }
    if path.exists() {
        let _ = fs::copy(path, backup_config_path(path));
    }
    let payload = serde_json::to_string_pretty(config)
        .map_err(|err| AppError::system(format!("Failed to serialize config: {err}"), trace_id))?;
    fs::write(path, payload)
        .map_err(|err| AppError::system(format!("Failed to write config: {err}"), trace_id))?;
    Ok(())
}

pub fn validate_config(mut config: AppConfig) -> AppConfig {
    let defaults = AppConfig::default();
    if config.monkey.event_count == 0 {
        config.monkey.event_count = defaults.monkey.event_count;
    }
    if config.monkey.pct_majornav > 100 {
        config.monkey.pct_majornav = defaults.monkey.pct_majornav;
    }
    if config.monkey.pct_appswitch > 100 {
        config.monkey.pct_appswitch = defaults.monkey.pct_appswitch;
    }
    if config.logcat.filter.trim().is_empty() {
        config.logcat.filter = defaults.logcat.filter;
    }
    if !(1..=120).contains(&config.logcat.setup_timeout_secs) {
        config.logcat.setup_timeout_secs = defaults.logcat.setup_timeout_secs;
    }
    if config.run.iterations == 0 {
        config.run.iterations = defaults.run.iterations;
    }
    if config.run.log_dir_prefix.trim().is_empty() {
        config.run.log_dir_prefix = defaults.run.log_dir_prefix;
    }
    config
}
