use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::app::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdbSettings {
    pub command_path: String,
    pub command_timeout_sec: u64,
}

impl Default for AdbSettings {
    fn default() -> Self {
        Self {
            command_path: String::new(),
            command_timeout_sec: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScreenRecordSettings {
    pub bit_rate: String,
    pub time_limit_sec: i32,
    pub size: String,
    pub extra_args: String,
    pub use_hevc: bool,
}

impl Default for ScreenRecordSettings {
    fn default() -> Self {
        Self {
            bit_rate: String::new(),
            time_limit_sec: 0,
            size: String::new(),
            extra_args: String::new(),
            use_hevc: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TileSettings {
    pub label: String,
    pub poll_interval_ms: u64,
}

impl Default for TileSettings {
    fn default() -> Self {
        Self {
            label: "Screen record".to_string(),
            poll_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JankSettings {
    pub iterations: u32,
    pub jank_threshold_pct: f64,
    pub settle_ms: u64,
}

impl Default for JankSettings {
    fn default() -> Self {
        Self {
            iterations: 5,
            jank_threshold_pct: 5.0,
            settle_ms: 500,
        }
    }
}

/// Component names and tap targets for the wear handwriting scenarios.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HandwritingSettings {
    pub ime_component: String,
    pub ime_package: String,
    pub remote_input_activity: String,
    pub input_box_activity: String,
    pub ime_button_x: i32,
    pub ime_button_y: i32,
    pub screen_tap_x: i32,
    pub screen_tap_y: i32,
}

impl Default for HandwritingSettings {
    fn default() -> Self {
        Self {
            ime_component:
                "com.google.android.inputmethod.handwriting/.HandwritingInputMethodService"
                    .to_string(),
            ime_package: "com.google.android.inputmethod.handwriting".to_string(),
            remote_input_activity:
                "com.google.android.wearable.app/com.google.android.clockwork.remoteinput.RemoteInputActivity"
                    .to_string(),
            input_box_activity:
                "com.google.android.wearable.app/com.google.android.clockwork.settings.InputBoxActivity"
                    .to_string(),
            ime_button_x: 200,
            ime_button_y: 360,
            screen_tap_x: 200,
            screen_tap_y: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub adb: AdbSettings,
    #[serde(default)]
    pub screen_record: ScreenRecordSettings,
    #[serde(default)]
    pub tile: TileSettings,
    #[serde(default)]
    pub jank: JankSettings,
    #[serde(default)]
    pub handwriting: HandwritingSettings,
    #[serde(default)]
    pub output_path: String,
    #[serde(default)]
    pub version: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            adb: AdbSettings::default(),
            screen_record: ScreenRecordSettings::default(),
            tile: TileSettings::default(),
            jank: JankSettings::default(),
            handwriting: HandwritingSettings::default(),
            output_path: String::new(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("JANKTILE_CONFIG_PATH") {
        return PathBuf::from(path);
    }
    if let Some(dir) = dirs::config_dir() {
        return dir.join("janktile").join("config.json");
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".janktile_config.json")
}

pub fn load_config() -> Result<AppConfig, AppError> {
    load_config_from_path(&config_path())
}

pub fn save_config(config: &AppConfig) -> Result<(), AppError> {
    save_config_to_path(config, &config_path())
}

pub fn load_config_from_path(path: &Path) -> Result<AppConfig, AppError> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let raw = fs::read_to_string(path)
        .map_err(|err| AppError::system(format!("Failed to read config: {err}"), ""))?;
    let config: AppConfig = serde_json::from_str(&raw)
        .map_err(|err| AppError::system(format!("Failed to parse config: {err}"), ""))?;
    Ok(validate_config(config))
}

pub fn save_config_to_path(config: &AppConfig, path: &Path) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let payload = serde_json::to_string_pretty(config)
        .map_err(|err| AppError::system(format!("Failed to serialize config: {err}"), ""))?;
    fs::write(path, payload)
        .map_err(|err| AppError::system(format!("Failed to write config: {err}"), ""))?;
    Ok(())
}

fn validate_config(mut config: AppConfig) -> AppConfig {
    if config.adb.command_timeout_sec == 0 {
        config.adb.command_timeout_sec = 10;
    }
    if config.tile.label.trim().is_empty() {
        config.tile.label = TileSettings::default().label;
    }
    if config.tile.poll_interval_ms < 100 {
        config.tile.poll_interval_ms = 1000;
    }
    if config.jank.iterations == 0 {
        config.jank.iterations = 5;
    }
    if !(0.0..=100.0).contains(&config.jank.jank_threshold_pct) {
        config.jank.jank_threshold_pct = 5.0;
    }
    config
}
