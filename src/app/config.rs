use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::app::error::AppError;
use crate::app::hierarchy::geometry::CoordinateHeuristics;
use crate::app::ui_capture::CaptureTransport;

pub const CONFIG_PATH_ENV: &str = "CARUI_INSPECTOR_CONFIG_PATH";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdbSettings {
    pub command_path: String,
    pub server_host: String,
    pub server_port: u16,
}

impl Default for AdbSettings {
    fn default() -> Self {
        Self {
            command_path: String::new(),
            server_host: "127.0.0.1".to_string(),
            server_port: 5037,
        }
    }
}

/// External call budgets, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeoutSettings {
    pub probe: u64,
    pub shell: u64,
    pub capture: u64,
    pub dump: u64,
    pub connect: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            probe: 3_000,
            shell: 5_000,
            capture: 10_000,
            dump: 10_000,
            connect: 10_000,
        }
    }
}

impl TimeoutSettings {
    pub fn probe(&self) -> Duration {
        Duration::from_millis(self.probe)
    }

    pub fn shell(&self) -> Duration {
        Duration::from_millis(self.shell)
    }

    pub fn capture(&self) -> Duration {
        Duration::from_millis(self.capture)
    }

    pub fn dump(&self) -> Duration {
        Duration::from_millis(self.dump)
    }

    pub fn connect(&self) -> Duration {
        Duration::from_millis(self.connect)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaptureSettings {
    pub min_png_bytes: usize,
    pub transports: Vec<CaptureTransport>,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            min_png_bytes: 100,
            transports: vec![CaptureTransport::Server, CaptureTransport::Process],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HierarchySettings {
    pub dump_path: String,
    pub dump_retries: u32,
    pub retry_delay_ms: u64,
    pub clamp_to_display: bool,
    #[serde(default)]
    pub coordinates: CoordinateHeuristics,
}

impl Default for HierarchySettings {
    fn default() -> Self {
        Self {
            dump_path: "/data/local/tmp/uidump.xml".to_string(),
            dump_retries: 3,
            retry_delay_ms: 300,
            clamp_to_display: true,
            coordinates: CoordinateHeuristics::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccessibilitySettings {
    pub device_port: u16,
    pub local_port: u16,
    pub offset_threshold_px: i32,
    pub service_component: String,
}

impl Default for AccessibilitySettings {
    fn default() -> Self {
        Self {
            device_port: 8765,
            local_port: 8765,
            offset_threshold_px: 50,
            service_component:
                "com.carui.accessibility/com.carui.accessibility.CarUIAccessibilityService"
                    .to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InspectorConfig {
    #[serde(default)]
    pub adb: AdbSettings,
    #[serde(default)]
    pub timeouts: TimeoutSettings,
    #[serde(default)]
    pub capture: CaptureSettings,
    #[serde(default)]
    pub hierarchy: HierarchySettings,
    #[serde(default)]
    pub accessibility: AccessibilitySettings,
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub version: String,
}

impl Default for InspectorConfig {
    fn default() -> Self {
        Self {
            adb: AdbSettings::default(),
            timeouts: TimeoutSettings::default(),
            capture: CaptureSettings::default(),
            hierarchy: HierarchySettings::default(),
            accessibility: AccessibilitySettings::default(),
            logging: LoggingSettings::default(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        return PathBuf::from(path);
    }
    home_dir().join(".carui_inspector_config.json")
}

/// Sits next to the active config file, so an env override moves both.
pub fn backup_config_path() -> PathBuf {
    config_path().with_extension("backup.json")
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

pub fn load_config() -> Result<InspectorConfig, AppError> {
    load_config_from_path(&config_path())
}

pub fn save_config(config: &InspectorConfig) -> Result<(), AppError> {
    save_config_to_path(config, &config_path(), &backup_config_path())
}

pub fn load_config_from_path(path: &Path) -> Result<InspectorConfig, AppError> {
    if !path.exists() {
        return Ok(InspectorConfig::default());
    }
    let raw = fs::read_to_string(path)
        .map_err(|err| AppError::system(format!("Failed to read config: {err}"), ""))?;
    let config: InspectorConfig = serde_json::from_str(&raw)
        .map_err(|err| AppError::system(format!("Failed to parse config: {err}"), ""))?;
    Ok(validate_config(config))
}

pub fn save_config_to_path(
    config: &InspectorConfig,
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
        .map_err(|err| AppError::system(format!("Failed to write config: {err}"), ""))?;
    Ok(())
}

pub fn validate_config(mut config: InspectorConfig) -> InspectorConfig {
    let timeout_defaults = TimeoutSettings::default();
    if config.timeouts.probe < 100 {
        config.timeouts.probe = timeout_defaults.probe;
    }
    if config.timeouts.shell < 100 {
        config.timeouts.shell = timeout_defaults.shell;
    }
    if config.timeouts.capture < 100 {
        config.timeouts.capture = timeout_defaults.capture;
    }
    if config.timeouts.dump < 100 {
        config.timeouts.dump = timeout_defaults.dump;
    }
    if config.timeouts.connect < 100 {
        config.timeouts.connect = timeout_defaults.connect;
    }
    if config.adb.server_port == 0 {
        config.adb.server_port = 5037;
    }
    if config.adb.server_host.trim().is_empty() {
        config.adb.server_host = "127.0.0.1".to_string();
    }
    // Anything shorter than the PNG signature can never be an image.
    if config.capture.min_png_bytes < 8 {
        config.capture.min_png_bytes = 100;
    }
    if config.capture.transports.is_empty() {
        config.capture.transports = CaptureSettings::default().transports;
    }
    let mut seen: Vec<CaptureTransport> = Vec::new();
    config.capture.transports.retain(|transport| {
        if seen.contains(transport) {
            return false;
        }
        seen.push(*transport);
        true
    });
    if !(1..=10).contains(&config.hierarchy.dump_retries) {
        config.hierarchy.dump_retries = 3;
    }
    if config.hierarchy.retry_delay_ms > 5_000 {
        config.hierarchy.retry_delay_ms = 300;
    }
    if !config.hierarchy.dump_path.starts_with('/') {
        config.hierarchy.dump_path = HierarchySettings::default().dump_path;
    }
    let coordinate_defaults = CoordinateHeuristics::default();
    let coordinates = &mut config.hierarchy.coordinates;
    if coordinates.full_display_origin_px < 0 {
        coordinates.full_display_origin_px = coordinate_defaults.full_display_origin_px;
    }
    if coordinates.absolute_margin_px < 0 {
        coordinates.absolute_margin_px = coordinate_defaults.absolute_margin_px;
    }
    if coordinates.relative_origin_px < 0 {
        coordinates.relative_origin_px = coordinate_defaults.relative_origin_px;
    }
    if config.accessibility.device_port == 0 {
        config.accessibility.device_port = 8765;
    }
    if config.accessibility.local_port == 0 {
        config.accessibility.local_port = config.accessibility.device_port;
    }
    if config.accessibility.offset_threshold_px < 0 {
        config.accessibility.offset_threshold_px = 50;
    }
    if config.logging.level.trim().is_empty() {
        config.logging.level = "info".to_string();
    }
    config
}
