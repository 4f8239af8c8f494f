use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::RwLock,
    time::Duration,
};

use crate::camera::FacingMode;

pub const DEFAULT_ENDPOINT: &str = "https://progpedammi.iut-tlse3.fr/APICelcat/public/sallesmmi";
pub const DEFAULT_CHAR_WHITELIST: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789-";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CaptureSettings {
    pub sample_interval_ms: u64,
    pub jpeg_quality: u8,
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub initial_facing: FacingMode,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            sample_interval_ms: 500,
            jpeg_quality: 92,
            ideal_width: 1920,
            ideal_height: 1080,
            initial_facing: FacingMode::Environment,
        }
    }
}

impl CaptureSettings {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CameraSettings {
    pub front_index: u32,
    pub back_index: u32,
    /// Image file or directory of images used in place of a device camera.
    pub frames_path: Option<PathBuf>,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            front_index: 0,
            back_index: 1,
            frames_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WatchdogSettings {
    pub stall_timeout_ms: u64,
    pub max_attempts: u32,
}

impl Default for WatchdogSettings {
    fn default() -> Self {
        Self {
            stall_timeout_ms: 10_000,
            max_attempts: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OcrSettings {
    pub language: String,
    pub char_whitelist: String,
    pub tesseract_path: PathBuf,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            language: "fra".into(),
            char_whitelist: DEFAULT_CHAR_WHITELIST.into(),
            tesseract_path: PathBuf::from("tesseract"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScheduleSettings {
    pub endpoint: String,
    pub request_timeout_secs: u64,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.into(),
            request_timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppSettings {
    pub capture: CaptureSettings,
    pub camera: CameraSettings,
    pub watchdog: WatchdogSettings,
    pub ocr: OcrSettings,
    pub schedule: ScheduleSettings,
}

pub struct SettingsStore {
    path: Option<PathBuf>,
    data: RwLock<AppSettings>,
}

impl SettingsStore {
    /// Loads settings from `path` when given and present, defaults otherwise.
    pub fn new(path: Option<PathBuf>) -> Result<Self> {
        let data = match path.as_deref() {
            Some(path) if path.exists() => read_settings(path)?,
            Some(path) => {
                warn!(
                    "settings file {} not found, using defaults",
                    path.display()
                );
                AppSettings::default()
            }
            None => AppSettings::default(),
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn settings(&self) -> AppSettings {
        match self.data.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn reload(&self) -> Result<()> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        let data = read_settings(path)?;
        let mut guard = match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = data;
        Ok(())
    }
}

fn read_settings(path: &Path) -> Result<AppSettings> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings from {}", path.display()))?;
    Ok(serde_json::from_str(&contents).unwrap_or_else(|err| {
        warn!(
            "settings file {} is malformed ({err}), using defaults",
            path.display()
        );
        AppSettings::default()
    }))
}
