use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::analyzer::AnalysisMode;
use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};

const MIN_HOLD_MS: u64 = 500;
const MAX_HOLD_MS: u64 = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSettings {
    pub telemetry_enabled: bool,
    pub hold_duration_ms: u64,
    pub analysis_mode: AnalysisMode,
}

#[derive(Debug, Clone, Serialize)]
pub struct RuntimeSettings {
    pub telemetry_enabled: bool,
    pub hold_duration_ms: u64,
    pub analysis_mode: AnalysisMode,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRuntimeSettingsPayload {
    pub telemetry_enabled: Option<bool>,
    pub hold_duration_ms: Option<u64>,
    pub analysis_mode: Option<AnalysisMode>,
}

impl UserSettings {
    pub fn load(path: &Path, config: &AppConfig) -> AppResult<Self> {
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<Self>(&contents) {
                Ok(settings) => Ok(settings.sanitized()),
                Err(err) => {
                    warn!(
                        target: "settings",
                        error = ?err,
                        "failed to parse settings file; regenerating defaults"
                    );
                    let defaults = Self::from_config(config);
                    defaults.persist(path)?;
                    Ok(defaults)
                }
            },
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                let defaults = Self::from_config(config);
                defaults.persist(path)?;
                Ok(defaults)
            }
            Err(err) => Err(AppError::Io(err)),
        }
    }

    pub fn persist(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let serialized = serde_json::to_string_pretty(self)?;
        fs::write(path, serialized)?;
        Ok(())
    }

    pub fn runtime_profile(&self) -> RuntimeSettings {
        RuntimeSettings {
            telemetry_enabled: self.telemetry_enabled,
            hold_duration_ms: self.hold_duration_ms,
            analysis_mode: self.analysis_mode,
        }
    }

    pub fn apply_patch(&mut self, payload: &UpdateRuntimeSettingsPayload) {
        if let Some(enabled) = payload.telemetry_enabled {
            self.telemetry_enabled = enabled;
        }
        if let Some(hold) = payload.hold_duration_ms {
            self.hold_duration_ms = clamp_hold(hold);
        }
        if let Some(mode) = payload.analysis_mode {
            self.analysis_mode = mode;
        }
    }

    fn from_config(config: &AppConfig) -> Self {
        Self {
            telemetry_enabled: config.telemetry_enabled_by_default,
            hold_duration_ms: clamp_hold(config.hold_duration_ms),
            analysis_mode: AnalysisMode::default(),
        }
    }

    fn sanitized(mut self) -> Self {
        self.hold_duration_ms = clamp_hold(self.hold_duration_ms);
        self
    }
}

fn clamp_hold(value: u64) -> u64 {
    value.clamp(MIN_HOLD_MS, MAX_HOLD_MS)
}

pub fn settings_path(data_dir: &Path, config: &AppConfig) -> PathBuf {
    data_dir.join(&config.settings_file_name)
}
