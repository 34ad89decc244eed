use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use facecheck_core::detection::infrastructure::onnx_face_detector::DEFAULT_CONFIDENCE;
use facecheck_core::pipeline::config::PipelineConfig;
use facecheck_core::shared::constants::APP_DIR_NAME;

/// Persisted CLI defaults. Command-line flags take precedence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub confidence: f32,
    /// Searched for the model before the cache and the network.
    pub model_dir: Option<PathBuf>,
    pub readiness_timeout_ms: Option<u64>,
    pub detection_timeout_ms: Option<u64>,
    /// Larger files are reported as having no face without being read.
    pub max_bytes: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            confidence: DEFAULT_CONFIDENCE,
            model_dir: None,
            readiness_timeout_ms: None,
            detection_timeout_ms: None,
            max_bytes: None,
        }
    }
}

impl Settings {
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join("settings.json"))
    }

    pub fn load() -> Self {
        Self::config_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default()
    }

    /// Missing or unparsable files yield defaults.
    pub fn load_from(path: &Path) -> Self {
        fs::read_to_string(path)
            .ok()
            .and_then(|json| serde_json::from_str(&json).ok())
            .unwrap_or_default()
    }

    pub fn save(&self) {
        if let Some(path) = Self::config_path() {
            self.save_to(&path);
        }
    }

    pub fn save_to(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = fs::write(path, json) {
                    log::warn!("Could not save settings to {}: {e}", path.display());
                }
            }
            Err(e) => log::warn!("Could not serialize settings: {e}"),
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            readiness_timeout: self.readiness_timeout_ms.map(Duration::from_millis),
            detection_timeout: self.detection_timeout_ms.map(Duration::from_millis),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(format!(
                "Confidence must be between 0.0 and 1.0, got {}",
                self.confidence
            ));
        }
        if self.max_bytes == Some(0) {
            return Err("Max bytes must be greater than zero".to_string());
        }
        if let Some(dir) = &self.model_dir {
            if !dir.is_dir() {
                return Err(format!("Model directory not found: {}", dir.display()));
            }
        }
        Ok(())
    }
}
