// SPDX-License-Identifier: GPL-3.0-only

use crate::backends::camera::CaptureSettings;
use crate::backends::virtual_camera::NodeIdentity;
use crate::constants::app_info::{CONFIG_DIR_NAME, CONFIG_FILE_NAME};
use crate::constants::virtual_camera::{NODE_DESCRIPTION, NODE_NAME};
use crate::errors::{AppError, AppResult};
use crate::pipelines::compositor::PipelineConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Virtual camera output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualCameraSettings {
    /// Publish the composited output as a PipeWire camera
    pub enabled: bool,
    /// PipeWire node name
    pub node_name: String,
    /// Name shown to video apps
    pub description: String,
}

impl Default for VirtualCameraSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            node_name: NODE_NAME.to_string(),
            description: NODE_DESCRIPTION.to_string(),
        }
    }
}

impl VirtualCameraSettings {
    pub fn node(&self) -> NodeIdentity {
        NodeIdentity {
            name: self.node_name.clone(),
            description: self.description.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Capture device and format
    pub capture: CaptureSettings,
    /// Stages to run at startup
    pub pipeline: PipelineConfig,
    /// Display output
    pub virtual_camera: VirtualCameraSettings,
}

impl Config {
    /// Default location: `<config dir>/camera-compositor/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load from `path`; a missing file yields the defaults
    pub fn load(path: &Path) -> AppResult<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?;
        info!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Load from the default location, or defaults when there is none
    pub fn load_default() -> AppResult<Self> {
        match Self::default_path() {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    /// Write to `path`, creating parent directories
    pub fn save(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        info!(path = %path.display(), "Saved config");
        Ok(())
    }

    pub fn from_json(json: &str) -> AppResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> AppResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
