// src/config.rs - session settings, stored as JSON in the platform config dir
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::camera::{CameraModel, DepthMode};
use crate::error::TryOnError;
use crate::pose::EstimatorConfig;
use crate::scheduler::SchedulerConfig;
use crate::tracking::TrackerConfig;

const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TryOnConfig {
    pub camera: CameraModel,
    pub depth: DepthMode,
    pub estimator: EstimatorConfig,
    pub tracker: TrackerConfig,
    pub scheduler: SchedulerConfig,
}

impl TryOnConfig {
    /// `<config dir>/config.json`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "RingTryOn", "ring_tryon")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        config.validate()?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// An explicit path must exist. Without one the default location is tried
    /// and a missing file gives the defaults.
    pub async fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path).await;
        }
        match Self::default_path() {
            Some(path) if tokio::fs::try_exists(&path).await.unwrap_or(false) => Self::load(&path).await,
            _ => {
                debug!("No configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content)
            .await
            .with_context(|| format!("failed to write config {}", path.display()))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), TryOnError> {
        self.camera.validate()?;
        self.depth.validate()?;
        self.estimator.validate()?;
        self.tracker.validate()?;
        self.scheduler.validate()
    }
}
