//! Configuration file handling for gpu-burnin

use anyhow::{Context, Result};
use burnin_adapter_gpu::TelemetryConfig;
use burnin_compute::ComputeConfig;
use burnin_core::RunConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Everything a run needs, as read from disk before command-line overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BurninConfig {
    /// Duration, cadence and shutdown policy
    pub run: RunConfig,

    /// Load engine settings
    pub compute: ComputeConfig,

    /// Telemetry backend settings
    pub telemetry: TelemetryConfig,

    /// Configuration source path
    #[serde(skip)]
    source: Option<PathBuf>,
}

impl BurninConfig {
    /// Load an explicit file, or the default file when it exists
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_from_file(path),
            None => {
                let path = Self::default_config_path()?;
                if path.exists() {
                    Self::load_from_file(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: Self = if path.extension().and_then(|s| s.to_str()) == Some("json") {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?
        } else {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?
        };

        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("gpu-burnin").join("config.yaml"))
    }

    /// Get the configuration source path
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }
}
