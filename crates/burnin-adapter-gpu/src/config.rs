//! GPU telemetry configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// GPU telemetry backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TelemetryBackend {
    /// Try NVML first, then nvidia-smi
    Auto,
    /// NVIDIA Management Library
    Nvml,
    /// `nvidia-smi --query-gpu`
    NvidiaSmi,
    /// Mock backend for testing
    Mock,
}

/// Telemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Backend to use
    pub backend: TelemetryBackend,

    /// NVML index of the monitored device; unset means GPU 0 unless the
    /// caller pins it
    pub device_index: Option<u32>,

    /// Upper bound on a single query
    #[serde(with = "duration_millis")]
    pub query_timeout: Duration,

    /// Path or name of the nvidia-smi executable
    pub nvidia_smi_path: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self::new(TelemetryBackend::Auto)
    }
}

impl TelemetryConfig {
    /// Create a new telemetry configuration
    pub fn new(backend: TelemetryBackend) -> Self {
        Self {
            backend,
            device_index: None,
            query_timeout: Duration::from_secs(5),
            nvidia_smi_path: "nvidia-smi".to_string(),
        }
    }

    /// Set the monitored device
    pub fn with_device_index(mut self, index: u32) -> Self {
        self.device_index = Some(index);
        self
    }

    /// NVML index that will be queried
    pub fn device(&self) -> u32 {
        self.device_index.unwrap_or(0)
    }

    /// Set the query timeout
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Set the nvidia-smi executable
    pub fn with_nvidia_smi_path(mut self, path: impl Into<String>) -> Self {
        self.nvidia_smi_path = path.into();
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.query_timeout.is_zero() {
            return Err("Query timeout must be greater than zero".to_string());
        }

        if self.nvidia_smi_path.trim().is_empty() {
            return Err("nvidia-smi path must not be empty".to_string());
        }

        Ok(())
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

impl std::fmt::Display for TelemetryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TelemetryBackend::Auto => write!(f, "auto"),
            TelemetryBackend::Nvml => write!(f, "nvml"),
            TelemetryBackend::NvidiaSmi => write!(f, "nvidia-smi"),
            TelemetryBackend::Mock => write!(f, "mock"),
        }
    }
}

impl std::str::FromStr for TelemetryBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(TelemetryBackend::Auto),
            "nvml" => Ok(TelemetryBackend::Nvml),
            "nvidia-smi" | "smi" => Ok(TelemetryBackend::NvidiaSmi),
            "mock" => Ok(TelemetryBackend::Mock),
            _ => Err(format!("Unknown telemetry backend: {}", s)),
        }
    }
}
