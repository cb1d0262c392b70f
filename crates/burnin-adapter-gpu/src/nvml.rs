//! NVML (NVIDIA Management Library) backend

use crate::config::TelemetryConfig;
use crate::{GpuError, Result};

use async_trait::async_trait;
use burnin_core::{MetricsSnapshot, TelemetrySource};
use nvml_wrapper::enum_wrappers::device::TemperatureSensor;
use nvml_wrapper::error::NvmlError;
use nvml_wrapper::Nvml;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// NVML telemetry for one device
pub struct NvmlTelemetry {
    nvml: Arc<Nvml>,
    device_index: u32,
    device_name: Option<String>,
    query_timeout: Duration,
}

impl NvmlTelemetry {
    /// Initialize NVML and resolve the configured device
    pub async fn new(config: TelemetryConfig) -> Result<Self> {
        config.validate().map_err(GpuError::Configuration)?;
        let device_index = config.device();
        info!("Creating NVML telemetry for GPU {}", device_index);

        let (nvml, device_name) = tokio::task::spawn_blocking(move || init_device(device_index))
            .await
            .map_err(|e| GpuError::InitializationFailed(format!("NVML init task failed: {}", e)))??;

        if let Some(name) = &device_name {
            info!("NVML found GPU {}: {}", device_index, name);
        }

        Ok(Self {
            nvml: Arc::new(nvml),
            device_index,
            device_name,
            query_timeout: config.query_timeout,
        })
    }

    async fn query(&self) -> Result<MetricsSnapshot> {
        let nvml = Arc::clone(&self.nvml);
        let index = self.device_index;
        let name = self.device_name.clone();

        // NVML calls block; a wedged driver must not stall the runtime
        let task = tokio::task::spawn_blocking(move || read_snapshot(&nvml, index, name));
        tokio::time::timeout(self.query_timeout, task)
            .await
            .map_err(|_| {
                GpuError::Timeout(format!("NVML did not answer within {:?}", self.query_timeout))
            })?
            .map_err(|e| GpuError::CommunicationError(format!("NVML query task failed: {}", e)))?
    }
}

#[async_trait]
impl TelemetrySource for NvmlTelemetry {
    fn backend_name(&self) -> &str {
        "nvml"
    }

    async fn query_device_metrics(&self) -> burnin_core::Result<MetricsSnapshot> {
        Ok(self.query().await?)
    }
}

fn init_device(index: u32) -> Result<(Nvml, Option<String>)> {
    let nvml = Nvml::init().map_err(map_nvml_error)?;

    let count = nvml.device_count().map_err(map_nvml_error)?;
    if index >= count {
        return Err(GpuError::GpuNotFound(format!(
            "GPU {} requested but NVML reports {} device(s)",
            index, count
        )));
    }

    let name = nvml
        .device_by_index(index)
        .and_then(|device| device.name())
        .ok();

    Ok((nvml, name))
}

fn read_snapshot(nvml: &Nvml, index: u32, name: Option<String>) -> Result<MetricsSnapshot> {
    let device = nvml.device_by_index(index).map_err(map_nvml_error)?;

    let utilization = device.utilization_rates().map_err(map_nvml_error)?;
    let memory = device.memory_info().map_err(map_nvml_error)?;

    let mut snapshot =
        MetricsSnapshot::new(index, utilization.gpu as f64, memory.used, memory.total);
    snapshot.device_name = name;

    // Consumer boards often lack power or thermal sensors
    snapshot.temperature_celsius = device
        .temperature(TemperatureSensor::Gpu)
        .ok()
        .map(|t| t as f64);
    snapshot.power_watts = device.power_usage().ok().map(milliwatts_to_watts);
    snapshot.power_limit_watts = device.enforced_power_limit().ok().map(milliwatts_to_watts);

    debug!("Read NVML sample for GPU {}", index);
    Ok(snapshot)
}

fn milliwatts_to_watts(milliwatts: u32) -> f64 {
    milliwatts as f64 / 1000.0
}

fn map_nvml_error(error: NvmlError) -> GpuError {
    match error {
        NvmlError::DriverNotLoaded => {
            GpuError::DriverError("NVIDIA driver is not loaded".to_string())
        }
        NvmlError::NoPermission => {
            GpuError::DriverError("insufficient permission to query the GPU".to_string())
        }
        NvmlError::GpuLost => GpuError::GpuLost("GPU has fallen off the bus".to_string()),
        NvmlError::Timeout => GpuError::Timeout("NVML operation timed out".to_string()),
        NvmlError::NotSupported => {
            GpuError::UnsupportedBackend("query not supported by this device".to_string())
        }
        other => GpuError::NvmlError(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TelemetryBackend;

    #[test]
    fn test_power_conversion() {
        assert_eq!(milliwatts_to_watts(250_000), 250.0);
        assert_eq!(milliwatts_to_watts(1_500), 1.5);
    }

    #[test]
    fn test_nvml_error_mapping() {
        assert!(map_nvml_error(NvmlError::DriverNotLoaded).is_driver_issue());
        assert!(map_nvml_error(NvmlError::Timeout).is_retryable());
        assert!(!map_nvml_error(NvmlError::GpuLost).is_retryable());
        assert!(matches!(map_nvml_error(NvmlError::GpuLost), GpuError::GpuLost(_)));
        assert!(matches!(
            map_nvml_error(NvmlError::NotSupported),
            GpuError::UnsupportedBackend(_)
        ));
        assert!(matches!(map_nvml_error(NvmlError::Unknown), GpuError::NvmlError(_)));
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_before_init() {
        let config = TelemetryConfig::new(TelemetryBackend::Nvml)
            .with_query_timeout(Duration::ZERO);
        let result = NvmlTelemetry::new(config).await;
        assert!(matches!(result, Err(GpuError::Configuration(_))));
    }
}
