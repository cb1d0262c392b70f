//! Telemetry backend selection

use crate::config::{TelemetryBackend, TelemetryConfig};
use crate::smi::NvidiaSmiTelemetry;
use crate::{GpuError, Result};

use burnin_core::TelemetrySource;
use std::sync::Arc;
use tracing::{info, warn};

/// Create the telemetry source named by `config.backend`
///
/// `Auto` prefers NVML and falls back to nvidia-smi when the library cannot
/// be loaded or does not see the device.
pub async fn create_telemetry_source(config: &TelemetryConfig) -> Result<Arc<dyn TelemetrySource>> {
    config.validate().map_err(GpuError::Configuration)?;

    match config.backend {
        TelemetryBackend::Auto => create_auto(config).await,

        #[cfg(feature = "nvml")]
        TelemetryBackend::Nvml => {
            let source = crate::nvml::NvmlTelemetry::new(config.clone()).await?;
            Ok(Arc::new(source))
        }

        TelemetryBackend::NvidiaSmi => {
            let source = NvidiaSmiTelemetry::new(config.clone()).await?;
            Ok(Arc::new(source))
        }

        #[cfg(any(feature = "mock", test))]
        TelemetryBackend::Mock => {
            info!("Using mock telemetry");
            Ok(Arc::new(burnin_core::mock::MockTelemetrySource::healthy()))
        }

        #[allow(unreachable_patterns)]
        _ => {
            warn!("Telemetry backend {} not supported or feature not enabled", config.backend);
            Err(GpuError::UnsupportedBackend(config.backend.to_string()))
        }
    }
}

async fn create_auto(config: &TelemetryConfig) -> Result<Arc<dyn TelemetrySource>> {
    #[cfg(feature = "nvml")]
    let nvml_error = match crate::nvml::NvmlTelemetry::new(config.clone()).await {
        Ok(source) => {
            info!("Auto-selected NVML telemetry");
            return Ok(Arc::new(source));
        }
        Err(e) => {
            warn!("NVML unavailable, trying nvidia-smi: {}", e);
            e.to_string()
        }
    };
    #[cfg(not(feature = "nvml"))]
    let nvml_error = "NVML support not compiled in".to_string();

    match NvidiaSmiTelemetry::new(config.clone()).await {
        Ok(source) => {
            info!("Auto-selected nvidia-smi telemetry");
            Ok(Arc::new(source))
        }
        Err(smi_error) => Err(GpuError::Unavailable(format!(
            "no telemetry backend available (nvml: {}; nvidia-smi: {})",
            nvml_error, smi_error
        ))),
    }
}
