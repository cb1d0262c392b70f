//! # burnin-adapter-gpu
//!
//! GPU telemetry backends for gpu-burnin.
//!
//! This crate provides [`burnin_core::TelemetrySource`] implementations that
//! read utilization, memory, temperature and power for a single device:
//!
//! - **NVML**: NVIDIA Management Library through `nvml-wrapper` (feature `nvml`)
//! - **nvidia-smi**: the CSV query interface of the `nvidia-smi` tool
//! - **Mock**: synthetic readings for dry runs (feature `mock`)
//!
//! ## Example
//!
//! ```rust,no_run
//! use burnin_adapter_gpu::{create_telemetry_source, TelemetryBackend, TelemetryConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = TelemetryConfig::new(TelemetryBackend::Auto).with_device_index(0);
//!     let source = create_telemetry_source(&config).await?;
//!
//!     let snapshot = source.query_device_metrics().await?;
//!     println!("GPU utilization: {:.1}%", snapshot.utilization_percent);
//!     Ok(())
//! }
//! ```

use thiserror::Error;

pub mod config;
pub mod monitor;
pub mod smi;

#[cfg(feature = "nvml")]
pub mod nvml;

pub use config::{TelemetryBackend, TelemetryConfig};
pub use monitor::create_telemetry_source;
pub use smi::NvidiaSmiTelemetry;

#[cfg(feature = "nvml")]
pub use nvml::NvmlTelemetry;

/// Result type for GPU telemetry operations
pub type Result<T> = std::result::Result<T, GpuError>;

/// Errors that can occur while reading GPU telemetry
#[derive(Error, Debug)]
pub enum GpuError {
    #[error("GPU backend not supported: {0}")]
    UnsupportedBackend(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("GPU not found: {0}")]
    GpuNotFound(String),

    #[error("GPU initialization failed: {0}")]
    InitializationFailed(String),

    #[error("GPU communication error: {0}")]
    CommunicationError(String),

    #[error("Driver error: {0}")]
    DriverError(String),

    #[error("NVML error: {0}")]
    NvmlError(String),

    #[error("Malformed telemetry: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("GPU unavailable: {0}")]
    Unavailable(String),

    #[error("GPU lost: {0}")]
    GpuLost(String),
}

impl GpuError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GpuError::CommunicationError(_)
                | GpuError::Timeout(_)
                | GpuError::Unavailable(_)
                | GpuError::ParseError(_)
        )
    }

    /// Check if this error indicates a driver issue
    pub fn is_driver_issue(&self) -> bool {
        matches!(
            self,
            GpuError::DriverError(_) | GpuError::NvmlError(_) | GpuError::InitializationFailed(_)
        )
    }
}

/// Retryable errors stay transient; anything else means the device is gone
/// until someone intervenes.
impl From<GpuError> for burnin_core::Error {
    fn from(error: GpuError) -> Self {
        match error {
            GpuError::Configuration(msg) => burnin_core::Error::config(msg),
            e if e.is_retryable() => burnin_core::Error::telemetry(e.to_string()),
            e if e.is_driver_issue() => {
                burnin_core::Error::unreachable(format!("driver problem: {}", e))
            }
            e => burnin_core::Error::unreachable(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpu_error_properties() {
        let timeout = GpuError::Timeout("nvidia-smi".to_string());
        assert!(timeout.is_retryable());
        assert!(!timeout.is_driver_issue());

        let driver_error = GpuError::DriverError("test".to_string());
        assert!(!driver_error.is_retryable());
        assert!(driver_error.is_driver_issue());

        let not_found = GpuError::GpuNotFound("GPU 7".to_string());
        assert!(!not_found.is_retryable());
        assert!(!not_found.is_driver_issue());

        let lost = GpuError::GpuLost("fallen off the bus".to_string());
        assert!(!lost.is_retryable());
        assert!(!lost.is_driver_issue());
    }

    #[test]
    fn test_conversion_to_core_error() {
        let error: burnin_core::Error = GpuError::Timeout("query took too long".to_string()).into();
        assert!(matches!(error, burnin_core::Error::TelemetryUnavailable(_)));
        assert!(error.to_string().contains("query took too long"));

        let error: burnin_core::Error = GpuError::Configuration("bad".to_string()).into();
        assert!(matches!(error, burnin_core::Error::InvalidConfiguration(_)));
    }

    #[test]
    fn test_non_retryable_errors_mean_device_unreachable() {
        let error: burnin_core::Error =
            GpuError::DriverError("NVIDIA driver is not loaded".to_string()).into();
        assert!(matches!(error, burnin_core::Error::DeviceUnreachable(_)));
        assert!(!error.is_transient());
        assert!(error.to_string().contains("driver problem"));

        let error: burnin_core::Error =
            GpuError::GpuLost("GPU has fallen off the bus".to_string()).into();
        assert!(matches!(error, burnin_core::Error::DeviceUnreachable(_)));
        assert!(error.to_string().contains("fallen off the bus"));
        assert!(!error.to_string().contains("driver problem"));

        let error: burnin_core::Error = GpuError::GpuNotFound("GPU 7".to_string()).into();
        assert!(matches!(error, burnin_core::Error::DeviceUnreachable(_)));

        let error: burnin_core::Error =
            GpuError::ParseError("expected at least 7 fields".to_string()).into();
        assert!(error.is_transient());
    }
}
