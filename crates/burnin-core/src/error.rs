//! Error handling for gpu-burnin
//!
//! Provides a unified error type and result type shared by the core loop and
//! the adapters that plug into it.

/// Result type alias for burn-in operations
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for burn-in runs
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    InvalidConfiguration(String),

    /// The compute engine could not execute work on the device
    #[error("Device failure: {0}")]
    DeviceFailure(String),

    /// A telemetry query did not produce a snapshot
    #[error("Telemetry unavailable: {0}")]
    TelemetryUnavailable(String),

    /// Telemetry reports that the device itself can no longer be reached
    #[error("Device unreachable: {0}")]
    DeviceUnreachable(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Create a device failure
    pub fn device(msg: impl Into<String>) -> Self {
        Self::DeviceFailure(msg.into())
    }

    /// Create a telemetry error
    pub fn telemetry(msg: impl Into<String>) -> Self {
        Self::TelemetryUnavailable(msg.into())
    }

    /// Create an unreachable-device error
    pub fn unreachable(msg: impl Into<String>) -> Self {
        Self::DeviceUnreachable(msg.into())
    }

    /// Check if this error may clear up on its own if the operation is repeated
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::TelemetryUnavailable(_))
    }
}
