//! Collaborator interfaces consumed by the burn-in loop
//!
//! The loop itself never talks to a driver directly. Compute work, telemetry
//! queries and console output are all reached through these traits so that
//! the adapters can be swapped for mocks in tests.

use crate::{DeviceDescription, MetricsSnapshot, Result};
use async_trait::async_trait;

/// Something that can keep an accelerator busy.
///
/// Calls block the current thread for the duration of the device work, so
/// the engine is driven from a dedicated thread rather than the async runtime.
pub trait ComputeEngine: Send {
    /// Short label for logs before `prepare` has run
    fn describe(&self) -> String;

    /// Allocate device buffers. Called once, on the load thread.
    fn prepare(&mut self) -> Result<DeviceDescription>;

    /// Execute one sizable operation and wait for the device to finish it.
    ///
    /// An `Err` is a device failure and ends the run.
    fn run_stress_operation(&mut self) -> Result<()>;
}

/// Source of point-in-time device metrics
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Backend name for banners and logs
    fn backend_name(&self) -> &str;

    /// Query one metrics snapshot
    async fn query_device_metrics(&self) -> Result<MetricsSnapshot>;
}

/// Append-only, line oriented output
pub trait OutputSink: Send + Sync {
    fn write_line(&self, line: &str);
}
