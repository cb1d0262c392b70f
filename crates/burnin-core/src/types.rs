//! Core data types for burn-in runs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Bytes per mebibyte, the unit device memory is displayed in
pub const MIB: u64 = 1024 * 1024;

/// Bytes per gibibyte
pub const GIB: u64 = 1024 * MIB;

/// Point-in-time reading of device health counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// When the reading was taken
    pub timestamp: DateTime<Utc>,

    /// Device index as reported by the driver
    pub device_index: u32,

    /// Device model name, when the backend reports it
    pub device_name: Option<String>,

    /// Compute utilization (0-100)
    pub utilization_percent: f64,

    /// Memory in use
    pub memory_used_bytes: u64,

    /// Installed memory
    pub memory_total_bytes: u64,

    /// Core temperature
    pub temperature_celsius: Option<f64>,

    /// Current power draw
    pub power_watts: Option<f64>,

    /// Enforced power limit
    pub power_limit_watts: Option<f64>,
}

impl MetricsSnapshot {
    /// Create a snapshot stamped with the current time
    pub fn new(
        device_index: u32,
        utilization_percent: f64,
        memory_used_bytes: u64,
        memory_total_bytes: u64,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            device_index,
            device_name: None,
            utilization_percent,
            memory_used_bytes,
            memory_total_bytes,
            temperature_celsius: None,
            power_watts: None,
            power_limit_watts: None,
        }
    }

    pub fn with_device_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = Some(name.into());
        self
    }

    pub fn with_temperature(mut self, celsius: f64) -> Self {
        self.temperature_celsius = Some(celsius);
        self
    }

    pub fn with_power(mut self, watts: f64, limit: Option<f64>) -> Self {
        self.power_watts = Some(watts);
        self.power_limit_watts = limit;
        self
    }
}

/// What the compute engine reports about the device once it is ready
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDescription {
    /// Human readable device label, e.g. `cuda:0`
    pub label: String,

    /// Installed memory, if known
    pub total_memory_bytes: Option<u64>,

    /// Memory the engine holds for the duration of the run
    pub allocated_bytes: u64,

    /// Short description of one stress operation
    pub workload: String,
}

impl fmt::Display for DeviceDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label)?;
        if let Some(total) = self.total_memory_bytes {
            write!(f, " ({:.2} GiB total)", total as f64 / GIB as f64)?;
        }
        write!(
            f,
            ", {:.2} GiB allocated, workload {}",
            self.allocated_bytes as f64 / GIB as f64,
            self.workload
        )
    }
}

/// Terminal state of the load generator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadOutcome {
    /// The generator observed the stop signal
    StoppedByCancellation,
    /// The compute engine raised a device failure
    Failed(String),
}

/// Terminal state of the telemetry sampler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleOutcome {
    /// The sampler observed the stop signal
    StoppedByCancellation,
    /// Telemetry stayed unavailable past the failure threshold
    Failed(String),
}

/// What the sampler hands back when it terminates
#[derive(Debug, Clone)]
pub struct SampleReport {
    pub outcome: SampleOutcome,
    pub summary: TelemetrySummary,
}

/// The two concurrent units of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitKind {
    LoadGenerator,
    TelemetrySampler,
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitKind::LoadGenerator => write!(f, "load generator"),
            UnitKind::TelemetrySampler => write!(f, "telemetry sampler"),
        }
    }
}

/// Overall disposition of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminalStatus {
    /// Duration elapsed and both units stopped cleanly
    Completed,
    /// The compute engine failed
    FailedLoad,
    /// Telemetry became unreachable
    FailedMonitor,
    /// A unit ignored cancellation past the grace period
    UnitHung,
    /// The operator stopped the run early
    Interrupted,
}

impl TerminalStatus {
    /// Process exit code for this status
    pub fn exit_code(&self) -> i32 {
        match self {
            TerminalStatus::Completed => 0,
            TerminalStatus::FailedLoad => 2,
            TerminalStatus::FailedMonitor => 3,
            TerminalStatus::UnitHung => 4,
            TerminalStatus::Interrupted => 130,
        }
    }
}

impl fmt::Display for TerminalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminalStatus::Completed => write!(f, "Completed"),
            TerminalStatus::FailedLoad => write!(f, "FailedLoad"),
            TerminalStatus::FailedMonitor => write!(f, "FailedMonitor"),
            TerminalStatus::UnitHung => write!(f, "UnitHung"),
            TerminalStatus::Interrupted => write!(f, "Interrupted"),
        }
    }
}

/// Summary of a finished run
#[derive(Debug, Clone)]
pub struct RunResult {
    /// Wall-clock time from launch until both units were joined or given up on
    pub elapsed: Duration,

    /// Telemetry samples successfully taken
    pub sample_count: u64,

    /// Stress operations completed by the load generator
    pub load_iterations: u64,

    /// Overall status
    pub terminal_status: TerminalStatus,

    /// Load generator outcome, `None` if it never reported
    pub load: Option<LoadOutcome>,

    /// Sampler outcome, `None` if it never reported
    pub monitor: Option<SampleOutcome>,

    /// Units that missed the grace period
    pub hung_units: Vec<UnitKind>,

    /// Aggregated telemetry, empty when the sampler hung
    pub telemetry: TelemetrySummary,
}

impl RunResult {
    pub fn exit_code(&self) -> i32 {
        self.terminal_status.exit_code()
    }

    /// The failure that decided the status, if any
    pub fn failure_reason(&self) -> Option<String> {
        match self.terminal_status {
            TerminalStatus::FailedLoad => match &self.load {
                Some(LoadOutcome::Failed(reason)) => Some(reason.clone()),
                _ => None,
            },
            TerminalStatus::FailedMonitor => match &self.monitor {
                Some(SampleOutcome::Failed(reason)) => Some(reason.clone()),
                _ => None,
            },
            TerminalStatus::UnitHung => Some(format!(
                "{} did not stop within the grace period",
                self.hung_units
                    .iter()
                    .map(|unit| unit.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
            TerminalStatus::Completed | TerminalStatus::Interrupted => None,
        }
    }
}

/// Running aggregate of the samples taken during a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySummary {
    pub samples: u64,
    pub utilization_sum: f64,
    pub peak_utilization: Option<f64>,
    pub peak_memory_used_bytes: Option<u64>,
    pub memory_total_bytes: Option<u64>,
    pub peak_temperature_celsius: Option<f64>,
    pub peak_power_watts: Option<f64>,
}

impl TelemetrySummary {
    /// Fold one snapshot into the aggregate
    pub fn record(&mut self, snapshot: &MetricsSnapshot) {
        self.samples += 1;
        self.utilization_sum += snapshot.utilization_percent;
        self.peak_utilization = max_f64(self.peak_utilization, Some(snapshot.utilization_percent));
        self.peak_memory_used_bytes = Some(
            self.peak_memory_used_bytes
                .unwrap_or(0)
                .max(snapshot.memory_used_bytes),
        );
        self.memory_total_bytes = Some(snapshot.memory_total_bytes);
        self.peak_temperature_celsius =
            max_f64(self.peak_temperature_celsius, snapshot.temperature_celsius);
        self.peak_power_watts = max_f64(self.peak_power_watts, snapshot.power_watts);
    }

    pub fn average_utilization(&self) -> Option<f64> {
        if self.samples == 0 {
            None
        } else {
            Some(self.utilization_sum / self.samples as f64)
        }
    }
}

fn max_f64(current: Option<f64>, candidate: Option<f64>) -> Option<f64> {
    match (current, candidate) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

/// Counters a unit publishes while it runs.
///
/// Each counter has exactly one writer, so the coordinator can still report
/// progress for a unit it had to give up on.
#[derive(Debug, Default)]
pub struct UnitProgress {
    load_iterations: AtomicU64,
    samples: AtomicU64,
}

impl UnitProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_iteration(&self) {
        self.load_iterations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sample(&self) {
        self.samples.fetch_add(1, Ordering::Relaxed);
    }

    pub fn load_iterations(&self) -> u64 {
        self.load_iterations.load(Ordering::Relaxed)
    }

    pub fn samples(&self) -> u64 {
        self.samples.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(util: f64, used: u64, temp: Option<f64>, power: Option<f64>) -> MetricsSnapshot {
        let mut snapshot = MetricsSnapshot::new(0, util, used, 24 * GIB);
        snapshot.temperature_celsius = temp;
        snapshot.power_watts = power;
        snapshot
    }

    #[test]
    fn test_summary_tracks_peaks() {
        let mut summary = TelemetrySummary::default();
        assert_eq!(summary.average_utilization(), None);

        summary.record(&snapshot(40.0, 2 * GIB, Some(60.0), None));
        summary.record(&snapshot(100.0, 20 * GIB, Some(78.5), Some(310.0)));
        summary.record(&snapshot(97.0, 19 * GIB, None, Some(290.0)));

        assert_eq!(summary.samples, 3);
        assert_eq!(summary.peak_utilization, Some(100.0));
        assert_eq!(summary.peak_memory_used_bytes, Some(20 * GIB));
        assert_eq!(summary.peak_temperature_celsius, Some(78.5));
        assert_eq!(summary.peak_power_watts, Some(310.0));
        assert_eq!(summary.average_utilization(), Some(79.0));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(TerminalStatus::Completed.exit_code(), 0);
        assert_ne!(TerminalStatus::FailedLoad.exit_code(), 0);
        assert_ne!(TerminalStatus::FailedMonitor.exit_code(), 0);
        assert_ne!(TerminalStatus::UnitHung.exit_code(), 0);
        assert_ne!(TerminalStatus::Interrupted.exit_code(), 0);
    }

    #[test]
    fn test_failure_reason() {
        let mut result = RunResult {
            elapsed: Duration::from_secs(3),
            sample_count: 2,
            load_iterations: 10,
            terminal_status: TerminalStatus::FailedLoad,
            load: Some(LoadOutcome::Failed("out of memory".to_string())),
            monitor: Some(SampleOutcome::StoppedByCancellation),
            hung_units: Vec::new(),
            telemetry: TelemetrySummary::default(),
        };
        assert_eq!(result.failure_reason().as_deref(), Some("out of memory"));

        result.terminal_status = TerminalStatus::UnitHung;
        result.hung_units = vec![UnitKind::LoadGenerator];
        assert!(result
            .failure_reason()
            .unwrap()
            .contains("load generator"));

        result.terminal_status = TerminalStatus::Completed;
        assert_eq!(result.failure_reason(), None);
    }

    #[test]
    fn test_unit_progress() {
        let progress = UnitProgress::new();
        progress.record_iteration();
        progress.record_iteration();
        progress.record_sample();
        assert_eq!(progress.load_iterations(), 2);
        assert_eq!(progress.samples(), 1);
    }

    #[test]
    fn test_device_description_display() {
        let description = DeviceDescription {
            label: "cuda:0".to_string(),
            total_memory_bytes: Some(24 * GIB),
            allocated_bytes: 2 * GIB,
            workload: "8192x8192 f32 matmul".to_string(),
        };
        let text = description.to_string();
        assert!(text.starts_with("cuda:0 (24.00 GiB total)"));
        assert!(text.contains("2.00 GiB allocated"));
    }
}
