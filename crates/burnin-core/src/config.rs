//! Run configuration

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default run duration in seconds
pub const DEFAULT_DURATION_SECS: u64 = 60;

/// Default telemetry interval in seconds
pub const DEFAULT_MONITOR_INTERVAL_SECS: u64 = 2;

/// Default wait for units after cancellation
pub const DEFAULT_GRACE_PERIOD_SECS: u64 = 5;

/// Default number of consecutive telemetry failures tolerated
pub const DEFAULT_TELEMETRY_FAILURE_THRESHOLD: u32 = 3;

/// Configuration for a single burn-in run.
///
/// Built once at startup and never mutated while the run is in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Wall-clock budget for the load
    #[serde(with = "duration_secs")]
    pub duration: Duration,

    /// Time between two telemetry samples
    #[serde(with = "duration_secs")]
    pub monitor_interval: Duration,

    /// How long to wait for units to stop after cancellation
    #[serde(with = "duration_secs")]
    pub grace_period: Duration,

    /// Consecutive telemetry failures after which the sampler gives up
    pub telemetry_failure_threshold: u32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::from_secs(DEFAULT_DURATION_SECS, DEFAULT_MONITOR_INTERVAL_SECS)
    }
}

impl RunConfig {
    /// Create a configuration from whole seconds
    pub fn from_secs(duration_seconds: u64, monitor_interval_seconds: u64) -> Self {
        Self::new(
            Duration::from_secs(duration_seconds),
            Duration::from_secs(monitor_interval_seconds),
        )
    }

    /// Create a configuration from arbitrary durations
    pub fn new(duration: Duration, monitor_interval: Duration) -> Self {
        Self {
            duration,
            monitor_interval,
            grace_period: Duration::from_secs(DEFAULT_GRACE_PERIOD_SECS),
            telemetry_failure_threshold: DEFAULT_TELEMETRY_FAILURE_THRESHOLD,
        }
    }

    /// Set the post-cancellation grace period
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Set the telemetry failure threshold
    pub fn with_telemetry_failure_threshold(mut self, threshold: u32) -> Self {
        self.telemetry_failure_threshold = threshold;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.duration.is_zero() {
            return Err(Error::config("Duration must be greater than zero"));
        }

        if self.monitor_interval.is_zero() {
            return Err(Error::config("Monitor interval must be greater than zero"));
        }

        if self.telemetry_failure_threshold == 0 {
            return Err(Error::config(
                "Telemetry failure threshold must be at least 1",
            ));
        }

        Ok(())
    }

    /// Number of samples a healthy run is expected to take.
    ///
    /// Sampling starts immediately, so a run of `D` with interval `I` sees
    /// one sample at t=0 plus one per elapsed interval.
    pub fn expected_samples(&self) -> u64 {
        let interval = self.monitor_interval.as_nanos();
        if interval == 0 {
            return 0;
        }
        (self.duration.as_nanos() / interval) as u64 + 1
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}
