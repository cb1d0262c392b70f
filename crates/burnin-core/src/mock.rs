//! Mock collaborators for tests and dry runs

use crate::traits::{ComputeEngine, TelemetrySource};
use crate::{DeviceDescription, Error, MetricsSnapshot, Result, GIB};

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Compute engine that sleeps instead of using a device
#[derive(Debug, Clone)]
pub struct MockComputeEngine {
    operation_time: Duration,
    fail_prepare: Option<String>,
    fail_at: Option<u64>,
    hang_at: Option<(u64, Duration)>,
    operations: Arc<AtomicU64>,
}

impl Default for MockComputeEngine {
    fn default() -> Self {
        Self::new(Duration::from_millis(5))
    }
}

impl MockComputeEngine {
    /// Create an engine whose operations take `operation_time`
    pub fn new(operation_time: Duration) -> Self {
        Self {
            operation_time,
            fail_prepare: None,
            fail_at: None,
            hang_at: None,
            operations: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Engine whose operations return immediately
    pub fn instant() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Fail buffer allocation
    pub fn failing_prepare(mut self, reason: impl Into<String>) -> Self {
        self.fail_prepare = Some(reason.into());
        self
    }

    /// Raise a device failure on the given 1-based operation
    pub fn failing_at(mut self, operation: u64) -> Self {
        self.fail_at = Some(operation);
        self
    }

    /// Block for `duration` inside the given 1-based operation
    pub fn hanging_at(mut self, operation: u64, duration: Duration) -> Self {
        self.hang_at = Some((operation, duration));
        self
    }

    /// Shared counter of operations started, readable after the engine moved
    pub fn operations(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.operations)
    }
}

impl ComputeEngine for MockComputeEngine {
    fn describe(&self) -> String {
        "mock".to_string()
    }

    fn prepare(&mut self) -> Result<DeviceDescription> {
        if let Some(reason) = &self.fail_prepare {
            return Err(Error::device(reason.clone()));
        }
        Ok(DeviceDescription {
            label: "mock:0".to_string(),
            total_memory_bytes: Some(8 * GIB),
            allocated_bytes: 0,
            workload: format!("sleep {:?}", self.operation_time),
        })
    }

    fn run_stress_operation(&mut self) -> Result<()> {
        let operation = self.operations.fetch_add(1, Ordering::SeqCst) + 1;

        if self.fail_at == Some(operation) {
            return Err(Error::device(format!(
                "mock device lost during operation {}",
                operation
            )));
        }

        match self.hang_at {
            Some((at, duration)) if at == operation => std::thread::sleep(duration),
            _ if !self.operation_time.is_zero() => std::thread::sleep(self.operation_time),
            _ => std::thread::yield_now(),
        }
        Ok(())
    }
}

/// Scripted behaviour of a [`MockTelemetrySource`]
#[derive(Debug, Clone)]
pub enum TelemetryBehavior {
    /// Every query succeeds
    Healthy,
    /// Every query fails
    AlwaysFail,
    /// Every query reports the device as gone
    Unreachable,
    /// Query `n` (1-based) fails when `pattern[n - 1]` is true, succeeds past the end
    Pattern(Vec<bool>),
}

/// Telemetry source returning synthetic readings
#[derive(Debug)]
pub struct MockTelemetrySource {
    behavior: TelemetryBehavior,
    hang_at: Option<(u64, Duration)>,
    queries: AtomicU64,
}

impl MockTelemetrySource {
    pub fn new(behavior: TelemetryBehavior) -> Self {
        Self {
            behavior,
            hang_at: None,
            queries: AtomicU64::new(0),
        }
    }

    pub fn healthy() -> Self {
        Self::new(TelemetryBehavior::Healthy)
    }

    pub fn always_failing() -> Self {
        Self::new(TelemetryBehavior::AlwaysFail)
    }

    /// Block the given 1-based query for `duration`
    pub fn hanging_at(mut self, query: u64, duration: Duration) -> Self {
        self.hang_at = Some((query, duration));
        self
    }

    /// Number of queries issued so far
    pub fn queries(&self) -> u64 {
        self.queries.load(Ordering::SeqCst)
    }

    fn should_fail(&self, query: u64) -> bool {
        match &self.behavior {
            TelemetryBehavior::Healthy => false,
            TelemetryBehavior::AlwaysFail | TelemetryBehavior::Unreachable => true,
            TelemetryBehavior::Pattern(pattern) => pattern
                .get((query - 1) as usize)
                .copied()
                .unwrap_or(false),
        }
    }
}

#[async_trait]
impl TelemetrySource for MockTelemetrySource {
    fn backend_name(&self) -> &str {
        "mock"
    }

    async fn query_device_metrics(&self) -> Result<MetricsSnapshot> {
        let query = self.queries.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some((at, duration)) = self.hang_at {
            if at == query {
                tokio::time::sleep(duration).await;
            }
        }

        if matches!(self.behavior, TelemetryBehavior::Unreachable) {
            return Err(Error::unreachable(format!("mock GPU lost on query {}", query)));
        }

        if self.should_fail(query) {
            return Err(Error::telemetry(format!(
                "mock device busy on query {}",
                query
            )));
        }

        debug!("Mock telemetry query {}", query);
        let utilization = 90.0 + (query % 10) as f64;
        Ok(MetricsSnapshot::new(0, utilization, 6 * GIB + query * 1024, 8 * GIB)
            .with_device_name("Mock GPU 0")
            .with_temperature(60.0 + (query % 20) as f64)
            .with_power(250.0, Some(300.0)))
    }
}
