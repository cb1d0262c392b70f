//! Telemetry sampler

use crate::{
    report, CancellationSignal, OutputSink, RunConfig, SampleOutcome, SampleReport,
    TelemetrySource, TelemetrySummary, UnitProgress,
};
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Shortest cadence the sampler will run at
pub const MIN_SAMPLE_INTERVAL: Duration = Duration::from_millis(1);

/// Cadence and failure tolerance of the sampler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerPolicy {
    /// Time between samples
    pub interval: Duration,

    /// Consecutive failed queries that end sampling
    pub failure_threshold: u32,
}

impl From<&RunConfig> for SamplerPolicy {
    fn from(config: &RunConfig) -> Self {
        Self {
            interval: config.monitor_interval.max(MIN_SAMPLE_INTERVAL),
            failure_threshold: config.telemetry_failure_threshold.max(1),
        }
    }
}

/// Sample device metrics until the signal is raised.
///
/// The first sample is taken immediately and the following ones on a fixed
/// schedule. Waiting between samples, and the query itself, are raced
/// against the signal so a long interval never delays shutdown.
///
/// Failed queries count toward `failure_threshold` whatever their cause, but
/// only transient ones are logged as warnings; an unreachable device is
/// logged as an error and named in the failure reason.
pub async fn sample_loop(
    source: &dyn TelemetrySource,
    signal: &CancellationSignal,
    policy: SamplerPolicy,
    sink: &dyn OutputSink,
    progress: &UnitProgress,
) -> SampleReport {
    info!(
        "Sampling {} telemetry every {:?}",
        source.backend_name(),
        policy.interval
    );

    let mut summary = TelemetrySummary::default();
    let mut consecutive_failures = 0u32;
    let failure_threshold = policy.failure_threshold.max(1);
    let mut ticker = interval(policy.interval.max(MIN_SAMPLE_INTERVAL));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let stopped = |summary: TelemetrySummary| {
        debug!("Telemetry sampler observed cancellation");
        SampleReport {
            outcome: SampleOutcome::StoppedByCancellation,
            summary,
        }
    };

    loop {
        tokio::select! {
            biased;
            _ = signal.cancelled() => return stopped(summary),
            _ = ticker.tick() => {}
        }

        let query = tokio::select! {
            biased;
            _ = signal.cancelled() => return stopped(summary),
            result = source.query_device_metrics() => result,
        };

        match query {
            Ok(snapshot) => {
                consecutive_failures = 0;
                summary.record(&snapshot);
                progress.record_sample();
                sink.write_line(&report::sample_line(&snapshot));
            }
            Err(e) => {
                consecutive_failures += 1;
                sink.write_line(&report::telemetry_warning(
                    consecutive_failures,
                    failure_threshold,
                    &e.to_string(),
                ));

                let cause = if e.is_transient() {
                    "telemetry unavailable"
                } else {
                    "device unreachable"
                };

                if consecutive_failures >= failure_threshold {
                    error!(
                        "Sampling stopped, {} after {} consecutive failures: {}",
                        cause, consecutive_failures, e
                    );
                    return SampleReport {
                        outcome: SampleOutcome::Failed(format!(
                            "{} after {} consecutive failures: {}",
                            cause, consecutive_failures, e
                        )),
                        summary,
                    };
                }

                if e.is_transient() {
                    warn!(
                        "Telemetry query failed ({}/{}): {}",
                        consecutive_failures, failure_threshold, e
                    );
                } else {
                    error!(
                        "Telemetry lost the device ({}/{}): {}",
                        consecutive_failures, failure_threshold, e
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockTelemetrySource, TelemetryBehavior};
    use crate::MemorySink;
    use std::sync::Arc;

    fn policy(interval_secs: u64) -> SamplerPolicy {
        SamplerPolicy {
            interval: Duration::from_secs(interval_secs),
            failure_threshold: 3,
        }
    }

    /// Runs the sampler and raises the signal after `run_for` of virtual time
    async fn run_sampler(
        source: Arc<MockTelemetrySource>,
        policy: SamplerPolicy,
        run_for: Duration,
    ) -> (SampleReport, Arc<MemorySink>, Arc<UnitProgress>) {
        let signal = CancellationSignal::new();
        let sink = Arc::new(MemorySink::new());
        let progress = Arc::new(UnitProgress::new());

        let handle = {
            let signal = signal.clone();
            let sink = Arc::clone(&sink);
            let progress = Arc::clone(&progress);
            tokio::spawn(async move {
                sample_loop(source.as_ref(), &signal, policy, sink.as_ref(), &progress).await
            })
        };

        tokio::time::sleep(run_for).await;
        signal.cancel();
        let report = handle.await.unwrap();
        (report, sink, progress)
    }

    #[tokio::test(start_paused = true)]
    async fn test_sample_count_matches_interval() {
        let source = Arc::new(MockTelemetrySource::healthy());
        let (report, sink, progress) =
            run_sampler(Arc::clone(&source), policy(10), Duration::from_secs(120)).await;

        assert_eq!(report.outcome, SampleOutcome::StoppedByCancellation);
        let samples = progress.samples();
        assert!((11..=13).contains(&samples), "took {} samples", samples);
        assert_eq!(report.summary.samples, samples);
        assert_eq!(sink.lines().len() as u64, samples);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_longer_than_run_takes_one_sample() {
        let source = Arc::new(MockTelemetrySource::healthy());
        let (report, _, progress) =
            run_sampler(source, policy(30), Duration::from_secs(5)).await;

        assert_eq!(report.outcome, SampleOutcome::StoppedByCancellation);
        assert!(progress.samples() <= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_long_wait() {
        let source = Arc::new(MockTelemetrySource::healthy());
        let signal = CancellationSignal::new();
        let sink = MemorySink::new();
        let progress = UnitProgress::new();

        let cancel = {
            let signal = signal.clone();
            async move {
                tokio::time::sleep(Duration::from_secs(1)).await;
                signal.cancel();
            }
        };

        let started = tokio::time::Instant::now();
        let (report, _) = tokio::join!(
            sample_loop(source.as_ref(), &signal, policy(3600), &sink, &progress),
            cancel
        );

        assert_eq!(report.outcome, SampleOutcome::StoppedByCancellation);
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(source.queries(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_tolerated() {
        let source = Arc::new(MockTelemetrySource::new(TelemetryBehavior::Pattern(vec![
            false, true, true, false, true, true, false,
        ])));
        let (report, sink, progress) =
            run_sampler(Arc::clone(&source), policy(1), Duration::from_millis(9500)).await;

        assert_eq!(report.outcome, SampleOutcome::StoppedByCancellation);
        assert_eq!(sink.count_containing("WARN telemetry query failed"), 4);
        assert_eq!(progress.samples(), source.queries() - 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_third_consecutive_failure_escalates() {
        let source = Arc::new(MockTelemetrySource::new(TelemetryBehavior::Pattern(vec![
            false, true, true, true,
        ])));
        let signal = CancellationSignal::new();
        let sink = MemorySink::new();
        let progress = UnitProgress::new();

        let report = sample_loop(source.as_ref(), &signal, policy(1), &sink, &progress).await;

        match report.outcome {
            SampleOutcome::Failed(reason) => {
                assert!(reason.starts_with("telemetry unavailable after 3 consecutive failures"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(source.queries(), 4);
        assert_eq!(progress.samples(), 1);
        assert!(!signal.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_query_is_abandoned_on_cancel() {
        let source = Arc::new(
            MockTelemetrySource::healthy().hanging_at(2, Duration::from_secs(3600)),
        );
        let (report, _, progress) =
            run_sampler(source, policy(1), Duration::from_millis(1500)).await;

        assert_eq!(report.outcome, SampleOutcome::StoppedByCancellation);
        assert_eq!(progress.samples(), 1);
    }

    #[test]
    fn test_policy_from_config() {
        let config = RunConfig::from_secs(60, 5).with_telemetry_failure_threshold(7);
        let policy = SamplerPolicy::from(&config);
        assert_eq!(policy.interval, Duration::from_secs(5));
        assert_eq!(policy.failure_threshold, 7);
    }

    #[test]
    fn test_policy_clamps_degenerate_config() {
        let config = RunConfig::new(Duration::from_secs(1), Duration::ZERO)
            .with_telemetry_failure_threshold(0);
        let policy = SamplerPolicy::from(&config);
        assert_eq!(policy.interval, MIN_SAMPLE_INTERVAL);
        assert_eq!(policy.failure_threshold, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_policy_does_not_panic() {
        let source = Arc::new(MockTelemetrySource::healthy());
        let policy = SamplerPolicy {
            interval: Duration::ZERO,
            failure_threshold: 0,
        };
        let (report, _, progress) =
            run_sampler(source, policy, Duration::from_millis(10)).await;

        assert_eq!(report.outcome, SampleOutcome::StoppedByCancellation);
        assert!(progress.samples() >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_device_named_in_failure() {
        let source = Arc::new(MockTelemetrySource::new(TelemetryBehavior::Unreachable));
        let signal = CancellationSignal::new();
        let sink = MemorySink::new();
        let progress = UnitProgress::new();

        let report = sample_loop(source.as_ref(), &signal, policy(1), &sink, &progress).await;

        match report.outcome {
            SampleOutcome::Failed(reason) => {
                assert!(reason.starts_with("device unreachable after 3 consecutive failures"));
                assert!(reason.contains("mock GPU lost"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(source.queries(), 3);
        assert_eq!(progress.samples(), 0);
        assert_eq!(sink.count_containing("WARN telemetry query failed"), 3);
    }
}
