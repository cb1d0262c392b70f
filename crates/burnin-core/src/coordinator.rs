//! Run coordinator
//!
//! Owns the stop signal and the duration budget. The load generator runs on
//! its own OS thread because compute calls block; the sampler runs as a
//! tokio task. Whichever of "duration elapsed", "a unit failed" or "operator
//! interrupt" happens first raises the signal, after which both units get a
//! bounded grace period to wind down.

use crate::load::generate_load;
use crate::sampler::{sample_loop, SamplerPolicy};
use crate::{
    report, CancellationSignal, ComputeEngine, LoadOutcome, OutputSink, Result, RunConfig,
    RunResult, SampleOutcome, SampleReport, TelemetrySource, TelemetrySummary, TerminalStatus,
    UnitKind, UnitProgress,
};

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info, warn};

/// Drives one burn-in run from start banner to final summary
pub struct RunCoordinator {
    config: RunConfig,
    engine: Box<dyn ComputeEngine>,
    telemetry: Arc<dyn TelemetrySource>,
    sink: Arc<dyn OutputSink>,
    signal: CancellationSignal,
}

/// Why the coordinator stopped waiting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    DurationElapsed,
    UnitFinished(UnitKind),
    Interrupted,
}

impl RunCoordinator {
    /// Create a coordinator for a validated configuration
    pub fn new(
        config: RunConfig,
        engine: Box<dyn ComputeEngine>,
        telemetry: Arc<dyn TelemetrySource>,
        sink: Arc<dyn OutputSink>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            engine,
            telemetry,
            sink,
            signal: CancellationSignal::new(),
        })
    }

    /// Read-only handle on the run's stop signal
    pub fn signal(&self) -> CancellationSignal {
        self.signal.clone()
    }

    /// Run for the configured duration
    pub async fn run(self) -> RunResult {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Run for the configured duration or until `interrupt` completes
    pub async fn run_until<F>(self, interrupt: F) -> RunResult
    where
        F: Future<Output = ()>,
    {
        let RunCoordinator {
            config,
            engine,
            telemetry,
            sink,
            signal,
        } = self;

        for line in report::start_banner(&config, &engine.describe(), telemetry.backend_name()) {
            sink.write_line(&line);
        }
        info!(
            "Starting burn-in run: duration {:?}, interval {:?}, grace {:?}",
            config.duration, config.monitor_interval, config.grace_period
        );

        let started = Instant::now();
        let progress = Arc::new(UnitProgress::new());

        let (mut load_rx, mut load) = match spawn_load_generator(
            engine,
            signal.clone(),
            Arc::clone(&progress),
            Arc::clone(&sink),
        ) {
            Ok(rx) => (Some(rx), None),
            Err(e) => {
                error!("Failed to spawn load generator thread: {}", e);
                (None, Some(LoadOutcome::Failed(format!("failed to spawn load thread: {}", e))))
            }
        };

        let mut sampler: JoinHandle<SampleReport> = {
            let signal = signal.clone();
            let progress = Arc::clone(&progress);
            let sink = Arc::clone(&sink);
            let policy = SamplerPolicy::from(&config);
            tokio::spawn(async move {
                sample_loop(telemetry.as_ref(), &signal, policy, sink.as_ref(), &progress).await
            })
        };
        let mut monitor: Option<SampleReport> = None;

        let deadline = tokio::time::sleep(config.duration);
        tokio::pin!(deadline);
        tokio::pin!(interrupt);

        let reason = if load.is_some() {
            StopReason::UnitFinished(UnitKind::LoadGenerator)
        } else {
            tokio::select! {
                _ = &mut deadline => StopReason::DurationElapsed,
                _ = &mut interrupt => StopReason::Interrupted,
                outcome = recv_load(&mut load_rx) => {
                    load = Some(outcome);
                    StopReason::UnitFinished(UnitKind::LoadGenerator)
                }
                joined = &mut sampler => {
                    monitor = Some(sampler_report(joined));
                    StopReason::UnitFinished(UnitKind::TelemetrySampler)
                }
            }
        };

        match reason {
            StopReason::DurationElapsed => info!("Run duration elapsed, stopping units"),
            StopReason::Interrupted => warn!("Run interrupted, stopping units"),
            StopReason::UnitFinished(unit) => warn!("{} finished early, stopping run", unit),
        }
        signal.cancel();

        let grace = tokio::time::sleep(config.grace_period);
        tokio::pin!(grace);
        while load.is_none() || monitor.is_none() {
            tokio::select! {
                outcome = recv_load(&mut load_rx), if load.is_none() => load = Some(outcome),
                joined = &mut sampler, if monitor.is_none() => monitor = Some(sampler_report(joined)),
                _ = &mut grace => break,
            }
        }

        let mut hung_units = Vec::new();
        if load.is_none() {
            error!("Load generator did not stop within {:?}", config.grace_period);
            hung_units.push(UnitKind::LoadGenerator);
        }
        if monitor.is_none() {
            error!("Telemetry sampler did not stop within {:?}", config.grace_period);
            sampler.abort();
            hung_units.push(UnitKind::TelemetrySampler);
        }

        let (monitor, telemetry_summary) = match monitor {
            Some(report) => (Some(report.outcome), report.summary),
            None => (None, TelemetrySummary::default()),
        };

        let terminal_status = decide_status(
            load.as_ref(),
            monitor.as_ref(),
            &hung_units,
            reason == StopReason::Interrupted,
        );

        let result = RunResult {
            elapsed: started.elapsed(),
            sample_count: progress.samples(),
            load_iterations: progress.load_iterations(),
            terminal_status,
            load,
            monitor,
            hung_units,
            telemetry: telemetry_summary,
        };

        for line in report::summary_lines(&result, &config) {
            sink.write_line(&line);
        }
        info!(
            "Run finished with status {} after {:.2}s",
            result.terminal_status,
            result.elapsed.as_secs_f64()
        );

        result
    }
}

fn spawn_load_generator(
    mut engine: Box<dyn ComputeEngine>,
    signal: CancellationSignal,
    progress: Arc<UnitProgress>,
    sink: Arc<dyn OutputSink>,
) -> std::io::Result<oneshot::Receiver<LoadOutcome>> {
    let (tx, rx) = oneshot::channel();
    std::thread::Builder::new()
        .name("burnin-load".to_string())
        .spawn(move || {
            let outcome = generate_load(engine.as_mut(), &signal, &progress, sink.as_ref());
            // The coordinator may already have given up on this thread.
            let _ = tx.send(outcome);
        })?;
    Ok(rx)
}

async fn recv_load(rx: &mut Option<oneshot::Receiver<LoadOutcome>>) -> LoadOutcome {
    match rx.as_mut() {
        Some(rx) => rx.await.unwrap_or_else(|_| {
            LoadOutcome::Failed("load generator terminated without reporting".to_string())
        }),
        None => std::future::pending().await,
    }
}

fn sampler_report(joined: std::result::Result<SampleReport, JoinError>) -> SampleReport {
    joined.unwrap_or_else(|e| SampleReport {
        outcome: SampleOutcome::Failed(format!("telemetry sampler terminated abnormally: {}", e)),
        summary: TelemetrySummary::default(),
    })
}

fn decide_status(
    load: Option<&LoadOutcome>,
    monitor: Option<&SampleOutcome>,
    hung_units: &[UnitKind],
    interrupted: bool,
) -> TerminalStatus {
    if matches!(load, Some(LoadOutcome::Failed(_))) {
        TerminalStatus::FailedLoad
    } else if matches!(monitor, Some(SampleOutcome::Failed(_))) {
        TerminalStatus::FailedMonitor
    } else if !hung_units.is_empty() {
        TerminalStatus::UnitHung
    } else if interrupted {
        TerminalStatus::Interrupted
    } else {
        TerminalStatus::Completed
    }
}
