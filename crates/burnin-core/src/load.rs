//! Load generator

use crate::{CancellationSignal, ComputeEngine, LoadOutcome, OutputSink, UnitProgress};
use std::time::Instant;
use tracing::{debug, error, info};

/// Keep the device busy until the signal is raised.
///
/// The generator has no notion of time of its own. Cancellation is observed
/// between operations, so stop latency is bounded by one operation.
pub fn generate_load(
    engine: &mut dyn ComputeEngine,
    signal: &CancellationSignal,
    progress: &UnitProgress,
    sink: &dyn OutputSink,
) -> LoadOutcome {
    info!("Preparing compute engine: {}", engine.describe());

    let device = match engine.prepare() {
        Ok(device) => device,
        Err(e) => {
            error!("Compute engine failed to prepare: {}", e);
            return LoadOutcome::Failed(e.to_string());
        }
    };
    sink.write_line(&format!("Load generator ready on {}", device));

    let started = Instant::now();
    loop {
        if signal.is_cancelled() {
            info!(
                "Load generator stopping after {} iterations in {:.2}s",
                progress.load_iterations(),
                started.elapsed().as_secs_f64()
            );
            return LoadOutcome::StoppedByCancellation;
        }

        if let Err(e) = engine.run_stress_operation() {
            error!(
                "Device failure after {} iterations: {}",
                progress.load_iterations(),
                e
            );
            return LoadOutcome::Failed(e.to_string());
        }

        progress.record_iteration();
        let iterations = progress.load_iterations();
        if iterations % 100 == 0 {
            debug!("Load generator completed {} iterations", iterations);
        }
    }
}
