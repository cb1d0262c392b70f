//! gpu-burnin - keep a GPU saturated for a fixed time while reporting telemetry

use anyhow::{Context, Result};
use burnin_adapter_gpu::{create_telemetry_source, TelemetryBackend};
use burnin_compute::{CandleEngine, ComputeDevice, Precision, VramTarget};
use burnin_core::mock::{MockComputeEngine, MockTelemetrySource};
use burnin_core::{ComputeEngine, OutputSink, RunCoordinator, TelemetrySource};
use clap::Parser;
use colored::*;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

mod config;
mod output;

use config::BurninConfig;
use output::ConsoleSink;

/// Stress a GPU with matrix multiplication and report live telemetry
#[derive(Debug, Parser)]
#[command(name = "gpu-burnin")]
#[command(about = "Stress a GPU with matrix multiplication and report live telemetry")]
#[command(version)]
pub struct Cli {
    /// Configuration file path (YAML or JSON)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Run duration in seconds [default: 60]
    #[arg(short, long, value_name = "SECONDS")]
    duration: Option<u64>,

    /// Seconds between telemetry samples [default: 2]
    #[arg(short = 'i', long, value_name = "SECONDS")]
    monitor_interval: Option<u64>,

    /// Device to load: cuda:N or cpu [default: cuda:0]
    #[arg(long, value_name = "DEVICE")]
    device: Option<ComputeDevice>,

    /// Edge length of the square matrices [default: 8192]
    #[arg(long, value_name = "N")]
    matrix_size: Option<usize>,

    /// Matrix element type: f32, f16 or bf16 [default: f32]
    #[arg(long)]
    precision: Option<Precision>,

    /// VRAM to occupy: max, none or a size in GB [default: max]
    #[arg(long, value_name = "TARGET")]
    target_vram: Option<VramTarget>,

    /// Telemetry backend: auto, nvml, nvidia-smi or mock [default: auto]
    #[arg(long, value_name = "BACKEND")]
    telemetry: Option<TelemetryBackend>,

    /// NVML index of the GPU to monitor [default: the CUDA ordinal of --device]
    #[arg(long, value_name = "INDEX")]
    telemetry_device: Option<u32>,

    /// Seconds to wait for units to stop after cancellation [default: 5]
    #[arg(long, value_name = "SECONDS")]
    grace_period: Option<u64>,

    /// Consecutive telemetry failures tolerated before the run fails [default: 3]
    #[arg(long, value_name = "COUNT")]
    max_telemetry_failures: Option<u32>,

    /// Use a simulated engine and telemetry instead of the GPU
    #[arg(long)]
    dry_run: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logs go to stderr so the report on stdout stays readable
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "gpu_burnin={0},burnin_core={0},burnin_adapter_gpu={0},burnin_compute={0}",
            log_level
        ))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    debug!("Starting gpu-burnin with arguments: {:?}", cli);

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    if cli.no_color {
        colored::control::set_override(false);
    }

    let mut config = BurninConfig::load(cli.config.as_deref())?;
    if let Some(source) = config.source() {
        info!("Loaded configuration from {}", source.display());
    }
    apply_overrides(&mut config, &cli);
    config.run.validate().context("Invalid run configuration")?;
    config.compute.validate().context("Invalid compute configuration")?;

    let sink: Arc<dyn OutputSink> = Arc::new(ConsoleSink::new(!cli.no_color));

    let (engine, telemetry): (Box<dyn ComputeEngine>, Arc<dyn TelemetrySource>) = if cli.dry_run {
        info!("Dry run: using simulated compute engine and telemetry");
        (
            Box::new(MockComputeEngine::new(Duration::from_millis(50))),
            Arc::new(MockTelemetrySource::healthy()),
        )
    } else {
        let telemetry = create_telemetry_source(&config.telemetry)
            .await
            .context("Failed to initialize GPU telemetry")?;

        if config.compute.device_memory_total.is_none() {
            match telemetry.query_device_metrics().await {
                Ok(snapshot) if snapshot.memory_total_bytes > 0 => {
                    config.compute.device_memory_total = Some(snapshot.memory_total_bytes);
                }
                Ok(_) => warn!("Telemetry reported no device memory size"),
                Err(e) => warn!("Could not read device memory size: {}", e),
            }
        }

        let engine =
            CandleEngine::new(config.compute.clone()).context("Failed to create compute engine")?;
        (Box::new(engine), telemetry)
    };

    let coordinator = RunCoordinator::new(config.run.clone(), engine, telemetry, sink)
        .context("Failed to create run coordinator")?;
    let result = coordinator.run_until(wait_for_interrupt()).await;

    Ok(result.exit_code())
}

/// Command-line values win over the configuration file
fn apply_overrides(config: &mut BurninConfig, cli: &Cli) {
    if let Some(seconds) = cli.duration {
        config.run.duration = Duration::from_secs(seconds);
    }
    if let Some(seconds) = cli.monitor_interval {
        config.run.monitor_interval = Duration::from_secs(seconds);
    }
    if let Some(seconds) = cli.grace_period {
        config.run.grace_period = Duration::from_secs(seconds);
    }
    if let Some(count) = cli.max_telemetry_failures {
        config.run.telemetry_failure_threshold = count;
    }

    if let Some(device) = cli.device {
        config.compute.device = device;
    }
    if let Some(size) = cli.matrix_size {
        config.compute.matrix_size = size;
    }
    if let Some(precision) = cli.precision {
        config.compute.precision = precision;
    }
    if let Some(target) = cli.target_vram {
        config.compute.target_vram = target;
    }

    if let Some(backend) = cli.telemetry {
        config.telemetry.backend = backend;
    }
    if let Some(index) = cli.telemetry_device {
        config.telemetry.device_index = Some(index);
    }
    if config.telemetry.device_index.is_none() {
        if let ComputeDevice::Cuda(ordinal) = config.compute.device {
            follow_cuda_ordinal(config, ordinal);
        }
    }
}

/// Monitor the NVML device with the same number as the CUDA ordinal.
///
/// CUDA numbers devices fastest first and after `CUDA_VISIBLE_DEVICES`
/// filtering while NVML uses PCI bus order, so on a multi-GPU host the two
/// may name different cards.
fn follow_cuda_ordinal(config: &mut BurninConfig, ordinal: usize) {
    let remapped = std::env::var_os("CUDA_VISIBLE_DEVICES").is_some();
    if ordinal > 0 || remapped {
        warn!(
            "Monitoring NVML GPU {} for cuda:{}; CUDA and NVML may order GPUs differently, \
             set --telemetry-device or telemetry.device_index if they disagree",
            ordinal, ordinal
        );
    } else {
        debug!("Monitoring NVML GPU 0 for cuda:0");
    }
    config.telemetry.device_index = Some(ordinal as u32);
}

/// Resolves on Ctrl+C or SIGTERM
async fn wait_for_interrupt() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, stopping run"),
        _ = terminate => info!("Received SIGTERM, stopping run"),
    }
}
