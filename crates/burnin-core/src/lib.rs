//! # burnin-core
//!
//! The load-generation and concurrent-monitoring loop behind `gpu-burnin`.
//!
//! A run consists of two concurrent units sharing one [`CancellationSignal`]:
//!
//! - the **load generator** keeps the accelerator busy through a
//!   [`ComputeEngine`] until the signal is raised
//! - the **telemetry sampler** queries a [`TelemetrySource`] on a fixed cadence
//!   and writes one line per sample to an [`OutputSink`]
//!
//! The [`RunCoordinator`] owns the signal and the duration budget, joins both
//! units within a grace period and produces a [`RunResult`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use burnin_core::{RunConfig, RunCoordinator, StdoutSink};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> burnin_core::Result<()> {
//!     let config = RunConfig::from_secs(60, 2);
//!     let coordinator = RunCoordinator::new(config, engine, telemetry, Arc::new(StdoutSink))?;
//!
//!     let result = coordinator.run().await;
//!     std::process::exit(result.exit_code());
//! }
//! ```

pub mod config;
pub mod coordinator;
pub mod error;
pub mod load;
pub mod report;
pub mod sampler;
pub mod signal;
pub mod sink;
pub mod traits;
pub mod types;

// Mock implementation for testing
#[cfg(any(feature = "mock", test))]
pub mod mock;

pub use config::RunConfig;
pub use coordinator::RunCoordinator;
pub use error::{Error, Result};
pub use load::generate_load;
pub use sampler::{sample_loop, SamplerPolicy, MIN_SAMPLE_INTERVAL};
pub use signal::CancellationSignal;
pub use sink::{MemorySink, StdoutSink};
pub use traits::{ComputeEngine, OutputSink, TelemetrySource};
pub use types::*;
