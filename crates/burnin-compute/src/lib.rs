//! # burnin-compute
//!
//! The [`burnin_core::ComputeEngine`] used by `gpu-burnin`: repeated square
//! matrix multiplication on a candle device, optionally next to a filler
//! buffer that occupies most of the device memory.
//!
//! CUDA support is behind the `cuda` feature. Without it only the `cpu`
//! device can be prepared.

pub mod config;
pub mod engine;
pub mod filler;

pub use config::{ComputeConfig, ComputeDevice, Precision, VramTarget, DEFAULT_MATRIX_SIZE};
pub use engine::CandleEngine;
pub use filler::plan_filler_bytes;
