//! Compute engine configuration

use burnin_core::{Error, Result};
use candle_core::DType;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Default edge length of the square matrices
pub const DEFAULT_MATRIX_SIZE: usize = 8192;

const MAX_MATRIX_SIZE: usize = 65_536;

/// Device the load runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeDevice {
    /// CUDA device by ordinal
    Cuda(usize),
    /// Host CPU, mostly useful for smoke tests
    Cpu,
}

impl fmt::Display for ComputeDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComputeDevice::Cuda(ordinal) => write!(f, "cuda:{}", ordinal),
            ComputeDevice::Cpu => write!(f, "cpu"),
        }
    }
}

impl FromStr for ComputeDevice {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        match s.as_str() {
            "cpu" => Ok(ComputeDevice::Cpu),
            "cuda" | "gpu" => Ok(ComputeDevice::Cuda(0)),
            _ => {
                let ordinal = s
                    .strip_prefix("cuda:")
                    .or_else(|| s.strip_prefix("gpu:"))
                    .ok_or_else(|| format!("Unknown device: {} (expected cuda:N or cpu)", s))?;
                ordinal
                    .parse()
                    .map(ComputeDevice::Cuda)
                    .map_err(|_| format!("Invalid CUDA ordinal: {}", ordinal))
            }
        }
    }
}

impl Serialize for ComputeDevice {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ComputeDevice {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Element type of the stress matrices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    F32,
    F16,
    Bf16,
}

impl Precision {
    pub fn dtype(&self) -> DType {
        match self {
            Precision::F32 => DType::F32,
            Precision::F16 => DType::F16,
            Precision::Bf16 => DType::BF16,
        }
    }

    pub fn size_in_bytes(&self) -> usize {
        self.dtype().size_in_bytes()
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Precision::F32 => write!(f, "f32"),
            Precision::F16 => write!(f, "f16"),
            Precision::Bf16 => write!(f, "bf16"),
        }
    }
}

impl FromStr for Precision {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "f32" | "fp32" => Ok(Precision::F32),
            "f16" | "fp16" => Ok(Precision::F16),
            "bf16" => Ok(Precision::Bf16),
            _ => Err(format!("Unknown precision: {}", s)),
        }
    }
}

/// How much device memory to occupy with a filler buffer
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VramTarget {
    /// Only the matrices are allocated
    None,
    /// Everything except a fixed reserve
    Max,
    /// A fixed amount in GiB, capped by what the device has
    Gigabytes(f64),
}

impl fmt::Display for VramTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VramTarget::None => write!(f, "none"),
            VramTarget::Max => write!(f, "max"),
            VramTarget::Gigabytes(gb) => write!(f, "{}", gb),
        }
    }
}

impl FromStr for VramTarget {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" | "off" => Ok(VramTarget::None),
            "max" => Ok(VramTarget::Max),
            other => {
                let gb: f64 = other
                    .trim_end_matches("gb")
                    .trim_end_matches("gib")
                    .trim()
                    .parse()
                    .map_err(|_| format!("Invalid VRAM target: {} (expected max, none or GB)", s))?;
                Ok(VramTarget::Gigabytes(gb))
            }
        }
    }
}

impl Serialize for VramTarget {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            VramTarget::Gigabytes(gb) => serializer.serialize_f64(*gb),
            other => serializer.collect_str(other),
        }
    }
}

impl<'de> Deserialize<'de> for VramTarget {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Gigabytes(f64),
            Keyword(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Gigabytes(gb) => Ok(VramTarget::Gigabytes(gb)),
            Repr::Keyword(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// Compute engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComputeConfig {
    /// Device to load
    pub device: ComputeDevice,

    /// Edge length of the square matrices
    pub matrix_size: usize,

    /// Element type of the matrices
    pub precision: Precision,

    /// Filler allocation target
    pub target_vram: VramTarget,

    /// Installed device memory, supplied by telemetry before the run
    #[serde(skip)]
    pub device_memory_total: Option<u64>,
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            device: ComputeDevice::Cuda(0),
            matrix_size: DEFAULT_MATRIX_SIZE,
            precision: Precision::F32,
            target_vram: VramTarget::Max,
            device_memory_total: None,
        }
    }
}

impl ComputeConfig {
    pub fn new(device: ComputeDevice) -> Self {
        Self {
            device,
            ..Self::default()
        }
    }

    pub fn with_matrix_size(mut self, size: usize) -> Self {
        self.matrix_size = size;
        self
    }

    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_target_vram(mut self, target: VramTarget) -> Self {
        self.target_vram = target;
        self
    }

    pub fn with_device_memory_total(mut self, bytes: u64) -> Self {
        self.device_memory_total = Some(bytes);
        self
    }

    /// Bytes held by the two input matrices and one product
    pub fn matrix_bytes(&self) -> u64 {
        3 * (self.matrix_size * self.matrix_size * self.precision.size_in_bytes()) as u64
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.matrix_size == 0 {
            return Err(Error::config("Matrix size must be greater than zero"));
        }

        if self.matrix_size > MAX_MATRIX_SIZE {
            return Err(Error::config(format!(
                "Matrix size {} exceeds the maximum of {}",
                self.matrix_size, MAX_MATRIX_SIZE
            )));
        }

        if let VramTarget::Gigabytes(gb) = self.target_vram {
            if !gb.is_finite() || gb <= 0.0 {
                return Err(Error::config(format!(
                    "VRAM target must be a positive number of GB, got {}",
                    gb
                )));
            }
        }

        Ok(())
    }
}
