//! Candle compute engine

use crate::config::{ComputeConfig, ComputeDevice};
use crate::filler::plan_filler_bytes;

use burnin_core::{ComputeEngine, DeviceDescription, Error, Result, GIB};
use candle_core::{DType, Device, Tensor};
use tracing::{debug, info, warn};

/// Tensors that stay resident for the whole run
struct Workload {
    device: Device,
    a: Tensor,
    b: Tensor,
    _filler: Option<Tensor>,
}

/// Square matrix multiplication on a candle device
pub struct CandleEngine {
    config: ComputeConfig,
    workload: Option<Workload>,
}

impl CandleEngine {
    pub fn new(config: ComputeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            workload: None,
        })
    }

    fn open_device(&self) -> Result<Device> {
        match self.config.device {
            ComputeDevice::Cuda(ordinal) => Device::new_cuda(ordinal).map_err(|e| {
                Error::device(format!("cannot open cuda:{}: {}", ordinal, e))
            }),
            ComputeDevice::Cpu => Ok(Device::Cpu),
        }
    }

    fn allocate_filler(&self, device: &Device) -> Result<Option<Tensor>> {
        if device.is_cpu() {
            return Ok(None);
        }

        let bytes = plan_filler_bytes(self.config.device_memory_total, self.config.target_vram);
        if bytes == 0 {
            debug!("No filler allocation for target {}", self.config.target_vram);
            return Ok(None);
        }

        info!("Allocating {:.2} GiB filler", bytes as f64 / GIB as f64);
        let elements = (bytes / DType::F32.size_in_bytes() as u64) as usize;
        let filler = Tensor::zeros(elements, DType::F32, device).map_err(|e| {
            Error::device(format!(
                "failed to allocate {:.2} GiB filler: {}",
                bytes as f64 / GIB as f64,
                e
            ))
        })?;

        Ok(Some(filler))
    }

    fn random_matrix(&self, device: &Device) -> Result<Tensor> {
        let n = self.config.matrix_size;
        Tensor::randn(0f32, 1f32, (n, n), device)
            .and_then(|t| t.to_dtype(self.config.precision.dtype()))
            .map_err(|e| Error::device(format!("failed to allocate {}x{} matrix: {}", n, n, e)))
    }
}

impl ComputeEngine for CandleEngine {
    fn describe(&self) -> String {
        format!(
            "candle {} {}x{} {} matmul",
            self.config.device, self.config.matrix_size, self.config.matrix_size, self.config.precision
        )
    }

    fn prepare(&mut self) -> Result<DeviceDescription> {
        let device = self.open_device()?;

        let filler = self.allocate_filler(&device)?;
        let filler_bytes = filler
            .as_ref()
            .map(|t| (t.elem_count() * t.dtype().size_in_bytes()) as u64)
            .unwrap_or(0);

        let a = self.random_matrix(&device)?;
        let b = self.random_matrix(&device)?;

        let total_memory_bytes = match self.config.device {
            ComputeDevice::Cuda(_) => self.config.device_memory_total,
            ComputeDevice::Cpu => None,
        };
        if total_memory_bytes.is_none() && !device.is_cpu() {
            warn!("Device memory size unknown, running without filler");
        }

        let description = DeviceDescription {
            label: self.config.device.to_string(),
            total_memory_bytes,
            allocated_bytes: filler_bytes + self.config.matrix_bytes(),
            workload: format!(
                "{}x{} {} matmul",
                self.config.matrix_size, self.config.matrix_size, self.config.precision
            ),
        };

        self.workload = Some(Workload {
            device,
            a,
            b,
            _filler: filler,
        });
        Ok(description)
    }

    fn run_stress_operation(&mut self) -> Result<()> {
        let workload = self
            .workload
            .as_ref()
            .ok_or_else(|| Error::device("compute engine used before prepare"))?;

        let product = workload
            .a
            .matmul(&workload.b)
            .map_err(|e| Error::device(format!("matmul failed: {}", e)))?;

        // Kernels launch asynchronously; wait so each call is one finished unit of work
        workload
            .device
            .synchronize()
            .map_err(|e| Error::device(format!("device synchronize failed: {}", e)))?;

        drop(product);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Precision, VramTarget};

    fn cpu_config(size: usize) -> ComputeConfig {
        ComputeConfig::new(ComputeDevice::Cpu).with_matrix_size(size)
    }

    #[test]
    fn test_rejects_invalid_config() {
        assert!(CandleEngine::new(cpu_config(0)).is_err());
    }

    #[test]
    fn test_operation_before_prepare_fails() {
        let mut engine = CandleEngine::new(cpu_config(8)).unwrap();
        assert!(engine.run_stress_operation().is_err());
    }

    #[test]
    fn test_cpu_engine_runs() {
        let config = cpu_config(16)
            .with_target_vram(VramTarget::Max)
            .with_device_memory_total(24 * GIB);
        let mut engine = CandleEngine::new(config).unwrap();
        assert_eq!(engine.describe(), "candle cpu 16x16 f32 matmul");

        let description = engine.prepare().unwrap();
        assert_eq!(description.label, "cpu");
        assert_eq!(description.total_memory_bytes, None);
        assert_eq!(description.allocated_bytes, 3 * 16 * 16 * 4);

        for _ in 0..3 {
            engine.run_stress_operation().unwrap();
        }
    }

    #[test]
    fn test_half_precision_on_cpu() {
        let mut engine = CandleEngine::new(cpu_config(8).with_precision(Precision::Bf16)).unwrap();
        let description = engine.prepare().unwrap();
        assert_eq!(description.workload, "8x8 bf16 matmul");
        engine.run_stress_operation().unwrap();
    }

    #[cfg(not(feature = "cuda"))]
    #[test]
    fn test_cuda_without_support_fails_prepare() {
        let mut engine = CandleEngine::new(ComputeConfig::new(ComputeDevice::Cuda(0))).unwrap();
        let error = engine.prepare().unwrap_err();
        assert!(matches!(error, Error::DeviceFailure(_)));
    }
}
