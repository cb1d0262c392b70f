//! nvidia-smi backend
//!
//! Shells out to `nvidia-smi --query-gpu` for every sample. Slower than NVML
//! but works wherever the driver tools are installed.

use crate::config::TelemetryConfig;
use crate::{GpuError, Result};

use async_trait::async_trait;
use burnin_core::{MetricsSnapshot, TelemetrySource, MIB};
use tokio::process::Command;
use tracing::{debug, info};

const QUERY_FIELDS: &str =
    "index,utilization.gpu,memory.used,memory.total,power.draw,power.limit,temperature.gpu,name";

/// Telemetry read through the nvidia-smi CSV interface
pub struct NvidiaSmiTelemetry {
    config: TelemetryConfig,
}

impl NvidiaSmiTelemetry {
    /// Create the backend and check that nvidia-smi answers for the device
    pub async fn new(config: TelemetryConfig) -> Result<Self> {
        config.validate().map_err(GpuError::Configuration)?;
        info!(
            "Creating nvidia-smi telemetry for GPU {} via {}",
            config.device(),
            config.nvidia_smi_path
        );

        let telemetry = Self { config };
        telemetry.query().await?;
        Ok(telemetry)
    }

    async fn query(&self) -> Result<MetricsSnapshot> {
        let mut command = Command::new(&self.config.nvidia_smi_path);
        command
            .arg(format!("--query-gpu={}", QUERY_FIELDS))
            .arg("--format=csv,noheader,nounits")
            .arg("-i")
            .arg(self.config.device().to_string())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.config.query_timeout, command.output())
            .await
            .map_err(|_| {
                GpuError::Timeout(format!(
                    "nvidia-smi did not answer within {:?}",
                    self.config.query_timeout
                ))
            })?
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    GpuError::UnsupportedBackend(format!("{} not found", self.config.nvidia_smi_path))
                }
                _ => GpuError::Io(e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let message = if stderr.trim().is_empty() { stdout } else { stderr };
            return Err(GpuError::CommunicationError(format!(
                "nvidia-smi exited with {}: {}",
                output.status,
                message.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_query_output(&stdout, self.config.device())
    }
}

#[async_trait]
impl TelemetrySource for NvidiaSmiTelemetry {
    fn backend_name(&self) -> &str {
        "nvidia-smi"
    }

    async fn query_device_metrics(&self) -> burnin_core::Result<MetricsSnapshot> {
        Ok(self.query().await?)
    }
}

/// Parse `--format=csv,noheader,nounits` output into a snapshot for `device_index`
pub fn parse_query_output(output: &str, device_index: u32) -> Result<MetricsSnapshot> {
    for line in output.lines().filter(|l| !l.trim().is_empty()) {
        let fields: Vec<&str> = line.splitn(8, ',').map(str::trim).collect();
        if fields.len() < 7 {
            return Err(GpuError::ParseError(format!(
                "expected at least 7 fields, got {}: {}",
                fields.len(),
                line
            )));
        }

        let index: u32 = fields[0]
            .parse()
            .map_err(|_| GpuError::ParseError(format!("invalid GPU index: {}", fields[0])))?;
        if index != device_index {
            continue;
        }

        let utilization = required(fields[1], "utilization.gpu")?;
        let memory_used = required(fields[2], "memory.used")?;
        let memory_total = required(fields[3], "memory.total")?;

        let mut snapshot = MetricsSnapshot::new(
            index,
            utilization,
            (memory_used * MIB as f64) as u64,
            (memory_total * MIB as f64) as u64,
        );
        snapshot.power_watts = optional(fields[4]);
        snapshot.power_limit_watts = optional(fields[5]);
        snapshot.temperature_celsius = optional(fields[6]);
        snapshot.device_name = fields
            .get(7)
            .filter(|name| !name.is_empty())
            .map(|name| name.to_string());

        debug!("Parsed nvidia-smi sample for GPU {}", index);
        return Ok(snapshot);
    }

    Err(GpuError::GpuNotFound(format!(
        "GPU {} missing from nvidia-smi output",
        device_index
    )))
}

fn required(field: &str, name: &str) -> Result<f64> {
    optional(field).ok_or_else(|| GpuError::ParseError(format!("{} unavailable: {}", name, field)))
}

/// `[N/A]`, `[Not Supported]` and friends read as missing
fn optional(field: &str) -> Option<f64> {
    field.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TelemetryBackend;
    use burnin_core::GIB;

    const SAMPLE: &str = "0, 97, 20480, 24564, 312.45, 450.00, 71, NVIDIA GeForce RTX 4090\n\
                          1, 3, 512, 81920, 61.20, 400.00, 34, NVIDIA A100-SXM4-80GB\n";

    #[test]
    fn test_parse_selects_device() {
        let snapshot = parse_query_output(SAMPLE, 1).unwrap();
        assert_eq!(snapshot.device_index, 1);
        assert_eq!(snapshot.utilization_percent, 3.0);
        assert_eq!(snapshot.memory_used_bytes, 512 * MIB);
        assert_eq!(snapshot.memory_total_bytes, 80 * GIB);
        assert_eq!(snapshot.power_watts, Some(61.2));
        assert_eq!(snapshot.power_limit_watts, Some(400.0));
        assert_eq!(snapshot.temperature_celsius, Some(34.0));
        assert_eq!(snapshot.device_name.as_deref(), Some("NVIDIA A100-SXM4-80GB"));
    }

    #[test]
    fn test_parse_tolerates_not_available_fields() {
        let output = "0, 100, 1000, 16000, [N/A], [N/A], 65\n";
        let snapshot = parse_query_output(output, 0).unwrap();
        assert_eq!(snapshot.power_watts, None);
        assert_eq!(snapshot.power_limit_watts, None);
        assert_eq!(snapshot.temperature_celsius, Some(65.0));
        assert_eq!(snapshot.device_name, None);
    }

    #[test]
    fn test_parse_missing_device() {
        let result = parse_query_output(SAMPLE, 4);
        assert!(matches!(result, Err(GpuError::GpuNotFound(_))));
    }

    #[test]
    fn test_parse_rejects_malformed_output() {
        assert!(matches!(
            parse_query_output("No devices were found", 0),
            Err(GpuError::ParseError(_))
        ));
        assert!(matches!(
            parse_query_output("0, [N/A], 1, 2, 3, 4, 5", 0),
            Err(GpuError::ParseError(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_binary_is_unsupported() {
        let config = TelemetryConfig::new(TelemetryBackend::NvidiaSmi)
            .with_nvidia_smi_path("/nonexistent/nvidia-smi-for-tests");
        let result = NvidiaSmiTelemetry::new(config).await;
        assert!(matches!(result, Err(GpuError::UnsupportedBackend(_))));
    }
}
