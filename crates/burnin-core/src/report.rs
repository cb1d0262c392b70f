//! Human readable lines written to the output sink

use crate::{MetricsSnapshot, RunConfig, RunResult, MIB};
use chrono::Local;

/// Column header for sample lines
pub fn table_header() -> String {
    format!(
        "{:<8} | {:<4} | {:>6} | {:<17} | {:<15} | {:>8}",
        "Time", "GPU", "Util", "Memory (MiB)", "Power (W)", "Temp (C)"
    )
}

/// Lines written before the units are launched
pub fn start_banner(config: &RunConfig, engine: &str, telemetry: &str) -> Vec<String> {
    vec![
        format!(
            "Starting GPU burn-in: duration {}s, monitor interval {}s",
            fmt_secs(config.duration.as_secs_f64()),
            fmt_secs(config.monitor_interval.as_secs_f64()),
        ),
        format!("Compute engine: {}; telemetry: {}", engine, telemetry),
        table_header(),
        "-".repeat(72),
    ]
}

/// One telemetry sample
pub fn sample_line(snapshot: &MetricsSnapshot) -> String {
    let memory = format!(
        "{} / {}",
        snapshot.memory_used_bytes / MIB,
        snapshot.memory_total_bytes / MIB
    );
    let power = match (snapshot.power_watts, snapshot.power_limit_watts) {
        (Some(draw), Some(limit)) => format!("{:.1} / {:.1}", draw, limit),
        (Some(draw), None) => format!("{:.1}", draw),
        (None, _) => "n/a".to_string(),
    };
    let temperature = snapshot
        .temperature_celsius
        .map(|t| format!("{:.1}", t))
        .unwrap_or_else(|| "n/a".to_string());

    format!(
        "{:<8} | {:<4} | {:>5.1}% | {:<17} | {:<15} | {:>8}",
        snapshot.timestamp.with_timezone(&Local).format("%H:%M:%S"),
        snapshot.device_index,
        snapshot.utilization_percent,
        memory,
        power,
        temperature,
    )
}

/// A telemetry query that failed but did not end sampling
pub fn telemetry_warning(consecutive: u32, threshold: u32, reason: &str) -> String {
    format!(
        "{:<8} | WARN telemetry query failed ({}/{}): {}",
        Local::now().format("%H:%M:%S"),
        consecutive,
        threshold,
        reason
    )
}

/// Final report, always produced regardless of how the run ended
pub fn summary_lines(result: &RunResult, config: &RunConfig) -> Vec<String> {
    let mut lines = vec![
        "-".repeat(72),
        format!(
            "Run finished: status={} elapsed={:.2}s samples={} (expected ~{}) load_iterations={}",
            result.terminal_status,
            result.elapsed.as_secs_f64(),
            result.sample_count,
            config.expected_samples(),
            result.load_iterations,
        ),
    ];

    if let Some(reason) = result.failure_reason() {
        lines.push(format!("Failure: {}", reason));
    }

    let telemetry = &result.telemetry;
    if let Some(average) = telemetry.average_utilization() {
        let mut parts = vec![format!(
            "avg util {:.1}%, peak util {:.1}%",
            average,
            telemetry.peak_utilization.unwrap_or(average)
        )];
        if let (Some(peak), Some(total)) =
            (telemetry.peak_memory_used_bytes, telemetry.memory_total_bytes)
        {
            parts.push(format!("peak memory {} / {} MiB", peak / MIB, total / MIB));
        }
        if let Some(temperature) = telemetry.peak_temperature_celsius {
            parts.push(format!("peak temp {:.1} C", temperature));
        }
        if let Some(power) = telemetry.peak_power_watts {
            parts.push(format!("peak power {:.1} W", power));
        }
        lines.push(format!("Telemetry: {}", parts.join(", ")));
    }

    lines
}

fn fmt_secs(secs: f64) -> String {
    if secs.fract() == 0.0 {
        format!("{}", secs as u64)
    } else {
        format!("{:.3}", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LoadOutcome, SampleOutcome, TelemetrySummary, TerminalStatus, GIB};
    use std::time::Duration;

    fn result(status: TerminalStatus) -> RunResult {
        RunResult {
            elapsed: Duration::from_millis(5020),
            sample_count: 6,
            load_iterations: 120,
            terminal_status: status,
            load: Some(LoadOutcome::StoppedByCancellation),
            monitor: Some(SampleOutcome::StoppedByCancellation),
            hung_units: Vec::new(),
            telemetry: TelemetrySummary::default(),
        }
    }

    #[test]
    fn test_sample_line_formats_optional_fields() {
        let snapshot = MetricsSnapshot::new(0, 97.25, 20 * GIB, 24 * GIB)
            .with_temperature(71.0)
            .with_power(310.25, Some(450.0));
        let line = sample_line(&snapshot);
        assert!(line.contains("97.2%") || line.contains("97.3%"));
        assert!(line.contains("20480 / 24576"));
        assert!(line.contains("310.2 / 450.0") || line.contains("310.3 / 450.0"));
        assert!(line.contains("71.0"));

        let bare = MetricsSnapshot::new(1, 0.0, 0, 8 * GIB);
        let line = sample_line(&bare);
        assert_eq!(line.matches("n/a").count(), 2);
    }

    #[test]
    fn test_start_banner() {
        let config = RunConfig::from_secs(60, 2);
        let banner = start_banner(&config, "cuda:0", "nvml");
        assert_eq!(
            banner[0],
            "Starting GPU burn-in: duration 60s, monitor interval 2s"
        );
        assert!(banner[1].contains("cuda:0"));
        assert!(banner[1].contains("nvml"));
    }

    #[test]
    fn test_summary_always_states_status_and_elapsed() {
        let config = RunConfig::from_secs(5, 1);
        let lines = summary_lines(&result(TerminalStatus::Completed), &config);
        assert!(lines[1].contains("status=Completed"));
        assert!(lines[1].contains("elapsed=5.02s"));
        assert!(lines[1].contains("samples=6"));
        assert!(!lines.iter().any(|l| l.starts_with("Failure")));

        let mut failed = result(TerminalStatus::FailedLoad);
        failed.load = Some(LoadOutcome::Failed("device lost".to_string()));
        let lines = summary_lines(&failed, &config);
        assert!(lines.iter().any(|l| l == "Failure: device lost"));
    }

    #[test]
    fn test_summary_includes_telemetry_peaks() {
        let config = RunConfig::from_secs(5, 1);
        let mut completed = result(TerminalStatus::Completed);
        completed.telemetry.record(
            &MetricsSnapshot::new(0, 99.0, 12 * GIB, 24 * GIB)
                .with_temperature(80.0)
                .with_power(300.0, None),
        );
        let lines = summary_lines(&completed, &config);
        let telemetry = lines.last().unwrap();
        assert!(telemetry.contains("peak util 99.0%"));
        assert!(telemetry.contains("peak memory 12288 / 24576 MiB"));
        assert!(telemetry.contains("peak temp 80.0 C"));
        assert!(telemetry.contains("peak power 300.0 W"));
    }

    #[test]
    fn test_telemetry_warning() {
        let line = telemetry_warning(2, 3, "device busy");
        assert!(line.contains("(2/3)"));
        assert!(line.ends_with("device busy"));
    }
}
