//! Console output for gpu-burnin

use burnin_core::{OutputSink, StdoutSink, TerminalStatus};
use colored::*;

/// Stdout sink that highlights warnings and the final status
pub struct ConsoleSink {
    inner: StdoutSink,
    color: bool,
}

impl ConsoleSink {
    pub fn new(color: bool) -> Self {
        Self {
            inner: StdoutSink,
            color,
        }
    }
}

impl OutputSink for ConsoleSink {
    fn write_line(&self, line: &str) {
        if self.color {
            self.inner.write_line(&style_line(line));
        } else {
            self.inner.write_line(line);
        }
    }
}

/// Apply terminal colors based on what the line reports
pub fn style_line(line: &str) -> String {
    if line.contains("| WARN ") {
        line.yellow().to_string()
    } else if line.starts_with("Failure:") {
        line.red().bold().to_string()
    } else if line.starts_with("Run finished:") {
        let status = if line.contains(&format!("status={}", TerminalStatus::Completed)) {
            "Completed".green().bold()
        } else {
            "not completed".red().bold()
        };
        format!("{} [{}]", line.bold(), status)
    } else if line.starts_with("Load generator ready") || line.starts_with("Starting GPU burn-in") {
        line.cyan().to_string()
    } else {
        line.to_string()
    }
}
