//! Per-node execution metrics
//!
//! Each agent owns its own Prometheus recorder instead of installing a
//! process-wide one, so two agents in one process never share counters.

use metrics::{Counter, Key, Level, Metadata, Recorder};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub const EXEC_TOTAL: &str = "wasm_exec_total";

pub struct ExecMetrics {
    handle: PrometheusHandle,
    exec_total: Counter,
}

impl ExecMetrics {
    pub fn new() -> Self {
        let recorder = PrometheusBuilder::new().build_recorder();

        recorder.describe_counter(
            EXEC_TOTAL.into(),
            None,
            "Total wasm function executions".into(),
        );
        let metadata = Metadata::new(module_path!(), Level::INFO, Some(module_path!()));
        let exec_total = recorder.register_counter(&Key::from_name(EXEC_TOTAL), &metadata);

        Self {
            handle: recorder.handle(),
            exec_total,
        }
    }

    /// Count one successful execution
    pub fn record_exec(&self) {
        self.exec_total.increment(1);
    }

    /// Prometheus text exposition
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

impl Default for ExecMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exec_total_line(rendered: &str) -> Option<&str> {
        rendered
            .lines()
            .find(|line| line.starts_with(EXEC_TOTAL) && !line.starts_with('#'))
    }

    #[test]
    fn test_counter_renders() {
        let metrics = ExecMetrics::new();
        metrics.record_exec();
        metrics.record_exec();

        let rendered = metrics.render();
        assert!(rendered.contains("# TYPE wasm_exec_total counter"));
        assert_eq!(exec_total_line(&rendered), Some("wasm_exec_total 2"));
    }

    #[test]
    fn test_nodes_do_not_share_counters() {
        let a = ExecMetrics::new();
        let b = ExecMetrics::new();
        a.record_exec();

        assert_eq!(exec_total_line(&a.render()), Some("wasm_exec_total 1"));
        assert_ne!(exec_total_line(&b.render()), Some("wasm_exec_total 1"));
    }
}
