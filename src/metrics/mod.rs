//! # Prometheus metrics for the supervisor.
//!
//! A process-wide [`Metrics`] registry exposed at `/metrics` in the text
//! exposition format. Families cover the task lifecycle and the queue; the
//! engine's own metrics are registered by the engine, not here.

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

/// Metric families owned by the supervisor.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    /// Tasks by terminal state: `started`, `succeeded`, `failed`, `canceled`.
    pub tasks_total: IntCounterVec,
    /// Current number of queued (not in-flight) tasks.
    pub queue_length: IntGauge,
    /// Wall-clock duration of finished tasks.
    pub task_duration_seconds: Histogram,
    /// Bytes delivered to the backend across all tasks.
    pub imported_bytes_total: IntCounter,
}

impl Metrics {
    /// Creates and registers all metric families.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let tasks_total = IntCounterVec::new(
            Opts::new("loadvisor_tasks_total", "Tasks by lifecycle state"),
            &["state"],
        )?;
        let queue_length = IntGauge::new(
            "loadvisor_queue_length",
            "Number of queued (not in-flight) tasks",
        )?;
        let task_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "loadvisor_task_duration_seconds",
                "Wall-clock duration of finished tasks",
            )
            .buckets(vec![
                1.0, 10.0, 60.0, 300.0, 900.0, 1800.0, 3600.0, 10800.0, 43200.0,
            ]),
        )?;
        let imported_bytes_total = IntCounter::new(
            "loadvisor_imported_bytes_total",
            "Bytes delivered to the backend",
        )?;

        registry.register(Box::new(tasks_total.clone()))?;
        registry.register(Box::new(queue_length.clone()))?;
        registry.register(Box::new(task_duration_seconds.clone()))?;
        registry.register(Box::new(imported_bytes_total.clone()))?;

        Ok(Self {
            registry,
            tasks_total,
            queue_length,
            task_duration_seconds,
            imported_bytes_total,
        })
    }

    /// Encodes the registry in the Prometheus text exposition format.
    ///
    /// Returns the content type and the encoded body.
    pub fn encode(&self) -> (String, Vec<u8>) {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        // Encoding only fails on malformed families, which registration
        // prevents; an empty body is the harmless fallback.
        let _ = encoder.encode(&self.registry.gather(), &mut buffer);
        (encoder.format_type().to_string(), buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn families_appear_in_exposition() {
        let metrics = Metrics::new().unwrap();
        metrics.tasks_total.with_label_values(&["started"]).inc();
        metrics.queue_length.set(3);
        metrics.imported_bytes_total.inc_by(1024);

        let (content_type, body) = metrics.encode();
        let text = String::from_utf8(body).unwrap();
        assert!(content_type.starts_with("text/plain"));
        assert!(text.contains("loadvisor_tasks_total{state=\"started\"} 1"));
        assert!(text.contains("loadvisor_queue_length 3"));
        assert!(text.contains("loadvisor_imported_bytes_total 1024"));
    }
}
