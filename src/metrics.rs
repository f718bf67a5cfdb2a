//! Invocation metrics, exported in the Prometheus text format.

use anyhow::{Context, Result};
use prometheus::core::Collector;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::time::{Duration, Instant};
use tracing::info;

/// Content type of the text exposition format
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Latency buckets in seconds
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.075, 0.1, 0.25, 0.5, 0.75, 1.0, 2.5, 5.0, 7.5, 10.0,
];

/// Metrics collector for the inference endpoint.
///
/// All collectors are atomic, so one instance is shared by every handler.
#[derive(Clone)]
pub struct ServiceMetrics {
    registry: Registry,
    /// Successful invocations (one per request, not per instance)
    invocations: IntCounter,
    /// Latency of successful invocations
    latency: Histogram,
    /// Failed invocations by error kind
    errors: IntCounterVec,
    /// Start time for rate calculation
    start_time: Instant,
}

impl ServiceMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let invocations = IntCounter::with_opts(Opts::new(
            "invocations_total",
            "Number of invocations",
        ))?;
        let latency = Histogram::with_opts(
            HistogramOpts::new("invocation_latency_seconds", "Latency of invocations")
                .buckets(LATENCY_BUCKETS.to_vec()),
        )?;
        let errors = IntCounterVec::new(
            Opts::new("invocation_errors_total", "Number of failed invocations"),
            &["kind"],
        )?;

        registry
            .register(Box::new(invocations.clone()))
            .context("Failed to register invocations_total")?;
        registry
            .register(Box::new(latency.clone()))
            .context("Failed to register invocation_latency_seconds")?;
        registry
            .register(Box::new(errors.clone()))
            .context("Failed to register invocation_errors_total")?;

        Ok(Self {
            registry,
            invocations,
            latency,
            errors,
            start_time: Instant::now(),
        })
    }

    /// Record a successful invocation
    pub fn record_invocation(&self, latency: Duration) {
        self.invocations.inc();
        self.latency.observe(latency.as_secs_f64());
    }

    /// Record a failed invocation
    pub fn record_error(&self, kind: &str) {
        self.errors.with_label_values(&[kind]).inc();
    }

    pub fn invocation_count(&self) -> u64 {
        self.invocations.get()
    }

    pub fn error_count(&self, kind: &str) -> u64 {
        self.errors.with_label_values(&[kind]).get()
    }

    /// Mean latency of successful invocations, in seconds
    pub fn mean_latency(&self) -> f64 {
        let count = self.latency.get_sample_count();
        if count == 0 {
            return 0.0;
        }
        self.latency.get_sample_sum() / count as f64
    }

    /// Invocations per second since startup
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.invocation_count() as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Render every registered metric in the text exposition format
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .context("Failed to encode metrics")?;
        String::from_utf8(buffer).context("Metrics are not valid UTF-8")
    }

    /// Log a one-line summary
    pub fn log_summary(&self) {
        let failed: u64 = self
            .errors
            .collect()
            .iter()
            .flat_map(|family| family.get_metric())
            .map(|m| m.get_counter().get_value() as u64)
            .sum();

        info!(
            invocations = self.invocation_count(),
            failed,
            throughput = format!("{:.2} req/s", self.get_throughput()),
            mean_latency_ms = format!("{:.3}", self.mean_latency() * 1000.0),
            "Metrics summary"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording() {
        let metrics = ServiceMetrics::new().unwrap();

        metrics.record_invocation(Duration::from_millis(100));
        metrics.record_invocation(Duration::from_millis(300));
        metrics.record_error("malformed");

        assert_eq!(metrics.invocation_count(), 2);
        assert_eq!(metrics.error_count("malformed"), 1);
        assert_eq!(metrics.error_count("model"), 0);
        assert!((metrics.mean_latency() - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_render_exposition() {
        let metrics = ServiceMetrics::new().unwrap();
        metrics.record_invocation(Duration::from_millis(20));

        let text = metrics.render().unwrap();

        assert!(text.contains("# TYPE invocations_total counter"));
        assert!(text.contains("invocations_total 1"));
        assert!(text.contains("# TYPE invocation_latency_seconds histogram"));
        assert!(text.contains("invocation_latency_seconds_bucket{le=\"0.025\"} 1"));
        assert!(text.contains("invocation_latency_seconds_bucket{le=\"0.01\"} 0"));
        assert!(text.contains("invocation_latency_seconds_count 1"));
    }

    #[test]
    fn test_instances_are_independent() {
        let a = ServiceMetrics::new().unwrap();
        let b = ServiceMetrics::new().unwrap();
        a.record_invocation(Duration::from_millis(1));
        assert_eq!(a.invocation_count(), 1);
        assert_eq!(b.invocation_count(), 0);
    }
}
