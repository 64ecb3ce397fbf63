//! Prometheus instrumentation
//!
//! Metrics live on a dedicated registry so an embedding service can expose
//! them next to its own without name clashes.

use once_cell::sync::Lazy;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder};
use tracing::warn;

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

fn register(collector: Box<dyn prometheus::core::Collector>, name: &str) {
    if let Err(e) = REGISTRY.register(collector) {
        warn!(metric = name, error = %e, "Metric registration failed");
    }
}

fn counter(name: &str, help: &str) -> IntCounter {
    // Names are string literals below; construction cannot fail on them
    let c = IntCounter::new(name, help).expect("valid metric name");
    register(Box::new(c.clone()), name);
    c
}

pub static EVALUATIONS_TOTAL: Lazy<IntCounter> =
    Lazy::new(|| counter("aeps_evaluations_total", "Completed evaluation cycles"));

pub static ANOMALIES_TOTAL: Lazy<IntCounter> =
    Lazy::new(|| counter("aeps_anomalies_total", "Series flagged lower or upper"));

pub static INSUFFICIENT_DATA_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    counter(
        "aeps_insufficient_data_total",
        "Series classified against a low-confidence baseline",
    )
});

pub static VALIDATION_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    counter(
        "aeps_validation_failures_total",
        "Evaluation requests rejected before computation",
    )
});

pub static SOURCE_FAILURES_TOTAL: Lazy<IntCounter> =
    Lazy::new(|| counter("aeps_source_failures_total", "Record source fetch failures"));

pub static CACHE_PUBLISHED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    counter(
        "aeps_baseline_cache_published_total",
        "Baselines published into the shared cache",
    )
});

pub static EVALUATION_LATENCY: Lazy<Histogram> = Lazy::new(|| {
    let opts = HistogramOpts::new(
        "aeps_evaluation_duration_seconds",
        "Wall time of one evaluation cycle",
    )
    .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]);
    let h = Histogram::with_opts(opts).expect("valid histogram options");
    register(Box::new(h.clone()), "aeps_evaluation_duration_seconds");
    h
});

/// Text exposition of every engine metric
pub fn gather_text() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        warn!(error = %e, "Metric encoding failed");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_includes_engine_metrics() {
        EVALUATIONS_TOTAL.inc();
        EVALUATION_LATENCY.observe(0.002);
        let text = gather_text();
        assert!(text.contains("aeps_evaluations_total"));
        assert!(text.contains("aeps_evaluation_duration_seconds_bucket"));
    }
}
