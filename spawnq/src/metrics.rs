//! Prometheus metrics instrumentation for spawnq.
//!
//! All metrics are conditionally compiled behind the `metrics` feature flag.
//! Code outside this module goes through [`crate::telemetry`], which forwards
//! here when the feature is enabled.
//!
//! # Metrics
//!
//! ## Counters
//! - `spawnq_entries_enqueued_total` - Entries newly added to a queue
//! - `spawnq_entries_dequeued_total` - Entries taken by an atomic dequeue
//! - `spawnq_workloads_submitted_total` - Workload submissions by outcome
//! - `spawnq_watch_outcomes_total` - Watcher exits by classification
//! - `spawnq_syncs_total` - Proxy info syncs by status
//!
//! ## Gauges
//! - `spawnq_queue_depth` - Last sampled queue cardinality
//!
//! ## Histograms
//! - `spawnq_watch_duration_seconds` - Time from watcher start to exit
#![cfg(feature = "metrics")]

use prometheus::{
    CounterVec, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, exponential_buckets,
};
use std::sync::LazyLock;

/// Registry holding every spawnq metric.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Labels: `queue`.
pub static ENTRIES_ENQUEUED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        "spawnq_entries_enqueued_total",
        "Total number of entries newly added to a queue",
    );
    CounterVec::new(opts, &["queue"]).expect("spawnq_entries_enqueued_total metric creation failed")
});

/// Labels: `queue`.
pub static ENTRIES_DEQUEUED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        "spawnq_entries_dequeued_total",
        "Total number of entries taken by atomic dequeue",
    );
    CounterVec::new(opts, &["queue"]).expect("spawnq_entries_dequeued_total metric creation failed")
});

/// Labels: `outcome` (accepted, rejected).
pub static WORKLOADS_SUBMITTED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        "spawnq_workloads_submitted_total",
        "Total number of workload submissions",
    );
    CounterVec::new(opts, &["outcome"])
        .expect("spawnq_workloads_submitted_total metric creation failed")
});

/// Labels: `outcome` (terminal, aborted_pending, cancelled, stream_closed).
pub static WATCH_OUTCOMES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        "spawnq_watch_outcomes_total",
        "Total number of watcher exits by classification",
    );
    CounterVec::new(opts, &["outcome"]).expect("spawnq_watch_outcomes_total metric creation failed")
});

/// Labels: `status` (ok, failed).
pub static SYNCS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new("spawnq_syncs_total", "Total number of proxy info syncs");
    CounterVec::new(opts, &["status"]).expect("spawnq_syncs_total metric creation failed")
});

/// Labels: `queue`.
pub static QUEUE_DEPTH: LazyLock<GaugeVec> = LazyLock::new(|| {
    let opts = Opts::new("spawnq_queue_depth", "Last sampled queue cardinality");
    GaugeVec::new(opts, &["queue"]).expect("spawnq_queue_depth metric creation failed")
});

/// Labels: `outcome`.
pub static WATCH_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let buckets = exponential_buckets(0.05, 2.0, 14).expect("bucket creation failed");
    let opts = HistogramOpts::new(
        "spawnq_watch_duration_seconds",
        "Time from watcher start to exit in seconds",
    )
    .buckets(buckets);
    HistogramVec::new(opts, &["outcome"])
        .expect("spawnq_watch_duration_seconds metric creation failed")
});

/// Register every metric with [`REGISTRY`]. Safe to call more than once.
pub fn init_metrics() -> anyhow::Result<()> {
    let registry = &*REGISTRY;

    for metric in [
        Box::new(ENTRIES_ENQUEUED_TOTAL.clone()) as Box<dyn prometheus::core::Collector>,
        Box::new(ENTRIES_DEQUEUED_TOTAL.clone()),
        Box::new(WORKLOADS_SUBMITTED_TOTAL.clone()),
        Box::new(WATCH_OUTCOMES_TOTAL.clone()),
        Box::new(SYNCS_TOTAL.clone()),
        Box::new(QUEUE_DEPTH.clone()),
        Box::new(WATCH_DURATION_SECONDS.clone()),
    ] {
        if let Err(e) = registry.register(metric) {
            let msg = e.to_string();
            if !msg.contains("Duplicate metrics collector registration attempted") {
                return Err(e.into());
            }
        }
    }

    Ok(())
}

pub fn record_entry_enqueued(queue: &str, added: u64) {
    ENTRIES_ENQUEUED_TOTAL
        .with_label_values(&[queue])
        .inc_by(added as f64);
}

pub fn record_entry_dequeued(queue: &str) {
    ENTRIES_DEQUEUED_TOTAL.with_label_values(&[queue]).inc();
}

pub fn set_queue_depth(queue: &str, depth: f64) {
    QUEUE_DEPTH.with_label_values(&[queue]).set(depth);
}

pub fn record_workload_submitted(outcome: &str) {
    WORKLOADS_SUBMITTED_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_watch_outcome(outcome: &str, duration_secs: f64) {
    WATCH_OUTCOMES_TOTAL.with_label_values(&[outcome]).inc();
    WATCH_DURATION_SECONDS
        .with_label_values(&[outcome])
        .observe(duration_secs);
}

pub fn record_sync(status: &str) {
    SYNCS_TOTAL.with_label_values(&[status]).inc();
}

/// Gather all registered metrics in Prometheus text format.
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    encoder
        .encode_to_string(&metric_families)
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_initialization_is_idempotent() {
        init_metrics().expect("metrics initialization should succeed");
        init_metrics().expect("second initialization should succeed");
    }

    #[test]
    fn test_gather_metrics() {
        init_metrics().expect("metrics initialization should succeed");

        record_entry_enqueued("test_queue", 1);
        record_entry_dequeued("test_queue");
        record_workload_submitted("accepted");
        record_watch_outcome("terminal", 0.5);
        record_sync("ok");
        set_queue_depth("test_queue", 3.0);

        let output = gather_metrics().expect("gather should succeed");
        assert!(output.contains("spawnq_entries_enqueued_total"));
        assert!(output.contains("spawnq_entries_dequeued_total"));
        assert!(output.contains("spawnq_watch_duration_seconds"));
        assert!(output.contains("spawnq_queue_depth"));
    }
}
