//! Tracing and telemetry instrumentation for spawnq.
//!
//! Span constructors take the owning component's span as parent, so a caller
//! that injects its own span into a queue or spawner sees every operation
//! nested under it. The `record_*` helpers emit a structured event and, with
//! the `metrics` feature, update the matching Prometheus series.
//!
//! # Example
//!
//! ```ignore
//! use spawnq::telemetry::{start_span, record_workload_submitted};
//!
//! let span = start_span(&component_span, "pod-5a09");
//! let _enter = span.enter();
//! record_workload_submitted("pod-5a09", "accepted");
//! ```

use tracing::{Span, info_span};

use crate::band::ScoreRange;

/// Span for a queue enqueue.
#[must_use]
pub fn enqueue_span(parent: &Span, key: impl AsRef<str>, score: f64) -> Span {
    info_span!(
        parent: parent,
        "spawnq.enqueue",
        queue = %key.as_ref(),
        score = score,
    )
}

/// Span for an atomic dequeue.
#[must_use]
pub fn dequeue_span(parent: &Span, key: impl AsRef<str>, range: ScoreRange) -> Span {
    info_span!(
        parent: parent,
        "spawnq.dequeue",
        queue = %key.as_ref(),
        min_score = range.min,
        max_score = range.max,
    )
}

/// Span for submitting a workload.
#[must_use]
pub fn start_span(parent: &Span, workload: impl AsRef<str>) -> Span {
    info_span!(parent: parent, "spawnq.start", workload = %workload.as_ref())
}

/// Span covering a watcher's whole lifetime.
#[must_use]
pub fn watch_span(parent: &Span, workload: impl AsRef<str>) -> Span {
    info_span!(parent: parent, "spawnq.watch", workload = %workload.as_ref())
}

/// Span for reconciling a status snapshot into the durable store.
#[must_use]
pub fn sync_span(parent: &Span, notebook_id: impl AsRef<str>, workload: impl AsRef<str>) -> Span {
    info_span!(
        parent: parent,
        "spawnq.sync",
        notebook_id = %notebook_id.as_ref(),
        workload = %workload.as_ref(),
    )
}

/// Span for deleting a workload.
#[must_use]
pub fn stop_span(parent: &Span, workload: impl AsRef<str>) -> Span {
    info_span!(parent: parent, "spawnq.stop", workload = %workload.as_ref())
}

/// Span for one dispatcher worker loop.
#[must_use]
pub fn dispatch_span(parent: &Span, worker_id: impl AsRef<str>) -> Span {
    info_span!(parent: parent, "spawnq.dispatch", worker_id = %worker_id.as_ref())
}

/// Record a queue insert.
pub fn record_entry_enqueued(queue: impl AsRef<str>, added: u64) {
    tracing::debug!(queue = %queue.as_ref(), added, "queue entry enqueued");

    #[cfg(feature = "metrics")]
    crate::metrics::record_entry_enqueued(queue.as_ref(), added);
}

/// Record a successful atomic dequeue.
pub fn record_entry_dequeued(queue: impl AsRef<str>) {
    tracing::debug!(queue = %queue.as_ref(), "queue entry dequeued");

    #[cfg(feature = "metrics")]
    crate::metrics::record_entry_dequeued(queue.as_ref());
}

/// Update the queue depth gauge.
pub fn set_queue_depth(queue: impl AsRef<str>, depth: u64) {
    tracing::trace!(queue = %queue.as_ref(), depth, "queue depth sampled");

    #[cfg(feature = "metrics")]
    crate::metrics::set_queue_depth(queue.as_ref(), depth as f64);
}

/// Record the orchestrator's answer to a submission.
///
/// `outcome` is `accepted` or `rejected`.
pub fn record_workload_submitted(workload: impl AsRef<str>, outcome: impl AsRef<str>) {
    tracing::info!(
        workload = %workload.as_ref(),
        outcome = %outcome.as_ref(),
        "workload submitted"
    );

    #[cfg(feature = "metrics")]
    crate::metrics::record_workload_submitted(outcome.as_ref());
}

/// Record a proxy info sync.
///
/// `status` is `ok` or `failed`.
pub fn record_sync(notebook_id: impl AsRef<str>, status: impl AsRef<str>) {
    tracing::debug!(
        notebook_id = %notebook_id.as_ref(),
        status = %status.as_ref(),
        "proxy info synced"
    );

    #[cfg(feature = "metrics")]
    crate::metrics::record_sync(status.as_ref());
}

/// Start timing a watcher. Pass the handle to [`record_watch_end`].
pub fn record_watch_start(workload: impl AsRef<str>) -> WatchTimingHandle {
    WatchTimingHandle {
        workload: workload.as_ref().to_string(),
        start: std::time::Instant::now(),
    }
}

/// Record how a watcher ended and how long it ran.
pub fn record_watch_end(handle: WatchTimingHandle, outcome: impl AsRef<str>) {
    let duration_secs = handle.start.elapsed().as_secs_f64();
    tracing::info!(
        workload = %handle.workload,
        outcome = %outcome.as_ref(),
        duration_secs,
        "watcher finished"
    );

    #[cfg(feature = "metrics")]
    crate::metrics::record_watch_outcome(outcome.as_ref(), duration_secs);
}

/// Handle for timing a watcher, returned by [`record_watch_start`].
#[derive(Debug)]
pub struct WatchTimingHandle {
    workload: String,
    start: std::time::Instant,
}

impl WatchTimingHandle {
    #[must_use]
    pub fn workload(&self) -> &str {
        &self.workload
    }

    #[must_use]
    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_span_names() {
        // Spans carry metadata only while a subscriber is interested in them.
        tracing::subscriber::with_default(tracing_subscriber::registry(), || {
            let parent = info_span!("spawnq.test");
            let cases = [
                (enqueue_span(&parent, "q", 1.0), "spawnq.enqueue"),
                (dequeue_span(&parent, "q", ScoreRange::all()), "spawnq.dequeue"),
                (start_span(&parent, "pod-a"), "spawnq.start"),
                (watch_span(&parent, "pod-a"), "spawnq.watch"),
                (sync_span(&parent, "a", "pod-a"), "spawnq.sync"),
                (stop_span(&parent, "pod-a"), "spawnq.stop"),
                (dispatch_span(&parent, "w0"), "spawnq.dispatch"),
            ];
            for (span, name) in cases {
                assert!(!span.is_disabled());
                assert_eq!(span.metadata().map(|m| m.name()), Some(name));
            }
        });
    }

    #[test]
    fn test_watch_timing_handle() {
        let handle = record_watch_start("pod-a");
        assert_eq!(handle.workload(), "pod-a");
        std::thread::sleep(std::time::Duration::from_millis(1));
        assert!(handle.elapsed().as_nanos() > 0);
        record_watch_end(handle, "terminal");
    }
}
