use std::{collections::HashMap, sync::Arc};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::workload::StatusEvent;

/// What is known locally about one started workload.
#[derive(Clone, Debug)]
pub struct WorkloadObservation {
    /// Ties every lifecycle event of one start together.
    pub correlation_id: Uuid,
    /// Most recent status a watcher saw, if any.
    pub latest: Option<StatusEvent>,
}

/// Latest watcher observation per workload name.
///
/// Sync falls back to this when the orchestrator cannot report a live status.
/// Thread-safe via `tokio::sync::Mutex`.
#[derive(Clone, Default, Debug)]
pub struct ObservationCache {
    inner: Arc<Mutex<HashMap<String, WorkloadObservation>>>,
}

impl ObservationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `name` afresh, dropping anything a previous start left.
    ///
    /// Returns the correlation id for this start.
    pub async fn begin(&self, name: &str) -> Uuid {
        let correlation_id = Uuid::now_v7();
        let mut guard = self.inner.lock().await;
        guard.insert(
            name.to_string(),
            WorkloadObservation {
                correlation_id,
                latest: None,
            },
        );
        correlation_id
    }

    /// Overwrite the latest observation for the event's workload.
    ///
    /// Only the start identified by `correlation_id` is updated. A workload
    /// that was forgotten or started again is left alone; returns whether the
    /// observation was kept.
    pub async fn record(&self, correlation_id: Uuid, event: &StatusEvent) -> bool {
        let mut guard = self.inner.lock().await;
        match guard.get_mut(&event.name) {
            Some(entry) if entry.correlation_id == correlation_id => {
                entry.latest = Some(event.clone());
                true
            }
            _ => {
                debug!(workload = %event.name, "dropping observation for a stale start");
                false
            }
        }
    }

    /// Latest observation for `name`, if a watcher recorded one.
    pub async fn latest(&self, name: &str) -> Option<StatusEvent> {
        let guard = self.inner.lock().await;
        guard.get(name).and_then(|o| o.latest.clone())
    }

    pub async fn fetch(&self, name: &str) -> Option<WorkloadObservation> {
        let guard = self.inner.lock().await;
        guard.get(name).cloned()
    }

    /// Correlation id for `name`, generating one if nothing was started here.
    pub async fn correlation_or_generate(&self, name: &str) -> Uuid {
        let guard = self.inner.lock().await;
        if let Some(existing) = guard.get(name) {
            return existing.correlation_id;
        }

        debug!(workload = %name, "no correlation id for workload; generating new one");
        Uuid::now_v7()
    }

    /// Stop tracking `name`.
    pub async fn forget(&self, name: &str) -> Option<WorkloadObservation> {
        let mut guard = self.inner.lock().await;
        let removed = guard.remove(name);
        if removed.is_some() {
            info!(workload = %name, "dropped cached observation");
        }
        removed
    }

    pub async fn contains(&self, name: &str) -> bool {
        let guard = self.inner.lock().await;
        guard.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workload::WorkloadPhase;

    #[tokio::test]
    async fn test_record_overwrites_latest() {
        let cache = ObservationCache::new();
        let correlation = cache.begin("pod-a").await;
        assert!(cache.latest("pod-a").await.is_none());

        cache
            .record(correlation, &StatusEvent::new("pod-a", WorkloadPhase::Pending))
            .await;
        cache
            .record(correlation, &StatusEvent::new("pod-a", WorkloadPhase::Running))
            .await;

        let latest = cache.latest("pod-a").await.unwrap();
        assert_eq!(latest.phase, WorkloadPhase::Running);
        assert_eq!(cache.correlation_or_generate("pod-a").await, correlation);
    }

    #[tokio::test]
    async fn test_begin_resets_previous_start() {
        let cache = ObservationCache::new();
        let first = cache.begin("pod-a").await;
        cache
            .record(first, &StatusEvent::new("pod-a", WorkloadPhase::Failed))
            .await;

        let second = cache.begin("pod-a").await;
        assert_ne!(first, second);
        assert!(cache.latest("pod-a").await.is_none());

        // A watcher of the replaced start must not write into the new one.
        assert!(
            !cache
                .record(first, &StatusEvent::new("pod-a", WorkloadPhase::Running))
                .await
        );
        assert!(cache.latest("pod-a").await.is_none());
    }

    #[tokio::test]
    async fn test_record_after_forget_does_not_resurrect() {
        let cache = ObservationCache::new();
        let correlation = cache.begin("pod-a").await;
        cache.forget("pod-a").await;

        let kept = cache
            .record(correlation, &StatusEvent::new("pod-a", WorkloadPhase::Running))
            .await;
        assert!(!kept);
        assert!(!cache.contains("pod-a").await);
        assert!(cache.latest("pod-a").await.is_none());
    }

    #[tokio::test]
    async fn test_forget() {
        let cache = ObservationCache::new();
        cache.begin("pod-a").await;
        assert!(cache.contains("pod-a").await);
        assert!(cache.forget("pod-a").await.is_some());
        assert!(!cache.contains("pod-a").await);
        assert!(cache.forget("pod-a").await.is_none());
    }
}
