use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::workload::WorkloadPhase;

/// Metadata envelope attached to every lifecycle event.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventMeta {
    pub version: u16,
    pub correlation_id: Uuid,
    /// Workload name the event is about.
    pub workload: String,
    pub timestamp: DateTime<Utc>,
}

impl EventMeta {
    pub fn new(workload: impl Into<String>, correlation_id: Option<Uuid>) -> Self {
        Self {
            version: 1,
            correlation_id: correlation_id.unwrap_or_else(Uuid::now_v7),
            workload: workload.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A workload lifecycle transition.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub meta: EventMeta,
    pub payload: LifecycleEventPayload,
}

impl LifecycleEvent {
    pub fn new(
        workload: impl Into<String>,
        correlation_id: Option<Uuid>,
        payload: LifecycleEventPayload,
    ) -> Self {
        Self {
            meta: EventMeta::new(workload, correlation_id),
            payload,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum LifecycleEventPayload {
    /// The orchestrator accepted the workload and a watcher was started.
    Submitted { notebook_id: String },
    /// A watcher saw a non-terminal status.
    Observed { phase: WorkloadPhase },
    /// A watcher saw a terminal phase and stopped.
    Terminal { phase: WorkloadPhase },
    /// A container could not pull its image; the watcher gave up.
    AbortedPending { reason: String },
    /// The watcher was cancelled before a terminal phase.
    WatchCancelled,
    /// Deletion was submitted. `existed` is false when nothing was there.
    Deleted { existed: bool },
    /// A proxy info snapshot was persisted.
    Synced { phase: WorkloadPhase },
}

/// Sink for lifecycle events.
#[async_trait]
pub trait LifecycleEventPublisher: Send + Sync {
    async fn publish(&self, event: LifecycleEvent) -> anyhow::Result<()>;
}

/// Publisher that drops every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopEventPublisher;

#[async_trait]
impl LifecycleEventPublisher for NoopEventPublisher {
    async fn publish(&self, _event: LifecycleEvent) -> anyhow::Result<()> {
        Ok(())
    }
}

/// In-process lifecycle event bus using a tokio broadcast channel.
///
/// Publishing never waits on subscribers. A subscriber that falls more than
/// `capacity` events behind receives `RecvError::Lagged` and skips ahead.
/// With no subscribers, events are dropped.
pub struct InProcEventBus {
    sender: broadcast::Sender<LifecycleEvent>,
    capacity: usize,
}

impl std::fmt::Debug for InProcEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InProcEventBus")
            .field("capacity", &self.capacity)
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}

impl InProcEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            capacity: capacity.max(1),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn publish_event(&self, event: LifecycleEvent) {
        let _ = self.sender.send(event);
    }

    /// Receive every event published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl LifecycleEventPublisher for InProcEventBus {
    async fn publish(&self, event: LifecycleEvent) -> anyhow::Result<()> {
        self.publish_event(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn submitted(i: usize) -> LifecycleEvent {
        LifecycleEvent::new(
            format!("pod-{i}"),
            None,
            LifecycleEventPayload::Submitted {
                notebook_id: i.to_string(),
            },
        )
    }

    #[tokio::test]
    async fn test_event_bus_broadcast_to_multiple_subscribers() {
        let bus = InProcEventBus::new(100);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        for i in 0..5 {
            bus.publish(submitted(i)).await.unwrap();
        }

        for i in 0..5 {
            let e1 = timeout(Duration::from_millis(100), rx1.recv())
                .await
                .unwrap()
                .unwrap();
            let e2 = timeout(Duration::from_millis(100), rx2.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(e1.meta.workload, format!("pod-{i}"));
            assert_eq!(e2.meta.workload, format!("pod-{i}"));
        }
    }

    #[tokio::test]
    async fn test_lagged_subscriber_doesnt_block_publisher() {
        let bus = InProcEventBus::new(2);
        let mut rx = bus.subscribe();

        for i in 0..5 {
            bus.publish_event(submitted(i));
        }

        let result = timeout(Duration::from_millis(100), rx.recv()).await;
        match result.unwrap() {
            Err(broadcast::error::RecvError::Lagged(skipped)) => assert!(skipped > 0),
            Ok(_) => panic!("expected the subscriber to lag"),
            Err(broadcast::error::RecvError::Closed) => {
                panic!("Channel should not be closed");
            }
        }
    }

    #[tokio::test]
    async fn test_event_bus_debug_format() {
        let bus = InProcEventBus::new(16);
        let _rx1 = bus.subscribe();
        let _rx2 = bus.subscribe();

        let debug_str = format!("{:?}", bus);
        assert!(debug_str.contains("InProcEventBus"));
        assert!(debug_str.contains("subscribers: 2"));
        assert!(debug_str.contains("capacity: 16"));
    }

    #[test]
    fn test_event_meta_creation() {
        let correlation_id = Uuid::now_v7();
        let meta = EventMeta::new("pod-a", Some(correlation_id));
        assert_eq!(meta.version, 1);
        assert_eq!(meta.correlation_id, correlation_id);
        assert_eq!(meta.workload, "pod-a");
        assert!(meta.timestamp <= Utc::now());
    }
}
