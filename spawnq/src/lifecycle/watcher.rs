use futures::StreamExt;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, oneshot};
use tracing::{Instrument, Span};
use uuid::Uuid;

use crate::events::{LifecycleEvent, LifecycleEventPayload, LifecycleEventPublisher};
use crate::observation::ObservationCache;
use crate::persistence::ProxyInfoStore;
use crate::shutdown::ShutdownToken;
use crate::telemetry;
use crate::workload::{ProxyInfo, StatusEvent, WorkloadPhase};

/// What a single status observation means for the watcher.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Classification {
    /// Still pending with no fatal container condition; keep watching.
    Continue,
    /// The workload reached a phase the watcher stops on.
    Terminal(WorkloadPhase),
    /// A container can never pull its image.
    AbortedPending(String),
}

/// Classify one observation against the lifecycle state machine.
pub fn classify(event: &StatusEvent) -> Classification {
    match event.phase {
        WorkloadPhase::Pending => match event.image_pull_failure() {
            Some(reason) => Classification::AbortedPending(reason.to_string()),
            None => Classification::Continue,
        },
        phase => Classification::Terminal(phase),
    }
}

/// Why a watcher exited.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WatchExit {
    Terminal(WorkloadPhase),
    AbortedPending { reason: String },
    Cancelled,
    /// The subscription ended before any terminal phase.
    StreamClosed,
}

impl WatchExit {
    pub fn as_str(&self) -> &'static str {
        match self {
            WatchExit::Terminal(_) => "terminal",
            WatchExit::AbortedPending { .. } => "aborted_pending",
            WatchExit::Cancelled => "cancelled",
            WatchExit::StreamClosed => "stream_closed",
        }
    }
}

/// Result delivered through a [`WatchHandle`] when its watcher exits.
#[derive(Clone, Debug)]
pub struct WatchOutcome {
    pub name: String,
    pub exit: WatchExit,
    pub last_observation: Option<StatusEvent>,
    /// Set when the terminal snapshot could not be persisted.
    pub persist_error: Option<String>,
}

impl WatchOutcome {
    /// Whether the terminal snapshot reached the durable store.
    pub fn persisted(&self) -> bool {
        matches!(
            self.exit,
            WatchExit::Terminal(_) | WatchExit::AbortedPending { .. }
        ) && self.last_observation.is_some()
            && self.persist_error.is_none()
    }
}

/// Completion signal and stop control for one running watcher.
///
/// Dropping the handle leaves the watcher running.
#[derive(Debug)]
pub struct WatchHandle {
    name: String,
    uid: Option<String>,
    correlation_id: Uuid,
    shutdown: ShutdownToken,
    completion: oneshot::Receiver<WatchOutcome>,
}

impl WatchHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Orchestrator-assigned uid of the submitted workload, if any.
    pub fn uid(&self) -> Option<&str> {
        self.uid.as_deref()
    }

    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    /// Ask the watcher to stop at its next event check.
    pub fn cancel(&self) {
        self.shutdown.cancel();
    }

    /// Wait for the watcher to exit.
    ///
    /// Returns `None` only if the watcher task died without reporting.
    pub async fn wait(self) -> Option<WatchOutcome> {
        self.completion.await.ok()
    }
}

#[derive(Debug)]
struct ActiveWatch {
    correlation_id: Uuid,
    shutdown: ShutdownToken,
}

/// Running watchers by workload name. At most one per name.
#[derive(Clone, Debug, Default)]
pub(crate) struct WatcherRegistry {
    inner: Arc<Mutex<HashMap<String, ActiveWatch>>>,
}

impl WatcherRegistry {
    /// Track a new watcher for `name`, cancelling any watcher it replaces.
    pub(crate) async fn register(&self, name: &str, correlation_id: Uuid, shutdown: ShutdownToken) {
        let mut guard = self.inner.lock().await;
        let previous = guard.insert(
            name.to_string(),
            ActiveWatch {
                correlation_id,
                shutdown,
            },
        );
        if let Some(previous) = previous {
            tracing::info!(workload = %name, "replacing running watcher");
            previous.shutdown.cancel();
        }
    }

    /// Forget the watcher for `name` if it is still the one started under
    /// `correlation_id`.
    pub(crate) async fn release(&self, name: &str, correlation_id: Uuid) {
        let mut guard = self.inner.lock().await;
        if guard
            .get(name)
            .is_some_and(|active| active.correlation_id == correlation_id)
        {
            guard.remove(name);
        }
    }

    pub(crate) async fn cancel(&self, name: &str) -> bool {
        let removed = self.inner.lock().await.remove(name);
        match removed {
            Some(active) => {
                active.shutdown.cancel();
                true
            }
            None => false,
        }
    }

    pub(crate) async fn cancel_all(&self) -> usize {
        let drained: Vec<_> = self.inner.lock().await.drain().collect();
        for (_, active) in &drained {
            active.shutdown.cancel();
        }
        drained.len()
    }

    pub(crate) async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}

/// Background task owning one workload's status subscription.
///
/// The subscription is handed to [`StatusWatcher::spawn`] separately and
/// lives only in the task's locals.
pub(crate) struct StatusWatcher {
    pub(crate) name: String,
    pub(crate) notebook_id: String,
    pub(crate) port: u16,
    pub(crate) correlation_id: Uuid,
    pub(crate) shutdown: ShutdownToken,
    pub(crate) observations: ObservationCache,
    pub(crate) registry: WatcherRegistry,
    pub(crate) proxy_store: Arc<dyn ProxyInfoStore>,
    pub(crate) events: Arc<dyn LifecycleEventPublisher>,
    pub(crate) span: Span,
}

impl StatusWatcher {
    /// Start the watcher and return the handle controlling it.
    pub(crate) fn spawn(
        self,
        stream: BoxStream<'static, StatusEvent>,
        uid: Option<String>,
    ) -> WatchHandle {
        let (tx, rx) = oneshot::channel();
        let handle = WatchHandle {
            name: self.name.clone(),
            uid,
            correlation_id: self.correlation_id,
            shutdown: self.shutdown.clone(),
            completion: rx,
        };
        let span = telemetry::watch_span(&self.span, &self.name);
        tokio::spawn(
            async move {
                let outcome = self.run(stream).await;
                let _ = tx.send(outcome);
            }
            .instrument(span),
        );
        handle
    }

    async fn run(self, mut stream: BoxStream<'static, StatusEvent>) -> WatchOutcome {
        let timing = telemetry::record_watch_start(&self.name);
        let mut last_observation: Option<StatusEvent> = None;

        let exit = loop {
            let next = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => None,
                next = stream.next() => Some(next),
            };
            let event = match next {
                None => break WatchExit::Cancelled,
                Some(None) => break WatchExit::StreamClosed,
                Some(Some(event)) => event,
            };

            self.observations.record(self.correlation_id, &event).await;
            let classification = classify(&event);
            let phase = event.phase;
            last_observation = Some(event);

            match classification {
                Classification::Continue => {
                    tracing::debug!(workload = %self.name, %phase, "workload still pending");
                    self.publish(LifecycleEventPayload::Observed { phase }).await;
                }
                Classification::Terminal(phase) => {
                    tracing::info!(workload = %self.name, %phase, "workload reached terminal phase");
                    self.publish(LifecycleEventPayload::Terminal { phase }).await;
                    break WatchExit::Terminal(phase);
                }
                Classification::AbortedPending(reason) => {
                    tracing::error!(workload = %self.name, %reason, "container is waiting on an image that cannot be pulled");
                    self.publish(LifecycleEventPayload::AbortedPending {
                        reason: reason.clone(),
                    })
                    .await;
                    break WatchExit::AbortedPending { reason };
                }
            }
        };

        // Release the subscription before anything else can block.
        drop(stream);
        self.registry.release(&self.name, self.correlation_id).await;

        let persist_error = match (&exit, &last_observation) {
            (WatchExit::Terminal(_), Some(event)) => self.persist(event, None).await,
            (WatchExit::AbortedPending { reason }, Some(event)) => {
                self.persist(event, Some(reason.as_str())).await
            }
            (WatchExit::Cancelled, _) => {
                tracing::info!(workload = %self.name, "watcher cancelled");
                self.publish(LifecycleEventPayload::WatchCancelled).await;
                None
            }
            (WatchExit::StreamClosed, _) => {
                tracing::warn!(workload = %self.name, "status stream ended before a terminal phase");
                None
            }
            _ => None,
        };

        telemetry::record_watch_end(timing, exit.as_str());
        WatchOutcome {
            name: self.name,
            exit,
            last_observation,
            persist_error,
        }
    }

    /// Implicit sync of the terminal observation.
    async fn persist(&self, event: &StatusEvent, abort_reason: Option<&str>) -> Option<String> {
        let mut info = ProxyInfo::from_status(event, self.port);
        match abort_reason {
            Some(reason) if info.reason.is_empty() => info.reason = reason.to_string(),
            _ => {}
        }

        match self.proxy_store.upsert(&self.notebook_id, &info).await {
            Ok(()) => {
                telemetry::record_sync(&self.notebook_id, "ok");
                self.publish(LifecycleEventPayload::Synced { phase: info.phase })
                    .await;
                None
            }
            Err(err) => {
                telemetry::record_sync(&self.notebook_id, "failed");
                tracing::error!(
                    workload = %self.name,
                    notebook_id = %self.notebook_id,
                    error = %err,
                    "persisting terminal status failed"
                );
                Some(err.to_string())
            }
        }
    }

    async fn publish(&self, payload: LifecycleEventPayload) {
        let event = LifecycleEvent::new(&self.name, Some(self.correlation_id), payload);
        super::emit(self.events.as_ref(), event).await;
    }
}
