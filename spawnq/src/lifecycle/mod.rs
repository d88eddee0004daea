//! Workload lifecycle: submit, watch, reconcile, tear down.
//!
//! [`Spawner`] is the entry point. It submits a workload built from a
//! [`NotebookDeployment`](crate::workload::NotebookDeployment), hands the
//! status subscription to a background [`watcher`] task, and writes observed
//! status into a [`ProxyInfoStore`](crate::persistence::ProxyInfoStore).

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;

use crate::error::OrchestratorError;
use crate::events::{LifecycleEvent, LifecycleEventPublisher};
use crate::workload::{StatusEvent, WorkloadHandle, WorkloadSpec};

/// Builder for [`Spawner`].
pub mod builder;
/// Lifecycle controller.
pub mod spawner;
/// Status watcher tasks and phase classification.
pub mod watcher;

pub use builder::SpawnerBuilder;
pub use spawner::Spawner;
pub use watcher::{Classification, WatchExit, WatchHandle, WatchOutcome, classify};

/// Container orchestrator API consumed by the lifecycle controller.
#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// Create the workload described by `spec`.
    async fn submit(&self, spec: &WorkloadSpec) -> Result<WorkloadHandle, OrchestratorError>;

    /// Delete the workload called `name`. Absent workloads yield
    /// [`OrchestratorError::NotFound`].
    async fn delete(&self, name: &str) -> Result<(), OrchestratorError>;

    /// Current status of `name`, or `None` if the orchestrator has none.
    async fn status(&self, name: &str) -> Result<Option<StatusEvent>, OrchestratorError>;

    /// Live status events for `name`. Must be callable before the workload
    /// exists; events for it are delivered once it is created.
    async fn subscribe(
        &self,
        name: &str,
    ) -> Result<BoxStream<'static, StatusEvent>, OrchestratorError>;
}

#[async_trait]
impl<O: Orchestrator + ?Sized> Orchestrator for Arc<O> {
    async fn submit(&self, spec: &WorkloadSpec) -> Result<WorkloadHandle, OrchestratorError> {
        (**self).submit(spec).await
    }

    async fn delete(&self, name: &str) -> Result<(), OrchestratorError> {
        (**self).delete(name).await
    }

    async fn status(&self, name: &str) -> Result<Option<StatusEvent>, OrchestratorError> {
        (**self).status(name).await
    }

    async fn subscribe(
        &self,
        name: &str,
    ) -> Result<BoxStream<'static, StatusEvent>, OrchestratorError> {
        (**self).subscribe(name).await
    }
}

pub(crate) async fn emit(events: &dyn LifecycleEventPublisher, event: LifecycleEvent) {
    if let Err(err) = events.publish(event).await {
        tracing::error!("publish lifecycle event failed: {err}");
    }
}
