use std::any::type_name;
use std::fmt;
use std::sync::Arc;

use tracing::{Instrument, Span};

use crate::config::SpawnerConfig;
use crate::error::{OrchestratorError, SpawnError};
use crate::events::{LifecycleEvent, LifecycleEventPayload, LifecycleEventPublisher};
use crate::lifecycle::Orchestrator;
use crate::lifecycle::watcher::{StatusWatcher, WatchHandle, WatcherRegistry};
use crate::observation::ObservationCache;
use crate::persistence::ProxyInfoStore;
use crate::shutdown::ShutdownToken;
use crate::telemetry;
use crate::workload::{NotebookDeployment, ProxyInfo, StatusEvent, workload_name};

/// Lifecycle controller for notebook workloads.
///
/// Borrows a descriptor for the length of each call and keeps nothing that
/// would be needed to recompute its workload name later. The only state it
/// holds is the latest watcher observation per workload, used as a fallback
/// by [`Spawner::sync`], and the stop controls of running watchers.
pub struct Spawner<O, P>
where
    O: Orchestrator + 'static,
    P: ProxyInfoStore + 'static,
{
    config: SpawnerConfig,
    orchestrator: Arc<O>,
    proxy_store: Arc<P>,
    events: Arc<dyn LifecycleEventPublisher>,
    observations: ObservationCache,
    watchers: WatcherRegistry,
    span: Span,
}

impl<O, P> fmt::Debug for Spawner<O, P>
where
    O: Orchestrator + 'static,
    P: ProxyInfoStore + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Spawner")
            .field("config", &self.config)
            .field("orchestrator_type", &type_name::<O>())
            .field("proxy_store_type", &type_name::<P>())
            .finish()
    }
}

impl<O, P> Spawner<O, P>
where
    O: Orchestrator + 'static,
    P: ProxyInfoStore + 'static,
{
    pub fn new(
        config: SpawnerConfig,
        orchestrator: Arc<O>,
        proxy_store: Arc<P>,
        events: Arc<dyn LifecycleEventPublisher>,
        observations: ObservationCache,
        span: Span,
    ) -> Self {
        Self {
            config,
            orchestrator,
            proxy_store,
            events,
            observations,
            watchers: WatcherRegistry::default(),
            span,
        }
    }

    pub fn config(&self) -> &SpawnerConfig {
        &self.config
    }

    pub fn orchestrator(&self) -> Arc<O> {
        Arc::clone(&self.orchestrator)
    }

    pub fn proxy_store(&self) -> Arc<P> {
        Arc::clone(&self.proxy_store)
    }

    pub fn observations(&self) -> ObservationCache {
        self.observations.clone()
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Workload name for `descriptor` under this spawner's prefix.
    pub fn workload_name<D>(&self, descriptor: &D) -> String
    where
        D: NotebookDeployment + ?Sized,
    {
        workload_name(&self.config.name_prefix, descriptor)
    }

    /// Submit the workload for `descriptor` and start watching it.
    ///
    /// Returns once the orchestrator accepted the workload; readiness is
    /// reported through the returned handle. On rejection nothing is left
    /// running.
    pub async fn start<D>(&self, descriptor: &D) -> Result<WatchHandle, SpawnError>
    where
        D: NotebookDeployment + Sync + ?Sized,
    {
        let name = self.workload_name(descriptor);
        let span = telemetry::start_span(&self.span, &name);
        self.start_named(name, descriptor).instrument(span).await
    }

    async fn start_named<D>(&self, name: String, descriptor: &D) -> Result<WatchHandle, SpawnError>
    where
        D: NotebookDeployment + Sync + ?Sized,
    {
        let mut spec = descriptor.new_workload_spec(&name);
        spec.namespace = self.config.namespace.clone();

        // Subscribe first so no status published right after creation is missed.
        let stream = match self.orchestrator.subscribe(&name).await {
            Ok(stream) => stream,
            Err(source) => {
                tracing::error!(workload = %name, error = %source, "status subscription failed");
                telemetry::record_workload_submitted(&name, "rejected");
                return Err(SpawnError::Submission { name, source });
            }
        };

        let handle = match self.orchestrator.submit(&spec).await {
            Ok(handle) => handle,
            Err(source) => {
                tracing::error!(workload = %name, error = %source, "workload submission rejected");
                telemetry::record_workload_submitted(&name, "rejected");
                return Err(SpawnError::Submission { name, source });
            }
        };
        telemetry::record_workload_submitted(&name, "accepted");

        let notebook_id = descriptor.deployment_id();
        let correlation_id = self.observations.begin(&name).await;
        self.publish(
            &name,
            correlation_id,
            LifecycleEventPayload::Submitted {
                notebook_id: notebook_id.clone(),
            },
        )
        .await;

        let shutdown = ShutdownToken::new();
        self.watchers
            .register(&name, correlation_id, shutdown.clone())
            .await;

        let proxy_store: Arc<dyn ProxyInfoStore> = self.proxy_store.clone();
        let watcher = StatusWatcher {
            name: name.clone(),
            notebook_id,
            port: descriptor.port(),
            correlation_id,
            shutdown,
            observations: self.observations.clone(),
            registry: self.watchers.clone(),
            proxy_store,
            events: Arc::clone(&self.events),
            span: self.span.clone(),
        };
        tracing::info!(workload = %name, uid = ?handle.uid, "workload submitted; watching status");
        Ok(watcher.spawn(stream, handle.uid))
    }

    /// Delete the workload for `descriptor`.
    ///
    /// A workload that is already gone counts as stopped. Any watcher for it
    /// is cancelled and its cached observation dropped.
    pub async fn stop<D>(&self, descriptor: &D) -> Result<(), SpawnError>
    where
        D: NotebookDeployment + Sync + ?Sized,
    {
        let name = self.workload_name(descriptor);
        let span = telemetry::stop_span(&self.span, &name);
        self.stop_named(name).instrument(span).await
    }

    async fn stop_named(&self, name: String) -> Result<(), SpawnError> {
        let existed = match self.orchestrator.delete(&name).await {
            Ok(()) => {
                tracing::info!(workload = %name, "workload deleted");
                true
            }
            Err(OrchestratorError::NotFound(_)) => {
                tracing::info!(workload = %name, "workload already absent");
                false
            }
            Err(source) => {
                tracing::error!(workload = %name, error = %source, "workload deletion failed");
                return Err(SpawnError::Teardown { name, source });
            }
        };

        if self.watchers.cancel(&name).await {
            tracing::debug!(workload = %name, "cancelled running watcher");
        }
        let correlation_id = self.observations.correlation_or_generate(&name).await;
        self.observations.forget(&name).await;
        self.publish(
            &name,
            correlation_id,
            LifecycleEventPayload::Deleted { existed },
        )
        .await;
        Ok(())
    }

    /// Overwrite the persisted [`ProxyInfo`] of `descriptor` with its latest
    /// status.
    ///
    /// The live orchestrator status is preferred; when it is unavailable the
    /// last watcher observation is used. Returns the snapshot written.
    pub async fn sync<D>(&self, descriptor: &D) -> Result<ProxyInfo, SpawnError>
    where
        D: NotebookDeployment + Sync + ?Sized,
    {
        let name = self.workload_name(descriptor);
        let notebook_id = descriptor.deployment_id();
        let span = telemetry::sync_span(&self.span, &notebook_id, &name);
        self.sync_named(name, notebook_id, descriptor.port())
            .instrument(span)
            .await
    }

    async fn sync_named(
        &self,
        name: String,
        notebook_id: String,
        port: u16,
    ) -> Result<ProxyInfo, SpawnError> {
        let status = match self.latest_status(&name).await {
            Some(status) => status,
            None => return Err(SpawnError::StatusUnavailable { name }),
        };

        let info = ProxyInfo::from_status(&status, port);
        if let Err(source) = self.proxy_store.upsert(&notebook_id, &info).await {
            telemetry::record_sync(&notebook_id, "failed");
            tracing::error!(workload = %name, error = %source, "persisting proxy info failed");
            return Err(SpawnError::Persistence {
                id: notebook_id,
                source,
            });
        }
        telemetry::record_sync(&notebook_id, "ok");

        let correlation_id = self.observations.correlation_or_generate(&name).await;
        self.publish(
            &name,
            correlation_id,
            LifecycleEventPayload::Synced { phase: info.phase },
        )
        .await;
        Ok(info)
    }

    async fn latest_status(&self, name: &str) -> Option<StatusEvent> {
        match self.orchestrator.status(name).await {
            Ok(Some(status)) => return Some(status),
            Ok(None) => {
                tracing::debug!(workload = %name, "no live status; using last observation");
            }
            Err(err) => {
                tracing::warn!(workload = %name, error = %err, "live status unavailable; using last observation");
            }
        }
        self.observations.latest(name).await
    }

    /// Persisted snapshot for `descriptor`, as last written by a sync.
    pub async fn proxy_info<D>(&self, descriptor: &D) -> Result<Option<ProxyInfo>, SpawnError>
    where
        D: NotebookDeployment + Sync + ?Sized,
    {
        let id = descriptor.deployment_id();
        let loaded = self.proxy_store.load(&id).await;
        loaded.map_err(|source| SpawnError::Persistence { id, source })
    }

    /// Number of watchers currently running.
    pub async fn active_watchers(&self) -> usize {
        self.watchers.len().await
    }

    /// Cancel every running watcher. Returns how many were signalled.
    pub async fn shutdown(&self) -> usize {
        let cancelled = self.watchers.cancel_all().await;
        tracing::info!(parent: &self.span, cancelled, "spawner shut down");
        cancelled
    }

    async fn publish(&self, name: &str, correlation_id: uuid::Uuid, payload: LifecycleEventPayload) {
        let event = LifecycleEvent::new(name, Some(correlation_id), payload);
        super::emit(self.events.as_ref(), event).await;
    }
}
