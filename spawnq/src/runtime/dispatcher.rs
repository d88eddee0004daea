use std::any::type_name;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{Instrument, Span};

use crate::band::ScoreRange;
use crate::error::{QueueError, SpawnError};
use crate::lifecycle::{Orchestrator, Spawner, WatchHandle};
use crate::persistence::ProxyInfoStore;
use crate::queue::{OrderedStore, PriorityQueue};
use crate::shutdown::ShutdownToken;
use crate::telemetry;
use crate::workload::NotebookDescriptor;

use super::worker::WorkerConfig;

/// How long [`QueueDispatcher::shutdown`] waits for each worker.
const WORKER_JOIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of one dispatch attempt.
#[derive(Debug)]
pub enum DispatchStatus {
    /// A descriptor was dequeued and its workload submitted.
    Started(WatchHandle),
    /// Nothing in range.
    Idle,
    /// The dequeued payload was not a descriptor and has been dropped.
    Discarded,
    /// The dequeued descriptor was rejected by the orchestrator.
    Rejected(SpawnError),
}

/// Moves notebook descriptors from a [`PriorityQueue`] into a [`Spawner`].
///
/// Each dequeue is the queue's atomic pop, so any number of workers, here or
/// in other processes, can share one queue key without double-starting.
pub struct QueueDispatcher<S, O, P>
where
    S: OrderedStore + 'static,
    O: Orchestrator + 'static,
    P: ProxyInfoStore + 'static,
{
    queue: Arc<PriorityQueue<S>>,
    spawner: Arc<Spawner<O, P>>,
    shutdown_token: ShutdownToken,
    worker_handles: Mutex<Vec<tokio::task::JoinHandle<()>>>,
    span: Span,
}

impl<S, O, P> fmt::Debug for QueueDispatcher<S, O, P>
where
    S: OrderedStore + 'static,
    O: Orchestrator + 'static,
    P: ProxyInfoStore + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let worker_count = self
            .worker_handles
            .try_lock()
            .map(|handles| handles.len())
            .unwrap_or_default();

        f.debug_struct("QueueDispatcher")
            .field("queue", &self.queue.key())
            .field("store_type", &type_name::<S>())
            .field("orchestrator_type", &type_name::<O>())
            .field("worker_count", &worker_count)
            .field("shutdown_cancelled", &self.shutdown_token.is_cancelled())
            .finish()
    }
}

impl<S, O, P> QueueDispatcher<S, O, P>
where
    S: OrderedStore + 'static,
    O: Orchestrator + 'static,
    P: ProxyInfoStore + 'static,
{
    pub fn new(queue: Arc<PriorityQueue<S>>, spawner: Arc<Spawner<O, P>>) -> Self {
        let span = tracing::info_span!("spawnq.dispatcher", queue = %queue.key());
        Self {
            queue,
            spawner,
            shutdown_token: ShutdownToken::new(),
            worker_handles: Mutex::new(Vec::new()),
            span,
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn queue(&self) -> Arc<PriorityQueue<S>> {
        Arc::clone(&self.queue)
    }

    pub fn spawner(&self) -> Arc<Spawner<O, P>> {
        Arc::clone(&self.spawner)
    }

    pub fn shutdown_token(&self) -> ShutdownToken {
        self.shutdown_token.clone()
    }

    /// Dequeue the highest-priority descriptor in `range` and start it.
    ///
    /// # Errors
    ///
    /// Only ordered store failures are returned; an empty range is
    /// [`DispatchStatus::Idle`].
    pub async fn dispatch_next(&self, range: ScoreRange) -> Result<DispatchStatus, QueueError> {
        dispatch_next(&self.queue, &self.spawner, range).await
    }

    /// Spawn `parallelism` polling workers configured by `config`.
    pub async fn spawn_workers(&self, config: WorkerConfig, parallelism: usize) {
        let mut handles = self.worker_handles.lock().await;
        for i in 0..parallelism {
            let worker_id = format!("{}-w{}", config.worker_id, i);
            let queue = Arc::clone(&self.queue);
            let spawner = Arc::clone(&self.spawner);
            let shutdown = self.shutdown_token.clone();
            let worker_config = config.clone();
            let span = telemetry::dispatch_span(&self.span, &worker_id);

            let handle = tokio::spawn(
                worker_loop(worker_id, queue, spawner, shutdown, worker_config).instrument(span),
            );
            handles.push(handle);
        }
    }

    pub async fn worker_count(&self) -> usize {
        self.worker_handles.lock().await.len()
    }

    /// Stop every worker and wait for it to exit.
    ///
    /// Watchers already started keep running; stop them through the spawner.
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        tracing::info!(parent: &self.span, "shutting down queue dispatcher");

        self.shutdown_token.cancel();

        let handles = {
            let mut guard = self.worker_handles.lock().await;
            std::mem::take(&mut *guard)
        };

        for handle in handles {
            match tokio::time::timeout(WORKER_JOIN_TIMEOUT, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("dispatcher worker failed: {:?}", e),
                Err(_) => tracing::warn!("dispatcher worker timed out during shutdown"),
            }
        }

        tracing::info!(parent: &self.span, "queue dispatcher shutdown complete");
        Ok(())
    }
}

async fn dispatch_next<S, O, P>(
    queue: &PriorityQueue<S>,
    spawner: &Spawner<O, P>,
    range: ScoreRange,
) -> Result<DispatchStatus, QueueError>
where
    S: OrderedStore + 'static,
    O: Orchestrator + 'static,
    P: ProxyInfoStore + 'static,
{
    let payload = match queue.dequeue_highest(range).await {
        Ok(payload) => payload,
        Err(err) if err.is_empty() => return Ok(DispatchStatus::Idle),
        Err(err) => return Err(err),
    };

    let descriptor: NotebookDescriptor = match serde_json::from_slice(&payload) {
        Ok(descriptor) => descriptor,
        Err(err) => {
            tracing::error!(
                queue = %queue.key(),
                bytes = payload.len(),
                error = %err,
                "dropping queue entry that is not a notebook descriptor"
            );
            return Ok(DispatchStatus::Discarded);
        }
    };

    match spawner.start(&descriptor).await {
        Ok(handle) => {
            tracing::info!(notebook_id = %descriptor.id, workload = %handle.name(), "dispatched notebook");
            Ok(DispatchStatus::Started(handle))
        }
        Err(err) => {
            tracing::error!(notebook_id = %descriptor.id, error = %err, "dispatch failed");
            Ok(DispatchStatus::Rejected(err))
        }
    }
}

async fn worker_loop<S, O, P>(
    worker_id: String,
    queue: Arc<PriorityQueue<S>>,
    spawner: Arc<Spawner<O, P>>,
    shutdown: ShutdownToken,
    config: WorkerConfig,
) where
    S: OrderedStore + 'static,
    O: Orchestrator + 'static,
    P: ProxyInfoStore + 'static,
{
    let range = config.score_range();
    let poll_interval = Duration::from_millis(config.poll_interval_ms);
    let backoff = Duration::from_millis(config.backoff_ms);

    loop {
        if shutdown.is_cancelled() {
            tracing::info!("worker {} shutting down", worker_id);
            break;
        }

        let pause = match dispatch_next(&queue, &spawner, range).await {
            Ok(DispatchStatus::Idle) => Some(poll_interval),
            Ok(_) => None,
            Err(err) => {
                tracing::warn!(worker = %worker_id, error = %err, "dequeue failed; backing off");
                Some(backoff)
            }
        };

        if let Some(pause) = pause {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("worker {} shutting down", worker_id);
                    break;
                }
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }
}
