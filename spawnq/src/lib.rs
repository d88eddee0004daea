//! spawnq - priority work queue and notebook workload lifecycle.
//!
//! Pending notebook sessions wait in a score-ordered queue; dispatcher
//! workers pop them atomically and hand them to a lifecycle controller that
//! submits the workload to a container orchestrator, watches its status and
//! persists where the notebook can be reached.
//!
//! # Core Concepts
//!
//! - **Queue**: [`PriorityQueue`] stores opaque payloads under a score in an
//!   [`OrderedStore`]. Lower scores dispatch first; [`PriorityBand`] maps
//!   High/Medium/Low onto the score axis. Dequeue is a single atomic pop.
//!
//! - **Workloads**: a [`NotebookDescriptor`] supplies the capabilities the
//!   controller needs ([`DeploymentIdProvider`], [`WorkloadFactory`],
//!   [`ProxyInfoProvider`]). Workload names are derived, never stored.
//!
//! - **Lifecycle**: [`Spawner`] starts, stops and syncs workloads through an
//!   [`Orchestrator`]. Each start runs one background watcher that classifies
//!   status events and persists the terminal snapshot.
//!
//! - **Persistence**: [`ProxyInfoStore`] holds the latest [`ProxyInfo`] per
//!   notebook, replaced as a whole on every write.
//!
//! - **Runtime**: [`QueueDispatcher`] runs worker pools that connect the
//!   queue to the spawner.
//!
//! - **Events**: [`InProcEventBus`] broadcasts [`LifecycleEvent`]s.
//!
//! # Feature Flags
//!
//! - `redis` - Redis sorted-set ordered store
//! - `postgres` - PostgreSQL proxy info store via sqlx
//! - `metrics` - Prometheus metrics support
//!
//! # Example
//!
//! ```ignore
//! use spawnq::*;
//!
//! let queue = PriorityQueue::new(RedisOrderedStore::new("redis://127.0.0.1/")?, "spawnq:queue");
//! queue.enqueue_json(PriorityBand::High, &descriptor).await?;
//!
//! let descriptor: NotebookDescriptor = queue.dequeue_json(ScoreRange::all()).await?;
//! let watch = spawner.start(&descriptor).await?;
//! ```

/// Priority bands and score ranges.
pub mod band;

/// Configuration structures for the queue, notebooks, spawner and persistence.
pub mod config;

/// Typed errors for every collaborator seam.
pub mod error;

/// Lifecycle event bus.
///
/// The `events` module provides [`LifecycleEventPublisher`], the
/// [`LifecycleEvent`] envelope and [`InProcEventBus`] for in-process
/// broadcasting.
pub mod events;

/// Workload lifecycle controller, status watchers and the orchestrator seam.
pub mod lifecycle;

#[cfg(feature = "metrics")]
/// Prometheus metrics.
pub mod metrics;

/// Latest watcher observation per workload.
pub mod observation;

/// Durable proxy info store and store backends.
pub mod persistence;

/// Priority queue over an ordered store.
///
/// The `queue` module defines the [`OrderedStore`] transport trait,
/// [`PriorityQueue`] and [`QueueSnapshot`] for monitoring queue depth.
pub mod queue;

/// Dispatcher workers connecting the queue to the spawner.
pub mod runtime;

/// Cooperative cancellation.
pub mod shutdown;

/// Tracing spans and telemetry recorders.
pub mod telemetry;

/// Workload model: descriptors, capabilities, specs and status.
pub mod workload;

pub use band::*;
pub use config::*;
pub use error::*;
pub use events::*;
pub use lifecycle::{
    Classification, Orchestrator, Spawner, SpawnerBuilder, WatchExit, WatchHandle, WatchOutcome,
    classify,
};
pub use observation::*;
pub use persistence::ProxyInfoStore;
#[cfg(feature = "postgres")]
pub use persistence::PostgresProxyInfoStore;
#[cfg(feature = "redis")]
pub use persistence::RedisOrderedStore;
pub use queue::*;
pub use runtime::{DispatchStatus, QueueDispatcher, WorkerConfig};
pub use shutdown::ShutdownToken;
pub use workload::*;
