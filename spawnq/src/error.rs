use thiserror::Error;

/// Failure reported by an [`OrderedStore`](crate::queue::OrderedStore)
/// transport.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached or timed out.
    #[error("ordered store unavailable: {0}")]
    Unavailable(String),
    /// The store answered with something the client could not interpret.
    #[error("ordered store protocol error: {0}")]
    Protocol(String),
}

/// Errors surfaced by [`PriorityQueue`](crate::queue::PriorityQueue).
#[derive(Debug, Error)]
pub enum QueueError {
    /// Transport failure talking to the ordered store. Retryable by the caller.
    #[error(transparent)]
    StoreUnavailable(#[from] StoreError),
    /// No entry matched the requested score range.
    #[error("no queue entry in score range [{min}, {max}]")]
    QueueEmpty { min: f64, max: f64 },
    /// A typed helper failed to encode or decode a payload.
    #[error("payload codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

impl QueueError {
    /// Whether this is the expected "nothing to dequeue" outcome.
    pub fn is_empty(&self) -> bool {
        matches!(self, QueueError::QueueEmpty { .. })
    }
}

/// Errors returned by an [`Orchestrator`](crate::lifecycle::Orchestrator).
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("workload {0} already exists")]
    Conflict(String),
    #[error("invalid workload spec: {0}")]
    Invalid(String),
    #[error("workload {0} not found")]
    NotFound(String),
    #[error("orchestrator transport error: {0}")]
    Transport(String),
}

/// Errors returned by a [`ProxyInfoStore`](crate::persistence::ProxyInfoStore).
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("durable store unavailable: {0}")]
    Unavailable(String),
    #[error("proxy info codec error: {0}")]
    Codec(String),
}

/// Errors surfaced by the lifecycle controller.
#[derive(Debug, Error)]
pub enum SpawnError {
    /// The orchestrator rejected the workload; no watcher was started.
    #[error("submission of workload {name} rejected")]
    Submission {
        name: String,
        #[source]
        source: OrchestratorError,
    },
    /// Deletion failed for a reason other than the workload being absent.
    #[error("teardown of workload {name} failed")]
    Teardown {
        name: String,
        #[source]
        source: OrchestratorError,
    },
    /// Writing the proxy info snapshot failed. Retry the sync.
    #[error("persisting proxy info for {id} failed")]
    Persistence {
        id: String,
        #[source]
        source: PersistenceError,
    },
    /// Neither the orchestrator nor a watcher has a status for this workload.
    #[error("no status known for workload {name}")]
    StatusUnavailable { name: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_queue_empty_is_not_transport() {
        let err = QueueError::QueueEmpty { min: 0.0, max: 1.0 };
        assert!(err.is_empty());

        let err: QueueError = StoreError::Unavailable("reset".into()).into();
        assert!(!err.is_empty());
        assert!(err.to_string().contains("reset"));
    }

    #[test]
    fn test_spawn_error_keeps_source() {
        let err = SpawnError::Submission {
            name: "pod-abc".into(),
            source: OrchestratorError::Conflict("pod-abc".into()),
        };
        assert!(err.to_string().contains("pod-abc"));
        assert!(err.source().is_some());
    }
}
