use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use futures::channel::mpsc;
use futures::stream::BoxStream;
use parking_lot::Mutex;
use spawnq::*;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::{SILENT_IMAGE, UNRESOLVABLE_IMAGE};

/// Address the fake assigns to running workloads.
pub const FAKE_WORKLOAD_ADDRESS: &str = "10.42.0.7";

/// Failure the fake can be told to return from one of its operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InjectedFailure {
    Conflict,
    Invalid,
    NotFound,
    Transport,
}

impl InjectedFailure {
    fn error(self, name: &str) -> OrchestratorError {
        match self {
            InjectedFailure::Conflict => OrchestratorError::Conflict(name.to_string()),
            InjectedFailure::Invalid => OrchestratorError::Invalid(format!("{name}: injected")),
            InjectedFailure::NotFound => OrchestratorError::NotFound(name.to_string()),
            InjectedFailure::Transport => OrchestratorError::Transport("injected".to_string()),
        }
    }
}

#[derive(Clone, Debug)]
struct FakeWorkload {
    status: Option<StatusEvent>,
}

#[derive(Default)]
struct FakeState {
    workloads: HashMap<String, FakeWorkload>,
    subscribers: HashMap<String, Vec<mpsc::UnboundedSender<StatusEvent>>>,
    scripts: HashMap<String, Vec<StatusEvent>>,
    submitted: Vec<WorkloadSpec>,
    deleted: Vec<String>,
    fail_submit: Option<InjectedFailure>,
    fail_delete: Option<InjectedFailure>,
    fail_status: Option<InjectedFailure>,
    fail_subscribe: Option<InjectedFailure>,
}

impl FakeState {
    fn broadcast(&mut self, name: &str, event: StatusEvent) {
        if let Some(workload) = self.workloads.get_mut(name) {
            workload.status = Some(event.clone());
        }
        if let Some(senders) = self.subscribers.get_mut(name) {
            senders.retain(|tx| tx.unbounded_send(event.clone()).is_ok());
        }
    }
}

/// Scripted stand-in for a container orchestrator.
///
/// On submit, the status events scripted for the submitted image are pushed to
/// every subscriber of the workload name. Without a script, an image is
/// driven `Pending` then `Running`; [`UNRESOLVABLE_IMAGE`] stays `Pending`
/// with `ErrImagePull`, and [`SILENT_IMAGE`] reports nothing. Deleting a
/// workload leaves its status streams open; use [`FakeOrchestrator::close_streams`]
/// to end them.
#[derive(Clone, Default)]
pub struct FakeOrchestrator {
    state: Arc<Mutex<FakeState>>,
}

impl FakeOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Statuses to report, in order, for workloads running `image`.
    pub fn script(&self, image: &str, events: Vec<StatusEvent>) {
        self.state.lock().scripts.insert(image.to_string(), events);
    }

    pub fn fail_submit(&self, failure: Option<InjectedFailure>) {
        self.state.lock().fail_submit = failure;
    }

    pub fn fail_delete(&self, failure: Option<InjectedFailure>) {
        self.state.lock().fail_delete = failure;
    }

    pub fn fail_status(&self, failure: Option<InjectedFailure>) {
        self.state.lock().fail_status = failure;
    }

    pub fn fail_subscribe(&self, failure: Option<InjectedFailure>) {
        self.state.lock().fail_subscribe = failure;
    }

    /// Report `event` for its workload as if the orchestrator observed it.
    pub fn emit(&self, event: StatusEvent) {
        let name = event.name.clone();
        self.state.lock().broadcast(&name, event);
    }

    /// End every status stream for `name`.
    pub fn close_streams(&self, name: &str) {
        self.state.lock().subscribers.remove(name);
    }

    pub fn submitted(&self) -> Vec<WorkloadSpec> {
        self.state.lock().submitted.clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().deleted.clone()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.state.lock().workloads.contains_key(name)
    }

    /// Open status subscriptions for `name`.
    pub fn subscriber_count(&self, name: &str) -> usize {
        self.state
            .lock()
            .subscribers
            .get(name)
            .map(|senders| senders.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }

    fn default_script(image: &str) -> Vec<StatusEvent> {
        let pending = StatusEvent::new("", WorkloadPhase::Pending)
            .with_container(ContainerStatus::waiting("notebook", "ContainerCreating"));
        match image {
            SILENT_IMAGE => Vec::new(),
            UNRESOLVABLE_IMAGE => vec![
                pending,
                StatusEvent::new("", WorkloadPhase::Pending)
                    .with_container(ContainerStatus::waiting("notebook", "ErrImagePull")),
            ],
            _ => vec![
                pending,
                StatusEvent::new("", WorkloadPhase::Running)
                    .with_address(FAKE_WORKLOAD_ADDRESS)
                    .with_start_time(Utc::now())
                    .with_container(ContainerStatus::ready("notebook")),
            ],
        }
    }
}

#[async_trait]
impl Orchestrator for FakeOrchestrator {
    async fn submit(&self, spec: &WorkloadSpec) -> Result<WorkloadHandle, OrchestratorError> {
        let mut state = self.state.lock();
        if let Some(failure) = state.fail_submit {
            return Err(failure.error(&spec.name));
        }
        if spec.image.trim().is_empty() {
            return Err(OrchestratorError::Invalid("image must not be empty".into()));
        }
        if state.workloads.contains_key(&spec.name) {
            return Err(OrchestratorError::Conflict(spec.name.clone()));
        }

        state
            .workloads
            .insert(spec.name.clone(), FakeWorkload { status: None });
        state.submitted.push(spec.clone());
        tracing::debug!(workload = %spec.name, image = %spec.image, "fake workload created");

        let script = state
            .scripts
            .get(&spec.image)
            .cloned()
            .unwrap_or_else(|| Self::default_script(&spec.image));
        for mut event in script {
            event.name = spec.name.clone();
            event.observed_at = Utc::now();
            state.broadcast(&spec.name, event);
        }

        Ok(WorkloadHandle {
            name: spec.name.clone(),
            uid: Some(Uuid::new_v4().to_string()),
        })
    }

    async fn delete(&self, name: &str) -> Result<(), OrchestratorError> {
        let mut state = self.state.lock();
        if let Some(failure) = state.fail_delete {
            return Err(failure.error(name));
        }
        if state.workloads.remove(name).is_none() {
            return Err(OrchestratorError::NotFound(name.to_string()));
        }
        state.deleted.push(name.to_string());
        Ok(())
    }

    async fn status(&self, name: &str) -> Result<Option<StatusEvent>, OrchestratorError> {
        let state = self.state.lock();
        if let Some(failure) = state.fail_status {
            return Err(failure.error(name));
        }
        Ok(state
            .workloads
            .get(name)
            .and_then(|workload| workload.status.clone()))
    }

    async fn subscribe(
        &self,
        name: &str,
    ) -> Result<BoxStream<'static, StatusEvent>, OrchestratorError> {
        let mut state = self.state.lock();
        if let Some(failure) = state.fail_subscribe {
            return Err(failure.error(name));
        }
        let (tx, rx) = mpsc::unbounded();
        state
            .subscribers
            .entry(name.to_string())
            .or_default()
            .push(tx);
        Ok(rx.boxed())
    }
}
