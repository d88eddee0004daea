//! Workload model: descriptors, capabilities, specs and observed status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use uuid::Uuid;

use crate::config::NotebookConfig;

/// Default prefix joined to a deployment id to name its workload.
pub const WORKLOAD_NAME_PREFIX: &str = "pod-";

/// Container wait reasons meaning the image will never become available
/// without outside intervention.
pub const IMAGE_PULL_FAILURE_REASONS: [&str; 4] = [
    "ErrImagePull",
    "ImagePullBackOff",
    "InvalidImageName",
    "ErrImageNeverPull",
];

pub fn is_image_pull_failure(reason: &str) -> bool {
    IMAGE_PULL_FAILURE_REASONS.contains(&reason)
}

/// Stable identifier derived for a workload's owner.
pub trait DeploymentIdProvider {
    fn deployment_id(&self) -> String;
}

/// Where the proxied notebook server is reachable.
pub trait ProxyInfoProvider {
    fn host(&self) -> String;
    fn port(&self) -> u16;
    fn base_url(&self) -> String;
}

/// Builds the orchestrator-native definition of a workload.
pub trait WorkloadFactory {
    fn new_workload_spec(&self, name: &str) -> WorkloadSpec;

    fn labels(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }
}

/// Everything the lifecycle controller needs from a descriptor.
pub trait NotebookDeployment: DeploymentIdProvider + WorkloadFactory + ProxyInfoProvider {}

impl<T> NotebookDeployment for T where T: DeploymentIdProvider + WorkloadFactory + ProxyInfoProvider {}

/// Workload name for `provider`: `prefix + deployment id`.
///
/// Pure, so stop and sync can always recompute it without a stored handle.
pub fn workload_name<P>(prefix: &str, provider: &P) -> String
where
    P: DeploymentIdProvider + ?Sized,
{
    format!("{prefix}{}", provider.deployment_id())
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct NotebookId(pub Uuid);

impl NotebookId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for NotebookId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for NotebookId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// A notebook session to run as a workload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotebookDescriptor {
    pub id: NotebookId,
    pub workspace_id: Option<String>,
    pub image: String,
    /// Directory the notebook server serves, normally the workspace.
    pub working_directory: String,
    pub proxy_base_url: String,
    /// Working directory of the notebook process inside the container.
    #[serde(default = "default_container_dir")]
    pub container_dir: String,
    #[serde(default = "default_notebook_port")]
    pub port: u16,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

fn default_notebook_port() -> u16 {
    NotebookConfig::default().port
}

fn default_container_dir() -> String {
    NotebookConfig::default().working_dir
}

fn default_bind_address() -> String {
    NotebookConfig::default().bind_address
}

impl NotebookDescriptor {
    pub fn new(
        id: NotebookId,
        image: impl Into<String>,
        working_directory: impl Into<String>,
        proxy_base_url: impl Into<String>,
    ) -> Self {
        Self {
            id,
            workspace_id: None,
            image: image.into(),
            working_directory: working_directory.into(),
            proxy_base_url: proxy_base_url.into(),
            container_dir: default_container_dir(),
            port: default_notebook_port(),
            bind_address: default_bind_address(),
        }
    }

    /// Descriptor for a notebook in `workspace_id`, with everything else from
    /// `config`. An empty `image` falls back to the configured default.
    pub fn from_config(
        config: &NotebookConfig,
        id: NotebookId,
        workspace_id: impl Into<String>,
        image: Option<String>,
    ) -> Self {
        let workspace_id = workspace_id.into();
        let working_directory = format!(
            "{}/batch-{}",
            config.batch_dir.trim_end_matches('/'),
            workspace_id
        );
        Self {
            id,
            workspace_id: Some(workspace_id),
            image: image
                .filter(|image| !image.trim().is_empty())
                .unwrap_or_else(|| config.default_image.clone()),
            working_directory,
            proxy_base_url: config.base_url.clone(),
            container_dir: config.working_dir.clone(),
            port: config.port,
            bind_address: config.bind_address.clone(),
        }
    }

    /// Base URL this notebook is served under, e.g. `/v1/notebooks/proxy/<id>/`.
    pub fn notebook_base_url(&self) -> String {
        format!("{}/{}/", self.proxy_base_url.trim_end_matches('/'), self.id)
    }
}

impl DeploymentIdProvider for NotebookDescriptor {
    fn deployment_id(&self) -> String {
        self.id.to_string()
    }
}

impl ProxyInfoProvider for NotebookDescriptor {
    fn host(&self) -> String {
        self.bind_address.clone()
    }

    fn port(&self) -> u16 {
        self.port
    }

    fn base_url(&self) -> String {
        self.notebook_base_url()
    }
}

impl WorkloadFactory for NotebookDescriptor {
    fn new_workload_spec(&self, name: &str) -> WorkloadSpec {
        WorkloadSpec {
            name: name.to_string(),
            image: self.image.clone(),
            command: vec!["start-notebook.sh".to_string()],
            args: vec![
                format!("--NotebookApp.base_url={}", self.base_url()),
                format!("--NotebookApp.ip={}", self.host()),
                format!("--NotebookApp.port={}", self.port()),
                format!("--NotebookApp.notebook_dir={}", self.working_directory),
                "--NotebookApp.token=''".to_string(),
            ],
            working_dir: self.container_dir.clone(),
            namespace: String::new(),
            port: self.port(),
            labels: self.labels(),
            env: BTreeMap::new(),
        }
    }

    fn labels(&self) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::new();
        labels.insert("service".to_string(), "notebook".to_string());
        labels.insert("notebook".to_string(), self.deployment_id());
        if let Some(workspace) = &self.workspace_id {
            labels.insert("workspace".to_string(), workspace.clone());
        }
        labels
    }
}

/// Orchestrator-neutral single-container workload definition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadSpec {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    pub args: Vec<String>,
    pub working_dir: String,
    /// Orchestrator namespace; filled in by the spawner from its config.
    #[serde(default)]
    pub namespace: String,
    pub port: u16,
    pub labels: BTreeMap<String, String>,
    pub env: BTreeMap<String, String>,
}

/// Returned by the orchestrator once a workload is accepted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadHandle {
    pub name: String,
    pub uid: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum WorkloadPhase {
    Pending,
    Running,
    Failed,
    Succeeded,
    #[default]
    Unknown,
}

impl WorkloadPhase {
    /// Whether a watcher stops on this phase.
    pub fn is_terminal(self) -> bool {
        !matches!(self, WorkloadPhase::Pending)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkloadPhase::Pending => "Pending",
            WorkloadPhase::Running => "Running",
            WorkloadPhase::Failed => "Failed",
            WorkloadPhase::Succeeded => "Succeeded",
            WorkloadPhase::Unknown => "Unknown",
        }
    }
}

impl Display for WorkloadPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStatus {
    pub name: String,
    pub waiting_reason: Option<String>,
    pub terminated_reason: Option<String>,
    pub ready: bool,
}

impl ContainerStatus {
    pub fn waiting(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            waiting_reason: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn ready(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ready: true,
            ..Self::default()
        }
    }
}

/// One observation of a workload's status.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub name: String,
    pub phase: WorkloadPhase,
    pub address: Option<String>,
    pub message: String,
    pub reason: String,
    pub start_time: Option<DateTime<Utc>>,
    pub containers: Vec<ContainerStatus>,
    pub observed_at: DateTime<Utc>,
}

impl StatusEvent {
    pub fn new(name: impl Into<String>, phase: WorkloadPhase) -> Self {
        Self {
            name: name.into(),
            phase,
            address: None,
            message: String::new(),
            reason: String::new(),
            start_time: None,
            containers: Vec::new(),
            observed_at: Utc::now(),
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_container(mut self, container: ContainerStatus) -> Self {
        self.containers.push(container);
        self
    }

    pub fn with_message(mut self, reason: impl Into<String>, message: impl Into<String>) -> Self {
        self.reason = reason.into();
        self.message = message.into();
        self
    }

    pub fn with_start_time(mut self, start_time: DateTime<Utc>) -> Self {
        self.start_time = Some(start_time);
        self
    }

    /// First container wait reason in the image-pull failure class.
    pub fn image_pull_failure(&self) -> Option<&str> {
        self.containers
            .iter()
            .filter_map(|c| c.waiting_reason.as_deref())
            .find(|reason| is_image_pull_failure(reason))
    }
}

/// Persisted snapshot of where a notebook is and what state it is in.
///
/// Always replaced as a whole; never merged field by field.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyInfo {
    pub address: String,
    pub port: u16,
    pub phase: WorkloadPhase,
    pub message: String,
    pub reason: String,
    pub start_time: Option<DateTime<Utc>>,
}

impl ProxyInfo {
    pub fn from_status(status: &StatusEvent, port: u16) -> Self {
        Self {
            address: status.address.clone().unwrap_or_default(),
            port,
            phase: status.phase,
            message: status.message.clone(),
            reason: status.reason.clone(),
            start_time: status.start_time,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> NotebookDescriptor {
        let id = NotebookId(Uuid::parse_str("5a094b3f-2517-e191-e088-e65c00000000").unwrap());
        NotebookDescriptor::new(
            id,
            "jupyter/minimal-notebook",
            "/data/batch-ws1",
            "/v1/notebooks/proxy",
        )
    }

    #[test]
    fn test_workload_name_is_deterministic() {
        let nb = descriptor();
        let first = workload_name(WORKLOAD_NAME_PREFIX, &nb);
        let second = workload_name(WORKLOAD_NAME_PREFIX, &nb.clone());
        assert_eq!(first, second);
        assert_eq!(first, "pod-5a094b3f2517e191e088e65c00000000");
    }

    #[test]
    fn test_workload_spec_carries_notebook_settings() {
        let nb = descriptor();
        let spec = nb.new_workload_spec("pod-x");
        assert_eq!(spec.name, "pod-x");
        assert_eq!(spec.image, "jupyter/minimal-notebook");
        assert_eq!(spec.working_dir, "/home/jovyan");
        assert!(
            spec.args
                .iter()
                .any(|a| a == "--NotebookApp.notebook_dir=/data/batch-ws1")
        );
        assert!(
            spec.args
                .iter()
                .any(|a| a == "--NotebookApp.base_url=/v1/notebooks/proxy/5a094b3f2517e191e088e65c00000000/")
        );
        assert_eq!(spec.labels.get("service").map(String::as_str), Some("notebook"));
    }

    #[test]
    fn test_from_config_fills_defaults() {
        let config = NotebookConfig::default();
        let nb = NotebookDescriptor::from_config(&config, NotebookId::new(), "ws1", Some(" ".into()));
        assert_eq!(nb.image, config.default_image);
        assert!(nb.working_directory.ends_with("/batch-ws1"));
        assert_eq!(nb.workspace_id.as_deref(), Some("ws1"));
    }

    #[test]
    fn test_configured_working_dir_reaches_workload_spec() {
        let config = NotebookConfig {
            working_dir: "/custom/workdir".to_string(),
            ..NotebookConfig::default()
        };
        let nb = NotebookDescriptor::from_config(&config, NotebookId::new(), "ws1", None);
        let spec = nb.new_workload_spec("pod-x");

        assert_eq!(spec.working_dir, "/custom/workdir");
        assert!(
            spec.args
                .iter()
                .any(|a| a == "--NotebookApp.notebook_dir=/data/batch/batch-ws1")
        );
        assert!(!spec.args.iter().any(|a| a.contains("/custom/workdir")));
    }

    #[test]
    fn test_image_pull_failure_detection() {
        let event = StatusEvent::new("pod-a", WorkloadPhase::Pending)
            .with_container(ContainerStatus::waiting("sidecar", "ContainerCreating"))
            .with_container(ContainerStatus::waiting("notebook", "ImagePullBackOff"));
        assert_eq!(event.image_pull_failure(), Some("ImagePullBackOff"));

        let event = StatusEvent::new("pod-a", WorkloadPhase::Pending)
            .with_container(ContainerStatus::waiting("notebook", "ContainerCreating"));
        assert_eq!(event.image_pull_failure(), None);
    }

    #[test]
    fn test_proxy_info_replaces_every_field() {
        let started = Utc::now();
        let event = StatusEvent::new("pod-a", WorkloadPhase::Running)
            .with_address("10.0.0.7")
            .with_start_time(started);
        let info = ProxyInfo::from_status(&event, 8888);
        assert_eq!(info.address, "10.0.0.7");
        assert_eq!(info.port, 8888);
        assert_eq!(info.phase, WorkloadPhase::Running);
        assert_eq!(info.start_time, Some(started));
        assert!(ProxyInfo::default().is_empty());
        assert_eq!(ProxyInfo::default().phase, WorkloadPhase::Unknown);
    }

    #[test]
    fn test_descriptor_round_trips_as_queue_payload() {
        let nb = descriptor();
        let bytes = serde_json::to_vec(&nb).unwrap();
        let back: NotebookDescriptor = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, nb);
    }
}
