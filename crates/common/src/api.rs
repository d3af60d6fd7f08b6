//! Marathon v2 REST DTOs used by the spawner and its operator CLI.
//!
//! Field names follow Marathon's camelCase wire format. Only the subset the
//! spawner reads or writes is modelled; unknown response fields are ignored.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Deployment action Marathon reports while an application is being removed.
pub const STOP_APPLICATION_ACTION: &str = "StopApplication";

/// Deployment action Marathon reports while an application is being created.
pub const START_APPLICATION_ACTION: &str = "StartApplication";

/// Docker networking mode for the workload container.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum NetworkMode {
    /// Container gets its own network namespace; ports are mapped dynamically.
    #[default]
    Bridge,
    /// Container binds the agent's network directly.
    Host,
}

impl NetworkMode {
    /// Returns the canonical uppercase representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkMode::Bridge => "BRIDGE",
            NetworkMode::Host => "HOST",
        }
    }
}

impl std::fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NetworkMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "BRIDGE" => Ok(NetworkMode::Bridge),
            "HOST" => Ok(NetworkMode::Host),
            other => Err(format!("unsupported network mode: {other}")),
        }
    }
}

/// Application creation payload accepted by `POST /v2/apps`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppRequest {
    /// Absolute application id, e.g. `/jupyter/alice`.
    pub id: String,
    /// Shell command executed inside the container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmd: Option<String>,
    /// Environment passed to the container.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    /// CPU shares reserved for each instance.
    pub cpus: f64,
    /// Memory reserved for each instance (MiB).
    pub mem: f64,
    /// Number of instances; the spawner always requests one.
    pub instances: u32,
    /// Container definition.
    pub container: AppContainer,
    /// Placement constraints, passed through verbatim.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<Constraint>,
    /// Health checks Marathon runs against each task.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub health_checks: Vec<HealthCheck>,
}

/// Container section of an application definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppContainer {
    /// Containerizer type (always `DOCKER`).
    #[serde(rename = "type")]
    pub kind: String,
    /// Docker-specific settings.
    pub docker: DockerContainer,
    /// Volumes mounted into the container.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<ContainerVolume>,
}

/// Docker image and networking settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DockerContainer {
    /// Image reference.
    pub image: String,
    /// Network mode.
    pub network: NetworkMode,
    /// Port mappings; empty in host networking.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub port_mappings: Vec<ContainerPortMapping>,
}

/// One container port exposed through bridge networking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerPortMapping {
    /// Port the container listens on.
    pub container_port: u16,
    /// Host port; `0` asks Marathon to allocate one.
    pub host_port: u16,
    /// Transport protocol (`tcp`).
    pub protocol: String,
}

/// Access mode of a mounted volume.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum VolumeMode {
    /// Read/write.
    #[serde(rename = "RW")]
    ReadWrite,
    /// Read-only.
    #[serde(rename = "RO")]
    ReadOnly,
}

impl std::str::FromStr for VolumeMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "RW" => Ok(VolumeMode::ReadWrite),
            "RO" => Ok(VolumeMode::ReadOnly),
            other => Err(format!("unsupported volume mode: {other}")),
        }
    }
}

/// Volume mounted into the workload container.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerVolume {
    /// Path inside the container.
    pub container_path: String,
    /// Path on the agent; absent for external volumes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_path: Option<String>,
    /// Access mode.
    pub mode: VolumeMode,
    /// External (driver-provided) volume binding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external: Option<ExternalVolume>,
}

/// External volume provided by a volume driver.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExternalVolume {
    /// Volume name as known to the provider.
    pub name: String,
    /// Provider, e.g. `dvdi`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Provider-specific options.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,
}

/// Placement constraint in Marathon's `[field, operator, value?]` form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Constraint(pub Vec<String>);

/// Health check definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheck {
    /// Probe protocol (`TCP`).
    pub protocol: String,
    /// Fixed port to probe (host networking).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Index into the allocated ports to probe (bridge networking).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_index: Option<u32>,
    /// Seconds after task start during which failures are ignored.
    pub grace_period_seconds: u32,
    /// Seconds between probes.
    pub interval_seconds: u32,
    /// Seconds before a probe counts as failed.
    pub timeout_seconds: u32,
    /// Consecutive failures tolerated before the task is killed (`0` = never).
    pub max_consecutive_failures: u32,
}

/// Reference to a deployment embedded in an application response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeploymentRef {
    /// Deployment identifier.
    pub id: String,
}

/// Response of `POST /v2/apps`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppCreated {
    /// Application id as stored by Marathon.
    pub id: String,
    /// Deployments scheduled for the new application.
    #[serde(default)]
    pub deployments: Option<Vec<DeploymentRef>>,
}

/// Envelope of `GET /v2/apps/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppEnvelope {
    /// The application.
    pub app: AppInfo,
}

/// Observed application state including embedded tasks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct AppInfo {
    /// Application id.
    pub id: String,
    /// Declared instance count.
    #[serde(default)]
    pub instances: u32,
    /// Number of tasks passing all health checks.
    #[serde(default)]
    pub tasks_healthy: u32,
    /// Number of running tasks.
    #[serde(default)]
    pub tasks_running: u32,
    /// Number of staged tasks.
    #[serde(default)]
    pub tasks_staged: u32,
    /// Embedded tasks (requires `embed=app.tasks`).
    #[serde(default)]
    pub tasks: Vec<Task>,
    /// Deployments currently affecting the application.
    #[serde(default)]
    pub deployments: Vec<DeploymentRef>,
}

/// One running instance of an application.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Task identifier.
    pub id: String,
    /// Owning application id.
    #[serde(default)]
    pub app_id: String,
    /// Agent host name the task runs on.
    pub host: String,
    /// Host ports allocated to the task, in port-mapping order.
    #[serde(default)]
    pub ports: Vec<u16>,
    /// Time the task started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// Latest result per health check.
    #[serde(default)]
    pub health_check_results: Vec<HealthCheckResult>,
}

/// Latest outcome of one health check for a task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckResult {
    /// Whether the last probe succeeded.
    pub alive: bool,
    /// Consecutive failures observed.
    #[serde(default)]
    pub consecutive_failures: u32,
}

/// Response of `DELETE /v2/apps/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AppDeleted {
    /// Deployment tracking the removal.
    pub deployment_id: String,
    /// Configuration version created by the removal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// In-flight deployment as listed by `GET /v2/deployments`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    /// Deployment identifier.
    pub id: String,
    /// Configuration version the deployment rolls out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Application ids touched by the deployment.
    #[serde(default)]
    pub affected_apps: Vec<String>,
    /// Actions of the step currently executing.
    #[serde(default)]
    pub current_actions: Vec<DeploymentAction>,
    /// Index of the executing step.
    #[serde(default)]
    pub current_step: u32,
    /// Total number of steps.
    #[serde(default)]
    pub total_steps: u32,
}

impl Deployment {
    /// Whether the deployment touches `app_id`.
    pub fn affects(&self, app_id: &str) -> bool {
        self.affected_apps.iter().any(|id| id == app_id)
    }

    /// Whether any current action stops an application.
    pub fn is_stopping(&self) -> bool {
        self.current_actions
            .iter()
            .any(|action| action.action == STOP_APPLICATION_ACTION)
    }
}

/// One action inside a deployment step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeploymentAction {
    /// Action name, e.g. `StartApplication` or `StopApplication`.
    pub action: String,
    /// Application the action applies to.
    #[serde(default)]
    pub app: String,
}

/// Error body Marathon returns for rejected requests.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct MarathonErrorBody {
    /// Human readable message.
    #[serde(default)]
    pub message: String,
}
