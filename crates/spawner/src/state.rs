use std::fmt;

use common::api::{AppInfo, Deployment};
use serde::{Deserialize, Serialize};

/// Remote lifecycle state derived from one observation; never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// No application and no deployment.
    Absent,
    /// A non-stopping deployment is in flight.
    Deploying,
    /// Exactly one healthy task; replacement or terminating tasks may linger.
    Ready,
    /// The application exists but is not ready.
    Degraded,
    /// A `StopApplication` deployment is in flight.
    StoppingDeploy,
    /// The delete deployment has drained. Only a waited stop reaches this;
    /// `observe` reports a missing application as `Absent`.
    Gone,
}

impl LifecycleState {
    /// Deployment presence wins over task inspection.
    pub fn observe(deployment: Option<&Deployment>, app: Option<&AppInfo>) -> Self {
        match (deployment, app) {
            (Some(deployment), _) if deployment.is_stopping() => LifecycleState::StoppingDeploy,
            (Some(_), _) => LifecycleState::Deploying,
            (None, Some(app)) if is_serving(app) => LifecycleState::Ready,
            (None, Some(_)) => LifecycleState::Degraded,
            (None, None) => LifecycleState::Absent,
        }
    }

    /// Status reported to the host framework.
    pub fn poll_status(self) -> PollStatus {
        match self {
            LifecycleState::StoppingDeploy => PollStatus::ShuttingDown,
            LifecycleState::Deploying => PollStatus::Pending,
            LifecycleState::Ready => PollStatus::Running,
            LifecycleState::Degraded | LifecycleState::Absent | LifecycleState::Gone => {
                PollStatus::Stopped
            }
        }
    }
}

/// Start-time readiness: exactly one task and exactly one healthy task; more
/// healthy tasks than that is not ready.
pub fn is_ready(app: &AppInfo) -> bool {
    app.tasks.len() == 1 && app.tasks_healthy == 1
}

/// Poll-time liveness: exactly one healthy task, whatever else is listed.
pub fn is_serving(app: &AppInfo) -> bool {
    app.tasks_healthy == 1
}

/// First deployment touching `app_id`, preferring one that stops it.
pub fn deployment_for<'a>(deployments: &'a [Deployment], app_id: &str) -> Option<&'a Deployment> {
    let mut affecting = deployments.iter().filter(|d| d.affects(app_id));
    let first = affecting.clone().next();
    affecting.find(|d| d.is_stopping()).or(first)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollStatus {
    Running,
    Pending,
    Stopped,
    ShuttingDown,
}

impl PollStatus {
    /// `None` while the workload is (or may become) alive.
    pub fn exit_status(self) -> Option<i32> {
        match self {
            PollStatus::Running | PollStatus::Pending => None,
            PollStatus::Stopped => Some(0),
            PollStatus::ShuttingDown => Some(1),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PollStatus::Running => "running",
            PollStatus::Pending => "pending",
            PollStatus::Stopped => "stopped",
            PollStatus::ShuttingDown => "shutting_down",
        }
    }
}

impl fmt::Display for PollStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The only state the host framework persists between restarts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnerState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
}

impl SpawnerState {
    pub fn for_app(app_id: impl Into<String>) -> Self {
        Self {
            container_name: Some(app_id.into()),
        }
    }

    /// Restores from a saved blob; missing keys leave the state empty.
    pub fn load(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value)
    }
}
