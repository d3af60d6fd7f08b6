use std::{sync::Arc, time::Duration};

use common::api::{AppInfo, AppRequest};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{Instrument, debug, error, info, info_span};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    convergence::{Step, converge},
    descriptor::WorkloadDescriptor,
    endpoint::{DnsResolver, DynHostResolver, Endpoint, EndpointError, resolve_endpoint},
    executor::RemoteExecutor,
    marathon::{DynMarathonApi, MarathonError},
    overlay::{self, OverlayError, OverlaySettings},
    request::{RequestBuilder, ValidationError},
    state::{self, LifecycleState, PollStatus},
    telemetry,
    with_request_id,
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum SpawnError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Overlay(#[from] OverlayError),
    #[error(transparent)]
    Marathon(#[from] MarathonError),
    #[error(transparent)]
    Endpoint(#[from] EndpointError),
    #[error("marathon accepted {app_id} but scheduled no deployment")]
    NotScheduled { app_id: String },
}

impl SpawnError {
    /// Network-level failures the host may retry later.
    pub fn is_transport(&self) -> bool {
        match self {
            SpawnError::Marathon(err) => err.is_transport(),
            SpawnError::Endpoint(EndpointError::Resolve { .. }) => true,
            _ => false,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            SpawnError::Validation(_) => "invalid",
            SpawnError::Overlay(_) => "overlay_error",
            SpawnError::Marathon(MarathonError::Rejected { .. }) => "rejected",
            SpawnError::Marathon(_) => "marathon_error",
            SpawnError::Endpoint(_) => "endpoint_error",
            SpawnError::NotScheduled { .. } => "not_scheduled",
        }
    }
}

/// Drives one tenant application through start, stop and poll.
///
/// Holds no per-tenant state: every call derives what it needs from the
/// application id and the orchestrator's answers, so calls for the same
/// tenant may overlap and any call may be dropped at an await point.
#[derive(Clone)]
pub struct LifecycleController {
    api: DynMarathonApi,
    executor: RemoteExecutor,
    builder: RequestBuilder,
    resolver: DynHostResolver,
    poll_interval: Duration,
    overlay: Option<OverlaySettings>,
}

impl LifecycleController {
    pub fn new(api: DynMarathonApi) -> Self {
        Self {
            api,
            executor: RemoteExecutor::default(),
            builder: RequestBuilder::default(),
            resolver: Arc::new(DnsResolver),
            poll_interval: DEFAULT_POLL_INTERVAL,
            overlay: None,
        }
    }

    pub fn from_config(cfg: &AppConfig, api: DynMarathonApi, executor: RemoteExecutor) -> Self {
        Self::new(api)
            .with_executor(executor)
            .with_poll_interval(cfg.poll_interval())
            .with_overlay(cfg.overlay_settings())
    }

    pub fn with_executor(mut self, executor: RemoteExecutor) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_request_builder(mut self, builder: RequestBuilder) -> Self {
        self.builder = builder;
        self
    }

    pub fn with_resolver(mut self, resolver: DynHostResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_overlay(mut self, overlay: Option<OverlaySettings>) -> Self {
        self.overlay = overlay;
        self
    }

    /// Creation payload for `descriptor` after the tenant overlay.
    pub async fn render(&self, descriptor: &WorkloadDescriptor) -> Result<AppRequest, SpawnError> {
        let descriptor = match &self.overlay {
            Some(settings) => overlay::apply(descriptor, settings).await?,
            None => descriptor.clone(),
        };
        Ok(self.builder.build(&descriptor)?)
    }

    /// Creates the application and waits until its single task is healthy.
    pub async fn start(&self, descriptor: &WorkloadDescriptor) -> Result<Endpoint, SpawnError> {
        let app_id = descriptor.app_id();
        let request_id = Uuid::new_v4().to_string();
        let span = info_span!("start", app_id = %app_id, request_id = %request_id);
        let started = Instant::now();

        let result = with_request_id(
            request_id,
            self.start_inner(descriptor, &app_id).instrument(span),
        )
        .await;

        let label = match &result {
            Ok(_) => "ready",
            Err(err) => err.label(),
        };
        telemetry::record_start_result(label);
        telemetry::record_start_duration(label, started.elapsed());
        result
    }

    async fn start_inner(
        &self,
        descriptor: &WorkloadDescriptor,
        app_id: &str,
    ) -> Result<Endpoint, SpawnError> {
        let request = self.render(descriptor).await.map_err(|err| {
            error!(error = %err, "refusing to create application");
            err
        })?;

        let created = self
            .executor
            .run(self.api.create_app(&request))
            .await
            .map_err(|err| {
                error!(error = %err, "create application failed");
                err
            })?;

        let deployment_id = created
            .deployments
            .as_ref()
            .and_then(|deployments| deployments.first())
            .map(|deployment| deployment.id.clone());
        let Some(deployment_id) = deployment_id else {
            error!("marathon returned no deployment for the new application");
            return Err(SpawnError::NotScheduled {
                app_id: app_id.to_string(),
            });
        };
        info!(%deployment_id, "application created; waiting for a healthy task");

        let app = converge("start", self.poll_interval, |attempt| {
            self.readiness_step(app_id, attempt)
        })
        .await?;

        // Read back from the payload so overlay overrides apply.
        let network_mode = request.container.docker.network;
        let web_port = request
            .health_checks
            .first()
            .and_then(|check| check.port)
            .unwrap_or_default();
        let endpoint =
            resolve_endpoint(&app, network_mode, web_port, self.resolver.as_ref()).await?;
        info!(%endpoint, "workload ready");
        Ok(endpoint)
    }

    async fn readiness_step(
        &self,
        app_id: &str,
        attempt: u64,
    ) -> Result<Step<AppInfo>, MarathonError> {
        match self.executor.run(self.api.get_app(app_id)).await? {
            None => {
                debug!(attempt, "application not visible yet");
                Ok(Step::Retry)
            }
            Some(app) if state::is_ready(&app) => Ok(Step::Ready(app)),
            Some(app) => {
                debug!(
                    attempt,
                    tasks = app.tasks.len(),
                    healthy = app.tasks_healthy,
                    "waiting for a healthy task"
                );
                Ok(Step::Retry)
            }
        }
    }

    /// Deletes the application; unless `now`, waits until the removal
    /// deployment has left Marathon's deployment list.
    pub async fn stop(&self, app_id: &str, now: bool) -> Result<(), SpawnError> {
        let request_id = Uuid::new_v4().to_string();
        let span = info_span!("stop", app_id = %app_id, request_id = %request_id, now);

        let result = with_request_id(request_id, self.stop_inner(app_id, now).instrument(span)).await;

        let label = match (&result, now) {
            (Ok(()), true) => "deleted",
            (Ok(()), false) => "drained",
            (Err(err), _) => err.label(),
        };
        telemetry::record_stop_result(label);
        result
    }

    async fn stop_inner(&self, app_id: &str, now: bool) -> Result<(), SpawnError> {
        let deleted = self
            .executor
            .run(self.api.delete_app(app_id))
            .await
            .map_err(|err| {
                error!(error = %err, "delete application failed");
                err
            })?;
        let deployment_id = deleted.deployment_id;
        info!(%deployment_id, "delete issued");

        if now {
            return Ok(());
        }

        converge("stop", self.poll_interval, |attempt| {
            self.drain_step(&deployment_id, attempt)
        })
        .await?;
        info!(%deployment_id, state = ?LifecycleState::Gone, "deployment drained");
        Ok(())
    }

    async fn drain_step(&self, deployment_id: &str, attempt: u64) -> Result<Step<()>, MarathonError> {
        let deployments = self.executor.run(self.api.list_deployments()).await?;
        if deployments.iter().any(|d| d.id == deployment_id) {
            debug!(attempt, %deployment_id, "removal still deploying");
            Ok(Step::Retry)
        } else {
            Ok(Step::Ready(()))
        }
    }

    /// Current remote state of `app_id`. Deployments are listed first and
    /// win over task inspection.
    pub async fn observe(&self, app_id: &str) -> Result<LifecycleState, MarathonError> {
        let deployments = self.executor.run(self.api.list_deployments()).await?;
        if let Some(deployment) = state::deployment_for(&deployments, app_id) {
            debug!(deployment_id = %deployment.id, "deployment in flight");
            return Ok(LifecycleState::observe(Some(deployment), None));
        }

        let app = self.executor.run(self.api.get_app(app_id)).await?;
        Ok(LifecycleState::observe(None, app.as_ref()))
    }

    pub async fn poll(&self, app_id: &str) -> Result<PollStatus, SpawnError> {
        let request_id = Uuid::new_v4().to_string();
        let span = info_span!("poll", app_id = %app_id, request_id = %request_id);

        let state = with_request_id(request_id, self.observe(app_id).instrument(span.clone()))
            .await
            .map_err(|err| {
                span.in_scope(|| error!(error = %err, "poll failed"));
                telemetry::record_poll_status("error");
                err
            })?;

        let status = state.poll_status();
        span.in_scope(|| debug!(?state, %status, "poll"));
        telemetry::record_poll_status(status.as_str());
        Ok(status)
    }
}
