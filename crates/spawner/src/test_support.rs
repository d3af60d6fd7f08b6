use std::collections::VecDeque;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use common::api::{
    AppCreated, AppDeleted, AppInfo, AppRequest, Deployment, DeploymentAction, DeploymentRef,
    NetworkMode, Task,
};

use crate::{
    config::AppConfig,
    descriptor::WorkloadDescriptor,
    endpoint::{EndpointError, HostResolver},
    marathon::{MarathonApi, MarathonError},
    overlay::OverlayPolicy,
};

pub(crate) fn base_config() -> AppConfig {
    AppConfig {
        marathon_url: "http://127.0.0.1:8080".into(),
        marathon_username: None,
        marathon_password: None,
        request_timeout_secs: 5,
        allow_insecure_http: true,
        app_prefix: "jupyter".into(),
        app_image: "jupyterhub/singleuser".into(),
        app_cmd: "jupyterhub-singleuser".into(),
        cpu_limit: 1.0,
        mem_limit: None,
        user_web_port: 0,
        user_ssh_port: 0,
        ports: vec![8888],
        network_mode: NetworkMode::Bridge,
        volumes: Vec::new(),
        constraints: Vec::new(),
        custom_env: Default::default(),
        hub_api_url: "http://127.0.0.1:8081/hub/api".into(),
        hub_prefix: "/hub/".into(),
        hub_cookie_name: "jupyterhub-services".into(),
        user_base_url: "/user/{username}/".into(),
        hub_ip_connect: None,
        hub_port_connect: None,
        notebook_dir: None,
        poll_interval_ms: 1_000,
        remote_concurrency: 1,
        user_file: None,
        overlay: OverlayPolicy::default(),
    }
}

pub(crate) fn sample_descriptor(tenant: &str) -> WorkloadDescriptor {
    base_config().descriptor(tenant)
}

pub(crate) fn task_on(host: &str, ports: &[u16]) -> Task {
    Task {
        id: format!("{host}.task"),
        host: host.to_string(),
        ports: ports.to_vec(),
        ..Default::default()
    }
}

pub(crate) fn app_with_tasks(id: &str, tasks: Vec<Task>, healthy: u32) -> AppInfo {
    AppInfo {
        id: id.to_string(),
        instances: 1,
        tasks_healthy: healthy,
        tasks_running: tasks.len() as u32,
        tasks,
        ..Default::default()
    }
}

pub(crate) fn deployment(id: &str, app_id: &str, action: &str) -> Deployment {
    Deployment {
        id: id.to_string(),
        affected_apps: vec![app_id.to_string()],
        current_actions: vec![DeploymentAction {
            action: action.to_string(),
            app: app_id.to_string(),
        }],
        current_step: 1,
        total_steps: 1,
        ..Default::default()
    }
}

/// Scripted Marathon. Queues are consumed front to back; an empty queue
/// answers with a neutral value (created with one deployment, no app, no
/// deployments).
#[derive(Default)]
pub(crate) struct FakeMarathon {
    create_results: StdMutex<VecDeque<Result<AppCreated, MarathonError>>>,
    get_results: StdMutex<VecDeque<Result<Option<AppInfo>, MarathonError>>>,
    deployments: StdMutex<VecDeque<Result<Vec<Deployment>, MarathonError>>>,
    delete_deployment: StdMutex<Option<String>>,
    delete_errors: StdMutex<VecDeque<MarathonError>>,
    created: StdMutex<Vec<AppRequest>>,
    get_calls: AtomicUsize,
    delete_calls: AtomicUsize,
    list_calls: AtomicUsize,
}

impl FakeMarathon {
    pub(crate) fn push_create(&self, result: Result<AppCreated, MarathonError>) {
        self.create_results
            .lock()
            .expect("lock create")
            .push_back(result);
    }

    pub(crate) fn push_get(&self, app: Option<AppInfo>) {
        self.get_results.lock().expect("lock get").push_back(Ok(app));
    }

    pub(crate) fn push_get_error(&self, err: MarathonError) {
        self.get_results.lock().expect("lock get").push_back(Err(err));
    }

    pub(crate) fn push_deployments(&self, deployments: Vec<Deployment>) {
        self.deployments
            .lock()
            .expect("lock deployments")
            .push_back(Ok(deployments));
    }

    pub(crate) fn push_list_error(&self, err: MarathonError) {
        self.deployments
            .lock()
            .expect("lock deployments")
            .push_back(Err(err));
    }

    pub(crate) fn push_delete_error(&self, err: MarathonError) {
        self.delete_errors
            .lock()
            .expect("lock delete errors")
            .push_back(err);
    }

    pub(crate) fn set_delete_deployment(&self, id: &str) {
        *self.delete_deployment.lock().expect("lock delete") = Some(id.to_string());
    }

    pub(crate) fn created(&self) -> Vec<AppRequest> {
        self.created.lock().expect("lock created").clone()
    }

    pub(crate) fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarathonApi for FakeMarathon {
    async fn create_app(&self, request: &AppRequest) -> Result<AppCreated, MarathonError> {
        self.created
            .lock()
            .expect("lock created")
            .push(request.clone());
        self.create_results
            .lock()
            .expect("lock create")
            .pop_front()
            .unwrap_or_else(|| {
                Ok(AppCreated {
                    id: request.id.clone(),
                    deployments: Some(vec![DeploymentRef {
                        id: "d-create".into(),
                    }]),
                })
            })
    }

    async fn get_app(&self, _app_id: &str) -> Result<Option<AppInfo>, MarathonError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.get_results
            .lock()
            .expect("lock get")
            .pop_front()
            .unwrap_or(Ok(None))
    }

    async fn delete_app(&self, _app_id: &str) -> Result<AppDeleted, MarathonError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self
            .delete_errors
            .lock()
            .expect("lock delete errors")
            .pop_front()
        {
            return Err(err);
        }
        let deployment_id = self
            .delete_deployment
            .lock()
            .expect("lock delete")
            .clone()
            .unwrap_or_else(|| "d-delete".into());
        Ok(AppDeleted {
            deployment_id,
            version: None,
        })
    }

    async fn list_deployments(&self) -> Result<Vec<Deployment>, MarathonError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.deployments
            .lock()
            .expect("lock deployments")
            .pop_front()
            .unwrap_or(Ok(Vec::new()))
    }
}

/// Resolves every host to one address and remembers what was asked.
pub(crate) struct FixedResolver {
    ip: IpAddr,
    lookups: StdMutex<Vec<String>>,
}

impl FixedResolver {
    pub(crate) fn new(ip: IpAddr) -> Self {
        Self {
            ip,
            lookups: StdMutex::new(Vec::new()),
        }
    }

    pub(crate) fn lookups(&self) -> Vec<String> {
        self.lookups.lock().expect("lock lookups").clone()
    }
}

#[async_trait]
impl HostResolver for FixedResolver {
    async fn lookup(&self, host: &str) -> Result<IpAddr, EndpointError> {
        self.lookups
            .lock()
            .expect("lock lookups")
            .push(host.to_string());
        Ok(self.ip)
    }
}
