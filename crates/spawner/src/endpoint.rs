use std::{fmt, net::IpAddr, sync::Arc};

use async_trait::async_trait;
use common::api::{AppInfo, NetworkMode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("application {app_id} has {count} tasks; exactly one is required")]
    TaskCount { app_id: String, count: usize },
    #[error("task {task_id} of {app_id} has no allocated host port")]
    NoAllocatedPort { app_id: String, task_id: String },
    #[error("failed to resolve host {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },
}

impl EndpointError {
    /// Precondition failures mean the observed application is not in a
    /// resolvable shape; resolution failures come from the network.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            EndpointError::TaskCount { .. } | EndpointError::NoAllocatedPort { .. }
        )
    }
}

/// Reachable address of a ready workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub ip: IpAddr,
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ip {
            IpAddr::V4(ip) => write!(f, "{ip}:{}", self.port),
            IpAddr::V6(ip) => write!(f, "[{ip}]:{}", self.port),
        }
    }
}

/// Picks the agent host and port of the single task of `app`.
///
/// Bridge networking uses the first host port Marathon allocated; host
/// networking uses the declared web port.
pub fn resolve(
    app: &AppInfo,
    mode: NetworkMode,
    web_port: u16,
) -> Result<(String, u16), EndpointError> {
    let [task] = app.tasks.as_slice() else {
        return Err(EndpointError::TaskCount {
            app_id: app.id.clone(),
            count: app.tasks.len(),
        });
    };

    let port = match mode {
        NetworkMode::Host => web_port,
        NetworkMode::Bridge => {
            task.ports
                .first()
                .copied()
                .ok_or_else(|| EndpointError::NoAllocatedPort {
                    app_id: app.id.clone(),
                    task_id: task.id.clone(),
                })?
        }
    };

    Ok((task.host.clone(), port))
}

#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn lookup(&self, host: &str) -> Result<IpAddr, EndpointError>;
}

pub type DynHostResolver = Arc<dyn HostResolver>;

/// System resolver through tokio; IPv4 answers are preferred.
#[derive(Debug, Clone, Copy, Default)]
pub struct DnsResolver;

#[async_trait]
impl HostResolver for DnsResolver {
    async fn lookup(&self, host: &str) -> Result<IpAddr, EndpointError> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(ip);
        }

        let resolve_err = |source| EndpointError::Resolve {
            host: host.to_string(),
            source,
        };
        let addrs: Vec<IpAddr> = tokio::net::lookup_host((host, 0))
            .await
            .map_err(resolve_err)?
            .map(|addr| addr.ip())
            .collect();

        addrs
            .iter()
            .find(|ip| ip.is_ipv4())
            .or_else(|| addrs.first())
            .copied()
            .ok_or_else(|| {
                resolve_err(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no addresses returned",
                ))
            })
    }
}

pub async fn resolve_endpoint(
    app: &AppInfo,
    mode: NetworkMode,
    web_port: u16,
    resolver: &dyn HostResolver,
) -> Result<Endpoint, EndpointError> {
    let (host, port) = resolve(app, mode, web_port)?;
    let ip = resolver.lookup(&host).await?;
    Ok(Endpoint { ip, port })
}
