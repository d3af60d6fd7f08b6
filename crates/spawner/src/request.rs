use std::sync::Arc;

use common::api::{
    AppContainer, AppRequest, Constraint, ContainerPortMapping, ContainerVolume, DockerContainer,
    ExternalVolume, HealthCheck, NetworkMode, VolumeMode,
};
use thiserror::Error;

use crate::descriptor::{VolumeSpec, WorkloadDescriptor};
use crate::env::container_env;
use crate::template::{DynVolumeNameFormatter, UsernameFormatter, render_command};

pub const HEALTH_CHECK_PROTOCOL: &str = "TCP";
pub const HEALTH_CHECK_GRACE_PERIOD_SECS: u32 = 300;
pub const HEALTH_CHECK_INTERVAL_SECS: u32 = 60;
pub const HEALTH_CHECK_TIMEOUT_SECS: u32 = 20;
pub const HEALTH_CHECK_MAX_CONSECUTIVE_FAILURES: u32 = 0;
pub const DEFAULT_MEM_MIB: f64 = 1024.0;
pub const CONTAINER_TYPE: &str = "DOCKER";

const BYTES_PER_MIB: f64 = 1_048_576.0;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("tenant name cannot be empty")]
    EmptyTenant,
    #[error("application id {id} has invalid path segment {segment:?}")]
    AppId { id: String, segment: String },
    #[error("no container ports declared")]
    NoPorts,
    #[error("host networking requires a web port")]
    MissingWebPort,
    #[error("volume {index} has an empty container path")]
    EmptyContainerPath { index: usize },
    #[error("volume {index} has unsupported mode {mode:?}")]
    VolumeMode { index: usize, mode: String },
    #[error("volume {index} needs a host path or an external volume")]
    MissingVolumeSource { index: usize },
    #[error("external volume {index} has no name")]
    ExternalVolumeName { index: usize },
    #[error("constraint {index} must be an array of 2 or 3 strings, got {value}")]
    Constraint { index: usize, value: String },
    #[error("invalid hub api url {url}: {reason}")]
    HubApiUrl { url: String, reason: String },
}

/// Turns a [`WorkloadDescriptor`] into a Marathon application definition.
#[derive(Clone)]
pub struct RequestBuilder {
    formatter: DynVolumeNameFormatter,
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new(Arc::new(UsernameFormatter))
    }
}

impl RequestBuilder {
    pub fn new(formatter: DynVolumeNameFormatter) -> Self {
        Self { formatter }
    }

    pub fn build(&self, descriptor: &WorkloadDescriptor) -> Result<AppRequest, ValidationError> {
        if descriptor.tenant.trim().is_empty() {
            return Err(ValidationError::EmptyTenant);
        }
        let id = descriptor.app_id();
        if !is_path_segment(&descriptor.tenant) {
            return Err(ValidationError::AppId {
                id,
                segment: descriptor.tenant.clone(),
            });
        }
        validate_app_id(&id)?;
        if descriptor.ports.is_empty() {
            return Err(ValidationError::NoPorts);
        }
        if descriptor.network_mode == NetworkMode::Host && descriptor.web_port == 0 {
            return Err(ValidationError::MissingWebPort);
        }

        let volumes = self.volumes(descriptor)?;
        let constraints = constraints(&descriptor.constraints)?;
        let env = container_env(descriptor)?;

        Ok(AppRequest {
            id,
            cmd: Some(render_command(
                &descriptor.cmd,
                &descriptor.tenant,
                descriptor.web_port,
                descriptor.ssh_port,
            )),
            env,
            cpus: descriptor.cpu_limit,
            mem: memory_mib(descriptor.mem_limit),
            instances: 1,
            container: AppContainer {
                kind: CONTAINER_TYPE.to_string(),
                docker: DockerContainer {
                    image: descriptor.image.clone(),
                    network: descriptor.network_mode,
                    port_mappings: port_mappings(descriptor.network_mode, &descriptor.ports),
                },
                volumes,
            },
            constraints,
            health_checks: vec![health_check(descriptor.network_mode, descriptor.web_port)],
        })
    }

    pub fn volumes(
        &self,
        descriptor: &WorkloadDescriptor,
    ) -> Result<Vec<ContainerVolume>, ValidationError> {
        descriptor
            .volumes
            .iter()
            .enumerate()
            .map(|(index, spec)| self.volume(index, spec, &descriptor.tenant))
            .collect()
    }

    fn volume(
        &self,
        index: usize,
        spec: &VolumeSpec,
        tenant: &str,
    ) -> Result<ContainerVolume, ValidationError> {
        if spec.container_path.trim().is_empty() {
            return Err(ValidationError::EmptyContainerPath { index });
        }
        let mode = spec
            .mode
            .parse::<VolumeMode>()
            .map_err(|_| ValidationError::VolumeMode {
                index,
                mode: spec.mode.clone(),
            })?;

        let external = match &spec.external {
            Some(external) => {
                let name = external
                    .name
                    .as_deref()
                    .filter(|name| !name.trim().is_empty())
                    .ok_or(ValidationError::ExternalVolumeName { index })?;
                Some(ExternalVolume {
                    name: self.formatter.format(name, tenant),
                    provider: external.provider.clone(),
                    options: external.options.clone(),
                })
            }
            None => None,
        };

        let host_path = spec
            .host_path
            .as_deref()
            .filter(|path| !path.trim().is_empty())
            .map(|path| self.formatter.format(path, tenant));
        if host_path.is_none() && external.is_none() {
            return Err(ValidationError::MissingVolumeSource { index });
        }

        Ok(ContainerVolume {
            container_path: self.formatter.format(&spec.container_path, tenant),
            host_path,
            mode,
            external,
        })
    }
}

/// Bridge networking maps every port to a dynamically allocated host port;
/// host networking maps none.
pub fn port_mappings(mode: NetworkMode, ports: &[u16]) -> Vec<ContainerPortMapping> {
    match mode {
        NetworkMode::Bridge => ports
            .iter()
            .map(|port| ContainerPortMapping {
                container_port: *port,
                host_port: 0,
                protocol: "tcp".to_string(),
            })
            .collect(),
        NetworkMode::Host => Vec::new(),
    }
}

pub fn health_check(mode: NetworkMode, web_port: u16) -> HealthCheck {
    let (port, port_index) = match mode {
        NetworkMode::Host => (Some(web_port), None),
        NetworkMode::Bridge => (None, Some(0)),
    };
    HealthCheck {
        protocol: HEALTH_CHECK_PROTOCOL.to_string(),
        port,
        port_index,
        grace_period_seconds: HEALTH_CHECK_GRACE_PERIOD_SECS,
        interval_seconds: HEALTH_CHECK_INTERVAL_SECS,
        timeout_seconds: HEALTH_CHECK_TIMEOUT_SECS,
        max_consecutive_failures: HEALTH_CHECK_MAX_CONSECUTIVE_FAILURES,
    }
}

/// Marathon reserves memory in MiB.
pub fn memory_mib(limit_bytes: Option<u64>) -> f64 {
    match limit_bytes {
        Some(bytes) => bytes as f64 / BYTES_PER_MIB,
        None => DEFAULT_MEM_MIB,
    }
}

pub fn constraints(raw: &[serde_json::Value]) -> Result<Vec<Constraint>, ValidationError> {
    raw.iter()
        .enumerate()
        .map(|(index, value)| {
            let invalid = || ValidationError::Constraint {
                index,
                value: value.to_string(),
            };
            let fields = value.as_array().ok_or_else(invalid)?;
            if !(2..=3).contains(&fields.len()) {
                return Err(invalid());
            }
            fields
                .iter()
                .map(|field| field.as_str().map(str::to_string).ok_or_else(invalid))
                .collect::<Result<Vec<_>, _>>()
                .map(Constraint)
        })
        .collect()
}

/// Every segment of an absolute id must be a Marathon path segment:
/// dot-separated labels of `a-z0-9-` that neither start nor end with `-`.
pub fn validate_app_id(id: &str) -> Result<(), ValidationError> {
    for segment in id.trim_start_matches('/').split('/') {
        if !is_path_segment(segment) {
            return Err(ValidationError::AppId {
                id: id.to_string(),
                segment: segment.to_string(),
            });
        }
    }
    Ok(())
}

fn is_path_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment.split('.').all(|label| {
            !label.is_empty()
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label
                    .bytes()
                    .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
        })
}
