use std::collections::BTreeMap;

use common::api::NetworkMode;
use serde::{Deserialize, Serialize};

/// Front-end URLs and cookie the workload needs to call back into the hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubContext {
    /// Hub API URL as seen by the hub itself.
    pub api_url: String,
    /// Hub URL prefix, e.g. `/hub/`.
    pub prefix: String,
    /// Session cookie name.
    pub cookie_name: String,
    /// Per-user server prefix, e.g. `/user/alice/`.
    pub base_url: String,
}

/// Volume as configured by operators, in Marathon's REST shape.
///
/// Paths and the external volume name may contain `{username}`; mode is kept
/// as text so malformed values surface as validation errors at build time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSpec {
    #[serde(
        rename = "containerPath",
        alias = "container_path",
        alias = "containerpath"
    )]
    pub container_path: String,
    #[serde(
        rename = "hostPath",
        alias = "host_path",
        alias = "hostpath",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub host_path: Option<String>,
    pub mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external: Option<ExternalVolumeSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalVolumeSpec {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

/// Everything needed to launch one tenant's workload.
///
/// Built per lifecycle call and discarded afterwards; the only identity that
/// outlives it is [`WorkloadDescriptor::app_id`].
#[derive(Debug, Clone, PartialEq)]
pub struct WorkloadDescriptor {
    pub tenant: String,
    pub app_prefix: String,
    pub image: String,
    /// Command template; see [`crate::template::render_command`].
    pub cmd: String,
    pub cpu_limit: f64,
    /// Memory limit in bytes.
    pub mem_limit: Option<u64>,
    /// Container ports to expose, in mapping order.
    pub ports: Vec<u16>,
    pub web_port: u16,
    pub ssh_port: u16,
    pub network_mode: NetworkMode,
    pub volumes: Vec<VolumeSpec>,
    /// Opaque placement rules passed to Marathon.
    pub constraints: Vec<serde_json::Value>,
    pub custom_env: BTreeMap<String, String>,
    pub hub: HubContext,
    pub hub_ip_connect: Option<String>,
    pub hub_port_connect: Option<u16>,
    pub notebook_dir: Option<String>,
}

impl WorkloadDescriptor {
    pub fn app_id(&self) -> String {
        app_id(&self.app_prefix, &self.tenant)
    }
}

/// Marathon application id for `tenant`; recomputable from the tenant alone.
pub fn app_id(prefix: &str, tenant: &str) -> String {
    format!("/{}/{}", prefix.trim_matches('/'), tenant)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_descriptor;

    #[test]
    fn app_id_is_absolute_and_stable() {
        assert_eq!(app_id("jupyter", "alice"), "/jupyter/alice");
        assert_eq!(app_id("/jupyter/", "alice"), "/jupyter/alice");
        assert_eq!(app_id("team/lab", "bob"), "/team/lab/bob");

        let descriptor = sample_descriptor("alice");
        assert_eq!(descriptor.app_id(), descriptor.app_id());
        assert_eq!(descriptor.app_id(), "/jupyter/alice");
    }

    #[test]
    fn volume_spec_accepts_marathon_and_snake_case_keys() {
        let camel: VolumeSpec = serde_json::from_value(serde_json::json!({
            "containerPath": "/home/{username}",
            "hostPath": "/data/{username}",
            "mode": "RW"
        }))
        .expect("camel case");
        let snake: VolumeSpec = serde_json::from_value(serde_json::json!({
            "container_path": "/home/{username}",
            "host_path": "/data/{username}",
            "mode": "RW"
        }))
        .expect("snake case");
        assert_eq!(camel, snake);
        assert!(camel.external.is_none());
    }

    #[test]
    fn external_volume_without_host_path_deserializes() {
        let spec: VolumeSpec = serde_json::from_value(serde_json::json!({
            "containerPath": "/data",
            "mode": "RW",
            "external": {"name": "{username}-vol", "provider": "dvdi",
                         "options": {"dvdi/driver": "rexray"}}
        }))
        .expect("external volume");
        assert!(spec.host_path.is_none());
        let external = spec.external.expect("external");
        assert_eq!(external.name.as_deref(), Some("{username}-vol"));
        assert_eq!(
            external.options.get("dvdi/driver").map(String::as_str),
            Some("rexray")
        );
    }
}
