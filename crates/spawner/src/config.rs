use std::collections::{BTreeMap, HashMap};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use common::api::NetworkMode;
use serde::Deserialize;

use crate::descriptor::{HubContext, VolumeSpec, WorkloadDescriptor};
use crate::overlay::{FailureMode, OverlayPolicy, OverlaySettings};

pub const CONFIG_PATH_ENV: &str = "SPAWNER_CONFIG";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub marathon_url: String,
    #[serde(default)]
    pub marathon_username: Option<String>,
    #[serde(default)]
    pub marathon_password: Option<String>,
    pub request_timeout_secs: u64,
    pub allow_insecure_http: bool,
    pub app_prefix: String,
    pub app_image: String,
    pub app_cmd: String,
    pub cpu_limit: f64,
    /// Memory limit in bytes or binary units; unset falls back to the
    /// default reservation.
    #[serde(default, deserialize_with = "crate::overlay::mem_limit")]
    pub mem_limit: Option<u64>,
    pub user_web_port: u16,
    pub user_ssh_port: u16,
    pub ports: Vec<u16>,
    pub network_mode: NetworkMode,
    #[serde(default)]
    pub volumes: Vec<VolumeSpec>,
    #[serde(default)]
    pub constraints: Vec<serde_json::Value>,
    #[serde(default)]
    pub custom_env: BTreeMap<String, String>,
    pub hub_api_url: String,
    pub hub_prefix: String,
    pub hub_cookie_name: String,
    /// Per-user server prefix; `{username}` is substituted.
    pub user_base_url: String,
    #[serde(default)]
    pub hub_ip_connect: Option<String>,
    #[serde(default)]
    pub hub_port_connect: Option<u16>,
    #[serde(default)]
    pub notebook_dir: Option<String>,
    pub poll_interval_ms: u64,
    pub remote_concurrency: usize,
    #[serde(default)]
    pub user_file: Option<PathBuf>,
    #[serde(default)]
    pub overlay: OverlayPolicy,
}

impl AppConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn overlay_settings(&self) -> Option<OverlaySettings> {
        self.user_file.as_ref().map(|path| OverlaySettings {
            path: path.clone(),
            policy: self.overlay.clone(),
        })
    }

    pub fn hub_context(&self, tenant: &str) -> HubContext {
        HubContext {
            api_url: self.hub_api_url.clone(),
            prefix: self.hub_prefix.clone(),
            cookie_name: self.hub_cookie_name.clone(),
            base_url: self.user_base_url.replace("{username}", tenant),
        }
    }

    /// Descriptor for `tenant` built from the framework-level defaults.
    pub fn descriptor(&self, tenant: &str) -> WorkloadDescriptor {
        WorkloadDescriptor {
            tenant: tenant.to_string(),
            app_prefix: self.app_prefix.clone(),
            image: self.app_image.clone(),
            cmd: self.app_cmd.clone(),
            cpu_limit: self.cpu_limit,
            mem_limit: self.mem_limit,
            ports: self.ports.clone(),
            web_port: self.user_web_port,
            ssh_port: self.user_ssh_port,
            network_mode: self.network_mode,
            volumes: self.volumes.clone(),
            constraints: self.constraints.clone(),
            custom_env: self.custom_env.clone(),
            hub: self.hub_context(tenant),
            hub_ip_connect: self.hub_ip_connect.clone(),
            hub_port_connect: self.hub_port_connect,
            notebook_dir: self.notebook_dir.clone(),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.marathon_url.trim().is_empty() {
            anyhow::bail!("marathon_url cannot be empty");
        }
        if self.app_prefix.trim_matches('/').is_empty() {
            anyhow::bail!("app_prefix cannot be empty");
        }
        if self.app_image.trim().is_empty() {
            anyhow::bail!("app_image cannot be empty");
        }
        if self.cpu_limit.is_nan() || self.cpu_limit <= 0.0 {
            anyhow::bail!("cpu_limit must be > 0");
        }
        if self.ports.is_empty() {
            anyhow::bail!("ports must list at least one container port");
        }
        if self.network_mode == NetworkMode::Host && self.user_web_port == 0 {
            anyhow::bail!("user_web_port is required when network_mode is HOST");
        }
        if self.remote_concurrency == 0 {
            anyhow::bail!("remote_concurrency must be > 0");
        }
        if self.marathon_username.is_some() != self.marathon_password.is_some() {
            anyhow::bail!("marathon_username and marathon_password must be set together");
        }
        Ok(())
    }
}

enum EnvKind {
    String,
    List,
    Map,
}

// (ENV_NAME, config_key, kind)
const ENV_OVERRIDES: &[(&str, &str, EnvKind)] = &[
    ("SPAWNER_MARATHON_URL", "marathon_url", EnvKind::String),
    (
        "SPAWNER_MARATHON_USERNAME",
        "marathon_username",
        EnvKind::String,
    ),
    (
        "SPAWNER_MARATHON_PASSWORD",
        "marathon_password",
        EnvKind::String,
    ),
    (
        "SPAWNER_REQUEST_TIMEOUT_SECS",
        "request_timeout_secs",
        EnvKind::String,
    ),
    (
        "SPAWNER_ALLOW_INSECURE_HTTP",
        "allow_insecure_http",
        EnvKind::String,
    ),
    ("SPAWNER_APP_PREFIX", "app_prefix", EnvKind::String),
    ("SPAWNER_APP_IMAGE", "app_image", EnvKind::String),
    ("SPAWNER_APP_CMD", "app_cmd", EnvKind::String),
    ("SPAWNER_CPU_LIMIT", "cpu_limit", EnvKind::String),
    ("SPAWNER_MEM_LIMIT", "mem_limit", EnvKind::String),
    ("SPAWNER_USER_WEB_PORT", "user_web_port", EnvKind::String),
    ("SPAWNER_USER_SSH_PORT", "user_ssh_port", EnvKind::String),
    ("SPAWNER_PORTS", "ports", EnvKind::List),
    ("SPAWNER_NETWORK_MODE", "network_mode", EnvKind::String),
    ("SPAWNER_CUSTOM_ENV", "custom_env", EnvKind::Map),
    ("SPAWNER_HUB_API_URL", "hub_api_url", EnvKind::String),
    ("SPAWNER_HUB_PREFIX", "hub_prefix", EnvKind::String),
    ("SPAWNER_HUB_COOKIE_NAME", "hub_cookie_name", EnvKind::String),
    ("SPAWNER_USER_BASE_URL", "user_base_url", EnvKind::String),
    ("SPAWNER_HUB_IP_CONNECT", "hub_ip_connect", EnvKind::String),
    ("SPAWNER_HUB_PORT_CONNECT", "hub_port_connect", EnvKind::String),
    ("SPAWNER_NOTEBOOK_DIR", "notebook_dir", EnvKind::String),
    ("SPAWNER_POLL_INTERVAL_MS", "poll_interval_ms", EnvKind::String),
    (
        "SPAWNER_REMOTE_CONCURRENCY",
        "remote_concurrency",
        EnvKind::String,
    ),
    ("SPAWNER_USER_FILE", "user_file", EnvKind::String),
    (
        "SPAWNER_OVERLAY_ON_MISSING_FILE",
        "overlay.on_missing_file",
        EnvKind::String,
    ),
    (
        "SPAWNER_OVERLAY_ON_PARSE_ERROR",
        "overlay.on_parse_error",
        EnvKind::String,
    ),
    (
        "SPAWNER_OVERLAY_ON_MISSING_TENANT",
        "overlay.on_missing_tenant",
        EnvKind::String,
    ),
];

pub fn load() -> anyhow::Result<AppConfig> {
    let path = env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "spawner".to_string());
    load_from(&path)
}

pub fn load_from(path: &str) -> anyhow::Result<AppConfig> {
    let mut builder = config::Config::builder()
        .add_source(config::File::with_name(path).required(false))
        .set_default("marathon_url", "http://127.0.0.1:8080")?
        .set_default("request_timeout_secs", 30)?
        .set_default("allow_insecure_http", true)?
        .set_default("app_prefix", "jupyter")?
        .set_default("app_image", "jupyterhub/singleuser")?
        .set_default("app_cmd", "jupyter notebook")?
        .set_default("cpu_limit", 1.0)?
        .set_default("user_web_port", 0)?
        .set_default("user_ssh_port", 0)?
        .set_default("ports", vec![8888])?
        .set_default("network_mode", NetworkMode::Bridge.as_str())?
        .set_default("hub_api_url", "http://127.0.0.1:8081/hub/api")?
        .set_default("hub_prefix", "/hub/")?
        .set_default("hub_cookie_name", "jupyterhub-services")?
        .set_default("user_base_url", "/user/{username}/")?
        .set_default("poll_interval_ms", 1_000)?
        .set_default("remote_concurrency", 1)?
        .set_default("overlay.on_missing_file", FailureMode::Fail.as_str())?
        .set_default("overlay.on_parse_error", FailureMode::Fail.as_str())?
        .set_default("overlay.on_missing_tenant", FailureMode::Fail.as_str())?;

    // Override with single-underscore environment variables.
    for (env_key, cfg_key, kind) in ENV_OVERRIDES {
        if let Ok(value) = env::var(env_key) {
            match kind {
                EnvKind::List => {
                    let entries: Vec<String> = value
                        .split(',')
                        .map(|s| s.trim())
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect();
                    builder = builder.set_override(*cfg_key, entries)?;
                }
                EnvKind::Map => {
                    builder = builder.set_override(*cfg_key, parse_env_pairs(&value))?;
                }
                EnvKind::String => {
                    builder = builder.set_override(*cfg_key, value)?;
                }
            }
        }
    }

    let app: AppConfig = builder.build()?.try_deserialize()?;
    app.validate()?;
    Ok(app)
}

/// Parses `KEY=value,OTHER=value` pairs; later keys win.
fn parse_env_pairs(value: &str) -> HashMap<String, String> {
    let mut pairs = HashMap::new();
    for entry in value.split(',') {
        let trimmed = entry.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some((k, v)) = trimmed.split_once('=') {
            pairs.insert(k.trim().to_string(), v.trim().to_string());
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::base_config;
    use std::io::Write;

    #[test]
    fn parse_env_pairs_keeps_last_value() {
        let pairs = parse_env_pairs("A=1, B = two ,A=3,,broken");
        assert_eq!(pairs.get("A").map(String::as_str), Some("3"));
        assert_eq!(pairs.get("B").map(String::as_str), Some("two"));
        assert_eq!(pairs.len(), 2);
    }

    #[test]
    fn load_from_file_applies_defaults_and_values() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("spawner.toml");
        let mut file = std::fs::File::create(&path).expect("create config");
        writeln!(
            file,
            r#"
marathon_url = "http://marathon.internal:8080"
app_prefix = "lab"
network_mode = "HOST"
user_web_port = 10400
user_ssh_port = 10500
constraints = [["hostname", "UNIQUE"]]

[[volumes]]
containerPath = "/home/{{username}}"
hostPath = "/data/{{username}}"
mode = "RW"

[overlay]
on_missing_tenant = "ignore"
"#
        )
        .expect("write config");

        let cfg = load_from(path.with_extension("").to_str().expect("utf8 path")).expect("load");
        assert_eq!(cfg.marathon_url, "http://marathon.internal:8080");
        assert_eq!(cfg.app_prefix, "lab");
        assert_eq!(cfg.network_mode, NetworkMode::Host);
        assert_eq!(cfg.ports, vec![8888]);
        assert_eq!(cfg.poll_interval(), Duration::from_secs(1));
        assert_eq!(cfg.remote_concurrency, 1);
        assert_eq!(cfg.volumes.len(), 1);
        assert_eq!(cfg.volumes[0].container_path, "/home/{username}");
        assert_eq!(cfg.constraints.len(), 1);
        assert_eq!(cfg.overlay.on_missing_file, FailureMode::Fail);
        assert_eq!(cfg.overlay.on_missing_tenant, FailureMode::Ignore);
    }

    #[test]
    fn mem_limit_accepts_the_overlay_size_formats() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("spawner.toml");
        std::fs::write(&path, "mem_limit = \"2G\"\n").expect("write config");
        let cfg = load_from(path.to_str().expect("utf8 path")).expect("load");
        assert_eq!(cfg.mem_limit, Some(2 * 1024 * 1024 * 1024));

        std::fs::write(&path, "mem_limit = 536870912\n").expect("write config");
        let cfg = load_from(path.to_str().expect("utf8 path")).expect("load");
        assert_eq!(cfg.mem_limit, Some(512 * 1024 * 1024));

        std::fs::write(&path, "mem_limit = \"lots\"\n").expect("write config");
        assert!(load_from(path.to_str().expect("utf8 path")).is_err());
    }

    #[test]
    fn validate_rejects_host_mode_without_web_port() {
        let mut cfg = base_config();
        cfg.network_mode = NetworkMode::Host;
        cfg.user_web_port = 0;
        let err = cfg.validate().expect_err("host mode needs web port");
        assert!(err.to_string().contains("user_web_port"));
    }

    #[test]
    fn validate_requires_paired_credentials() {
        let mut cfg = base_config();
        cfg.marathon_username = Some("ops".into());
        assert!(cfg.validate().is_err());
        cfg.marathon_password = Some("secret".into());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn descriptor_uses_tenant_for_hub_base_url() {
        let cfg = base_config();
        let descriptor = cfg.descriptor("alice");
        assert_eq!(descriptor.app_id(), "/jupyter/alice");
        assert_eq!(descriptor.hub.base_url, "/user/alice/");
        assert_eq!(descriptor.ports, cfg.ports);
    }

    #[test]
    fn overlay_settings_only_when_user_file_set() {
        let mut cfg = base_config();
        assert!(cfg.overlay_settings().is_none());
        cfg.user_file = Some("/etc/spawner/users.jsonl".into());
        let settings = cfg.overlay_settings().expect("settings");
        assert_eq!(settings.path, PathBuf::from("/etc/spawner/users.jsonl"));
        assert_eq!(settings.policy, OverlayPolicy::default());
    }
}
