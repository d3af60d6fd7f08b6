//! Per-tenant overrides read from a newline-delimited JSON file.
//!
//! Each non-blank line that does not start with `#` is one JSON record keyed
//! by `user`. The first record for the tenant wins; later lines are not read.
//! A matched record is merged over the framework defaults with
//! [`merge`]:
//!
//! * `cpu_limit`, `mem_limit`, `user_web_port`, `user_ssh_port`,
//!   `network_mode`, `app_image` replace the base value when present;
//! * the web and ssh ports are appended to the exposed port list;
//! * `marathon_constraints` replaces the base constraints;
//! * `custom_env` and `volumes` are appended, env keys last-write-wins.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use common::api::NetworkMode;
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tracing::{info, warn};

use crate::descriptor::{VolumeSpec, WorkloadDescriptor};

const KIB: f64 = 1024.0;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ConfigOverlay {
    pub user: String,
    #[serde(default, deserialize_with = "cpu_limit")]
    pub cpu_limit: Option<f64>,
    /// Bytes; accepts a number or a `"2G"`-style size.
    #[serde(default, deserialize_with = "mem_limit")]
    pub mem_limit: Option<u64>,
    #[serde(default)]
    pub user_ssh_port: Option<u16>,
    #[serde(default)]
    pub user_web_port: Option<u16>,
    #[serde(default, deserialize_with = "network_mode")]
    pub network_mode: Option<NetworkMode>,
    #[serde(default)]
    pub app_image: Option<String>,
    #[serde(default)]
    pub marathon_constraints: Option<Vec<serde_json::Value>>,
    /// List of single-entry maps, applied in order.
    #[serde(default)]
    pub custom_env: Vec<BTreeMap<String, serde_json::Value>>,
    #[serde(default)]
    pub volumes: Vec<VolumeSpec>,
}

#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("cannot read overlay file {}: {source}", path.display())]
    Missing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid overlay record at {}:{line}: {source}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("tenant {tenant} not found in overlay file {}", path.display())]
    TenantNotFound { path: PathBuf, tenant: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureMode {
    /// Abort the start.
    #[default]
    Fail,
    /// Log and continue with the defaults.
    Ignore,
}

impl FailureMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureMode::Fail => "fail",
            FailureMode::Ignore => "ignore",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct OverlayPolicy {
    #[serde(default)]
    pub on_missing_file: FailureMode,
    #[serde(default)]
    pub on_parse_error: FailureMode,
    #[serde(default)]
    pub on_missing_tenant: FailureMode,
}

impl OverlayPolicy {
    pub fn mode_for(&self, err: &OverlayError) -> FailureMode {
        match err {
            OverlayError::Missing { .. } => self.on_missing_file,
            OverlayError::Parse { .. } => self.on_parse_error,
            OverlayError::TenantNotFound { .. } => self.on_missing_tenant,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlaySettings {
    pub path: PathBuf,
    pub policy: OverlayPolicy,
}

pub async fn load(path: &Path, tenant: &str) -> Result<ConfigOverlay, OverlayError> {
    let contents =
        tokio::fs::read_to_string(path)
            .await
            .map_err(|source| OverlayError::Missing {
                path: path.to_path_buf(),
                source,
            })?;
    find_tenant(path, &contents, tenant)
}

fn find_tenant(path: &Path, contents: &str, tenant: &str) -> Result<ConfigOverlay, OverlayError> {
    for (index, raw) in contents.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parse_err = |source| OverlayError::Parse {
            path: path.to_path_buf(),
            line: index + 1,
            source,
        };

        let record: serde_json::Value = serde_json::from_str(line).map_err(parse_err)?;
        if record.get("user").and_then(|user| user.as_str()) != Some(tenant) {
            continue;
        }
        return serde_json::from_value(record).map_err(parse_err);
    }

    Err(OverlayError::TenantNotFound {
        path: path.to_path_buf(),
        tenant: tenant.to_string(),
    })
}

pub fn merge(base: &WorkloadDescriptor, overlay: &ConfigOverlay) -> WorkloadDescriptor {
    let mut merged = base.clone();

    if let Some(cpu) = overlay.cpu_limit {
        merged.cpu_limit = cpu;
    }
    if let Some(mem) = overlay.mem_limit {
        merged.mem_limit = Some(mem);
    }
    if let Some(port) = overlay.user_web_port {
        merged.web_port = port;
    }
    if let Some(port) = overlay.user_ssh_port {
        merged.ssh_port = port;
    }
    if let Some(mode) = overlay.network_mode {
        merged.network_mode = mode;
    }
    if let Some(image) = overlay.app_image.as_ref().filter(|image| !image.is_empty()) {
        merged.image = image.clone();
    }
    if let Some(constraints) = &overlay.marathon_constraints {
        merged.constraints = constraints.clone();
    }

    for port in [overlay.user_web_port, overlay.user_ssh_port]
        .into_iter()
        .flatten()
        .filter(|port| *port > 0)
    {
        if !merged.ports.contains(&port) {
            merged.ports.push(port);
        }
    }

    for entry in &overlay.custom_env {
        for (key, value) in entry {
            merged.custom_env.insert(key.clone(), env_value(value));
        }
    }
    merged.volumes.extend(overlay.volumes.iter().cloned());

    merged
}

/// Loads the tenant's overlay and merges it; failures fall back to `base`
/// when the policy for that failure is [`FailureMode::Ignore`].
pub async fn apply(
    base: &WorkloadDescriptor,
    settings: &OverlaySettings,
) -> Result<WorkloadDescriptor, OverlayError> {
    match load(&settings.path, &base.tenant).await {
        Ok(overlay) => {
            info!(tenant = %base.tenant, path = %settings.path.display(), "applying tenant overlay");
            Ok(merge(base, &overlay))
        }
        Err(err) => match settings.policy.mode_for(&err) {
            FailureMode::Fail => Err(err),
            FailureMode::Ignore => {
                warn!(tenant = %base.tenant, error = %err, "overlay unavailable; using defaults");
                Ok(base.clone())
            }
        },
    }
}

fn env_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(text) => text.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Quantity {
    Whole(u64),
    Fraction(f64),
    Text(String),
}

fn cpu_limit<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = match Option::<Quantity>::deserialize(deserializer)? {
        None => return Ok(None),
        Some(Quantity::Whole(n)) => n as f64,
        Some(Quantity::Fraction(n)) => n,
        Some(Quantity::Text(text)) => text
            .trim()
            .parse::<f64>()
            .map_err(|_| serde::de::Error::custom(format!("invalid cpu_limit {text:?}")))?,
    };
    if value.is_nan() || value <= 0.0 {
        return Err(serde::de::Error::custom("cpu_limit must be > 0"));
    }
    Ok(Some(value))
}

/// Byte count or binary-unit string (`"2G"`); shared with the base config.
pub(crate) fn mem_limit<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Quantity>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Quantity::Whole(bytes)) => Ok(Some(bytes)),
        Some(Quantity::Fraction(bytes)) if bytes >= 0.0 => Ok(Some(bytes as u64)),
        Some(Quantity::Fraction(bytes)) => Err(serde::de::Error::custom(format!(
            "invalid mem_limit {bytes}"
        ))),
        Some(Quantity::Text(text)) => parse_byte_size(&text)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid mem_limit {text:?}"))),
    }
}

fn network_mode<'de, D>(deserializer: D) -> Result<Option<NetworkMode>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)?
        .map(|mode| mode.parse::<NetworkMode>().map_err(serde::de::Error::custom))
        .transpose()
}

/// Parses `512`, `512K`, `1.5G` (binary units) into bytes.
pub fn parse_byte_size(text: &str) -> Option<u64> {
    let text = text.trim();
    let (number, exponent) = match text.chars().last()?.to_ascii_uppercase() {
        'K' => (&text[..text.len() - 1], 1),
        'M' => (&text[..text.len() - 1], 2),
        'G' => (&text[..text.len() - 1], 3),
        'T' => (&text[..text.len() - 1], 4),
        _ => (text, 0),
    };
    let value = number.trim().parse::<f64>().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    Some((value * KIB.powi(exponent)) as u64)
}
