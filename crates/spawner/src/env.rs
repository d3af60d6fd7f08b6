use std::collections::BTreeMap;

use reqwest::Url;

use crate::descriptor::WorkloadDescriptor;
use crate::request::ValidationError;

pub const USER_ENV: &str = "JPY_USER";
pub const COOKIE_NAME_ENV: &str = "JPY_COOKIE_NAME";
pub const BASE_URL_ENV: &str = "JPY_BASE_URL";
pub const HUB_PREFIX_ENV: &str = "JPY_HUB_PREFIX";
pub const HUB_API_URL_ENV: &str = "JPY_HUB_API_URL";
pub const WEB_PORT_ENV: &str = "JPY_USER_WEB_PORT";
pub const SSH_PORT_ENV: &str = "JPY_USER_SSH_PORT";
pub const NOTEBOOK_DIR_ENV: &str = "NOTEBOOK_DIR";

/// Environment injected into the workload container.
///
/// Custom entries are applied last and win over the built-in keys.
pub fn container_env(
    descriptor: &WorkloadDescriptor,
) -> Result<BTreeMap<String, String>, ValidationError> {
    let mut env = BTreeMap::new();
    env.insert(USER_ENV.to_string(), descriptor.tenant.clone());
    env.insert(
        COOKIE_NAME_ENV.to_string(),
        descriptor.hub.cookie_name.clone(),
    );
    env.insert(BASE_URL_ENV.to_string(), descriptor.hub.base_url.clone());
    env.insert(HUB_PREFIX_ENV.to_string(), descriptor.hub.prefix.clone());
    env.insert(WEB_PORT_ENV.to_string(), descriptor.web_port.to_string());
    env.insert(SSH_PORT_ENV.to_string(), descriptor.ssh_port.to_string());

    if let Some(dir) = descriptor
        .notebook_dir
        .as_deref()
        .filter(|dir| !dir.is_empty())
    {
        env.insert(NOTEBOOK_DIR_ENV.to_string(), dir.to_string());
    }

    let hub_api_url = public_hub_api_url(
        &descriptor.hub.api_url,
        descriptor.hub_ip_connect.as_deref(),
        descriptor.hub_port_connect,
    )?;
    env.insert(HUB_API_URL_ENV.to_string(), hub_api_url);

    for (key, value) in &descriptor.custom_env {
        env.insert(key.clone(), value.clone());
    }

    Ok(env)
}

/// Rewrites host and/or port of the hub API URL so containers can reach it.
///
/// Returns `api_url` untouched when neither override is set.
pub fn public_hub_api_url(
    api_url: &str,
    host: Option<&str>,
    port: Option<u16>,
) -> Result<String, ValidationError> {
    let host = host.map(str::trim).filter(|h| !h.is_empty());
    let port = port.filter(|p| *p > 0);
    if host.is_none() && port.is_none() {
        return Ok(api_url.to_string());
    }

    let invalid = |reason: String| ValidationError::HubApiUrl {
        url: api_url.to_string(),
        reason,
    };

    let mut url = Url::parse(api_url).map_err(|err| invalid(err.to_string()))?;
    if let Some(host) = host {
        url.set_host(Some(host))
            .map_err(|err| invalid(format!("host {host}: {err}")))?;
    }
    if let Some(port) = port {
        url.set_port(Some(port))
            .map_err(|_| invalid(format!("url cannot carry port {port}")))?;
    }
    Ok(url.to_string())
}
