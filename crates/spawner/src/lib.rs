use std::future::Future;

use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue};
use tracing::warn;

pub mod cli;
pub mod config;
pub mod controller;
pub mod convergence;
pub mod descriptor;
pub mod endpoint;
pub mod env;
pub mod executor;
pub mod marathon;
pub mod overlay;
pub mod request;
pub mod state;
pub mod telemetry;
pub mod template;
pub mod version;

#[cfg(test)]
pub mod test_support;

pub use controller::{LifecycleController, SpawnError};
pub use descriptor::WorkloadDescriptor;
pub use endpoint::Endpoint;
pub use executor::RemoteExecutor;
pub use marathon::{MarathonApi, MarathonClient, MarathonError};
pub use state::{PollStatus, SpawnerState};

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const SPAWNER_VERSION_HEADER: &str = "x-spawner-version";

tokio::task_local! {
    static REQUEST_ID: String;
}

/// Runs `fut` with `request_id` attached to every Marathon call it makes.
pub async fn with_request_id<F: Future>(request_id: String, fut: F) -> F::Output {
    REQUEST_ID.scope(request_id, fut).await
}

pub fn current_request_id() -> Option<String> {
    REQUEST_ID.try_with(Clone::clone).ok()
}

pub fn validate_marathon_url(cfg: &config::AppConfig) -> anyhow::Result<()> {
    let url = reqwest::Url::parse(&cfg.marathon_url)?;
    match url.scheme() {
        "https" => Ok(()),
        "http" if cfg.allow_insecure_http => {
            warn!(
                marathon = %cfg.marathon_url,
                "insecure HTTP Marathon URL in use; credentials travel unencrypted"
            );
            Ok(())
        }
        "http" => anyhow::bail!(
            "insecure Marathon URL not allowed: {}; set allow_insecure_http=true to override",
            cfg.marathon_url
        ),
        other => anyhow::bail!("unsupported URL scheme: {}", other),
    }
}

pub fn build_client(cfg: &config::AppConfig) -> anyhow::Result<reqwest::Client> {
    validate_marathon_url(cfg)?;
    reqwest::Client::builder()
        .default_headers(build_spawner_headers()?)
        .user_agent(format!("spawnerctl/{}", version::VERSION))
        .timeout(cfg.request_timeout())
        .build()
        .map_err(Into::into)
}

fn build_spawner_headers() -> anyhow::Result<HeaderMap> {
    if version::VERSION.trim().is_empty() {
        anyhow::bail!("spawner version metadata missing; refusing to start");
    }

    let mut headers = HeaderMap::new();
    headers.insert(
        SPAWNER_VERSION_HEADER,
        HeaderValue::from_str(version::VERSION).context("invalid spawner version header value")?,
    );
    Ok(headers)
}
