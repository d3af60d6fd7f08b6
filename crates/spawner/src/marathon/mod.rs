use std::sync::Arc;

use async_trait::async_trait;
use common::api::{AppCreated, AppDeleted, AppInfo, AppRequest, Deployment};
use reqwest::StatusCode;
use thiserror::Error;

pub mod http;

pub use http::MarathonClient;

pub type DynMarathonApi = Arc<dyn MarathonApi>;

/// The four Marathon v2 calls the lifecycle controller needs.
///
/// `get_app` maps a 404 to `Ok(None)`; callers never see "not found" as an
/// error.
#[async_trait]
pub trait MarathonApi: Send + Sync {
    async fn create_app(&self, request: &AppRequest) -> Result<AppCreated, MarathonError>;
    async fn get_app(&self, app_id: &str) -> Result<Option<AppInfo>, MarathonError>;
    async fn delete_app(&self, app_id: &str) -> Result<AppDeleted, MarathonError>;
    async fn list_deployments(&self) -> Result<Vec<Deployment>, MarathonError>;
}

#[derive(Debug, Error)]
pub enum MarathonError {
    #[error("marathon rejected application {app_id} ({status}): {message}")]
    Rejected {
        app_id: String,
        status: StatusCode,
        message: String,
    },
    #[error("{operation} request failed: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("{operation} returned unexpected status {status}: {body}")]
    UnexpectedStatus {
        operation: &'static str,
        status: StatusCode,
        body: String,
    },
    #[error("failed to decode {operation} response: {source}")]
    Decode {
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl MarathonError {
    pub fn is_transport(&self) -> bool {
        matches!(self, MarathonError::Transport { .. })
    }

    pub fn operation(&self) -> &'static str {
        match self {
            MarathonError::Rejected { .. } => "create_app",
            MarathonError::Transport { operation, .. }
            | MarathonError::UnexpectedStatus { operation, .. }
            | MarathonError::Decode { operation, .. } => operation,
        }
    }
}
