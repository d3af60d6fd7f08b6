use async_trait::async_trait;
use common::api::{
    AppCreated, AppDeleted, AppEnvelope, AppInfo, AppRequest, Deployment, MarathonErrorBody,
};
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::{MarathonApi, MarathonError};
use crate::{REQUEST_ID_HEADER, config::AppConfig, current_request_id, telemetry};

const CREATE_APP: &str = "create_app";
const GET_APP: &str = "get_app";
const DELETE_APP: &str = "delete_app";
const LIST_DEPLOYMENTS: &str = "list_deployments";

/// Marathon v2 REST client.
#[derive(Clone)]
pub struct MarathonClient {
    base_url: String,
    client: reqwest::Client,
    credentials: Option<(String, String)>,
}

impl MarathonClient {
    pub fn new(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            credentials: None,
        }
    }

    pub fn from_config(cfg: &AppConfig, client: reqwest::Client) -> Self {
        let marathon = Self::new(cfg.marathon_url.clone(), client);
        match (&cfg.marathon_username, &cfg.marathon_password) {
            (Some(user), Some(password)) => marathon.with_basic_auth(user, password),
            _ => marathon,
        }
    }

    pub fn with_basic_auth(mut self, username: &str, password: &str) -> Self {
        self.credentials = Some((username.to_string(), password.to_string()));
        self
    }

    fn apps_url(&self, app_id: &str) -> String {
        format!("{}/v2/apps/{}", self.base_url, app_id.trim_start_matches('/'))
    }

    fn request(&self, method: Method, url: String) -> reqwest::RequestBuilder {
        let request_id = current_request_id().unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let mut builder = self
            .client
            .request(method, url)
            .header(REQUEST_ID_HEADER, request_id);
        if let Some((user, password)) = &self.credentials {
            builder = builder.basic_auth(user, Some(password));
        }
        builder
    }

    async fn send(
        &self,
        operation: &'static str,
        builder: reqwest::RequestBuilder,
    ) -> Result<Response, MarathonError> {
        builder.send().await.map_err(|err| {
            warn!(operation, ?err, "marathon request failed");
            telemetry::record_remote_call(operation, "transport_error");
            MarathonError::Transport {
                operation,
                source: err.into(),
            }
        })
    }
}

#[async_trait]
impl MarathonApi for MarathonClient {
    async fn create_app(&self, request: &AppRequest) -> Result<AppCreated, MarathonError> {
        let url = format!("{}/v2/apps", self.base_url);
        let res = self
            .send(CREATE_APP, self.request(Method::POST, url).json(request))
            .await?;

        let status = res.status();
        if status.is_client_error() {
            let body = res.text().await.unwrap_or_default();
            let message = serde_json::from_str::<MarathonErrorBody>(&body)
                .ok()
                .map(|parsed| parsed.message)
                .filter(|message| !message.is_empty())
                .unwrap_or(body);
            warn!(app_id = %request.id, %status, %message, "marathon rejected application");
            telemetry::record_remote_call(CREATE_APP, "rejected");
            return Err(MarathonError::Rejected {
                app_id: request.id.clone(),
                status,
                message,
            });
        }

        let created = decode::<AppCreated>(CREATE_APP, res).await?;
        debug!(app_id = %created.id, "application created");
        Ok(created)
    }

    async fn get_app(&self, app_id: &str) -> Result<Option<AppInfo>, MarathonError> {
        let res = self
            .send(
                GET_APP,
                self.request(Method::GET, self.apps_url(app_id))
                    .query(&[("embed", "app.tasks")]),
            )
            .await?;

        if res.status() == StatusCode::NOT_FOUND {
            telemetry::record_remote_call(GET_APP, "not_found");
            return Ok(None);
        }

        let envelope = decode::<AppEnvelope>(GET_APP, res).await?;
        Ok(Some(envelope.app))
    }

    async fn delete_app(&self, app_id: &str) -> Result<AppDeleted, MarathonError> {
        let res = self
            .send(
                DELETE_APP,
                self.request(Method::DELETE, self.apps_url(app_id)),
            )
            .await?;
        decode::<AppDeleted>(DELETE_APP, res).await
    }

    async fn list_deployments(&self) -> Result<Vec<Deployment>, MarathonError> {
        let url = format!("{}/v2/deployments", self.base_url);
        let res = self
            .send(LIST_DEPLOYMENTS, self.request(Method::GET, url))
            .await?;
        decode::<Vec<Deployment>>(LIST_DEPLOYMENTS, res).await
    }
}

async fn decode<T: DeserializeOwned>(
    operation: &'static str,
    res: Response,
) -> Result<T, MarathonError> {
    let status = res.status();
    if !status.is_success() {
        let body = res.text().await.unwrap_or_default();
        warn!(operation, %status, error = %body, "marathon returned error");
        telemetry::record_remote_call(operation, "unexpected_status");
        return Err(MarathonError::UnexpectedStatus {
            operation,
            status,
            body,
        });
    }

    let decoded = res.json::<T>().await.map_err(|err| {
        telemetry::record_remote_call(operation, "decode_error");
        MarathonError::Decode {
            operation,
            source: err.into(),
        }
    })?;
    telemetry::record_remote_call(operation, "ok");
    Ok(decoded)
}
