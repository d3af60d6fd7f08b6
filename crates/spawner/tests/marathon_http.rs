use std::sync::Arc;
use std::time::Duration;

use httpmock::{
    Method::{DELETE, GET, POST},
    MockServer,
};
use serde_json::json;

use spawner::{LifecycleController, MarathonClient, PollStatus, REQUEST_ID_HEADER, RemoteExecutor};

const APP: &str = "/jupyter/alice";

fn descriptor() -> spawner::WorkloadDescriptor {
    spawner_config().descriptor("alice")
}

fn spawner_config() -> spawner::config::AppConfig {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("spawner.toml");
    std::fs::write(
        &path,
        r#"
marathon_url = "http://127.0.0.1:8080"
app_image = "jupyterhub/singleuser:4"
app_cmd = "start-singleuser.sh --port={userwebport}"
ports = [8888, 22]
"#,
    )
    .expect("write config");
    spawner::config::load_from(path.to_str().expect("utf8 path")).expect("config")
}

fn controller(server: &MockServer) -> LifecycleController {
    let api = Arc::new(MarathonClient::new(server.base_url(), reqwest::Client::new()));
    LifecycleController::new(api)
        .with_executor(RemoteExecutor::new(1))
        .with_poll_interval(Duration::from_millis(10))
}

#[tokio::test]
async fn start_creates_the_app_and_resolves_the_task_endpoint() {
    let server = MockServer::start();
    let create = server.mock(|when, then| {
        when.method(POST)
            .path("/v2/apps")
            .header_exists(REQUEST_ID_HEADER)
            .json_body_partial(
                r#"{
                    "id": "/jupyter/alice",
                    "instances": 1,
                    "mem": 1024.0,
                    "container": {"type": "DOCKER", "docker": {"network": "BRIDGE"}},
                    "healthChecks": [{"protocol": "TCP", "portIndex": 0, "gracePeriodSeconds": 300}]
                }"#,
            );
        then.status(201).json_body(json!({
            "id": APP,
            "deployments": [{"id": "d-start"}]
        }));
    });
    let get = server.mock(|when, then| {
        when.method(GET)
            .path("/v2/apps/jupyter/alice")
            .query_param("embed", "app.tasks");
        then.status(200).json_body(json!({
            "app": {
                "id": APP,
                "instances": 1,
                "tasksHealthy": 1,
                "tasks": [{"id": "t1", "host": "127.0.0.1", "ports": [31005, 31006]}]
            }
        }));
    });

    let endpoint = controller(&server)
        .start(&descriptor())
        .await
        .expect("start succeeds");

    assert_eq!(endpoint.to_string(), "127.0.0.1:31005");
    create.assert();
    get.assert();
}

#[tokio::test]
async fn conflicting_create_surfaces_the_rejection() {
    let server = MockServer::start();
    let _create = server.mock(|when, then| {
        when.method(POST).path("/v2/apps");
        then.status(409)
            .json_body(json!({"message": "An app with id [/jupyter/alice] already exists."}));
    });
    let get = server.mock(|when, then| {
        when.method(GET).path("/v2/apps/jupyter/alice");
        then.status(404);
    });

    let err = controller(&server)
        .start(&descriptor())
        .await
        .expect_err("rejected");
    assert!(!err.is_transport());
    assert!(err.to_string().contains("already exists"));
    get.assert_hits(0);
}

#[tokio::test]
async fn stop_deletes_and_waits_for_the_deployment_to_finish() {
    let server = MockServer::start();
    let delete = server.mock(|when, then| {
        when.method(DELETE).path("/v2/apps/jupyter/alice");
        then.status(200)
            .json_body(json!({"deploymentId": "d-stop", "version": "2024-03-01T10:00:00.000Z"}));
    });
    let deployments = server.mock(|when, then| {
        when.method(GET).path("/v2/deployments");
        then.status(200).json_body(json!([{
            "id": "d-other",
            "affectedApps": ["/jupyter/bob"],
            "currentActions": [{"action": "StartApplication", "app": "/jupyter/bob"}]
        }]));
    });

    controller(&server)
        .stop(APP, false)
        .await
        .expect("stop succeeds");
    delete.assert();
    deployments.assert_hits(1);
}

#[tokio::test]
async fn poll_reads_deployments_before_the_app() {
    let server = MockServer::start();
    let deployments = server.mock(|when, then| {
        when.method(GET).path("/v2/deployments");
        then.status(200).json_body(json!([{
            "id": "d-stop",
            "affectedApps": [APP],
            "currentActions": [{"action": "StopApplication", "app": APP}]
        }]));
    });
    let get = server.mock(|when, then| {
        when.method(GET).path("/v2/apps/jupyter/alice");
        then.status(404);
    });

    let status = controller(&server).poll(APP).await.expect("poll");
    assert_eq!(status, PollStatus::ShuttingDown);
    deployments.assert();
    get.assert_hits(0);
}

#[tokio::test]
async fn poll_of_a_missing_app_reports_stopped() {
    let server = MockServer::start();
    let _deployments = server.mock(|when, then| {
        when.method(GET).path("/v2/deployments");
        then.status(200).json_body(json!([]));
    });
    let get = server.mock(|when, then| {
        when.method(GET).path("/v2/apps/jupyter/alice");
        then.status(404)
            .json_body(json!({"message": "App '/jupyter/alice' does not exist"}));
    });

    let status = controller(&server).poll(APP).await.expect("poll");
    assert_eq!(status, PollStatus::Stopped);
    get.assert();
}
