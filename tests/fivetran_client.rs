//! Fivetran client against a scripted HTTP server

mod common;

use common::{Reply, ScriptedServer};
use jobwait::client::JobClient;
use jobwait::domain::{JobTrigger, PollOutcome, RunHandle};
use jobwait::error::JobError;
use jobwait::vendors::{ConnectorUpdate, FivetranClient, FivetranConfig};
use serde_json::{Value, json};

fn client(base_url: &str) -> FivetranClient {
    FivetranClient::new("key", "secret", FivetranConfig::with_base_url(base_url)).unwrap()
}

fn connector(succeeded: Value, failed: Value, state: &str) -> Reply {
    Reply::json(
        200,
        json!({
            "code": "Success",
            "data": {
                "id": "warm_hostel",
                "succeeded_at": succeeded,
                "failed_at": failed,
                "status": {"sync_state": state, "tasks": []}
            }
        }),
    )
}

fn ok() -> Reply {
    Reply::json(200, json!({"code": "Success", "message": "Sync has been successfully triggered"}))
}

#[tokio::test]
async fn test_trigger_captures_baseline_then_syncs() {
    let server = ScriptedServer::start(vec![connector(json!("2024-03-01T10:00:00Z"), Value::Null, "scheduled"), ok()]).await;

    let handle = client(&server.base_url)
        .trigger(&JobTrigger::new("warm_hostel", "sync").with_force(true))
        .await
        .unwrap();

    assert_eq!(handle.run_id, "warm_hostel");
    let baseline = handle.watermark.expect("baseline should travel in the handle");
    assert!(baseline.succeeded_at.is_some());
    assert!(baseline.failed_at.is_none());

    let requests = server.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].method, "GET");
    assert_eq!(requests[0].path(), "/connectors/warm_hostel");
    assert_eq!(requests[1].method, "POST");
    assert_eq!(requests[1].path(), "/connectors/warm_hostel/sync");
    assert_eq!(requests[1].json()["force"], true);
    assert_eq!(requests[1].header("accept"), Some("application/json;version=2"));
    assert!(requests[1].header("authorization").unwrap_or_default().starts_with("Basic "));
}

#[tokio::test]
async fn test_trigger_without_wait_is_a_single_request() {
    let server = ScriptedServer::start(vec![ok()]).await;

    let handle = client(&server.base_url)
        .trigger(&JobTrigger::new("warm_hostel", "sync").with_wait(false))
        .await
        .unwrap();

    assert_eq!(handle.run_id, "warm_hostel");
    assert!(handle.watermark.is_none());
    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "POST");
    assert_eq!(requests[0].path(), "/connectors/warm_hostel/sync");
}

#[tokio::test]
async fn test_poll_detects_new_success_and_failure() {
    let server = ScriptedServer::start(vec![
        connector(json!("2024-03-01T10:00:00Z"), Value::Null, "syncing"),
        ok(),
        connector(json!("2024-03-01T11:00:00Z"), Value::Null, "scheduled"),
        connector(json!("2024-03-01T10:00:00Z"), json!("2024-03-01T11:30:00Z"), "scheduled"),
    ])
    .await;
    let client = client(&server.base_url);

    let handle = client.trigger(&JobTrigger::new("warm_hostel", "sync")).await.unwrap();
    assert_eq!(server.requests()[1].json()["force"], false);

    let succeeded = client.poll_status(&handle).await.unwrap();
    assert_eq!(PollOutcome::classify("warm_hostel", &succeeded), PollOutcome::Success);

    let failed = client.poll_status(&handle).await.unwrap();
    match PollOutcome::classify("warm_hostel", &failed) {
        PollOutcome::Failure(detail) => {
            assert!(detail.status_message.unwrap_or_default().starts_with("Sync failed at"));
        }
        other => panic!("Expected failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_not_found_code_is_invalid_target() {
    let server = ScriptedServer::start(vec![Reply::json(
        404,
        json!({"code": "NotFound_Integration", "message": "Connector with id 'nope' doesn't exist"}),
    )])
    .await;

    match client(&server.base_url).trigger(&JobTrigger::new("nope", "sync")).await {
        Err(JobError::NotFound(message)) => assert!(message.contains("doesn't exist")),
        other => panic!("Expected not found, got {:?}", other),
    }
    assert_eq!(server.requests().len(), 1);
}

#[tokio::test]
async fn test_poll_without_baseline_is_config_error() {
    let server = ScriptedServer::start(vec![]).await;

    let result = client(&server.base_url).poll_status(&RunHandle::new("warm_hostel")).await;
    assert!(matches!(result, Err(JobError::Config(_))));
    assert!(server.requests().is_empty());
}

#[tokio::test]
async fn test_pause_connector() {
    let server = ScriptedServer::start(vec![ok()]).await;

    client(&server.base_url)
        .update_connector("warm_hostel", &ConnectorUpdate::paused(true))
        .await
        .unwrap();

    let requests = server.requests();
    assert_eq!(requests[0].method, "PATCH");
    assert_eq!(requests[0].path(), "/connectors/warm_hostel");
    assert_eq!(requests[0].json(), json!({"paused": true}));
}

#[tokio::test]
async fn test_empty_update_is_rejected_locally() {
    let server = ScriptedServer::start(vec![]).await;

    let result = client(&server.base_url)
        .update_connector("warm_hostel", &ConnectorUpdate::default())
        .await;
    assert!(matches!(result, Err(JobError::BadRequest(_))));
    assert!(server.requests().is_empty());
}

#[tokio::test]
async fn test_check_connection_reads_users() {
    let server = ScriptedServer::start(vec![Reply::json(200, json!({"code": "Success", "data": {"items": []}}))]).await;

    client(&server.base_url).check_connection().await.unwrap();
    assert_eq!(server.requests()[0].path(), "/users");
}

#[tokio::test]
async fn test_forbidden_is_auth_error() {
    let server = ScriptedServer::start(vec![Reply::json(403, json!({"code": "AuthFailed", "message": "Forbidden"}))]).await;

    let result = client(&server.base_url).check_connection().await;
    assert!(matches!(result, Err(JobError::Auth(_))));
}
