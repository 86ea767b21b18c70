#![allow(clippy::unwrap_used)]
// Task tracker tests against a mock server with short real intervals.

use std::time::{Duration, Instant};

use serde_json::json;
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use proxly_api::{ApiClient, Credential, Error, FormBody, Method, Upid};

const UPID: &str = "UPID:pve1:0000C2B6:0029A1DF:65F0A1B2:qmstart:100:ci@pve!deploy:";
const TASK_PATH: &str = "/api2/json/nodes/pve1/tasks/UPID%3Apve1%3A0000C2B6%3A0029A1DF%3A65F0A1B2%3Aqmstart%3A100%3Aci%40pve%21deploy%3A";

const TICK: Duration = Duration::from_millis(20);

async fn setup() -> (MockServer, ApiClient, Upid) {
    let server = MockServer::start().await;
    let client = ApiClient::with_client(
        reqwest::Client::new(),
        Url::parse(&server.uri()).unwrap(),
        Credential::api_token("ci@pve", "deploy", "secret"),
    );
    (server, client, UPID.parse().unwrap())
}

fn running() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "data": { "status": "running", "type": "qmstart", "id": "100", "user": "ci@pve!deploy" }
    }))
}

fn stopped(exit: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "data": { "status": "stopped", "exitstatus": exit, "type": "qmstart", "id": "100" }
    }))
}

#[tokio::test]
async fn waits_until_task_stops_ok() {
    let (server, client, upid) = setup().await;

    Mock::given(method("GET"))
        .and(path(format!("{TASK_PATH}/status")))
        .respond_with(running())
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{TASK_PATH}/status")))
        .respond_with(stopped("OK"))
        .mount(&server)
        .await;

    let result = client
        .wait_task_with(&upid, Duration::from_secs(10), TICK)
        .await
        .unwrap();
    assert_eq!(result.exit_status, "OK");
    assert_eq!(result.warnings, 0);
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn warnings_count_as_success() {
    let (server, client, upid) = setup().await;

    Mock::given(method("GET"))
        .and(path(format!("{TASK_PATH}/status")))
        .respond_with(stopped("WARNINGS: 2"))
        .mount(&server)
        .await;

    let result = client
        .wait_task_with(&upid, Duration::from_secs(10), TICK)
        .await
        .unwrap();
    assert_eq!(result.warnings, 2);
}

#[tokio::test]
async fn failed_task_carries_log_tail() {
    let (server, client, upid) = setup().await;

    Mock::given(method("GET"))
        .and(path(format!("{TASK_PATH}/status")))
        .respond_with(stopped("command 'qm start 100' failed: exit code 1"))
        .mount(&server)
        .await;

    let lines: Vec<_> = (1..=25)
        .map(|n| json!({ "n": n, "t": format!("line {n}") }))
        .collect();
    Mock::given(method("GET"))
        .and(path(format!("{TASK_PATH}/log")))
        .and(query_param("start", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": lines })))
        .mount(&server)
        .await;

    let err = client
        .wait_task_with(&upid, Duration::from_secs(10), TICK)
        .await
        .unwrap_err();
    match err {
        Error::TaskFailed {
            upid,
            exit_status,
            log_tail,
        } => {
            assert_eq!(upid, UPID);
            assert!(exit_status.contains("exit code 1"));
            assert_eq!(log_tail.len(), 20);
            assert_eq!(log_tail.first().unwrap(), "line 6");
            assert_eq!(log_tail.last().unwrap(), "line 25");
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn transient_server_errors_are_tolerated() {
    let (server, client, upid) = setup().await;

    Mock::given(method("GET"))
        .and(path(format!("{TASK_PATH}/status")))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{TASK_PATH}/status")))
        .respond_with(stopped("OK"))
        .mount(&server)
        .await;

    let result = client
        .wait_task_with(&upid, Duration::from_secs(10), TICK)
        .await;
    assert!(result.is_ok(), "{result:?}");
}

#[tokio::test]
async fn sustained_failure_times_out_with_last_error() {
    let (server, client, upid) = setup().await;

    Mock::given(method("GET"))
        .and(path(format!("{TASK_PATH}/status")))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = client
        .wait_task_with(&upid, Duration::from_millis(300), TICK)
        .await
        .unwrap_err();
    match err {
        Error::Timeout { waiting_for, .. } => {
            assert!(waiting_for.starts_with("task UPID:pve1"), "{waiting_for}");
            assert!(waiting_for.contains("last error"), "{waiting_for}");
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn running_past_deadline_times_out() {
    let (server, client, upid) = setup().await;

    Mock::given(method("GET"))
        .and(path(format!("{TASK_PATH}/status")))
        .respond_with(running())
        .mount(&server)
        .await;

    let deadline = Duration::from_millis(200);
    let started = Instant::now();
    let err = client
        .wait_task_with(&upid, deadline, TICK)
        .await
        .unwrap_err();
    let elapsed = started.elapsed();
    assert!(matches!(err, Error::Timeout { .. }), "{err:?}");
    assert!(elapsed >= deadline, "gave up after {elapsed:?}");
    assert!(elapsed < deadline * 10, "overran deadline: {elapsed:?}");
}

#[tokio::test]
async fn unreadable_log_leaves_tail_empty() {
    let (server, client, upid) = setup().await;

    Mock::given(method("GET"))
        .and(path(format!("{TASK_PATH}/status")))
        .respond_with(stopped("command 'qm start 100' failed: exit code 1"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{TASK_PATH}/log")))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let err = client
        .wait_task_with(&upid, Duration::from_secs(10), TICK)
        .await
        .unwrap_err();
    match err {
        Error::TaskFailed { log_tail, .. } => assert!(log_tail.is_empty()),
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn auth_failure_aborts_immediately() {
    let (server, client, upid) = setup().await;

    Mock::given(method("GET"))
        .and(path(format!("{TASK_PATH}/status")))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let err = client
        .wait_task_with(&upid, Duration::from_secs(10), TICK)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Authentication { .. }), "{err:?}");
}

#[tokio::test]
async fn async_operation_returns_parsed_handle() {
    let (server, client, _) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api2/json/nodes/pve1/qemu/100/status/start"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": UPID })))
        .mount(&server)
        .await;

    let upid = client
        .execute_task(Method::POST, "nodes/pve1/qemu/100/status/start", &FormBody::new())
        .await
        .unwrap();
    assert_eq!(upid.node(), "pve1");
    assert_eq!(upid.task_type(), "qmstart");
}

#[tokio::test]
async fn stop_sends_delete_for_task() {
    let (server, client, upid) = setup().await;

    Mock::given(method("DELETE"))
        .and(path(TASK_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": null })))
        .expect(1)
        .mount(&server)
        .await;

    client.stop_task(&upid).await.unwrap();
}
