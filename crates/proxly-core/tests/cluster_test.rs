#![allow(clippy::unwrap_used)]
// Cluster facade against a mock server: reconcile-then-apply, idempotent
// delete, task-returning kinds and guest id allocation.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_string, body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use proxly_api::{ApiClient, Credential, TransportConfig, segment};
use proxly_core::{
    AppliedAction, Cluster, CoreError, DeleteOutcome, DesiredField, GroupConfig, GuestAction,
    GuestConfig, GuestId, ResourceKind, ResourceRegistry, ResourceSpec, Scope, StorageConfig,
    TokenConfig,
};

const TICK: Duration = Duration::from_millis(20);

fn upid(task: &str, id: u32) -> String {
    format!("UPID:pve1:0000C2B6:0029A1DF:65F0A1B2:{task}:{id}:ci@pve!deploy:")
}

async fn setup() -> (MockServer, Cluster) {
    let server = MockServer::start().await;
    let client = ApiClient::new(
        &server.uri(),
        Credential::api_token("ci@pve", "deploy", "secret"),
        &TransportConfig::default(),
    )
    .unwrap();
    let cluster = Cluster::from_client(client, ResourceRegistry::standard())
        .with_task_timeout(Duration::from_secs(5))
        .with_poll_interval(TICK);
    (server, cluster)
}

fn ok(data: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "data": data }))
}

fn missing(what: &str) -> ResponseTemplate {
    ResponseTemplate::new(500).set_body_json(json!({ "data": null, "message": format!("{what} does not exist\n") }))
}

async fn mount_task_ok(server: &MockServer, upid: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/api2/json/nodes/pve1/tasks/{}/status", segment(upid))))
        .respond_with(ok(json!({ "status": "stopped", "exitstatus": "OK" })))
        .mount(server)
        .await;
}

async fn mount_inventory(server: &MockServer, ids: &[u32]) {
    let vms: Vec<_> = ids
        .iter()
        .map(|id| json!({ "id": format!("qemu/{id}"), "type": "qemu", "node": "pve1", "vmid": id }))
        .collect();
    Mock::given(method("GET"))
        .and(path("/api2/json/cluster/resources"))
        .and(query_param("type", "vm"))
        .respond_with(ok(json!(vms)))
        .mount(server)
        .await;
}

fn group(comment: DesiredField<String>) -> ResourceSpec {
    GroupConfig {
        groupid: "ops".into(),
        comment,
    }
    .into()
}

fn guest(vmid: u32) -> GuestConfig {
    let mut g = GuestConfig::new("pve1", GuestId::new(vmid).unwrap());
    g.name = DesiredField::Value("web-01".into());
    g.memory = DesiredField::Value(2048);
    g
}

// ── Reconcile and apply ─────────────────────────────────────────────

#[tokio::test]
async fn set_creates_absent_group_with_identifier() {
    let (server, cluster) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api2/json/access/groups/ops"))
        .respond_with(missing("group 'ops'"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api2/json/access/groups"))
        .and(body_string("groupid=ops&comment=night+shift"))
        .respond_with(ok(json!(null)))
        .expect(1)
        .mount(&server)
        .await;

    let applied = cluster
        .set(&group(DesiredField::Value("night shift".into())))
        .await
        .unwrap();
    assert_eq!(applied.action, AppliedAction::Created);
    assert_eq!(applied.changed, vec!["comment".to_owned()]);
    assert!(applied.task.is_none());
}

#[tokio::test]
async fn set_with_matching_state_sends_nothing() {
    let (server, cluster) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api2/json/access/groups/ops"))
        .respond_with(ok(json!({ "comment": "night shift", "members": [] })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ok(json!(null)))
        .expect(0)
        .mount(&server)
        .await;

    let applied = cluster
        .set(&group(DesiredField::Value("night shift".into())))
        .await
        .unwrap();
    assert_eq!(applied.action, AppliedAction::Unchanged);
    assert!(applied.changed.is_empty());
}

#[tokio::test]
async fn update_clears_field_with_put() {
    let (server, cluster) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api2/json/access/groups/ops"))
        .respond_with(ok(json!({ "comment": "old", "members": ["alice@pve"] })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api2/json/access/groups/ops"))
        .and(body_string("comment="))
        .respond_with(ok(json!(null)))
        .expect(1)
        .mount(&server)
        .await;

    let applied = cluster.update(&group(DesiredField::Cleared)).await.unwrap();
    assert_eq!(applied.action, AppliedAction::Updated);
}

#[tokio::test]
async fn update_of_absent_resource_is_not_found() {
    let (server, cluster) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api2/json/access/groups/ops"))
        .respond_with(missing("group 'ops'"))
        .mount(&server)
        .await;

    let err = cluster
        .update(&group(DesiredField::Value("x".into())))
        .await
        .unwrap_err();
    assert!(err.is_not_found(), "{err:?}");
}

#[tokio::test]
async fn update_skips_create_only_fields() {
    let (server, cluster) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api2/json/storage/backup"))
        .respond_with(ok(json!({ "type": "dir", "path": "/mnt/old", "content": "backup" })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api2/json/storage/backup"))
        .and(body_string("path=%2Fmnt%2Fbackup"))
        .respond_with(ok(json!(null)))
        .expect(1)
        .mount(&server)
        .await;

    let storage = StorageConfig {
        storage: "backup".into(),
        storage_type: DesiredField::Value("nfs".into()),
        path: DesiredField::Value("/mnt/backup".into()),
        content: DesiredField::Value(vec!["backup".into()]),
        nodes: DesiredField::Unset,
        disable: DesiredField::Unset,
    };
    let applied = cluster.update(&storage.into()).await.unwrap();
    assert_eq!(applied.changed, vec!["path".to_owned()]);
}

#[tokio::test]
async fn create_requires_storage_type_without_sending() {
    let (server, cluster) = setup().await;

    Mock::given(method("POST"))
        .respond_with(ok(json!(null)))
        .expect(0)
        .mount(&server)
        .await;

    let storage = StorageConfig {
        storage: "backup".into(),
        storage_type: DesiredField::Unset,
        path: DesiredField::Value("/mnt/backup".into()),
        content: DesiredField::Unset,
        nodes: DesiredField::Unset,
        disable: DesiredField::Unset,
    };
    let err = cluster.create(&storage.into()).await.unwrap_err();
    assert!(
        matches!(err, CoreError::ValidationFailed { field: Some(ref f), .. } if f == "type"),
        "{err:?}"
    );
}

#[tokio::test]
async fn token_create_posts_to_item_and_returns_secret() {
    let (server, cluster) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api2/json/access/users/ci%40pve/token/deploy"))
        .and(body_string("privsep=0"))
        .respond_with(ok(json!({ "full-tokenid": "ci@pve!deploy", "value": "0b5e-secret" })))
        .expect(1)
        .mount(&server)
        .await;

    let token = TokenConfig {
        userid: "ci@pve".into(),
        tokenid: "deploy".into(),
        comment: DesiredField::Unset,
        expire: DesiredField::Unset,
        privsep: DesiredField::Value(false),
    };
    let applied = cluster.create(&token.into()).await.unwrap();
    assert_eq!(applied.response.unwrap()["value"], "0b5e-secret");
}

// ── Delete ──────────────────────────────────────────────────────────

#[tokio::test]
async fn deleting_twice_reports_did_not_exist() {
    let (server, cluster) = setup().await;

    Mock::given(method("DELETE"))
        .and(path("/api2/json/pools/lab"))
        .respond_with(ok(json!(null)))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api2/json/pools/lab"))
        .respond_with(missing("pool 'lab'"))
        .mount(&server)
        .await;

    let scope = Scope::default();
    assert_eq!(
        cluster.delete(ResourceKind::Pool, "lab", &scope).await.unwrap(),
        DeleteOutcome::Deleted
    );
    assert_eq!(
        cluster.delete(ResourceKind::Pool, "lab", &scope).await.unwrap(),
        DeleteOutcome::DidNotExist
    );
}

#[tokio::test]
async fn guest_delete_waits_on_task() {
    let (server, cluster) = setup().await;
    let task = upid("qmdestroy", 100);

    Mock::given(method("DELETE"))
        .and(path("/api2/json/nodes/pve1/qemu/100"))
        .respond_with(ok(json!(task)))
        .expect(1)
        .mount(&server)
        .await;
    mount_task_ok(&server, &task).await;

    let outcome = cluster
        .delete(ResourceKind::Guest, "100", &Scope::node("pve1"))
        .await
        .unwrap();
    assert_eq!(outcome, DeleteOutcome::Deleted);
}

#[tokio::test]
async fn deleted_guest_id_is_free_again() {
    let (server, cluster) = setup().await;
    let task = upid("qmdestroy", 100);
    let id = GuestId::new(100).unwrap();
    let scope = Scope::node("pve1");

    // The inventory shows the guest once, and is empty after the delete.
    Mock::given(method("GET"))
        .and(path("/api2/json/cluster/resources"))
        .and(query_param("type", "vm"))
        .respond_with(ok(json!([
            { "id": "qemu/100", "type": "qemu", "node": "pve1", "vmid": 100 }
        ])))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    mount_inventory(&server, &[]).await;

    Mock::given(method("DELETE"))
        .and(path("/api2/json/nodes/pve1/qemu/100"))
        .respond_with(ok(json!(task)))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api2/json/nodes/pve1/qemu/100"))
        .respond_with(missing("Configuration file 'nodes/pve1/qemu-server/100.conf'"))
        .mount(&server)
        .await;
    mount_task_ok(&server, &task).await;

    assert!(cluster.allocator().await.unwrap().exists(id));
    assert_eq!(
        cluster.delete(ResourceKind::Guest, "100", &scope).await.unwrap(),
        DeleteOutcome::Deleted
    );
    assert!(!cluster.allocator().await.unwrap().exists(id));
    assert_eq!(
        cluster.delete(ResourceKind::Guest, "100", &scope).await.unwrap(),
        DeleteOutcome::DidNotExist
    );
}

// ── Guests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn guest_create_waits_on_task() {
    let (server, cluster) = setup().await;
    let task = upid("qmcreate", 100);

    Mock::given(method("POST"))
        .and(path("/api2/json/nodes/pve1/qemu"))
        .and(body_string("vmid=100&name=web-01&memory=2048"))
        .respond_with(ok(json!(task)))
        .expect(1)
        .mount(&server)
        .await;
    mount_task_ok(&server, &task).await;

    let applied = cluster.create(&guest(100).into()).await.unwrap();
    assert_eq!(applied.task.unwrap().exit_status, "OK");
}

#[tokio::test]
async fn guest_create_conflict_is_guest_id_in_use() {
    let (server, cluster) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api2/json/nodes/pve1/qemu"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "data": null,
            "message": "unable to create VM 100 - VM 100 already exists on node 'pve2'\n"
        })))
        .mount(&server)
        .await;

    let err = cluster.create(&guest(100).into()).await.unwrap_err();
    assert!(matches!(err, CoreError::GuestIdInUse { id: 100 }), "{err:?}");
}

#[tokio::test]
async fn auto_id_create_moves_past_a_taken_id() {
    let (server, cluster) = setup().await;
    mount_inventory(&server, &[100, 101]).await;

    Mock::given(method("POST"))
        .and(path("/api2/json/nodes/pve1/qemu"))
        .and(body_string_contains("vmid=102"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "data": null,
            "message": "unable to create VM 102 - config file already exists\n"
        })))
        .expect(1)
        .mount(&server)
        .await;
    let task = upid("qmcreate", 103);
    Mock::given(method("POST"))
        .and(path("/api2/json/nodes/pve1/qemu"))
        .and(body_string_contains("vmid=103"))
        .respond_with(ok(json!(task)))
        .expect(1)
        .mount(&server)
        .await;
    mount_task_ok(&server, &task).await;

    let applied = cluster.create_guest_auto_id(guest(100), 0).await.unwrap();
    assert_eq!(applied.identifier, "103");
    assert_eq!(applied.action, AppliedAction::Created);
}

#[tokio::test]
async fn allocator_reads_fresh_inventory() {
    let (server, cluster) = setup().await;
    mount_inventory(&server, &[100, 101, 250]).await;

    assert_eq!(cluster.next_free_id(0).await.unwrap().get(), 102);
    assert_eq!(cluster.next_free_id(250).await.unwrap().get(), 251);
    assert_eq!(cluster.max_id().await.unwrap().get(), 250);
    assert_eq!(cluster.guest_node(GuestId::new(250).unwrap()).await.unwrap(), "pve1");
}

#[tokio::test]
async fn validate_free_asks_the_server() {
    let (server, cluster) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api2/json/cluster/nextid"))
        .and(query_param("vmid", "100"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "data": null,
            "errors": { "vmid": "VM 100 already exists" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api2/json/cluster/nextid"))
        .and(query_param("vmid", "104"))
        .respond_with(ok(json!("104")))
        .mount(&server)
        .await;

    assert!(!cluster.validate_free(GuestId::new(100).unwrap()).await.unwrap());
    assert!(cluster.validate_free(GuestId::new(104).unwrap()).await.unwrap());
}

#[tokio::test]
async fn guest_action_posts_and_waits() {
    let (server, cluster) = setup().await;
    let task = upid("qmstart", 100);

    Mock::given(method("POST"))
        .and(path("/api2/json/nodes/pve1/qemu/100/status/start"))
        .respond_with(ok(json!(task)))
        .expect(1)
        .mount(&server)
        .await;
    mount_task_ok(&server, &task).await;

    let result = cluster
        .guest_action("pve1", GuestId::new(100).unwrap(), GuestAction::Start)
        .await
        .unwrap();
    assert_eq!(result.upid.task_type(), "qmstart");
}

#[tokio::test]
async fn failed_guest_action_carries_log_tail() {
    let (server, cluster) = setup().await;
    let task = upid("qmstart", 100);

    Mock::given(method("POST"))
        .and(path("/api2/json/nodes/pve1/qemu/100/status/start"))
        .respond_with(ok(json!(task)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/api2/json/nodes/pve1/tasks/{}/status", segment(&task))))
        .respond_with(ok(json!({ "status": "stopped", "exitstatus": "start failed: no memory" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/api2/json/nodes/pve1/tasks/{}/log", segment(&task))))
        .respond_with(ok(json!([
            { "n": 1, "t": "starting" },
            { "n": 2, "t": "start failed: no memory" }
        ])))
        .mount(&server)
        .await;

    let err = cluster
        .guest_action("pve1", GuestId::new(100).unwrap(), GuestAction::Start)
        .await
        .unwrap_err();
    match err {
        CoreError::TaskFailed { exit_status, log_tail, .. } => {
            assert_eq!(exit_status, "start failed: no memory");
            assert_eq!(log_tail.last().unwrap(), "start failed: no memory");
        }
        other => panic!("unexpected: {other:?}"),
    }
}
