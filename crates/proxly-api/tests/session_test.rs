#![allow(clippy::unwrap_used)]
// Integration tests for authentication and request execution using wiremock.

use std::time::Duration;

use serde_json::json;
use url::Url;
use wiremock::matchers::{body_string, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use proxly_api::{ApiClient, Credential, Error, FormBody, TransportConfig, WireValue};

// ── Helpers ─────────────────────────────────────────────────────────

const TICKET: &str = "PVE:root@pam:65F0A1B2::c2lnbmF0dXJl/+=";
const CSRF: &str = "65F0A1B2:Y3NyZg";

async fn setup(credential: Credential) -> (MockServer, ApiClient) {
    let server = MockServer::start().await;
    let client = ApiClient::with_client(
        reqwest::Client::new(),
        Url::parse(&server.uri()).unwrap(),
        credential,
    );
    (server, client)
}

async fn mount_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api2/json/access/ticket"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "ticket": TICKET, "CSRFPreventionToken": CSRF, "username": "root@pam" }
        })))
        .mount(server)
        .await;
}

async fn logged_in() -> (MockServer, ApiClient) {
    let (server, client) = setup(Credential::password("root@pam", "pa ss!")).await;
    mount_login(&server).await;
    client.authenticate().await.unwrap();
    (server, client)
}

// ── Login ───────────────────────────────────────────────────────────

#[tokio::test]
async fn login_sends_encoded_credentials_and_stores_ticket() {
    let (server, client) = setup(Credential::password("root@pam", "pa ss!")).await;

    Mock::given(method("POST"))
        .and(path("/api2/json/access/ticket"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string("username=root%40pam&password=pa%20ss!"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "ticket": TICKET, "CSRFPreventionToken": CSRF, "username": "root@pam" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    assert!(!client.session().is_authenticated());
    client.authenticate().await.unwrap();
    assert!(client.session().is_authenticated());
    assert_eq!(client.session().ticket().unwrap().username, "root@pam");
}

#[tokio::test]
async fn login_rejection_is_authentication_error() {
    let (server, client) = setup(Credential::password("root@pam", "wrong")).await;

    Mock::given(method("POST"))
        .and(path("/api2/json/access/ticket"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let result = client.authenticate().await;
    assert!(
        matches!(result, Err(Error::Authentication { .. })),
        "expected Authentication error, got: {result:?}"
    );
}

#[tokio::test]
async fn second_factor_required_without_code() {
    let (server, client) = setup(Credential::password("root@pam", "pw")).await;

    Mock::given(method("POST"))
        .and(path("/api2/json/access/ticket"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "ticket": "PVE:!tfa!root@pam:XYZ", "username": "root@pam", "NeedTFA": 1 }
        })))
        .mount(&server)
        .await;

    let result = client.authenticate().await;
    assert!(matches!(result, Err(Error::TwoFactorRequired)), "{result:?}");
    assert!(!client.session().is_authenticated());
}

#[tokio::test]
async fn second_factor_is_submitted_as_challenge() {
    let (server, client) =
        setup(Credential::password("root@pam", "pw").with_otp("123456")).await;

    Mock::given(method("POST"))
        .and(path("/api2/json/access/ticket"))
        .and(body_string_contains("tfa-challenge="))
        .and(body_string_contains("password=totp%3A123456"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "ticket": TICKET, "CSRFPreventionToken": CSRF, "username": "root@pam" }
        })))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api2/json/access/ticket"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "ticket": "PVE:!tfa!root@pam:XYZ", "username": "root@pam", "NeedTFA": 1 }
        })))
        .mount(&server)
        .await;

    client.authenticate().await.unwrap();
    assert!(client.session().is_authenticated());
}

// ── Attaching credentials ───────────────────────────────────────────

#[tokio::test]
async fn get_carries_cookie_but_no_csrf_header() {
    let (server, client) = logged_in().await;

    Mock::given(method("GET"))
        .and(path("/api2/json/version"))
        .and(header(
            "cookie",
            "PVEAuthCookie=PVE%3Aroot%40pam%3A65F0A1B2%3A%3Ac2lnbmF0dXJl%2F%2B%3D",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "version": "8.2.4", "release": "8.2", "repoid": "faa83925" }
        })))
        .mount(&server)
        .await;

    let version = client.version().await.unwrap();
    assert_eq!(version.version, "8.2.4");

    let requests = server.received_requests().await.unwrap();
    let get = requests
        .iter()
        .find(|r| r.url.path() == "/api2/json/version")
        .unwrap();
    assert!(get.headers.get("csrfpreventiontoken").is_none());
}

#[tokio::test]
async fn state_changing_requests_carry_csrf_header() {
    let (server, client) = logged_in().await;

    Mock::given(method("POST"))
        .and(path("/api2/json/access/groups"))
        .and(header("CSRFPreventionToken", CSRF))
        .and(body_string("groupid=ops&comment=night+shift"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": null })))
        .expect(1)
        .mount(&server)
        .await;

    let body = FormBody::new()
        .with("groupid", "ops")
        .with("comment", "night shift");
    let _: Option<serde_json::Value> = client.post("access/groups", &body).await.unwrap();
}

#[tokio::test]
async fn api_token_uses_authorization_header_without_login() {
    let (server, client) = setup(Credential::api_token("ci@pve", "deploy", "0d3c-b7e")).await;

    Mock::given(method("GET"))
        .and(path("/api2/json/nodes"))
        .and(header("authorization", "PVEAPIToken=ci@pve!deploy=0d3c-b7e"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "node": "pve1", "status": "online", "maxcpu": 16 }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    client.authenticate().await.unwrap();
    let nodes = client.nodes().await.unwrap();
    assert_eq!(nodes[0].node, "pve1");
}

#[tokio::test]
async fn request_without_login_fails_locally() {
    let (server, client) = setup(Credential::password("root@pam", "pw")).await;
    let result = client.version().await;
    assert!(matches!(result, Err(Error::SessionExpired)), "{result:?}");
    assert!(server.received_requests().await.unwrap().is_empty());
}

// ── Rejection policy ────────────────────────────────────────────────

#[tokio::test]
async fn rejected_ticket_clears_session_without_retry() {
    let (server, client) = logged_in().await;

    Mock::given(method("GET"))
        .and(path("/api2/json/nodes"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    assert!(matches!(client.nodes().await, Err(Error::SessionExpired)));
    assert!(client.session().ticket().is_none());
    assert!(matches!(client.nodes().await, Err(Error::SessionExpired)));
}

#[tokio::test]
async fn rejected_token_is_authentication_failure() {
    let (server, client) = setup(Credential::api_token("ci@pve", "deploy", "stale")).await;

    Mock::given(method("GET"))
        .and(path("/api2/json/nodes"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let result = client.nodes().await;
    assert!(matches!(result, Err(Error::Authentication { .. })), "{result:?}");
}

// ── Error classification ────────────────────────────────────────────

#[tokio::test]
async fn parameter_errors_become_validation_with_field() {
    let (server, client) = setup(Credential::api_token("ci@pve", "deploy", "x")).await;

    Mock::given(method("POST"))
        .and(path("/api2/json/nodes/pve1/qemu"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "data": null,
            "errors": { "vmid": "value must have a minimum value of 100\n" }
        })))
        .mount(&server)
        .await;

    let body = FormBody::new().with("vmid", "42");
    let err = client
        .post::<serde_json::Value>("nodes/pve1/qemu", &body)
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(400));
    assert_eq!(err.field(), Some("vmid"));
    assert!(!err.is_transient());
    match err {
        Error::Validation { errors, .. } => {
            assert_eq!(errors["vmid"], "value must have a minimum value of 100");
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn server_faults_are_transient() {
    let (server, client) = setup(Credential::api_token("ci@pve", "deploy", "x")).await;

    Mock::given(method("GET"))
        .and(path("/api2/json/cluster/resources"))
        .and(query_param("type", "vm"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "data": null, "message": "cluster not ready - no quorum?"
        })))
        .mount(&server)
        .await;

    let err = client.cluster_resources(Some("vm")).await.unwrap_err();
    assert!(err.is_transient());
    assert!(
        matches!(err, Error::Server { status: 500, ref message } if message.contains("no quorum")),
        "{err:?}"
    );
}

#[tokio::test]
async fn slow_response_is_a_timeout() {
    let server = MockServer::start().await;
    let transport = TransportConfig::default().with_timeout(Duration::from_millis(200));
    let client = ApiClient::new(
        &server.uri(),
        Credential::api_token("ci@pve", "deploy", "x"),
        &transport,
    )
    .unwrap();

    Mock::given(method("GET"))
        .and(path("/api2/json/version"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "data": { "version": "8.2.4" } }))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let err = client.version().await.unwrap_err();
    assert!(
        matches!(err, Error::Timeout { ref waiting_for, .. } if waiting_for == "GET version"),
        "{err:?}"
    );
    assert!(err.is_transient());
}

#[tokio::test]
async fn key_blobs_are_double_encoded_on_the_wire() {
    let (server, client) = setup(Credential::api_token("ci@pve", "deploy", "x")).await;

    Mock::given(method("PUT"))
        .and(path("/api2/json/nodes/pve1/qemu/100/config"))
        .and(body_string("sshkeys=ssh-ed25519%2520AAAA%252B%252F%2520me%2540box"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": null })))
        .expect(1)
        .mount(&server)
        .await;

    let body =
        FormBody::new().with_value("sshkeys", WireValue::key_blob("ssh-ed25519 AAAA+/ me@box"));
    let _: Option<serde_json::Value> = client
        .put("nodes/pve1/qemu/100/config", &body)
        .await
        .unwrap();
}

#[tokio::test]
async fn next_id_accepts_string_data() {
    let (server, client) = setup(Credential::api_token("ci@pve", "deploy", "x")).await;

    Mock::given(method("GET"))
        .and(path("/api2/json/cluster/nextid"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": "104" })))
        .mount(&server)
        .await;

    assert_eq!(client.next_id(None).await.unwrap(), 104);
}
