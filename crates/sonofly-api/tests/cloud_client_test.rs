#![allow(clippy::unwrap_used)]
// Integration tests for `CloudClient` using wiremock.

use pretty_assertions::assert_eq;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, json};
use url::Url;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use sonofly_api::{CloudClient, CloudRegion, Error, TransportConfig};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, CloudClient) {
    let server = MockServer::start().await;
    let base_url = Url::parse(&server.uri()).unwrap();
    let client = CloudClient::with_base_url(base_url, &TransportConfig::default()).unwrap();
    (server, client)
}

fn password() -> SecretString {
    SecretString::from("hunter2".to_string())
}

async fn mount_login_ok(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v2/user/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": 0,
            "msg": "",
            "data": {
                "at": "access-token",
                "user": {"apikey": "user-apikey"},
                "region": "eu"
            }
        })))
        .mount(server)
        .await;
}

// ── Authentication tests ────────────────────────────────────────────

#[tokio::test]
async fn test_login_success_stores_auth() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/v2/user/login"))
        .and(body_partial_json(json!({
            "email": "user@example.com",
            "password": "hunter2"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": 0,
            "data": {
                "at": "access-token",
                "user": {"apikey": "user-apikey"},
                "region": "eu"
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    assert!(!client.has_auth());
    let auth = client.login("user@example.com", &password()).await.unwrap();

    assert_eq!(auth.access_token.expose_secret(), "access-token");
    assert_eq!(auth.api_key, "user-apikey");
    assert_eq!(auth.region, CloudRegion::Eu);
    assert!(client.has_auth());
}

#[tokio::test]
async fn test_login_wrong_password_is_auth_failure() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/v2/user/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": 10001,
            "msg": "password error"
        })))
        .mount(&server)
        .await;

    let err = client
        .login("user@example.com", &password())
        .await
        .unwrap_err();

    assert!(err.is_auth_failure(), "expected auth failure, got {err:?}");
    assert!(!err.is_transient());
    assert!(!client.has_auth());
}

#[tokio::test]
async fn test_login_http_401_is_auth_failure() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/v2/user/login"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = client
        .login("user@example.com", &password())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Authentication { .. }));
}

#[tokio::test]
async fn test_login_forbidden_is_auth_failure() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/v2/user/login"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let err = client
        .login("user@example.com", &password())
        .await
        .unwrap_err();
    assert!(err.is_auth_failure(), "expected auth failure, got {err:?}");
}

#[tokio::test]
async fn test_login_rate_limited_is_transient() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/v2/user/login"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let err = client
        .login("user@example.com", &password())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Throttled { status: 429 }), "got {err:?}");
    assert!(!err.is_auth_failure());
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_login_request_timeout_is_transient() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/v2/user/login"))
        .respond_with(ResponseTemplate::new(408))
        .mount(&server)
        .await;

    let err = client
        .login("user@example.com", &password())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Throttled { status: 408 }), "got {err:?}");
    assert!(!err.is_auth_failure());
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_login_other_client_error_is_api_error() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/v2/user/login"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = client
        .login("user@example.com", &password())
        .await
        .unwrap_err();
    assert_eq!(err.cloud_error_code(), Some(404));
    assert!(!err.is_auth_failure());
}

#[tokio::test]
async fn test_login_server_error_is_transient() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/v2/user/login"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = client
        .login("user@example.com", &password())
        .await
        .unwrap_err();
    assert!(err.is_transient(), "expected transient error, got {err:?}");
    assert!(!err.is_auth_failure());
}

#[tokio::test]
async fn test_login_follows_region_redirect_once() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/v2/user/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": 10004,
            "data": {"region": "as"}
        })))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v2/user/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": 0,
            "data": {"at": "token", "user": {"apikey": "key"}}
        })))
        .with_priority(2)
        .mount(&server)
        .await;

    let auth = client.login("user@example.com", &password()).await.unwrap();

    // No region in the success body: the redirect's region sticks.
    assert_eq!(auth.region, CloudRegion::As);
}

#[tokio::test]
async fn test_login_repeated_redirect_gives_up() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/v2/user/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": 10004,
            "data": {"region": "cn"}
        })))
        .expect(2)
        .mount(&server)
        .await;

    let err = client
        .login("user@example.com", &password())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::WrongRegion { ref region } if region == "cn"));
}

// ── Device tests ────────────────────────────────────────────────────

#[tokio::test]
async fn test_get_devices_requires_login() {
    let (_server, client) = setup().await;
    let err = client.get_devices().await.unwrap_err();
    assert!(matches!(err, Error::NotAuthenticated));
}

#[tokio::test]
async fn test_get_devices_skips_groups() {
    let (server, client) = setup().await;
    mount_login_ok(&server).await;

    Mock::given(method("GET"))
        .and(path("/v2/device/thing"))
        .and(query_param("num", "0"))
        .and(header("authorization", "Bearer access-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": 0,
            "data": {
                "thingList": [
                    {"itemType": 1, "itemData": {
                        "deviceid": "1000abcd12", "name": "Kitchen",
                        "devicekey": "k1", "online": true,
                        "params": {"switch": "on"}
                    }},
                    {"itemType": 2, "itemData": {
                        "deviceid": "1000abcd13", "name": "Shared lamp"
                    }},
                    {"itemType": 3, "itemData": {"id": "group-1", "name": "Group"}}
                ]
            }
        })))
        .mount(&server)
        .await;

    client.login("user@example.com", &password()).await.unwrap();
    let devices = client.get_devices().await.unwrap();

    assert_eq!(devices.len(), 2);
    assert_eq!(devices[0].deviceid, "1000abcd12");
    assert_eq!(devices[0].devicekey.as_deref(), Some("k1"));
    assert_eq!(devices[0].params["switch"], "on");
    assert_eq!(devices[1].name, "Shared lamp");
}

#[tokio::test]
async fn test_get_devices_401_is_session_expired() {
    let (server, client) = setup().await;
    mount_login_ok(&server).await;

    Mock::given(method("GET"))
        .and(path("/v2/device/thing"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    client.login("user@example.com", &password()).await.unwrap();
    let err = client.get_devices().await.unwrap_err();
    assert!(err.is_auth_expired());
}

#[tokio::test]
async fn test_send_params_posts_status() {
    let (server, client) = setup().await;
    mount_login_ok(&server).await;

    Mock::given(method("POST"))
        .and(path("/v2/device/thing/status"))
        .and(body_partial_json(json!({
            "type": 1,
            "id": "1000abcd12",
            "params": {"switch": "off"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"error": 0, "data": {}})))
        .expect(1)
        .mount(&server)
        .await;

    client.login("user@example.com", &password()).await.unwrap();

    let mut params = Map::new();
    params.insert("switch".into(), json!("off"));
    client.send_params("1000abcd12", &params).await.unwrap();
}

#[tokio::test]
async fn test_send_params_cloud_error_code() {
    let (server, client) = setup().await;
    mount_login_ok(&server).await;

    Mock::given(method("POST"))
        .and(path("/v2/device/thing/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": 4002,
            "msg": "device offline"
        })))
        .mount(&server)
        .await;

    client.login("user@example.com", &password()).await.unwrap();
    let err = client
        .send_params("1000abcd12", &Map::new())
        .await
        .unwrap_err();
    assert_eq!(err.cloud_error_code(), Some(4002));
}

// ── Session lifecycle ───────────────────────────────────────────────

#[tokio::test]
async fn test_start_requires_auth_and_stop_is_idempotent() {
    let (_server, client) = setup().await;

    assert!(matches!(client.start(), Err(Error::NotAuthenticated)));
    client.stop();
    client.stop();
    assert!(!client.is_online());
}
