#![allow(clippy::unwrap_used)]
// Integration tests for `EcoflowClient` using wiremock.

use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{body_json, header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ecoflow_api::{EcoflowClient, Error, Signer};

// ── Helpers ─────────────────────────────────────────────────────────

const QUOTA: &str = "/iot-open/sign/device/quota";
const QUOTA_ALL: &str = "/iot-open/sign/device/quota/all";
const CERTIFICATE: &str = "/iot-open/sign/certification";

async fn setup() -> (MockServer, EcoflowClient) {
    let server = MockServer::start().await;
    let signer = Signer::new("AK123", SecretString::from("SK456".to_string()));
    let client = EcoflowClient::from_reqwest(&server.uri(), reqwest::Client::new(), signer).unwrap();
    (server, client)
}

fn ok(data: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "code": "0",
        "message": "Success",
        "data": data
    }))
}

// ── Signing headers ─────────────────────────────────────────────────

#[tokio::test]
async fn test_requests_carry_signature_headers() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path(QUOTA_ALL))
        .and(query_param("sn", "R331ZEB4ZEAL0528"))
        .and(header("accesskey", "AK123"))
        .and(header_exists("nonce"))
        .and(header_exists("timestamp"))
        .and(header_exists("sign"))
        .respond_with(ok(json!({ "pd.soc": 81 })))
        .expect(1)
        .mount(&server)
        .await;

    let data = client.get_all_quotas("R331ZEB4ZEAL0528").await.unwrap().unwrap();
    assert_eq!(data.get("pd.soc"), Some(&json!(81)));
}

// ── Quota reads ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_get_all_quotas_without_data() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path(QUOTA_ALL))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "code": "0" })))
        .mount(&server)
        .await;

    assert!(client.get_all_quotas("SN1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_execute_get_is_cached() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path(QUOTA))
        .and(body_json(json!({
            "sn": "SN1",
            "params": { "quotas": ["inv.cfgAcEnabled"] }
        })))
        .respond_with(ok(json!({ "inv.cfgAcEnabled": 1 })))
        .expect(1)
        .mount(&server)
        .await;

    let first: u8 = client.execute_get("SN1", "inv.cfgAcEnabled").await.unwrap();
    let second: u8 = client.execute_get("SN1", "inv.cfgAcEnabled").await.unwrap();
    assert_eq!(first, 1);
    assert_eq!(second, 1);
}

#[tokio::test]
async fn test_execute_get_missing_key() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path(QUOTA))
        .respond_with(ok(json!({})))
        .mount(&server)
        .await;

    let result: Result<u8, _> = client.execute_get("SN1", "pd.soc").await;
    assert!(
        matches!(result, Err(Error::MissingData { .. })),
        "expected MissingData error, got: {result:?}"
    );
}

// ── Quota writes ────────────────────────────────────────────────────

#[tokio::test]
async fn test_execute_set_primes_cache() {
    let (server, client) = setup().await;

    Mock::given(method("PUT"))
        .and(path(QUOTA))
        .and(body_json(json!({ "sn": "SN1", "params": { "pd.beepMode": 0 } })))
        .respond_with(ok(json!(null)))
        .expect(1)
        .mount(&server)
        .await;

    client.execute_set("SN1", "pd.beepMode", 0).await.unwrap();

    // Served from cache: no POST mock is mounted.
    let cached: u8 = client.execute_get("SN1", "pd.beepMode").await.unwrap();
    assert_eq!(cached, 0);
}

#[tokio::test]
async fn test_send_set_envelope() {
    let (server, client) = setup().await;

    let envelope = json!({
        "id": 1,
        "version": "1.0",
        "sn": "SN1",
        "moduleType": 1,
        "operateType": "quietCfg",
        "params": { "enabled": 1 }
    });

    Mock::given(method("PUT"))
        .and(path(QUOTA))
        .and(body_json(envelope.clone()))
        .respond_with(ok(json!(null)))
        .expect(1)
        .mount(&server)
        .await;

    client.send_set_envelope(&envelope).await.unwrap();
}

// ── Errors ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_api_error_code() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path(QUOTA_ALL))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "8521",
            "message": "signature is wrong"
        })))
        .mount(&server)
        .await;

    let err = client.get_all_quotas("SN1").await.unwrap_err();
    assert_eq!(err.api_error_code(), Some("8521"));
}

#[tokio::test]
async fn test_http_status_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path(CERTIFICATE))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = client.acquire_certificate().await.unwrap_err();
    assert!(
        matches!(err, Error::HttpStatus { status: 503, .. }),
        "expected HttpStatus error, got: {err:?}"
    );
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_malformed_body() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path(QUOTA_ALL))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>nope</html>"))
        .mount(&server)
        .await;

    let err = client.get_all_quotas("SN1").await.unwrap_err();
    match err {
        Error::Deserialization { body, .. } => assert!(body.contains("nope")),
        other => panic!("expected Deserialization error, got: {other:?}"),
    }
}

// ── Certificate ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_acquire_certificate() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path(CERTIFICATE))
        .respond_with(ok(json!({
            "certificateAccount": "open-AK123",
            "certificatePassword": "mqtt-pw",
            "url": "mqtt-e.ecoflow.com",
            "port": "8883",
            "protocol": "mqtts"
        })))
        .mount(&server)
        .await;

    let cert = client.acquire_certificate().await.unwrap();
    assert_eq!(cert.certificate_account, "open-AK123");
    assert_eq!(cert.port_number().unwrap(), 8883);
    assert!(cert.uses_tls());
}
