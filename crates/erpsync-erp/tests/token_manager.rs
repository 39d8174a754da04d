//! Integration tests for `TokenManager` against a mock token endpoint.

mod common;

use chrono::Duration;
use erpsync_erp::{AuthError, TokenManager};
use serde_json::json;
use wiremock::matchers::{basic_auth, body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{now, record, FixedClock, MemoryGateway, TENANT};

fn manager(
    server: &MockServer,
    gateway: MemoryGateway,
    margin: Duration,
) -> TokenManager<MemoryGateway, FixedClock> {
    TokenManager::new(TENANT, gateway, reqwest::Client::new(), &server.uri(), margin)
        .with_clock(FixedClock(now()))
}

async fn mount_refresh(server: &MockServer, body: serde_json::Value, times: u64) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(basic_auth("client", "secret"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=refresh-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(times)
        .mount(server)
        .await;
}

#[tokio::test]
async fn valid_token_is_returned_without_refreshing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let gateway = MemoryGateway::with_record(record("token-1", Duration::hours(1)));
    let tokens = manager(&server, gateway.clone(), Duration::minutes(10));

    assert_eq!(tokens.get_valid_token().await.unwrap(), "token-1");
    assert_eq!(gateway.saves(), 0);
}

#[tokio::test]
async fn token_inside_margin_is_refreshed_and_persisted() {
    let server = MockServer::start().await;
    mount_refresh(
        &server,
        json!({
            "access_token": "token-2",
            "refresh_token": "refresh-2",
            "expires_in": 21600,
            "token_type": "Bearer"
        }),
        1,
    )
    .await;

    // Expires in 2 minutes with a 5 minute margin.
    let gateway = MemoryGateway::with_record(record("token-1", Duration::minutes(2)));
    let tokens = manager(&server, gateway.clone(), Duration::minutes(5));

    assert_eq!(tokens.get_valid_token().await.unwrap(), "token-2");

    let stored = gateway.current().unwrap();
    assert_eq!(stored.access_token, "token-2");
    assert_eq!(stored.refresh_token, "refresh-2");
    assert_eq!(stored.expires_at, now() + Duration::seconds(21600));
    assert_eq!(stored.client_id, "client", "client credentials are kept");
    assert_eq!(gateway.saves(), 1);
}

#[tokio::test]
async fn refresh_happens_once_for_repeated_calls_at_the_same_time() {
    let server = MockServer::start().await;
    mount_refresh(
        &server,
        json!({"access_token": "token-2", "refresh_token": "refresh-2", "expires_in": 21600}),
        1,
    )
    .await;

    let gateway = MemoryGateway::with_record(record("token-1", Duration::minutes(-30)));
    let tokens = manager(&server, gateway.clone(), Duration::minutes(10));

    let first = tokens.get_valid_token().await.unwrap();
    let second = tokens.get_valid_token().await.unwrap();
    assert_eq!(first, second);
    assert_eq!(gateway.saves(), 1);
}

#[tokio::test]
async fn force_refresh_ignores_expiry() {
    let server = MockServer::start().await;
    mount_refresh(
        &server,
        json!({"access_token": "token-2", "expires_in": 3600}),
        1,
    )
    .await;

    let gateway = MemoryGateway::with_record(record("token-1", Duration::hours(5)));
    let tokens = manager(&server, gateway.clone(), Duration::minutes(10));

    assert_eq!(tokens.force_refresh().await.unwrap(), "token-2");
    let stored = gateway.current().unwrap();
    assert_eq!(
        stored.refresh_token, "refresh-1",
        "refresh token is kept when the ERP does not rotate it"
    );
}

#[tokio::test]
async fn missing_record_is_an_auth_error() {
    let server = MockServer::start().await;
    let tokens = manager(&server, MemoryGateway::default(), Duration::minutes(10));

    let err = tokens.get_valid_token().await.unwrap_err();
    assert!(
        matches!(err, AuthError::MissingCredentials { ref tenant } if tenant == TENANT),
        "got {err:?}"
    );
}

#[tokio::test]
async fn rejected_refresh_is_an_auth_error_and_nothing_is_saved() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(400).set_body_string(r#"{"error":"invalid_grant"}"#))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = MemoryGateway::with_record(record("token-1", Duration::minutes(-1)));
    let tokens = manager(&server, gateway.clone(), Duration::minutes(10));

    let err = tokens.get_valid_token().await.unwrap_err();
    assert!(
        matches!(err, AuthError::RefreshRejected { status: 400, ref body, .. } if body.contains("invalid_grant")),
        "got {err:?}"
    );
    assert_eq!(gateway.saves(), 0);
    assert_eq!(gateway.current().unwrap().access_token, "token-1");
}

#[tokio::test]
async fn out_of_range_expires_in_is_an_auth_error_and_nothing_is_saved() {
    let server = MockServer::start().await;
    mount_refresh(
        &server,
        json!({"access_token": "token-2", "refresh_token": "refresh-2", "expires_in": i64::MAX}),
        1,
    )
    .await;

    let gateway = MemoryGateway::with_record(record("token-1", Duration::minutes(-1)));
    let tokens = manager(&server, gateway.clone(), Duration::minutes(10));

    let err = tokens.get_valid_token().await.unwrap_err();
    assert!(
        matches!(err, AuthError::InvalidExpiry { expires_in: i64::MAX, .. }),
        "got {err:?}"
    );
    assert_eq!(gateway.saves(), 0);
    assert_eq!(gateway.current().unwrap().access_token, "token-1");
}

#[tokio::test]
async fn negative_expires_in_is_an_auth_error() {
    let server = MockServer::start().await;
    mount_refresh(
        &server,
        json!({"access_token": "token-2", "expires_in": -60}),
        1,
    )
    .await;

    let gateway = MemoryGateway::with_record(record("token-1", Duration::minutes(-1)));
    let tokens = manager(&server, gateway.clone(), Duration::minutes(10));

    let err = tokens.get_valid_token().await.unwrap_err();
    assert!(
        matches!(err, AuthError::InvalidExpiry { expires_in: -60, .. }),
        "got {err:?}"
    );
    assert_eq!(gateway.saves(), 0);
}

#[tokio::test]
async fn unreachable_token_endpoint_is_an_auth_error() {
    // Nothing listens on port 1.
    let uri = "http://127.0.0.1:1";

    let gateway = MemoryGateway::with_record(record("token-1", Duration::minutes(-1)));
    let tokens = TokenManager::new(
        TENANT,
        gateway,
        reqwest::Client::new(),
        uri,
        Duration::minutes(10),
    )
    .with_clock(FixedClock(now()));

    let err = tokens.get_valid_token().await.unwrap_err();
    assert!(matches!(err, AuthError::RefreshTransport { .. }), "got {err:?}");
}
