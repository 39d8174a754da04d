//! Integration tests for `PageWalker` and `ErpClient` using wiremock HTTP mocks.

mod common;

use chrono::Duration;
use erpsync_erp::{AuthError, ErpError, RetryPolicy};
use serde_json::json;
use wiremock::matchers::{basic_auth, bearer_token, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{client, client_with, record, records, settings, MemoryGateway};

fn page_body(records: Vec<serde_json::Value>) -> serde_json::Value {
    json!({ "data": records })
}

async fn mount_page(server: &MockServer, endpoint: &str, page: u32, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(endpoint))
        .and(query_param("pagina", page.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

// ---------------------------------------------------------------------------
// Termination and ordering
// ---------------------------------------------------------------------------

#[tokio::test]
async fn walks_every_page_in_order_until_empty_page() {
    let server = MockServer::start().await;
    mount_page(&server, "/produtos", 1, page_body(records(1, 100))).await;
    mount_page(&server, "/produtos", 2, page_body(records(101, 100))).await;
    mount_page(&server, "/produtos", 3, page_body(records(201, 50))).await;
    Mock::given(method("GET"))
        .and(path("/produtos"))
        .and(query_param("pagina", "4"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(vec![])))
        .expect(1)
        .mount(&server)
        .await;

    let (client, _) = client(&server);
    let mut walker = client.pages("/produtos", Vec::new(), 1);

    let mut numbers = Vec::new();
    let mut ids = Vec::new();
    while let Some(page) = walker.next_page().await.expect("walk should not fail") {
        numbers.push(page.number);
        ids.extend(page.records.iter().map(|r| r["id"].as_i64().unwrap()));
    }

    // ceil(250 / 100) = 3 pages, in order, nothing repeated.
    assert_eq!(numbers, vec![1, 2, 3]);
    assert_eq!(ids, (1..=250).collect::<Vec<_>>());
    assert_eq!(walker.pages_fetched(), 3);

    // Finished walkers stay finished without another request.
    assert!(walker.next_page().await.unwrap().is_none());
    assert!(walker.is_done());
    assert!(!walker.is_truncated());
}

#[tokio::test]
async fn walk_starting_at_the_last_page_number_stops_after_it() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/produtos"))
        .and(query_param("pagina", u32::MAX.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(records(1, 2))))
        .expect(1)
        .mount(&server)
        .await;

    let (client, _) = client(&server);
    let mut walker = client.pages("/produtos", Vec::new(), u32::MAX);

    let page = walker.next_page().await.unwrap().expect("one page");
    assert_eq!(page.number, u32::MAX);
    assert!(walker.next_page().await.unwrap().is_none());
    assert!(walker.is_done());
    assert!(walker.is_truncated());
}

#[tokio::test]
async fn empty_first_page_yields_no_pages() {
    let server = MockServer::start().await;
    mount_page(&server, "/nfe", 1, page_body(vec![])).await;

    let (client, _) = client(&server);
    let mut walker = client.pages("/nfe", Vec::new(), 1);

    assert!(walker.next_page().await.unwrap().is_none());
    assert_eq!(walker.pages_fetched(), 0);
}

#[tokio::test]
async fn missing_data_field_ends_the_walk() {
    let server = MockServer::start().await;
    mount_page(&server, "/nfe", 1, json!({})).await;

    let (client, _) = client(&server);
    let mut walker = client.pages("/nfe", Vec::new(), 1);
    assert!(walker.next_page().await.unwrap().is_none());
}

#[tokio::test]
async fn walk_starts_at_requested_page_with_filters_and_page_size() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/produtos"))
        .and(query_param("criterio", "5"))
        .and(query_param("pagina", "7"))
        .and(query_param("limite", "100"))
        .and(bearer_token("token-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(records(1, 3))))
        .expect(1)
        .mount(&server)
        .await;
    mount_page(&server, "/produtos", 8, page_body(vec![])).await;

    let (client, _) = client(&server);
    let mut walker = client.pages(
        "/produtos",
        vec![("criterio".to_string(), "5".to_string())],
        7,
    );
    let page = walker.next_page().await.unwrap().expect("page 7");
    assert_eq!(page.number, 7);
    assert_eq!(page.len(), 3);
    assert!(walker.next_page().await.unwrap().is_none());
}

// ---------------------------------------------------------------------------
// Upstream failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn server_error_ends_walk_after_yielded_pages() {
    let server = MockServer::start().await;
    mount_page(&server, "/pedidos/compras", 1, page_body(records(1, 2))).await;
    Mock::given(method("GET"))
        .and(path("/pedidos/compras"))
        .and(query_param("pagina", "2"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&server)
        .await;

    let (client, _) = client(&server);
    let mut walker = client.pages("/pedidos/compras", Vec::new(), 1);

    let first = walker.next_page().await.unwrap().expect("page 1");
    assert_eq!(first.len(), 2);

    let err = walker.next_page().await.unwrap_err();
    assert!(
        matches!(err, ErpError::UpstreamStatus { status: 500, ref body, .. } if body == "boom"),
        "got {err:?}"
    );
    assert!(!err.is_fatal());

    assert!(walker.next_page().await.unwrap().is_none(), "not restartable");
}

#[tokio::test]
async fn rate_limited_page_is_retried_then_yielded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/nfe"))
        .and(query_param("pagina", "1"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    mount_page(&server, "/nfe", 1, page_body(records(1, 1))).await;

    let (client, _) = client(&server);
    let mut walker = client.pages("/nfe", Vec::new(), 1);
    let page = walker.next_page().await.unwrap().expect("page after backoff");
    assert_eq!(page.number, 1);
}

#[tokio::test]
async fn rate_limit_retries_are_capped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/nfe"))
        .respond_with(ResponseTemplate::new(429))
        .expect(3) // 1 initial + 2 retries
        .mount(&server)
        .await;

    let mut settings = settings(&server);
    settings.retry = RetryPolicy {
        max_rate_limit_retries: 2,
        ..RetryPolicy::default()
    }
    .without_delays();
    let gateway = MemoryGateway::with_record(record("token-1", Duration::hours(6)));
    let client = client_with(settings, gateway);

    let mut walker = client.pages("/nfe", Vec::new(), 1);
    let err = walker.next_page().await.unwrap_err();
    assert!(
        matches!(err, ErpError::RateLimitExceeded { attempts: 3, .. }),
        "got {err:?}"
    );
    assert!(walker.next_page().await.unwrap().is_none());
}

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unauthorized_forces_one_refresh_and_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/produtos"))
        .and(bearer_token("token-1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/produtos"))
        .and(query_param("pagina", "1"))
        .and(bearer_token("token-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(records(1, 1))))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(basic_auth("client", "secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "token-2",
            "refresh_token": "refresh-2",
            "expires_in": 21600
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (client, gateway) = client(&server);
    let mut walker = client.pages("/produtos", Vec::new(), 1);
    let page = walker.next_page().await.unwrap().expect("page after refresh");

    assert_eq!(page.number, 1);
    assert_eq!(gateway.saves(), 1, "one persistence write per refresh");
    let stored = gateway.current().unwrap();
    assert_eq!(stored.access_token, "token-2");
    assert_eq!(stored.refresh_token, "refresh-2");
}

#[tokio::test]
async fn second_unauthorized_is_an_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/produtos"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "token-2",
            "refresh_token": "refresh-2",
            "expires_in": 21600
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (client, _) = client(&server);
    let mut walker = client.pages("/produtos", Vec::new(), 1);
    let err = walker.next_page().await.unwrap_err();

    assert!(
        matches!(err, ErpError::Auth(AuthError::Unauthorized { .. })),
        "got {err:?}"
    );
    assert!(err.is_fatal());
}

#[tokio::test]
async fn expired_token_is_refreshed_before_the_page_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "token-2",
            "refresh_token": "refresh-2",
            "expires_in": 21600
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/nfe"))
        .and(bearer_token("token-2"))
        .and(query_param("pagina", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(records(1, 1))))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/nfe"))
        .and(bearer_token("token-2"))
        .and(query_param("pagina", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(vec![])))
        .mount(&server)
        .await;

    let gateway = MemoryGateway::with_record(record("token-1", Duration::minutes(-1)));
    let client = client_with(settings(&server), gateway.clone());
    let mut walker = client.pages("/nfe", Vec::new(), 1);

    assert!(walker.next_page().await.unwrap().is_some());
    // Page 2 resolves the token again and finds the refreshed one valid.
    assert!(walker.next_page().await.unwrap().is_none());
    assert_eq!(gateway.saves(), 1);
}

// ---------------------------------------------------------------------------
// Detail requests
// ---------------------------------------------------------------------------

#[derive(Debug, serde::Deserialize)]
struct Named {
    id: i64,
    nome: String,
}

#[tokio::test]
async fn get_detail_unwraps_data() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/contatos/42"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"data": {"id": 42, "nome": "ACME"}})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/contatos/43"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": null})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/contatos/44"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .mount(&server)
        .await;

    let (client, _) = client(&server);

    let found: Named = client.get_detail("/contatos", 42).await.unwrap().unwrap();
    assert_eq!((found.id, found.nome.as_str()), (42, "ACME"));

    let missing: Option<Named> = client.get_detail("/contatos", 43).await.unwrap();
    assert!(missing.is_none());

    let err = client.get_detail::<Named>("/contatos", 44).await.unwrap_err();
    assert!(matches!(err, ErpError::UpstreamStatus { status: 404, .. }));
}
