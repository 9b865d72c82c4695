//! Name-lookup API chain against a mock HTTP server: response mapping for
//! both API shapes, preference order, and the bounded-retry discipline.

use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mstfinder::backoff::BackoffPolicy;
use mstfinder::config::{BackoffConfig, HttpConfig, NameApiSource};
use mstfinder::name_api::{NameApiChain, NameLookup};

fn http_config() -> HttpConfig {
    HttpConfig {
        user_agent: "mstfinder-tests/0.1".into(),
        request_timeout_secs: 5,
        proxy_url: None,
        verify_ssl: true,
    }
}

fn fast_policy(max_attempts: u32) -> BackoffPolicy {
    BackoffPolicy::from_config(&BackoffConfig {
        max_attempts,
        base: 2.0,
        cap_secs: 0.05,
        jitter_max_secs: 0.0,
    })
}

fn vitax_source(server: &MockServer) -> NameApiSource {
    NameApiSource {
        name: "vitax".into(),
        url_template: format!("{}/api/partner/Invoices/getMST?mst={{mst}}", server.uri()),
        name_path: "result.name".into(),
        success_code_path: None,
        success_code_value: None,
    }
}

fn vietqr_source(server: &MockServer) -> NameApiSource {
    NameApiSource {
        name: "vietqr".into(),
        url_template: format!("{}/v2/business/{{mst}}", server.uri()),
        name_path: "data.name".into(),
        success_code_path: Some("code".into()),
        success_code_value: Some("00".into()),
    }
}

fn chain(sources: Vec<NameApiSource>, max_attempts: u32) -> NameApiChain {
    NameApiChain::new(&http_config(), sources, fast_policy(max_attempts)).unwrap()
}

#[tokio::test]
async fn test_vitax_shape_yields_trimmed_name() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/partner/Invoices/getMST"))
        .and(query_param("mst", "0102234896"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "result": { "name": "  CÔNG TY TNHH MINH ANH  " }
        })))
        .mount(&server)
        .await;

    let chain = chain(vec![vitax_source(&server)], 5);
    let recovery = chain.recover_name("0102234896").await;

    let found = recovery.name.expect("name should be recovered");
    assert_eq!(found.name, "CÔNG TY TNHH MINH ANH");
    assert_eq!(found.source, "vitax");
    assert!(recovery.errors.is_empty());
}

#[tokio::test]
async fn test_vietqr_success_envelope_is_checked() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/business/0102234896"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "code": "00",
            "data": { "name": "CÔNG TY CỔ PHẦN ĐẠI VIỆT" }
        })))
        .mount(&server)
        .await;

    let chain = chain(vec![vietqr_source(&server)], 5);
    let recovery = chain.recover_name("0102234896").await;
    assert_eq!(recovery.name.unwrap().name, "CÔNG TY CỔ PHẦN ĐẠI VIỆT");
}

#[tokio::test]
async fn test_vietqr_failure_code_is_a_miss_not_a_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/business/0102234896"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "code": "86",
            "desc": "Not found"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let chain = chain(vec![vietqr_source(&server)], 5);
    let recovery = chain.recover_name("0102234896").await;

    assert!(recovery.name.is_none());
    assert_eq!(recovery.errors.len(), 1);
    assert!(recovery.errors[0].contains("api_code=86"), "{:?}", recovery.errors);
}

#[tokio::test]
async fn test_sources_queried_in_order_first_nonempty_wins() {
    let server = MockServer::start().await;
    // First source answers with an empty name; second supplies the name.
    Mock::given(method("GET"))
        .and(path("/api/partner/Invoices/getMST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "result": { "name": "" }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/business/0102234896"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "code": "00",
            "data": { "name": "CÔNG TY TNHH MINH ANH" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let chain = chain(vec![vitax_source(&server), vietqr_source(&server)], 5);
    let recovery = chain.recover_name("0102234896").await;

    let found = recovery.name.unwrap();
    assert_eq!(found.source, "vietqr");
    assert_eq!(recovery.errors, vec!["vitax: empty_name"]);
}

#[tokio::test]
async fn test_winning_first_source_skips_the_rest() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/partner/Invoices/getMST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "result": { "name": "CÔNG TY TNHH MINH ANH" }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/business/0102234896"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let chain = chain(vec![vitax_source(&server), vietqr_source(&server)], 5);
    let recovery = chain.recover_name("0102234896").await;
    assert_eq!(recovery.name.unwrap().source, "vitax");
}

#[tokio::test]
async fn test_five_consecutive_rate_limits_exhaust_the_cap() {
    let server = MockServer::start().await;
    // No Retry-After header: the exponential/jitter wait applies. The
    // sixth request must never arrive.
    Mock::given(method("GET"))
        .and(path("/api/partner/Invoices/getMST"))
        .respond_with(ResponseTemplate::new(429))
        .expect(5)
        .mount(&server)
        .await;

    let chain = chain(vec![vitax_source(&server)], 5);
    let recovery = chain.recover_name("0102234896").await;

    assert!(recovery.name.is_none());
    assert!(recovery.errors[0].contains("rate limited"), "{:?}", recovery.errors);
    server.verify().await;
}

#[tokio::test]
async fn test_retry_after_header_is_honored() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/partner/Invoices/getMST"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/partner/Invoices/getMST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "result": { "name": "CÔNG TY TNHH MINH ANH" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let chain = chain(vec![vitax_source(&server)], 5);
    let recovery = chain.recover_name("0102234896").await;
    assert!(recovery.name.is_some());
}

#[tokio::test]
async fn test_server_fault_retries_then_recovers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/partner/Invoices/getMST"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/partner/Invoices/getMST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "result": { "name": "CÔNG TY TNHH MINH ANH" }
        })))
        .mount(&server)
        .await;

    let chain = chain(vec![vitax_source(&server)], 5);
    let recovery = chain.recover_name("0102234896").await;
    assert!(recovery.name.is_some());
}

#[tokio::test]
async fn test_malformed_success_body_is_retried_like_a_server_fault() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/partner/Invoices/getMST"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("<html>definitely not json</html>"),
        )
        .expect(3)
        .mount(&server)
        .await;

    let chain = chain(vec![vitax_source(&server)], 3);
    let recovery = chain.recover_name("0102234896").await;

    assert!(recovery.name.is_none());
    assert!(recovery.errors[0].contains("non-JSON"), "{:?}", recovery.errors);
    server.verify().await;
}
