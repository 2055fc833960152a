//! Fiindo client against a mock HTTP server.

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use serde_json::json;
use ticker_pipeline::api::{FiindoClient, TickerDataProvider};
use ticker_pipeline::models::Statement;
use ticker_pipeline::PipelineError;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::fixtures::{general_body, BEARER};
use crate::common::TestEnv;

async fn client_for(server: &MockServer, env: &TestEnv) -> FiindoClient {
    FiindoClient::new(&env.config(Some(&server.uri()))).expect("Failed to create client")
}

#[test_log::test(tokio::test)]
async fn test_requests_carry_bearer_and_accept_headers() {
    let server = MockServer::start().await;
    let env = TestEnv::new();
    Mock::given(method("GET"))
        .and(path("/api/v1/symbols"))
        .and(header("Authorization", BEARER))
        .and(header("Accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"symbols": ["AAPL", "MSFT"]})))
        .expect(1)
        .mount(&server)
        .await;

    let symbols = client_for(&server, &env).await.get_symbols().await.unwrap();
    assert_eq!(symbols, vec!["AAPL".to_string(), "MSFT".to_string()]);
}

#[test_log::test(tokio::test)]
async fn test_unauthorized_is_authentication_error() {
    let server = MockServer::start().await;
    let env = TestEnv::new();
    Mock::given(method("GET"))
        .and(path("/api/v1/symbols"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let result = client_for(&server, &env).await.get_symbols().await;
    assert_matches!(result, Err(PipelineError::Authentication(_)));
}

#[test_log::test(tokio::test)]
async fn test_forbidden_is_authentication_error() {
    let server = MockServer::start().await;
    let env = TestEnv::new();
    Mock::given(method("GET"))
        .and(path("/api/v1/eod/AAPL"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let result = client_for(&server, &env).await.get_eod("AAPL").await;
    assert_matches!(result, Err(PipelineError::Authentication(_)));
}

#[test_log::test(tokio::test)]
async fn test_server_error_on_symbols_is_network_error() {
    let server = MockServer::start().await;
    let env = TestEnv::new();
    Mock::given(method("GET"))
        .and(path("/api/v1/symbols"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&server)
        .await;

    let result = client_for(&server, &env).await.get_symbols().await;
    assert_matches!(result, Err(PipelineError::Network(message)) if message.contains("upstream exploded"));
}

#[test_log::test(tokio::test)]
async fn test_invalid_json_is_network_error() {
    let server = MockServer::start().await;
    let env = TestEnv::new();
    Mock::given(method("GET"))
        .and(path("/api/v1/general/AAPL"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let result = client_for(&server, &env).await.get_profile("AAPL").await;
    assert_matches!(result, Err(PipelineError::Network(_)));
}

#[test_log::test(tokio::test)]
async fn test_profile_and_statement_endpoints() {
    let server = MockServer::start().await;
    let env = TestEnv::new();
    Mock::given(method("GET"))
        .and(path("/api/v1/general/AAPL"))
        .respond_with(ResponseTemplate::new(200).set_body_json(general_body("Consumer Electronics", "Apple Inc.")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/financials/AAPL/balance_sheet_statement"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, &env).await;
    let profile = client.get_profile("AAPL").await.unwrap();
    assert_eq!(profile.industry, "Consumer Electronics");
    assert_eq!(profile.name.as_deref(), Some("Apple Inc."));

    let payload = client
        .get_statement("AAPL", Statement::BalanceSheetStatement)
        .await
        .unwrap();
    assert_eq!(payload, json!({"ok": true}));
}

#[test_log::test(tokio::test)]
async fn test_unreachable_endpoint_is_network_error() {
    let env = TestEnv::new();
    let client = FiindoClient::new(&env.config(Some("http://127.0.0.1:1"))).unwrap();

    let result = client.get_symbols().await;
    assert_matches!(result, Err(PipelineError::Network(_)));
}
