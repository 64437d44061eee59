//! Path setup against mocked probe and account endpoints.

use std::time::Duration;

use rustscholarly::proxy::{PathDescriptor, ProbeEndpoints, ProxyMode, SessionProvider};
use rustscholarly::ScholarError;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider(server: &MockServer) -> SessionProvider {
    SessionProvider::with_endpoints(ProbeEndpoints {
        probe_url: format!("{}/ip", server.uri()),
        account_url: format!("{}/account", server.uri()),
    })
}

fn gateway(key: &str) -> PathDescriptor {
    PathDescriptor::AuthenticatedGateway {
        api_key: key.to_string(),
        country_code: None,
        premium: false,
        render: false,
    }
}

#[tokio::test]
async fn active_gateway_account_is_adopted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/account"))
        .and(query_param("api_key", "KEY"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"requestCount": 10, "requestLimit": 1000})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let provider = provider(&server);
    assert!(provider.configure(gateway("KEY")).await.expect("configure"));
    assert_eq!(provider.mode(), ProxyMode::AuthenticatedGateway);
    assert!(provider.has_proxy());
    assert_eq!(provider.recommended_timeout(), Some(Duration::from_secs(60)));
}

#[tokio::test]
async fn rejected_gateway_key_keeps_direct_path() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/account"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"error": "invalid key"})))
        .expect(1)
        .mount(&server)
        .await;

    let provider = provider(&server);
    assert!(!provider.configure(gateway("BAD")).await.expect("configure"));
    assert_eq!(provider.mode(), ProxyMode::None);
    assert!(!provider.has_proxy());
    assert_eq!(provider.recommended_timeout(), None);
}

#[tokio::test]
async fn invalid_parameters_fail_before_any_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let provider = provider(&server);
    let err = provider.configure(gateway("  ")).await.expect_err("invalid");
    assert!(matches!(err, ScholarError::Config(_)));

    let err = provider
        .configure(PathDescriptor::RotatingProxy {
            username: "user".to_string(),
            password: String::new(),
            port: 22225,
        })
        .await
        .expect_err("invalid");
    assert!(matches!(err, ScholarError::Config(_)));
    assert_eq!(provider.mode(), ProxyMode::None);
}

#[tokio::test]
async fn unreachable_proxy_is_not_adopted() {
    let server = MockServer::start().await;
    let provider = provider(&server);
    let adopted = provider
        .configure(PathDescriptor::SingleProxy {
            http: "127.0.0.1:1".to_string(),
            https: None,
        })
        .await
        .expect("configure");
    assert!(!adopted);
    assert_eq!(provider.mode(), ProxyMode::None);
    assert!(provider.client().is_ok());
}

#[tokio::test]
async fn direct_path_needs_no_probe() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let provider = provider(&server);
    assert!(provider.configure(PathDescriptor::Direct).await.expect("configure"));
    assert_eq!(provider.mode(), ProxyMode::None);
    assert!(!provider.has_proxy());
    assert!(provider.current_path().verified);
}
