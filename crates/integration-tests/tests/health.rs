mod harness;

use conduit_config::CorsConfig;
use harness::config::ConfigBuilder;
use harness::mock_upstream::MockUpstream;
use harness::server::TestServer;

#[tokio::test]
async fn health_endpoint_returns_ok() {
    let mock = MockUpstream::start().await.unwrap();
    let config = ConfigBuilder::new()
        .with_chat_provider("mock", &mock.base_url(), Some("test-key"))
        .build();

    let server = TestServer::start(config).await.unwrap();

    let resp = server.client().get(server.url("/health")).send().await.unwrap();

    assert_eq!(resp.status(), 200);

    let body = resp.text().await.unwrap();
    assert_eq!(body, "ok");
}

#[tokio::test]
async fn health_endpoint_disabled() {
    let mock = MockUpstream::start().await.unwrap();
    let config = ConfigBuilder::new()
        .with_chat_provider("mock", &mock.base_url(), Some("test-key"))
        .without_health()
        .build();

    let server = TestServer::start(config).await.unwrap();

    let resp = server.client().get(server.url("/health")).send().await.unwrap();

    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn root_reports_status_json() {
    let mock = MockUpstream::start().await.unwrap();
    let config = ConfigBuilder::new()
        .with_chat_provider("mock", &mock.base_url(), Some("test-key"))
        .build();

    let server = TestServer::start(config).await.unwrap();

    let resp = server.client().get(server.url("/")).send().await.unwrap();

    assert_eq!(resp.status(), 200);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn count_tokens_does_not_touch_upstream() {
    let mock = MockUpstream::start().await.unwrap();
    let config = ConfigBuilder::new()
        .with_chat_provider("mock", &mock.base_url(), Some("test-key"))
        .build();

    let server = TestServer::start(config).await.unwrap();

    let body = serde_json::json!({
        "model": "mock/mock-model",
        "system": "You are terse.",
        "messages": [{"role": "user", "content": "Count the tokens in this message, please."}]
    });

    let resp = server
        .client()
        .post(server.url("/v1/messages/count_tokens"))
        .json(&body)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert!(json["input_tokens"].as_u64().unwrap() > 5);
    assert_eq!(mock.connection_count(), 0);
}

#[tokio::test]
async fn cors_preflight_is_answered() {
    let mock = MockUpstream::start().await.unwrap();
    let config = ConfigBuilder::new()
        .with_chat_provider("mock", &mock.base_url(), Some("test-key"))
        .with_cors(CorsConfig::default())
        .build();

    let server = TestServer::start(config).await.unwrap();

    let resp = server
        .client()
        .request(reqwest::Method::OPTIONS, server.url("/v1/messages"))
        .header("Origin", "http://localhost:5173")
        .header("Access-Control-Request-Method", "POST")
        .header("Access-Control-Request-Headers", "content-type")
        .send()
        .await
        .unwrap();

    assert!(resp.status().is_success());
    assert_eq!(
        resp.headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
}
