mod harness;

use harness::config::ConfigBuilder;
use harness::mock_upstream::MockUpstream;
use harness::server::TestServer;
use harness::{event_names, parse_sse};

fn messages_body(model: &str) -> serde_json::Value {
    serde_json::json!({
        "model": model,
        "max_tokens": 64,
        "messages": [{"role": "user", "content": "Hi"}],
        "stream": true
    })
}

#[tokio::test]
async fn unavailable_provider_is_rejected_without_upstream_contact() {
    let mock = MockUpstream::start().await.unwrap();
    let config = ConfigBuilder::new()
        .with_chat_provider("openai", &mock.base_url(), None)
        .build();

    let server = TestServer::start(config).await.unwrap();

    let resp = server.messages(&messages_body("openai/gpt-4o")).await;

    assert_eq!(resp.status(), 401);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["type"], "error");
    assert_eq!(json["error"]["type"], "authentication_error");
    assert!(json["error"]["message"].as_str().unwrap().contains("openai"));

    assert_eq!(mock.connection_count(), 0);
}

#[tokio::test]
async fn fallback_provider_serves_when_requested_one_has_no_credential() {
    let primary = MockUpstream::start().await.unwrap();
    let backup = MockUpstream::start().await.unwrap();
    let config = ConfigBuilder::new()
        .with_chat_provider("primary", &primary.base_url(), None)
        .with_chat_provider("backup", &backup.base_url(), Some("backup-key"))
        .with_fallback_order(&["primary", "backup"])
        .build();

    let server = TestServer::start(config).await.unwrap();

    let resp = server.messages(&messages_body("primary/some-model")).await;
    assert_eq!(resp.status(), 200);

    let frames = parse_sse(&resp.text().await.unwrap());
    assert_eq!(event_names(&frames).last(), Some(&"message_stop"));

    assert_eq!(primary.connection_count(), 0);
    assert_eq!(backup.chat_count(), 1);
    assert_eq!(backup.last_authorization().as_deref(), Some("Bearer backup-key"));
    assert_eq!(backup.last_body().unwrap()["model"], "some-model");
}

#[tokio::test]
async fn unknown_prefix_goes_to_default_provider_verbatim() {
    let mock = MockUpstream::start().await.unwrap();
    let config = ConfigBuilder::new()
        .with_chat_provider("openrouter", &mock.base_url(), Some("or-key"))
        .with_default_provider("openrouter")
        .build();

    let server = TestServer::start(config).await.unwrap();

    let resp = server.messages(&messages_body("anthropic/claude-sonnet-4")).await;
    assert_eq!(resp.status(), 200);
    resp.text().await.unwrap();

    assert_eq!(mock.chat_count(), 1);
    assert_eq!(mock.last_body().unwrap()["model"], "anthropic/claude-sonnet-4");
}

#[tokio::test]
async fn oauth_provider_refreshes_once_and_reuses_token() {
    let mock = MockUpstream::start().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let auth_file = dir.path().join("auth.json");
    std::fs::write(
        &auth_file,
        serde_json::json!({
            "tokens": {"access_token": "at-opaque", "refresh_token": "rt-1"},
            "last_refresh": "2026-01-01T00:00:00Z"
        })
        .to_string(),
    )
    .unwrap();

    let config = ConfigBuilder::new()
        .with_oauth_responses_provider("openai", &mock.responses_url(), &auth_file, &mock.token_url())
        .build();

    let server = TestServer::start(config).await.unwrap();

    for _ in 0..2 {
        let resp = server.messages(&messages_body("openai/gpt-5")).await;
        assert_eq!(resp.status(), 200);

        let frames = parse_sse(&resp.text().await.unwrap());
        assert!(event_names(&frames).contains(&"content_block_delta"));
    }

    assert_eq!(mock.token_count(), 1);
    assert_eq!(mock.responses_count(), 2);
    assert_eq!(mock.last_authorization().as_deref(), Some("Bearer at-refreshed"));

    let stored: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&auth_file).unwrap()).unwrap();
    assert_eq!(stored["tokens"]["access_token"], "at-refreshed");
    assert_eq!(stored["tokens"]["refresh_token"], "rt-rotated");
    assert_eq!(stored["last_refresh"], "2026-01-01T00:00:00Z");
}

#[tokio::test]
async fn missing_auth_file_is_unauthorized() {
    let mock = MockUpstream::start().await.unwrap();
    let dir = tempfile::tempdir().unwrap();

    let config = ConfigBuilder::new()
        .with_oauth_responses_provider(
            "openai",
            &mock.responses_url(),
            &dir.path().join("absent.json"),
            &mock.token_url(),
        )
        .build();

    let server = TestServer::start(config).await.unwrap();

    let resp = server.messages(&messages_body("openai/gpt-5")).await;

    assert_eq!(resp.status(), 401);
    assert_eq!(mock.connection_count(), 0);
}
