// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Model Router client behaviour against a mock HTTP server: response and
//! header parsing, tracking headers, status-to-error mapping, and the
//! retry budget.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::Router;

use compass_core::domain::router::{ChatBackend, ChatMessage, ChatRequest, RouterError};
use compass_core::infrastructure::router_client::ModelRouterClient;

/// Scripted response sequence: each inbound call gets the next entry
/// (status, optional Retry-After, body), sticking on the last one.
#[derive(Clone)]
struct Sequence {
    responses: Arc<Vec<(u16, Option<u64>, String)>>,
    hits: Arc<AtomicUsize>,
}

async fn sequence_handler(State(seq): State<Sequence>) -> axum::http::Response<axum::body::Body> {
    let hit = seq.hits.fetch_add(1, Ordering::SeqCst);
    let index = hit.min(seq.responses.len() - 1);
    let (status, retry_after, body) = seq.responses[index].clone();
    let mut builder = axum::http::Response::builder().status(status);
    if let Some(seconds) = retry_after {
        builder = builder.header("Retry-After", seconds.to_string());
    }
    builder.body(axum::body::Body::from(body)).unwrap()
}

async fn start_sequence_server(
    responses: Vec<(u16, Option<u64>, String)>,
) -> (String, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let sequence = Sequence { responses: Arc::new(responses), hits: hits.clone() };
    let app = Router::new()
        .route("/v1/chat/completions", post(sequence_handler))
        .with_state(sequence);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    (format!("http://{addr}"), hits)
}

fn request(model: &str) -> ChatRequest {
    ChatRequest {
        model: model.to_string(),
        messages: vec![
            ChatMessage::system("You are a juror."),
            ChatMessage::user("Which language?"),
        ],
        temperature: 0.3,
        max_tokens: 2048,
    }
}

fn completion_body(content: &str) -> String {
    serde_json::json!({
        "id": "cmpl-1",
        "model": "gpt-4o",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 12, "completion_tokens": 34, "total_tokens": 46}
    })
    .to_string()
}

#[tokio::test]
async fn successful_call_parses_body_and_headers() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/chat/completions")
        .match_header("authorization", "Bearer jwt-token")
        .match_header("x-pap-agent-id", "jury-1")
        .match_header("x-pap-request-id", mockito::Matcher::Regex("^[0-9a-f-]{36}$".into()))
        .with_status(200)
        .with_header("X-Request-Cost", "0.0042")
        .with_header("X-Request-Latency-Ms", "812")
        .with_header("X-Model-Provider", "openai")
        .with_header("X-Cache-Status", "HIT")
        .with_body(completion_body("The answer is Go."))
        .create_async()
        .await;

    let client = ModelRouterClient::new(server.url(), "jwt-token", "jury-1");
    let outcome = client.chat(&request("gpt-4o")).await.unwrap();

    assert_eq!(outcome.text, "The answer is Go.");
    assert_eq!(outcome.model, "gpt-4o");
    assert_eq!(outcome.usage.unwrap().total_tokens, 46);
    assert_eq!(outcome.cost_usd, Some(0.0042));
    assert_eq!(outcome.router_latency_ms, Some(812));
    assert_eq!(outcome.provider.as_deref(), Some("openai"));
    assert!(outcome.cache_hit);
    mock.assert_async().await;
}

#[tokio::test]
async fn empty_content_is_still_a_successful_call() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/v1/chat/completions")
        .with_status(200)
        .with_body(completion_body(""))
        .create_async()
        .await;

    let client = ModelRouterClient::new(server.url(), "jwt", "jury-1");
    let outcome = client.chat(&request("gpt-4o")).await.unwrap();
    // The aggregator, not the client, decides what an empty answer means.
    assert_eq!(outcome.text, "");
}

#[tokio::test]
async fn unauthorized_maps_to_auth_error_without_retry() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/chat/completions")
        .with_status(401)
        .with_body(r#"{"error": {"message": "token revoked"}}"#)
        .expect(1)
        .create_async()
        .await;

    let client = ModelRouterClient::new(server.url(), "stale", "jury-1");
    let err = client.chat(&request("gpt-4o")).await.unwrap_err();
    match err {
        RouterError::Auth(message) => assert_eq!(message, "token revoked"),
        other => panic!("expected Auth, got {other:?}"),
    }
    mock.assert_async().await;
}

#[tokio::test]
async fn budget_exceeded_maps_to_402_without_retry() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/chat/completions")
        .with_status(402)
        .with_body(r#"{"error": {"message": "monthly budget exhausted"}}"#)
        .expect(1)
        .create_async()
        .await;

    let client = ModelRouterClient::new(server.url(), "jwt", "jury-1");
    let err = client.chat(&request("gpt-4o")).await.unwrap_err();
    assert!(matches!(err, RouterError::BudgetExceeded(_)));
    mock.assert_async().await;
}

#[tokio::test]
async fn rate_limit_is_retried_honouring_retry_after() {
    let (url, hits) = start_sequence_server(vec![
        (429, Some(0), r#"{"error": {"message": "slow down"}}"#.to_string()),
        (200, None, completion_body("eventually")),
    ])
    .await;

    let client = ModelRouterClient::new(url, "jwt", "jury-1");
    let outcome = client.chat(&request("gpt-4o")).await.unwrap();
    assert_eq!(outcome.text, "eventually");
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn server_errors_consume_the_retry_budget_then_surface() {
    let mut server = mockito::Server::new_async().await;
    // Initial attempt plus two retries.
    let mock = server
        .mock("POST", "/v1/chat/completions")
        .with_status(503)
        .with_body("upstream overloaded")
        .expect(3)
        .create_async()
        .await;

    let client = ModelRouterClient::new(server.url(), "jwt", "jury-1");
    let err = client.chat(&request("gpt-4o")).await.unwrap_err();
    match err {
        RouterError::Api { status, message } => {
            assert_eq!(status, 503);
            // Non-JSON body is carried through raw.
            assert_eq!(message, "upstream overloaded");
        }
        other => panic!("expected Api, got {other:?}"),
    }
    mock.assert_async().await;
}

#[tokio::test]
async fn client_errors_other_than_auth_are_not_retried() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/chat/completions")
        .with_status(404)
        .with_body(r#"{"error": {"message": "unknown model"}}"#)
        .expect(1)
        .create_async()
        .await;

    let client = ModelRouterClient::new(server.url(), "jwt", "jury-1");
    let err = client.chat(&request("nope")).await.unwrap_err();
    assert!(matches!(err, RouterError::Api { status: 404, .. }));
    mock.assert_async().await;
}

#[tokio::test]
async fn transient_5xx_recovers_within_the_budget() {
    let (url, hits) = start_sequence_server(vec![
        (500, None, "boom".to_string()),
        (500, None, "boom again".to_string()),
        (200, None, completion_body("recovered")),
    ])
    .await;

    let client = ModelRouterClient::new(url, "jwt", "jury-1");
    let outcome = client.chat(&request("gpt-4o")).await.unwrap();
    assert_eq!(outcome.text, "recovered");
    // Initial attempt plus both retries.
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn list_models_parses_the_catalogue() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/v1/models")
        .with_status(200)
        .with_body(
            r#"{"data": [
                {"id": "gpt-4o", "owned_by": "openai"},
                {"id": "claude-sonnet-4", "owned_by": "anthropic"}
            ]}"#,
        )
        .create_async()
        .await;

    let client = ModelRouterClient::new(server.url(), "jwt", "jury-1");
    let models = client.list_models().await.unwrap();
    assert_eq!(models.len(), 2);
    assert_eq!(models[0].id, "gpt-4o");
    assert_eq!(models[1].owned_by, "anthropic");
}

#[tokio::test]
async fn request_body_matches_the_wire_contract() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/chat/completions")
        .match_request(|req| {
            let body: serde_json::Value = serde_json::from_slice(req.body().unwrap()).unwrap();
            body["model"] == "gpt-4o"
                && body["stream"] == false
                && body["max_tokens"] == 2048
                && body["messages"][0]["role"] == "system"
                && body["messages"][1]["role"] == "user"
        })
        .with_status(200)
        .with_body(completion_body("ok"))
        .create_async()
        .await;

    let client = ModelRouterClient::new(server.url(), "jwt", "jury-1");
    client.chat(&request("gpt-4o")).await.unwrap();
    mock.assert_async().await;
}
