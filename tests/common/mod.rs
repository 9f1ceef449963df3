//! Shared test utilities and fixtures
//!
//! A wiremock-backed Chat Completions endpoint plus builders for its
//! streamed chunks.

#![allow(dead_code)]

use minicoder_context::{ConversationStore, TrimPolicy};
use minicoder_engine::{NullSink, Orchestrator};
use minicoder_providers::openai::OpenAiClient;
use minicoder_providers::retry::RetryConfig;
use minicoder_providers::ApiConfig;
use minicoder_tools::{FileMutator, ToolDispatcher};
use minicoder_types::{ApiKey, ModelName};
use serde_json::{Value, json};
use std::time::Duration;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// Start a mock server that simulates the Chat Completions API
pub async fn start_openai_mock() -> MockServer {
    MockServer::start().await
}

/// Client pointed at the mock server, with fast retries.
pub fn client_for(server: &MockServer) -> OpenAiClient {
    let config = ApiConfig::new(
        ApiKey::new("sk-test").unwrap(),
        ModelName::new("gpt-4o").unwrap(),
    )
    .with_endpoint(&format!("{}{COMPLETIONS_PATH}", server.uri()))
    .unwrap();
    OpenAiClient::new(config).with_retry(RetryConfig {
        max_retries: 1,
        initial_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(10),
        jitter_factor: 0.0,
    })
}

/// Orchestrator over the mock server, rooted in `dir`.
pub fn orchestrator_for(
    server: &MockServer,
    dir: &std::path::Path,
) -> Orchestrator<OpenAiClient, NullSink> {
    Orchestrator::new(
        client_for(server),
        ConversationStore::with_instructions("You are a test assistant.", TrimPolicy::default()),
        ToolDispatcher::with_builtins(FileMutator::new(dir).unwrap()),
        NullSink,
    )
}

/// `{"choices":[{"delta": <delta>}]}`
pub fn delta_chunk(delta: Value) -> Value {
    json!({ "choices": [{ "index": 0, "delta": delta, "finish_reason": null }] })
}

pub fn text_chunk(text: &str) -> Value {
    delta_chunk(json!({ "content": text }))
}

pub fn tool_chunk(index: usize, id: Option<&str>, name: Option<&str>, arguments: &str) -> Value {
    let mut function = serde_json::Map::new();
    if let Some(name) = name {
        function.insert("name".into(), json!(name));
    }
    function.insert("arguments".into(), json!(arguments));
    let mut call = json!({ "index": index, "type": "function", "function": function });
    if let Some(id) = id {
        call["id"] = json!(id);
    }
    delta_chunk(json!({ "tool_calls": [call] }))
}

/// SSE body of `chunks` terminated by `data: [DONE]`.
pub fn sse_body(chunks: &[Value]) -> String {
    let mut body = String::new();
    for chunk in chunks {
        body.push_str(&format!("data: {chunk}\n\n"));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

fn sse_response(chunks: &[Value]) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(sse_body(chunks))
        .insert_header("content-type", "text/event-stream")
}

/// Answer every completion request with `chunks`.
pub async fn mount_stream(server: &MockServer, chunks: &[Value]) {
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(sse_response(chunks))
        .mount(server)
        .await;
}

/// Answer requests whose body contains `needle` with `chunks`.
///
/// Takes precedence over any catch-all mounted with [`mount_stream`].
pub async fn mount_stream_when(server: &MockServer, needle: &str, chunks: &[Value]) {
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .and(body_string_contains(needle))
        .respond_with(sse_response(chunks))
        .with_priority(1)
        .mount(server)
        .await;
}

/// Answer every completion request with an HTTP error.
pub async fn mount_error(server: &MockServer, status: u16, body: Value) {
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(server)
        .await;
}

/// JSON bodies of every request the server received.
pub async fn request_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|request| serde_json::from_slice(&request.body).unwrap())
        .collect()
}
