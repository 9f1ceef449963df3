//! Chat Completions client tests against a mock endpoint

use minicoder_providers::openai::OpenAiClient;
use minicoder_providers::ChatRequest;
use minicoder_types::{Message, OutputLimits, StreamFragment, ToolCallDelta, ToolDefinition, ToolInvocation};
use serde_json::json;
use tokio::sync::mpsc;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::common::{
    COMPLETIONS_PATH, client_for, mount_error, mount_stream, request_bodies, start_openai_mock,
    text_chunk, tool_chunk, delta_chunk,
};

async fn collect(
    client: &OpenAiClient,
    messages: &[Message],
    tools: &[ToolDefinition],
) -> Vec<StreamFragment> {
    let (tx, mut rx) = mpsc::channel(64);
    let request = ChatRequest {
        messages,
        tools,
        limits: OutputLimits::default(),
    };
    let (result, fragments) = tokio::join!(client.send_message(request, tx), async {
        let mut fragments = Vec::new();
        while let Some(fragment) = rx.recv().await {
            fragments.push(fragment);
        }
        fragments
    });
    result.unwrap();
    fragments
}

#[tokio::test]
async fn streams_text_and_reasoning() {
    let server = start_openai_mock().await;
    mount_stream(
        &server,
        &[
            delta_chunk(json!({ "role": "assistant", "reasoning_content": "hmm" })),
            text_chunk("Hello"),
            text_chunk(", world"),
            json!({ "choices": [], "usage": { "total_tokens": 12 } }),
        ],
    )
    .await;

    let fragments = collect(&client_for(&server), &[Message::user("hi")], &[]).await;
    assert_eq!(
        fragments,
        vec![
            StreamFragment::ReasoningDelta("hmm".into()),
            StreamFragment::TextDelta("Hello".into()),
            StreamFragment::TextDelta(", world".into()),
            StreamFragment::Done,
        ]
    );
}

#[tokio::test]
async fn tool_call_deltas_keep_their_slots() {
    let server = start_openai_mock().await;
    mount_stream(
        &server,
        &[
            tool_chunk(0, Some("call_1"), Some("read_file"), ""),
            tool_chunk(0, None, None, "{\"file_path\":"),
            tool_chunk(0, None, None, " \"a.txt\"}"),
        ],
    )
    .await;

    let fragments = collect(&client_for(&server), &[Message::user("read")], &[]).await;
    assert_eq!(
        fragments,
        vec![
            StreamFragment::ToolCall(
                ToolCallDelta::new(0)
                    .with_id("call_1")
                    .with_name("read_file")
                    .with_arguments("")
            ),
            StreamFragment::ToolCall(ToolCallDelta::new(0).with_arguments("{\"file_path\":")),
            StreamFragment::ToolCall(ToolCallDelta::new(0).with_arguments(" \"a.txt\"}")),
            StreamFragment::Done,
        ]
    );
}

#[tokio::test]
async fn request_carries_log_schema_and_limits() {
    let server = start_openai_mock().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("data: [DONE]\n\n")
                .insert_header("content-type", "text/event-stream"),
        )
        .mount(&server)
        .await;

    let messages = vec![
        Message::system("rules"),
        Message::user("read a"),
        Message::assistant(
            None,
            vec![ToolInvocation::new("call_9", "read_file", "{\"file_path\":\"a\"}")],
        ),
        Message::tool("call_9", "Content of file '/a':\n\nA"),
    ];
    let tools = vec![ToolDefinition::new(
        "read_file",
        "Read a file",
        json!({ "type": "object", "properties": { "file_path": { "type": "string" } } }),
    )];
    let fragments = collect(&client_for(&server), &messages, &tools).await;
    assert_eq!(fragments, vec![StreamFragment::Done]);

    let bodies = request_bodies(&server).await;
    assert_eq!(bodies.len(), 1);
    let body = &bodies[0];
    assert_eq!(body["model"], "gpt-4o");
    assert_eq!(body["stream"], true);
    assert_eq!(body["max_completion_tokens"], 2000);
    assert_eq!(body["tools"][0]["type"], "function");
    assert_eq!(body["tools"][0]["function"]["name"], "read_file");

    let wire = body["messages"].as_array().unwrap();
    assert_eq!(wire.len(), 4);
    assert_eq!(wire[2]["content"], serde_json::Value::Null);
    assert_eq!(wire[2]["tool_calls"][0]["id"], "call_9");
    assert_eq!(
        wire[2]["tool_calls"][0]["function"]["arguments"],
        "{\"file_path\":\"a\"}"
    );
    assert_eq!(wire[3]["role"], "tool");
    assert_eq!(wire[3]["tool_call_id"], "call_9");
}

#[tokio::test]
async fn http_error_becomes_error_fragment() {
    let server = start_openai_mock().await;
    mount_error(
        &server,
        401,
        json!({ "error": { "message": "Incorrect API key provided", "type": "invalid_request_error" } }),
    )
    .await;

    let fragments = collect(&client_for(&server), &[Message::user("hi")], &[]).await;
    assert_eq!(fragments.len(), 1);
    let StreamFragment::Error(message) = &fragments[0] else {
        panic!("expected error fragment, got {fragments:?}");
    };
    assert!(message.starts_with("API error 401"));
    assert!(message.contains("Incorrect API key provided"));
    assert_eq!(request_bodies(&server).await.len(), 1);
}

#[tokio::test]
async fn server_error_is_retried_once() {
    let server = start_openai_mock().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_stream(&server, &[text_chunk("recovered")]).await;

    let fragments = collect(&client_for(&server), &[Message::user("hi")], &[]).await;
    assert_eq!(
        fragments,
        vec![
            StreamFragment::TextDelta("recovered".into()),
            StreamFragment::Done
        ]
    );
    assert_eq!(request_bodies(&server).await.len(), 2);
}

#[tokio::test]
async fn truncated_stream_is_an_error() {
    let server = start_openai_mock().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(format!("data: {}\n\n", text_chunk("cut")))
                .insert_header("content-type", "text/event-stream"),
        )
        .mount(&server)
        .await;

    let fragments = collect(&client_for(&server), &[Message::user("hi")], &[]).await;
    assert_eq!(
        fragments,
        vec![
            StreamFragment::TextDelta("cut".into()),
            StreamFragment::Error("Connection closed before stream completed".into()),
        ]
    );
}
