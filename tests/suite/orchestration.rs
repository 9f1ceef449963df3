//! End-to-end turns: orchestrator + OpenAI client + file tools over a mock endpoint

use minicoder_engine::{TransportError, TurnError};
use minicoder_types::{Message, Role};
use serde_json::json;

use crate::common::{
    mount_error, mount_stream, mount_stream_when, orchestrator_for, request_bodies,
    start_openai_mock, text_chunk, tool_chunk,
};

fn roles(messages: &[Message]) -> Vec<Role> {
    messages.iter().map(Message::role).collect()
}

#[tokio::test]
async fn plain_turn_round_trips() {
    let server = start_openai_mock().await;
    mount_stream(&server, &[text_chunk("Hi"), text_chunk(" there!")]).await;
    let dir = tempfile::tempdir().unwrap();
    let mut orch = orchestrator_for(&server, dir.path());

    let summary = orch.run_turn("hello").await.unwrap();

    assert_eq!(summary.reply.as_deref(), Some("Hi there!"));
    assert_eq!(
        roles(orch.store().messages()),
        vec![Role::System, Role::User, Role::Assistant]
    );
    assert_eq!(request_bodies(&server).await.len(), 1);
}

#[tokio::test]
async fn tool_turn_creates_file_and_follows_up() {
    let server = start_openai_mock().await;
    mount_stream_when(&server, "tool_call_id", &[text_chunk("Created hello.py.")]).await;
    let arguments = json!({ "file_path": "src/hello.py", "content": "print('hi')\n" }).to_string();
    let (head, tail) = arguments.split_at(17);
    mount_stream(
        &server,
        &[
            tool_chunk(0, Some("call_create"), Some("create_"), ""),
            tool_chunk(0, None, Some("file"), head),
            tool_chunk(0, None, None, tail),
        ],
    )
    .await;
    let dir = tempfile::tempdir().unwrap();
    let mut orch = orchestrator_for(&server, dir.path());

    let summary = orch.run_turn("write a hello script").await.unwrap();

    assert_eq!(summary.tools_executed, 1);
    assert_eq!(summary.tool_failures, 0);
    assert_eq!(summary.reply.as_deref(), Some("Created hello.py."));
    assert_eq!(
        std::fs::read_to_string(dir.path().join("src/hello.py")).unwrap(),
        "print('hi')\n"
    );
    let messages = orch.store().messages();
    assert_eq!(
        roles(messages),
        vec![
            Role::System,
            Role::User,
            Role::Assistant,
            Role::Tool,
            Role::Assistant
        ]
    );
    assert_eq!(
        messages[3].content(),
        Some("Successfully created file 'src/hello.py'")
    );

    let bodies = request_bodies(&server).await;
    assert_eq!(bodies.len(), 2);
    let follow_up = bodies[1]["messages"].as_array().unwrap();
    assert_eq!(follow_up.len(), 4);
    assert_eq!(follow_up[2]["tool_calls"][0]["function"]["name"], "create_file");
    assert_eq!(follow_up[2]["tool_calls"][0]["function"]["arguments"], arguments);
    assert_eq!(follow_up[3]["tool_call_id"], "call_create");
}

#[tokio::test]
async fn traversal_attempt_is_answered_without_touching_disk() {
    let server = start_openai_mock().await;
    mount_stream_when(&server, "tool_call_id", &[text_chunk("I cannot read that.")]).await;
    mount_stream(
        &server,
        &[tool_chunk(
            0,
            Some("call_x"),
            Some("read_file"),
            r#"{"file_path": "../../etc/passwd"}"#,
        )],
    )
    .await;
    let dir = tempfile::tempdir().unwrap();
    let mut orch = orchestrator_for(&server, dir.path());

    let summary = orch.run_turn("show me passwords").await.unwrap();

    assert_eq!(summary.tool_failures, 1);
    let tool = &orch.store().messages()[3];
    assert!(tool
        .content()
        .unwrap()
        .contains("contains parent directory references"));
    assert_eq!(orch.store().outstanding_invocations().count(), 0);
}

#[tokio::test]
async fn edit_turn_applies_snippet_replacement() {
    let server = start_openai_mock().await;
    mount_stream_when(&server, "tool_call_id", &[text_chunk("Bumped.")]).await;
    let arguments = json!({
        "file_path": "f.py",
        "original_snippet": "    return 1",
        "new_snippet": "    return 2"
    })
    .to_string();
    mount_stream(
        &server,
        &[tool_chunk(0, Some("call_edit"), Some("edit_file"), &arguments)],
    )
    .await;
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("f.py"), "def f():\n    return 1\n").unwrap();
    let mut orch = orchestrator_for(&server, dir.path());

    orch.run_turn("return 2 instead").await.unwrap();

    assert_eq!(
        std::fs::read_to_string(dir.path().join("f.py")).unwrap(),
        "def f():\n    return 2\n"
    );
    // Context injected during the batch lands after the tool result.
    let bodies = request_bodies(&server).await;
    let follow_up = bodies[1]["messages"].as_array().unwrap();
    assert_eq!(follow_up[3]["role"], "tool");
    assert_eq!(follow_up[4]["role"], "system");
    assert!(follow_up[4]["content"]
        .as_str()
        .unwrap()
        .starts_with("Content of file '"));
}

#[tokio::test]
async fn api_failure_surfaces_and_keeps_store_consistent() {
    let server = start_openai_mock().await;
    mount_error(&server, 401, json!({ "error": { "message": "Incorrect API key provided" } })).await;
    let dir = tempfile::tempdir().unwrap();
    let mut orch = orchestrator_for(&server, dir.path());

    let err = orch.run_turn("hello").await.unwrap_err();

    assert!(matches!(err, TurnError::Transport(TransportError::Service(_))));
    let rendered = err.to_string();
    assert!(rendered.starts_with("API error 401"), "{rendered}");
    assert!(rendered.ends_with("Incorrect API key provided"), "{rendered}");
    assert_eq!(
        roles(orch.store().messages()),
        vec![Role::System, Role::User]
    );
}
