//! Message type tests

use minicoder_context::{
    ConversationStore, InvariantError, TrimPolicy, file_context_message, file_context_text,
};
use minicoder_types::{Message, NonEmptyString, Role, ToolInvocation};

#[test]
fn non_empty_string_rejects_empty() {
    assert!(NonEmptyString::new("").is_err());
    assert!(NonEmptyString::new("   ").is_err());
    assert!(NonEmptyString::new("\n\t").is_err());
}

#[test]
fn non_empty_string_preserves_whitespace() {
    let s = NonEmptyString::new("  hello  ").unwrap();
    assert_eq!(s.as_str(), "  hello  ");
}

#[test]
fn message_roles() {
    assert_eq!(Message::system("s").role(), Role::System);
    assert_eq!(Message::user("u").role(), Role::User);
    assert_eq!(Message::assistant(None, Vec::new()).role(), Role::Assistant);
    assert_eq!(Message::tool("id", "t").role(), Role::Tool);
    assert_eq!(Role::Tool.as_str(), "tool");
}

#[test]
fn store_enforces_pairing_across_a_full_turn() {
    let mut store = ConversationStore::with_instructions("rules", TrimPolicy::default());
    store.append(Message::user("do two things")).unwrap();
    store
        .append(Message::assistant(
            None,
            vec![
                ToolInvocation::new("a", "read_file", "{}"),
                ToolInvocation::new("b", "read_file", "{}"),
            ],
        ))
        .unwrap();

    assert!(matches!(
        store.append(Message::user("too early")),
        Err(InvariantError::UnansweredInvocations { .. })
    ));
    assert!(matches!(
        store.append(Message::tool("b", "out of order")),
        Err(InvariantError::ToolResultOutOfOrder { .. })
    ));
    store.append(Message::tool("a", "first")).unwrap();
    store.append(Message::tool("b", "second")).unwrap();
    assert!(matches!(
        store.append(Message::tool("c", "stray")),
        Err(InvariantError::UnexpectedToolResult { .. })
    ));
    store
        .append(Message::assistant(Some("done".into()), Vec::new()))
        .unwrap();
    assert_eq!(store.len(), 6);
}

#[test]
fn trim_keeps_instructions_first() {
    let mut store = ConversationStore::with_instructions("rules", TrimPolicy::default());
    for i in 0..30 {
        store.append(Message::user(format!("u{i}"))).unwrap();
    }
    let report = store.trim();
    assert!(report.trimmed());
    assert_eq!(store.len(), 16);
    assert!(store.messages()[0].is_system());
    assert_eq!(store.messages()[1].content(), Some("u15"));
    assert_eq!(store.messages()[15].content(), Some("u29"));
}

#[test]
fn file_context_text_matches_injected_message() {
    let path = std::path::Path::new("/work/notes.md");
    let text = file_context_text(path, "hello");
    assert_eq!(text, "Content of file '/work/notes.md':\n\nhello");
    assert_eq!(file_context_message(path, "hello").content(), Some(text.as_str()));
}
