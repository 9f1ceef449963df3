//! Conversation messages.
//!
//! Each role gets its own struct so that role-specific fields (tool invocations
//! on assistant turns, the back-reference on tool results) cannot appear on the
//! wrong kind of message.

use serde::{Deserialize, Serialize};

use crate::ToolInvocation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Instructions or injected file context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemMessage {
    content: String,
}

impl SystemMessage {
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMessage {
    content: String,
}

impl UserMessage {
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }
}

/// A reconstructed model turn.
///
/// `content` is `None` when the model produced no text at all, which is the
/// required shape for a turn that consists only of tool invocations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssistantMessage {
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ToolInvocation>,
}

impl AssistantMessage {
    #[must_use]
    pub fn new(content: Option<String>, tool_calls: Vec<ToolInvocation>) -> Self {
        Self {
            content,
            tool_calls,
        }
    }

    #[must_use]
    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    #[must_use]
    pub fn tool_calls(&self) -> &[ToolInvocation] {
        &self.tool_calls
    }

    #[must_use]
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Collapse empty text to `None`.
    #[must_use]
    pub fn with_null_empty_content(mut self) -> Self {
        if self.content.as_deref().is_some_and(str::is_empty) {
            self.content = None;
        }
        self
    }

    /// Drop every tool invocation, returning the dropped ones.
    pub fn take_tool_calls(&mut self) -> Vec<ToolInvocation> {
        std::mem::take(&mut self.tool_calls)
    }
}

/// The textual outcome of one tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolMessage {
    tool_call_id: String,
    content: String,
}

impl ToolMessage {
    #[must_use]
    pub fn tool_call_id(&self) -> &str {
        &self.tool_call_id
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }
}

/// One entry in the conversation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    System(SystemMessage),
    User(UserMessage),
    Assistant(AssistantMessage),
    Tool(ToolMessage),
}

impl Message {
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Message::System(SystemMessage {
            content: content.into(),
        })
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Message::User(UserMessage {
            content: content.into(),
        })
    }

    #[must_use]
    pub fn assistant(content: Option<String>, tool_calls: Vec<ToolInvocation>) -> Self {
        Message::Assistant(AssistantMessage::new(content, tool_calls))
    }

    #[must_use]
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Message::Tool(ToolMessage {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
        })
    }

    #[must_use]
    pub fn role(&self) -> Role {
        match self {
            Message::System(_) => Role::System,
            Message::User(_) => Role::User,
            Message::Assistant(_) => Role::Assistant,
            Message::Tool(_) => Role::Tool,
        }
    }

    #[must_use]
    pub fn content(&self) -> Option<&str> {
        match self {
            Message::System(m) => Some(m.content()),
            Message::User(m) => Some(m.content()),
            Message::Assistant(m) => m.content(),
            Message::Tool(m) => Some(m.content()),
        }
    }

    /// Tool invocations carried by an assistant message; empty for every other role.
    #[must_use]
    pub fn tool_calls(&self) -> &[ToolInvocation] {
        match self {
            Message::Assistant(m) => m.tool_calls(),
            _ => &[],
        }
    }

    #[must_use]
    pub fn is_system(&self) -> bool {
        matches!(self, Message::System(_))
    }
}

impl From<AssistantMessage> for Message {
    fn from(value: AssistantMessage) -> Self {
        Message::Assistant(value)
    }
}
