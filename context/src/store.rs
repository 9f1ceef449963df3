//! The conversation log.
//!
//! Invariants maintained by [`ConversationStore::append`]:
//!
//! - an assistant message with tool invocations is followed by exactly one
//!   tool message per invocation, in invocation order, before any further
//!   user or assistant message
//! - a tool message always answers the oldest unanswered invocation
//!
//! System messages appended while invocations are unanswered are held back and
//! placed right after the last answering tool message, so the assistant/tool
//! block is never split.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;

use minicoder_types::{Message, Role};
use thiserror::Error;

use crate::file_context::file_marker;

pub const DEFAULT_TRIM_LIMIT: usize = 20;
pub const DEFAULT_KEEP_TAIL: usize = 15;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantError {
    #[error("cannot append {role} message while {outstanding} tool invocation(s) are unanswered")]
    UnansweredInvocations { role: Role, outstanding: usize },
    #[error("tool result '{tool_call_id}' does not answer an outstanding invocation")]
    UnexpectedToolResult { tool_call_id: String },
    #[error("tool result '{got}' arrived before the result for '{expected}'")]
    ToolResultOutOfOrder { expected: String, got: String },
    #[error("invocation id '{id}' appears more than once in one assistant message")]
    DuplicateInvocationId { id: String },
}

/// Size bound applied before each model call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrimPolicy {
    /// Total message count at or below which nothing is trimmed.
    pub limit: usize,
    /// Non-system messages kept when trimming.
    pub keep_tail: usize,
}

impl Default for TrimPolicy {
    fn default() -> Self {
        Self {
            limit: DEFAULT_TRIM_LIMIT,
            keep_tail: DEFAULT_KEEP_TAIL,
        }
    }
}

/// What a call to [`ConversationStore::trim`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrimReport {
    pub before: usize,
    pub after: usize,
    /// Tool results dropped because their invocation fell outside the tail.
    pub orphans_dropped: usize,
}

impl TrimReport {
    #[must_use]
    pub fn trimmed(&self) -> bool {
        self.after < self.before
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConversationStore {
    messages: Vec<Message>,
    /// Unanswered invocation ids, oldest first.
    pending: VecDeque<String>,
    /// System messages waiting for the open tool batch to close.
    held: Vec<Message>,
    policy: TrimPolicy,
}

impl ConversationStore {
    #[must_use]
    pub fn new(policy: TrimPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Store whose first message is the pinned instructions.
    #[must_use]
    pub fn with_instructions(instructions: impl Into<String>, policy: TrimPolicy) -> Self {
        let mut store = Self::new(policy);
        store.messages.push(Message::system(instructions));
        store
    }

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    #[must_use]
    pub fn policy(&self) -> TrimPolicy {
        self.policy
    }

    /// Ids of invocations still waiting for a tool message, oldest first.
    pub fn outstanding_invocations(&self) -> impl Iterator<Item = &str> {
        self.pending.iter().map(String::as_str)
    }

    /// Messages appended but not yet placed in the log.
    #[must_use]
    pub fn held_messages(&self) -> &[Message] {
        &self.held
    }

    pub fn append(&mut self, message: Message) -> Result<(), InvariantError> {
        match &message {
            Message::Tool(result) => {
                let id = result.tool_call_id();
                match self.pending.front() {
                    Some(expected) if expected == id => {}
                    Some(expected) if self.pending.iter().any(|p| p == id) => {
                        return Err(InvariantError::ToolResultOutOfOrder {
                            expected: expected.clone(),
                            got: id.to_string(),
                        });
                    }
                    _ => {
                        return Err(InvariantError::UnexpectedToolResult {
                            tool_call_id: id.to_string(),
                        });
                    }
                }
                self.pending.pop_front();
                self.messages.push(message);
                if self.pending.is_empty() && !self.held.is_empty() {
                    tracing::debug!(count = self.held.len(), "Placing held system messages");
                    self.messages.append(&mut self.held);
                }
            }
            Message::System(_) if !self.pending.is_empty() => {
                tracing::debug!(
                    outstanding = self.pending.len(),
                    "Holding system message until tool batch completes"
                );
                self.held.push(message);
            }
            Message::System(_) => self.messages.push(message),
            Message::User(_) | Message::Assistant(_) if !self.pending.is_empty() => {
                return Err(InvariantError::UnansweredInvocations {
                    role: message.role(),
                    outstanding: self.pending.len(),
                });
            }
            Message::Assistant(assistant) => {
                let mut seen = HashSet::new();
                if let Some(dup) = assistant
                    .tool_calls()
                    .iter()
                    .find(|call| !seen.insert(call.id.as_str()))
                {
                    return Err(InvariantError::DuplicateInvocationId {
                        id: dup.id.clone(),
                    });
                }
                self.pending
                    .extend(assistant.tool_calls().iter().map(|call| call.id.clone()));
                self.messages.push(message);
            }
            Message::User(_) => self.messages.push(message),
        }
        Ok(())
    }

    /// Close an interrupted tool batch.
    ///
    /// Every unanswered invocation gets an `Error executing <name>: cancelled`
    /// tool message and held system messages are placed after them. Returns
    /// the number of invocations answered this way.
    pub fn abandon_open_batch(&mut self) -> usize {
        if self.pending.is_empty() {
            return 0;
        }
        let names: HashMap<String, String> = self
            .messages
            .iter()
            .rev()
            .find_map(|message| match message {
                Message::Assistant(assistant) if assistant.has_tool_calls() => Some(assistant),
                _ => None,
            })
            .map(|assistant| {
                assistant
                    .tool_calls()
                    .iter()
                    .map(|call| (call.id.clone(), call.name.clone()))
                    .collect()
            })
            .unwrap_or_default();

        let abandoned = self.pending.len();
        while let Some(id) = self.pending.pop_front() {
            let name = names.get(&id).map_or("function", String::as_str);
            let content = format!("Error executing {name}: cancelled");
            self.messages.push(Message::tool(id, content));
        }
        self.messages.append(&mut self.held);
        tracing::warn!(abandoned, "Closed interrupted tool batch");
        abandoned
    }

    /// Bound the log using the store's policy.
    pub fn trim(&mut self) -> TrimReport {
        self.trim_with(self.policy)
    }

    /// Keep every system message, then the last `keep_tail` others.
    ///
    /// Tool results at the head of the kept tail lost their invocation to the
    /// cut and are dropped too. Nothing happens while a tool batch is open.
    pub fn trim_with(&mut self, policy: TrimPolicy) -> TrimReport {
        let before = self.messages.len();
        let untouched = TrimReport {
            before,
            after: before,
            orphans_dropped: 0,
        };
        if before <= policy.limit {
            return untouched;
        }
        if !self.pending.is_empty() {
            tracing::debug!("Skipping trim while tool invocations are outstanding");
            return untouched;
        }

        let (system, others): (Vec<Message>, Vec<Message>) = std::mem::take(&mut self.messages)
            .into_iter()
            .partition(Message::is_system);

        let mut cut = others.len().saturating_sub(policy.keep_tail);
        let naive_cut = cut;
        while others
            .get(cut)
            .is_some_and(|m| matches!(m, Message::Tool(_)))
        {
            cut += 1;
        }

        self.messages = system;
        self.messages.extend(others.into_iter().skip(cut));

        let report = TrimReport {
            before,
            after: self.messages.len(),
            orphans_dropped: cut - naive_cut,
        };
        if report.trimmed() {
            tracing::info!(
                before = report.before,
                after = report.after,
                orphans_dropped = report.orphans_dropped,
                "Trimmed conversation"
            );
        }
        report
    }

    /// Whether `needle` occurs in any message, placed or held.
    #[must_use]
    pub fn mentions(&self, needle: &str) -> bool {
        self.messages
            .iter()
            .chain(&self.held)
            .filter_map(Message::content)
            .any(|content| content.contains(needle))
    }

    /// Whether the file's context marker is already present.
    #[must_use]
    pub fn has_file_context(&self, canonical: &Path) -> bool {
        self.mentions(&file_marker(canonical))
    }
}
