//! Stream Aggregator: folds one call's fragments into an assistant message.
//!
//! The reducer only relies on per-slot arrival order. Fragments for different
//! slots may interleave arbitrarily; each slot's name and argument chunks are
//! appended in the order they arrive.

use std::collections::HashSet;

use minicoder_types::{
    AssistantMessage, StreamFragment, ToolCallDelta, ToolInvocation, synthesize_invocation_id,
};

use crate::errors::TransportError;

/// Highest number of invocation slots one reply may open.
const MAX_TOOL_SLOTS: usize = 128;

/// An invocation still being assembled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Slot {
    id: Option<String>,
    name: String,
    arguments: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Termination {
    Done,
    Failed(String),
}

/// Accumulated state of one streamed reply.
#[derive(Debug, Clone, Default)]
pub struct PartialTurn {
    content: Option<String>,
    slots: Vec<Slot>,
    reasoning_bytes: usize,
    fragments: usize,
    termination: Option<Termination>,
}

impl PartialTurn {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one fragment in. Fragments after a terminal one are ignored.
    pub fn apply(&mut self, fragment: StreamFragment) {
        if self.termination.is_some() {
            tracing::debug!(?fragment, "Ignoring fragment after stream end");
            return;
        }
        self.fragments += 1;
        match fragment {
            StreamFragment::TextDelta(text) => {
                self.content.get_or_insert_with(String::new).push_str(&text);
            }
            StreamFragment::ReasoningDelta(text) => self.reasoning_bytes += text.len(),
            StreamFragment::ToolCall(delta) => self.apply_tool_delta(delta),
            StreamFragment::Done => self.termination = Some(Termination::Done),
            StreamFragment::Error(message) => {
                self.termination = Some(Termination::Failed(message));
            }
        }
    }

    fn apply_tool_delta(&mut self, delta: ToolCallDelta) {
        if delta.index >= MAX_TOOL_SLOTS {
            tracing::warn!(
                index = delta.index,
                limit = MAX_TOOL_SLOTS,
                "Dropping tool call delta with out-of-range slot index"
            );
            return;
        }
        if delta.index >= self.slots.len() {
            self.slots.resize_with(delta.index + 1, Slot::default);
        }
        let slot = &mut self.slots[delta.index];
        if let Some(id) = delta.id.filter(|id| !id.is_empty()) {
            slot.id = Some(id);
        }
        if let Some(name) = delta.name {
            slot.name.push_str(&name);
        }
        if let Some(arguments) = delta.arguments {
            slot.arguments.push_str(&arguments);
        }
    }

    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.termination.is_some()
    }

    /// Fragments applied so far, terminal included.
    #[must_use]
    pub fn fragment_count(&self) -> usize {
        self.fragments
    }

    #[must_use]
    pub fn reasoning_bytes(&self) -> usize {
        self.reasoning_bytes
    }

    /// The completed message, or the reason the stream did not complete.
    pub fn finish(self) -> Result<AssistantMessage, TransportError> {
        match &self.termination {
            Some(Termination::Done) => Ok(self.into_message()),
            Some(Termination::Failed(message)) => Err(TransportError::Service(message.clone())),
            None => Err(TransportError::Incomplete),
        }
    }

    /// Reconstruct the message from whatever has been folded in.
    ///
    /// Slots that never received a name are dropped. Surviving slots keep
    /// their service-assigned id, or get a synthesized one when it is missing
    /// or repeats an earlier slot's id.
    #[must_use]
    pub fn into_message(self) -> AssistantMessage {
        let mut seen = HashSet::new();
        let mut calls = Vec::with_capacity(self.slots.len());
        for (index, slot) in self.slots.into_iter().enumerate() {
            if slot.name.is_empty() {
                tracing::debug!(slot = index, "Dropping tool slot without a name");
                continue;
            }
            let id = match slot.id {
                Some(id) if !seen.contains(&id) => id,
                Some(duplicate) => {
                    let id = synthesize_invocation_id(index);
                    tracing::warn!(slot = index, %duplicate, replacement = %id, "Duplicate invocation id");
                    id
                }
                None => {
                    let id = synthesize_invocation_id(index);
                    tracing::debug!(slot = index, %id, "Synthesized invocation id");
                    id
                }
            };
            seen.insert(id.clone());
            calls.push(ToolInvocation::new(id, slot.name, slot.arguments));
        }
        AssistantMessage::new(self.content, calls)
    }
}

/// Fold a complete fragment sequence.
pub fn aggregate(
    fragments: impl IntoIterator<Item = StreamFragment>,
) -> Result<AssistantMessage, TransportError> {
    let mut turn = PartialTurn::new();
    for fragment in fragments {
        turn.apply(fragment);
    }
    turn.finish()
}
