//! Incremental pieces of one streamed model reply.

/// A slot-addressed piece of a tool invocation.
///
/// The service may split the capability name and the argument payload across
/// many fragments; every field present here is appended to the slot at `index`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCallDelta {
    pub index: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

impl ToolCallDelta {
    #[must_use]
    pub fn new(index: usize) -> Self {
        Self {
            index,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_arguments(mut self, arguments: impl Into<String>) -> Self {
        self.arguments = Some(arguments.into());
        self
    }
}

/// One increment of a streamed reply, as normalised by a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFragment {
    /// Visible reply text.
    TextDelta(String),
    /// Reasoning text; displayed while streaming, never persisted.
    ReasoningDelta(String),
    ToolCall(ToolCallDelta),
    /// The service signalled a complete reply.
    Done,
    /// The call failed; no further fragments follow.
    Error(String),
}

impl StreamFragment {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamFragment::Done | StreamFragment::Error(_))
    }
}
