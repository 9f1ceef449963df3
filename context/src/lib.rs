//! Conversation state for MiniCoder.
//!
//! - [`ConversationStore`] - the ordered message log; every mutation goes
//!   through [`ConversationStore::append`] or [`ConversationStore::trim`]
//! - [`file_context`] - the `Content of file '...'` messages used to place
//!   file contents in front of the model

pub mod file_context;
mod store;

pub use file_context::{file_context_message, file_context_text, file_marker};
pub use store::{
    ConversationStore, DEFAULT_KEEP_TAIL, DEFAULT_TRIM_LIMIT, InvariantError, TrimPolicy,
    TrimReport,
};
