//! Turn orchestration for MiniCoder.
//!
//! [`Orchestrator`] owns the conversation and drives each user turn through
//! one or two streamed model calls, executing requested tools in between.
//! Model output is reconstructed by the [`PartialTurn`] reducer.

mod aggregator;
pub mod config;
mod errors;
mod orchestrator;
mod sink;

pub use aggregator::{PartialTurn, aggregate};
pub use config::{ConfigError, MinicoderConfig};
pub use errors::{TransportError, TurnError, format_stream_error};
pub use orchestrator::{Orchestrator, TurnSummary};
pub use sink::{NullSink, OutputSink, Round};

pub use minicoder_context as context;
pub use minicoder_providers as providers;
pub use minicoder_tools as tools;
pub use minicoder_types as types;

/// Conversation instructions used unless the config overrides them.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are MiniCoder, a software engineering assistant working inside the user's \
project directory. You can read, create and edit files through the provided \
functions.

Guidelines:
- Read a file before editing it unless its content is already in the conversation.
- Prefer edit_file for small, targeted changes. The original_snippet must match \
the file text exactly, including indentation, and should be long enough to be unique.
- Use create_file or create_multiple_files for new files or complete rewrites.
- Use relative paths inside the project. Paths containing '..' or starting with \
'~' are rejected.
- After making changes, briefly summarise what you did and why.
- When no file operation is needed, answer directly and concisely.";
