//! Tool framework - capability trait, dispatcher, and the file capabilities.
//!
//! Every invocation ends as text: successes and failures alike become the
//! content of exactly one `tool` message. Nothing raised inside a capability
//! crosses [`ToolDispatcher::execute`].

pub mod builtins;
pub mod locator;
pub mod mutator;
pub mod paths;
pub mod walk;

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::time::Duration;

use futures_util::FutureExt;
use minicoder_context::{ConversationStore, InvariantError};
use minicoder_types::{Message, ToolDefinition, ToolInvocation};
use serde_json::Value;
use thiserror::Error;

pub use locator::{PartialMatch, SnippetError, SnippetMatch, locate};
pub use mutator::{EditReport, FileMutator, MAX_FILE_CONTENT_BYTES};
pub use paths::PathError;

/// Tool execution future type alias.
pub type ToolFut<'a> = Pin<Box<dyn Future<Output = Result<String, ToolError>> + Send + 'a>>;

/// Wall-clock bound on a single capability.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Error parsing function arguments: {message}")]
    BadArgs { message: String },
    #[error("Unknown function: {name}")]
    UnknownTool { name: String },
    #[error("Duplicate tool registered: {name}")]
    DuplicateTool { name: String },
    #[error(transparent)]
    Path(#[from] PathError),
    #[error(transparent)]
    Snippet(#[from] SnippetError),
    #[error(transparent)]
    Invariant(#[from] InvariantError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Already formatted with the capability's own context.
    #[error("{0}")]
    Failed(String),
}

/// Textual result of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutcome {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutcome {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }

    /// The `tool` message answering `invocation_id`.
    #[must_use]
    pub fn into_message(self, invocation_id: &str) -> Message {
        Message::tool(invocation_id, self.content)
    }
}

/// What a capability may touch while it runs.
pub struct ToolCtx<'a> {
    pub files: &'a FileMutator,
    pub store: &'a mut ConversationStore,
}

/// A named capability the model may invoke.
pub trait ToolExecutor: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// JSON Schema of the argument object.
    fn schema(&self) -> Value;
    fn execute<'a>(&'a self, args: Value, ctx: &'a mut ToolCtx<'_>) -> ToolFut<'a>;
}

pub(crate) fn parse_args<T: serde::de::DeserializeOwned>(args: &Value) -> Result<T, ToolError> {
    serde_json::from_value(args.clone()).map_err(|e| ToolError::BadArgs {
        message: e.to_string(),
    })
}

/// Decode the raw streamed payload. Blank payloads mean "no arguments".
fn decode_arguments(raw: &str) -> Result<Value, ToolError> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    serde_json::from_str(raw).map_err(|e| ToolError::BadArgs {
        message: e.to_string(),
    })
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Routes invocations to registered capabilities.
pub struct ToolDispatcher {
    executors: HashMap<&'static str, Box<dyn ToolExecutor>>,
    files: FileMutator,
    timeout: Duration,
}

impl ToolDispatcher {
    #[must_use]
    pub fn new(files: FileMutator) -> Self {
        Self {
            executors: HashMap::new(),
            files,
            timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    /// Dispatcher with the five file capabilities registered.
    #[must_use]
    pub fn with_builtins(files: FileMutator) -> Self {
        let mut dispatcher = Self::new(files);
        builtins::register_builtins(&mut dispatcher);
        dispatcher
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn register(&mut self, executor: Box<dyn ToolExecutor>) -> Result<(), ToolError> {
        let name = executor.name();
        if self.executors.contains_key(name) {
            return Err(ToolError::DuplicateTool {
                name: name.to_string(),
            });
        }
        self.executors.insert(name, executor);
        Ok(())
    }

    #[must_use]
    pub fn files(&self) -> &FileMutator {
        &self.files
    }

    /// Capability schema sent with every model call, sorted by name.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .executors
            .values()
            .map(|e| ToolDefinition::new(e.name(), e.description(), e.schema()))
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Run one invocation to a textual outcome. Never fails.
    pub async fn execute(
        &self,
        invocation: &ToolInvocation,
        store: &mut ConversationStore,
    ) -> ToolOutcome {
        let name = invocation.name.as_str();
        let Some(executor) = self.executors.get(name) else {
            tracing::warn!(tool = %name, call_id = %invocation.id, "Unknown tool requested");
            return ToolOutcome::error(ToolError::UnknownTool { name: name.into() }.to_string());
        };
        let args = match decode_arguments(&invocation.arguments) {
            Ok(args) => args,
            Err(e) => {
                tracing::warn!(tool = %name, call_id = %invocation.id, %e, "Unparsable tool arguments");
                return ToolOutcome::error(e.to_string());
            }
        };

        let mut ctx = ToolCtx {
            files: &self.files,
            store,
        };
        let running = AssertUnwindSafe(executor.execute(args, &mut ctx)).catch_unwind();
        let outcome = match tokio::time::timeout(self.timeout, running).await {
            Err(_) => ToolOutcome::error(format!(
                "Error executing {name}: timed out after {}s",
                self.timeout.as_secs()
            )),
            Ok(Err(payload)) => ToolOutcome::error(format!(
                "Error executing {name}: {}",
                panic_message(payload.as_ref())
            )),
            Ok(Ok(Ok(text))) => ToolOutcome::success(text),
            Ok(Ok(Err(e))) => ToolOutcome::error(e.to_string()),
        };

        tracing::info!(
            tool = %name,
            call_id = %invocation.id,
            is_error = outcome.is_error,
            "Tool executed"
        );
        outcome
    }
}
