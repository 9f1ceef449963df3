//! Shared vocabulary for MiniCoder: messages, stream fragments, tool
//! definitions and the validated strings they are built from.
//!
//! Nothing in here performs IO.

#![allow(clippy::missing_errors_doc)]

mod fragment;
mod ids;
mod message;

pub use fragment::{StreamFragment, ToolCallDelta};
pub use ids::synthesize_invocation_id;
pub use message::{
    AssistantMessage, Message, Role, SystemMessage, ToolMessage, UserMessage,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

// --- validated strings ---

/// A string guaranteed to be non-empty (after trimming).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NonEmptyString(String);

#[derive(Debug, Error)]
#[error("value must not be empty")]
pub struct EmptyStringError;

impl NonEmptyString {
    pub fn new(value: impl Into<String>) -> Result<Self, EmptyStringError> {
        let value = value.into();
        if value.trim().is_empty() {
            Err(EmptyStringError)
        } else {
            Ok(Self(value))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl TryFrom<String> for NonEmptyString {
    type Error = EmptyStringError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for NonEmptyString {
    type Error = EmptyStringError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<NonEmptyString> for String {
    fn from(value: NonEmptyString) -> Self {
        value.0
    }
}

impl std::ops::Deref for NonEmptyString {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}

// --- model and credentials ---

/// Model used when nothing else is configured.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Output cap sent with every model call unless configured otherwise.
pub const DEFAULT_MAX_COMPLETION_TOKENS: u32 = 2000;

/// Name of the remote model, as sent on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelName(NonEmptyString);

impl ModelName {
    pub fn new(raw: impl Into<String>) -> Result<Self, EmptyStringError> {
        let name = NonEmptyString::new(raw.into().trim().to_string())?;
        Ok(Self(name))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Default for ModelName {
    fn default() -> Self {
        Self(NonEmptyString(DEFAULT_MODEL.to_string()))
    }
}

impl std::fmt::Display for ModelName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bearer credential for the model service.
///
/// `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(raw: impl Into<String>) -> Result<Self, EmptyStringError> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(EmptyStringError);
        }
        Ok(Self(trimmed.to_string()))
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey([REDACTED])")
    }
}

/// Upper bound on the size of one model reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputLimits {
    max_completion_tokens: u32,
}

impl OutputLimits {
    #[must_use]
    pub const fn new(max_completion_tokens: u32) -> Self {
        Self {
            max_completion_tokens,
        }
    }

    #[must_use]
    pub const fn max_completion_tokens(self) -> u32 {
        self.max_completion_tokens
    }
}

impl Default for OutputLimits {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_COMPLETION_TOKENS)
    }
}

// --- tools ---

/// A capability the model service may request, described by a JSON schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema describing the argument object.
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// One reconstructed request to run a capability.
///
/// `arguments` is the raw payload text exactly as streamed; parsing happens at
/// dispatch time so that malformed payloads can be reported back to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl ToolInvocation {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}
