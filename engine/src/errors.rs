//! Turn-level failures and their user-facing text.

use minicoder_context::InvariantError;
use serde_json::Value;
use thiserror::Error;

/// The model call itself failed.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Reported in-band by the provider.
    #[error("{}", format_stream_error(.0))]
    Service(String),
    #[error("Connection closed before stream completed")]
    Incomplete,
    /// The backend future returned an error without reporting it in-band.
    #[error("{0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum TurnError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("conversation invariant violated: {0}")]
    Invariant(#[from] InvariantError),
    #[error("Turn cancelled")]
    Cancelled,
}

fn split_api_error(raw: &str) -> Option<(&str, &str)> {
    let rest = raw.strip_prefix("API error ")?;
    let (status, body) = rest.split_once(": ")?;
    Some((status.trim(), body.trim()))
}

fn extract_error_message(body: &str) -> Option<String> {
    let payload: Value = serde_json::from_str(body).ok()?;
    payload
        .pointer("/error/message")
        .or_else(|| payload.pointer("/message"))
        .and_then(Value::as_str)
        .or_else(|| payload.as_str())
        .map(str::to_string)
}

/// Reduce a provider error to its message, keeping the HTTP status.
///
/// `API error 401: {"error":{"message":"Incorrect API key"}}` becomes
/// `API error 401: Incorrect API key`. Anything else passes through trimmed.
#[must_use]
pub fn format_stream_error(raw: &str) -> String {
    let trimmed = raw.trim();
    match split_api_error(trimmed) {
        Some((status, body)) => {
            let message = extract_error_message(body).unwrap_or_else(|| body.to_string());
            format!("API error {status}: {message}")
        }
        None => extract_error_message(trimmed).unwrap_or_else(|| trimmed.to_string()),
    }
}
