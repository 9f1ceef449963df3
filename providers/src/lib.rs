//! Model service client with streaming support.
//!
//! # Architecture
//!
//! - [`ModelBackend`] - the seam the orchestration loop talks to: submit a
//!   conversation, receive [`StreamFragment`]s on a channel
//! - [`openai`] - OpenAI Chat Completions implementation of that seam
//! - [`retry`] - HTTP retry policy shared by all requests
//!
//! # Error Handling
//!
//! Service failures (HTTP errors, malformed streams, premature EOF) are
//! delivered in-band as a final `StreamFragment::Error`, so partial output
//! that arrived before the failure is still observed by the caller.
//! Low-level failures while reading the response body return `Err`.

pub mod openai;
pub mod retry;
mod sse;
pub mod sse_types;

pub(crate) use anyhow::Result;
pub(crate) use tokio::sync::mpsc;

pub use minicoder_types;
use minicoder_types::{ApiKey, Message, ModelName, OutputLimits, StreamFragment, ToolDefinition};

use std::future::Future;
use std::pin::Pin;
use std::sync::OnceLock;
use std::time::Duration;

use thiserror::Error;

/// Canonical Chat Completions endpoint.
pub const OPENAI_CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";

const CONNECT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_STREAM_IDLE_TIMEOUT_SECS: u64 = 60;
const TCP_KEEPALIVE_SECS: u64 = 60;
const POOL_IDLE_TIMEOUT_SECS: u64 = 90;

const MAX_ERROR_BODY_BYTES: usize = 32 * 1024;

/// Shared HTTP client.
///
/// Plain-http endpoints are refused earlier, by [`ApiConfig::new`].
pub fn http_client() -> &'static reqwest::Client {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .redirect(reqwest::redirect::Policy::none())
            .tcp_keepalive(Some(Duration::from_secs(TCP_KEEPALIVE_SECS)))
            .pool_idle_timeout(Some(Duration::from_secs(POOL_IDLE_TIMEOUT_SECS)))
            .user_agent(concat!("minicoder/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|e| {
                tracing::error!("Failed to build tuned HTTP client: {e}. Using defaults.");
                reqwest::Client::new()
            })
    })
}

/// Idle timeout between stream chunks (`MINICODER_STREAM_IDLE_TIMEOUT_SECS`).
pub fn stream_idle_timeout() -> Duration {
    static TIMEOUT: OnceLock<Duration> = OnceLock::new();
    *TIMEOUT.get_or_init(|| {
        let secs = std::env::var("MINICODER_STREAM_IDLE_TIMEOUT_SECS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(DEFAULT_STREAM_IDLE_TIMEOUT_SECS);
        Duration::from_secs(secs)
    })
}

/// Read an error body, keeping at most 32 KiB of it.
pub async fn read_capped_error_body(response: reqwest::Response) -> String {
    use futures_util::StreamExt;

    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(Ok(chunk)) = stream.next().await {
        body.extend_from_slice(&chunk);
        if body.len() > MAX_ERROR_BODY_BYTES {
            body.truncate(MAX_ERROR_BODY_BYTES);
            return format!("{}...(truncated)", String::from_utf8_lossy(&body));
        }
    }
    String::from_utf8_lossy(&body).into_owned()
}

/// Turn a retry outcome into a streamable response, or report why not.
pub(crate) async fn accept_response(
    outcome: retry::RetryOutcome,
    tx: &mpsc::Sender<StreamFragment>,
) -> Option<reqwest::Response> {
    let message = match outcome {
        retry::RetryOutcome::Success(response) => return Some(response),
        retry::RetryOutcome::HttpError(response) => {
            let status = response.status();
            let body = read_capped_error_body(response).await;
            format!("API error {status}: {body}")
        }
        retry::RetryOutcome::ConnectionError { attempts, source } => {
            format!("Request failed after {attempts} attempts: {source}")
        }
        retry::RetryOutcome::NonRetryable(e) => format!("Request failed: {e}"),
    };
    let _ = tx.send(StreamFragment::Error(message)).await;
    None
}

// ============================================================================
// Configuration
// ============================================================================

/// Credentials, model and endpoint for one service.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    api_key: ApiKey,
    model: ModelName,
    endpoint: String,
}

#[derive(Debug, Error)]
pub enum ApiConfigError {
    #[error("invalid endpoint URL '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
    #[error("refusing to send credentials over plain http to '{host}'")]
    InsecureEndpoint { host: String },
}

impl ApiConfig {
    pub fn new(api_key: ApiKey, model: ModelName) -> Self {
        Self {
            api_key,
            model,
            endpoint: OPENAI_CHAT_COMPLETIONS_URL.to_string(),
        }
    }

    /// Point at a different Chat Completions compatible endpoint.
    ///
    /// `http` is accepted only for loopback hosts.
    pub fn with_endpoint(mut self, endpoint: &str) -> Result<Self, ApiConfigError> {
        let url = reqwest::Url::parse(endpoint).map_err(|e| ApiConfigError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })?;
        match url.scheme() {
            "https" => {}
            "http" => {
                let host = url.host_str().unwrap_or_default().to_string();
                let loopback = host == "localhost"
                    || host
                        .trim_matches(|c| c == '[' || c == ']')
                        .parse::<std::net::IpAddr>()
                        .is_ok_and(|ip| ip.is_loopback());
                if !loopback {
                    return Err(ApiConfigError::InsecureEndpoint { host });
                }
            }
            other => {
                return Err(ApiConfigError::InvalidEndpoint {
                    endpoint: endpoint.to_string(),
                    reason: format!("unsupported scheme '{other}'"),
                });
            }
        }
        self.endpoint = url.into();
        Ok(self)
    }

    #[must_use]
    pub fn api_key(&self) -> &str {
        self.api_key.expose()
    }

    #[must_use]
    pub fn model(&self) -> &ModelName {
        &self.model
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

// ============================================================================
// Backend seam
// ============================================================================

/// One "submit conversation, stream response" call.
#[derive(Debug, Clone, Copy)]
pub struct ChatRequest<'a> {
    pub messages: &'a [Message],
    pub tools: &'a [ToolDefinition],
    pub limits: OutputLimits,
}

pub type StreamFut<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// A model service that streams its reply as fragments.
///
/// Implementations send fragments in arrival order and finish with exactly one
/// `Done` or `Error` unless the receiver is dropped. Returning `Err` means the
/// transport itself broke; the caller treats a missing terminal fragment the
/// same way.
pub trait ModelBackend: Send + Sync {
    fn stream<'a>(
        &'a self,
        request: ChatRequest<'a>,
        tx: mpsc::Sender<StreamFragment>,
    ) -> StreamFut<'a>;
}
