//! OpenAI Chat Completions streaming client.
//!
//! Tool-call fragments arrive as `choices[0].delta.tool_calls[]` entries keyed
//! by `index`; they are forwarded slot-addressed and reassembled downstream.

use serde_json::{Value, json};

use crate::sse::{SseParseAction, SseParser, pump_sse_stream};
use crate::sse_types::ChatChunk;
use crate::{
    ApiConfig, ChatRequest, Message, ModelBackend, Result, StreamFragment, StreamFut,
    ToolDefinition, accept_response, http_client, mpsc,
    retry::{RetryConfig, send_with_retry},
    stream_idle_timeout,
};
use minicoder_types::ToolCallDelta;

// ========================================================================
// SSE Parser
// ========================================================================

#[derive(Debug, Default)]
pub(crate) struct ChatCompletionsParser {
    saw_unindexed_call: bool,
}

impl SseParser for ChatCompletionsParser {
    fn parse(&mut self, json: &Value) -> SseParseAction {
        let chunk: ChatChunk = match serde_json::from_value(json.clone()) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::debug!("Failed to parse chat completion chunk: {e}");
                return SseParseAction::Continue;
            }
        };

        if let Some(error) = chunk.error {
            let message = if error.message.is_empty() {
                error.error_type.unwrap_or_else(|| "Unknown error".to_string())
            } else {
                error.message
            };
            return SseParseAction::Error(message);
        }

        let mut fragments = Vec::new();
        // Only the first choice is requested (n = 1).
        let Some(choice) = chunk.choices.into_iter().next() else {
            return SseParseAction::Continue;
        };
        let delta = choice.delta;

        if let Some(reasoning) = delta.reasoning_content.filter(|s| !s.is_empty()) {
            fragments.push(StreamFragment::ReasoningDelta(reasoning));
        }
        if let Some(text) = delta.content.filter(|s| !s.is_empty()) {
            fragments.push(StreamFragment::TextDelta(text));
        }
        if let Some(refusal) = delta.refusal.filter(|s| !s.is_empty()) {
            fragments.push(StreamFragment::TextDelta(refusal));
        }
        for call in delta.tool_calls.unwrap_or_default() {
            let Some(index) = call.index else {
                if !self.saw_unindexed_call {
                    tracing::warn!("Dropping tool call fragment without slot index");
                    self.saw_unindexed_call = true;
                }
                continue;
            };
            let (name, arguments) = call
                .function
                .map(|f| (f.name, f.arguments))
                .unwrap_or_default();
            fragments.push(StreamFragment::ToolCall(ToolCallDelta {
                index,
                id: call.id.filter(|id| !id.is_empty()),
                name,
                arguments,
            }));
        }

        if fragments.is_empty() {
            SseParseAction::Continue
        } else {
            SseParseAction::Emit(fragments)
        }
    }

    fn provider_name(&self) -> &'static str {
        "OpenAI"
    }
}

// ========================================================================
// Request body
// ========================================================================

fn message_to_json(message: &Message) -> Value {
    match message {
        Message::System(m) => json!({ "role": "system", "content": m.content() }),
        Message::User(m) => json!({ "role": "user", "content": m.content() }),
        Message::Assistant(m) if m.has_tool_calls() => {
            let calls: Vec<Value> = m
                .tool_calls()
                .iter()
                .map(|call| {
                    json!({
                        "id": call.id,
                        "type": "function",
                        "function": { "name": call.name, "arguments": call.arguments },
                    })
                })
                .collect();
            json!({ "role": "assistant", "content": m.content(), "tool_calls": calls })
        }
        // The API rejects a null-content assistant message without tool calls.
        Message::Assistant(m) => {
            json!({ "role": "assistant", "content": m.content().unwrap_or_default() })
        }
        Message::Tool(m) => json!({
            "role": "tool",
            "tool_call_id": m.tool_call_id(),
            "content": m.content(),
        }),
    }
}

fn tool_to_json(tool: &ToolDefinition) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        },
    })
}

pub(crate) fn build_request_body(config: &ApiConfig, request: &ChatRequest<'_>) -> Value {
    let mut body = serde_json::Map::new();
    body.insert("model".to_string(), json!(config.model().as_str()));
    body.insert(
        "messages".to_string(),
        Value::Array(request.messages.iter().map(message_to_json).collect()),
    );
    if !request.tools.is_empty() {
        body.insert(
            "tools".to_string(),
            Value::Array(request.tools.iter().map(tool_to_json).collect()),
        );
    }
    body.insert(
        "max_completion_tokens".to_string(),
        json!(request.limits.max_completion_tokens()),
    );
    body.insert("stream".to_string(), json!(true));
    Value::Object(body)
}

// ========================================================================
// Client
// ========================================================================

/// [`ModelBackend`] backed by the Chat Completions API.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    config: ApiConfig,
    retry: RetryConfig,
}

impl OpenAiClient {
    #[must_use]
    pub fn new(config: ApiConfig) -> Self {
        Self {
            config,
            retry: RetryConfig::default(),
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    pub async fn send_message(
        &self,
        request: ChatRequest<'_>,
        tx: mpsc::Sender<StreamFragment>,
    ) -> Result<()> {
        let client = http_client();
        let body = build_request_body(&self.config, &request);
        let auth_header = format!("Bearer {}", self.config.api_key());
        let endpoint = self.config.endpoint();

        tracing::debug!(
            model = %self.config.model(),
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Submitting chat completion"
        );

        let outcome = send_with_retry(
            || {
                client
                    .post(endpoint)
                    .header("Authorization", &auth_header)
                    .header("Accept", "text/event-stream")
                    .json(&body)
            },
            &self.retry,
        )
        .await;

        let Some(response) = accept_response(outcome, &tx).await else {
            return Ok(());
        };

        let mut parser = ChatCompletionsParser::default();
        pump_sse_stream(
            response.bytes_stream(),
            &mut parser,
            &tx,
            stream_idle_timeout(),
        )
        .await
    }
}

impl ModelBackend for OpenAiClient {
    fn stream<'a>(
        &'a self,
        request: ChatRequest<'a>,
        tx: mpsc::Sender<StreamFragment>,
    ) -> StreamFut<'a> {
        Box::pin(self.send_message(request, tx))
    }
}
