//! Orchestration Loop.
//!
//! Per user turn: `Submit -> Streaming(reply) -> Idle` when the reply asks
//! for no tools, otherwise `Submit -> Streaming(reply) -> Dispatch ->
//! Streaming(follow-up) -> Idle`. Invocations run one at a time in slot order
//! and each result is appended before the next invocation starts.

use std::future::Future;

use minicoder_context::{ConversationStore, TrimReport};
use minicoder_providers::{ChatRequest, ModelBackend};
use minicoder_tools::walk::{self, AddedContext};
use minicoder_tools::{ToolDispatcher, ToolError};
use minicoder_types::{AssistantMessage, Message, OutputLimits, StreamFragment, ToolDefinition};
use tokio::sync::mpsc;

use crate::aggregator::PartialTurn;
use crate::errors::{TransportError, TurnError};
use crate::sink::{OutputSink, Round};

const FRAGMENT_CHANNEL_CAPACITY: usize = 256;

/// What one completed turn did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnSummary {
    /// Text of the last assistant message appended.
    pub reply: Option<String>,
    pub tools_executed: usize,
    pub tool_failures: usize,
    /// Follow-up invocations that were dropped rather than executed.
    pub ignored_invocations: usize,
    pub trim: TrimReport,
}

pub struct Orchestrator<B, S> {
    backend: B,
    store: ConversationStore,
    dispatcher: ToolDispatcher,
    tools: Vec<ToolDefinition>,
    sink: S,
    limits: OutputLimits,
}

impl<B: ModelBackend, S: OutputSink> Orchestrator<B, S> {
    pub fn new(backend: B, store: ConversationStore, dispatcher: ToolDispatcher, sink: S) -> Self {
        let tools = dispatcher.definitions();
        Self {
            backend,
            store,
            dispatcher,
            tools,
            sink,
            limits: OutputLimits::default(),
        }
    }

    #[must_use]
    pub fn with_limits(mut self, limits: OutputLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Capability schema sent with every model call.
    pub fn tools(&self) -> &[ToolDefinition] {
        &self.tools
    }

    /// Inject a file or directory as system messages (`/add`).
    pub fn add_context(&mut self, raw: &str) -> Result<AddedContext, ToolError> {
        walk::add_to_context(self.dispatcher.files(), raw, &mut self.store)
    }

    /// [`Self::run_turn`], abandoned as soon as `cancel` resolves.
    ///
    /// The store is not rolled back; it may hold a partial turn afterwards.
    /// Invocations left unanswered are closed with cancellation errors so the
    /// next turn can be appended.
    pub async fn run_turn_until<F: Future>(
        &mut self,
        user_text: &str,
        cancel: F,
    ) -> Result<TurnSummary, TurnError> {
        let finished = tokio::select! {
            biased;
            result = self.run_turn(user_text) => Some(result),
            _ = cancel => None,
        };
        if let Some(result) = finished {
            return result;
        }
        let abandoned = self.store.abandon_open_batch();
        tracing::warn!(messages = self.store.len(), abandoned, "Turn cancelled");
        Err(TurnError::Cancelled)
    }

    pub async fn run_turn(&mut self, user_text: &str) -> Result<TurnSummary, TurnError> {
        self.store.append(Message::user(user_text))?;
        let trim = self.store.trim();
        let mut summary = TurnSummary {
            trim,
            ..TurnSummary::default()
        };

        let reply = self.stream_reply(Round::Reply).await?;
        if !reply.has_tool_calls() {
            summary.reply = reply.content().map(str::to_string);
            self.store.append(reply.into())?;
            return Ok(summary);
        }

        let reply = reply.with_null_empty_content();
        let invocations = reply.tool_calls().to_vec();
        self.store.append(reply.into())?;

        self.sink.tools_started(invocations.len());
        for invocation in &invocations {
            self.sink.tool_started(invocation);
            let outcome = self.dispatcher.execute(invocation, &mut self.store).await;
            self.sink.tool_finished(invocation, &outcome);
            summary.tools_executed += 1;
            if outcome.is_error {
                summary.tool_failures += 1;
            }
            self.store.append(outcome.into_message(&invocation.id))?;
        }

        let mut follow_up = self.stream_reply(Round::FollowUp).await?;
        let ignored = follow_up.take_tool_calls();
        if !ignored.is_empty() {
            let names: Vec<&str> = ignored.iter().map(|call| call.name.as_str()).collect();
            tracing::warn!(count = ignored.len(), ?names, "Ignoring invocations in follow-up reply");
            self.sink.notice(&format!(
                "Ignored {} further function call(s) requested after tool execution",
                ignored.len()
            ));
            summary.ignored_invocations = ignored.len();
        }
        summary.reply = follow_up.content().map(str::to_string);
        self.store.append(follow_up.into())?;
        Ok(summary)
    }

    /// One model call over the current log, aggregated into a message.
    ///
    /// Nothing is appended here, so a failed call leaves the store untouched.
    async fn stream_reply(&mut self, round: Round) -> Result<AssistantMessage, TransportError> {
        let (tx, mut rx) = mpsc::channel(FRAGMENT_CHANNEL_CAPACITY);
        let request = ChatRequest {
            messages: self.store.messages(),
            tools: &self.tools,
            limits: self.limits,
        };
        tracing::debug!(?round, messages = request.messages.len(), "Model call started");
        self.sink.stream_started(round);

        let sink = &mut self.sink;
        let producer = self.backend.stream(request, tx);
        let consumer = async move {
            let mut turn = PartialTurn::new();
            while let Some(fragment) = rx.recv().await {
                match &fragment {
                    StreamFragment::TextDelta(text) => sink.text_delta(text),
                    StreamFragment::ReasoningDelta(text) => sink.reasoning_delta(text),
                    _ => {}
                }
                let terminal = fragment.is_terminal();
                turn.apply(fragment);
                if terminal {
                    break;
                }
            }
            turn
        };
        let (sent, turn) = tokio::join!(producer, consumer);
        self.sink.stream_finished(round);

        tracing::debug!(
            ?round,
            fragments = turn.fragment_count(),
            reasoning_bytes = turn.reasoning_bytes(),
            "Model call finished"
        );
        if let Err(e) = sent
            && !turn.is_terminated()
        {
            tracing::warn!(?round, error = %format!("{e:#}"), "Model call failed");
            return Err(TransportError::Backend(format!("{e:#}")));
        }
        turn.finish()
    }
}
