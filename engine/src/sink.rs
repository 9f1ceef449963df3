//! Where a turn's progress is reported.
//!
//! The loop never writes to a terminal directly. Every method has a no-op
//! default so headless callers implement only what they observe.

use minicoder_tools::ToolOutcome;
use minicoder_types::ToolInvocation;

/// Which model call of the turn is streaming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Round {
    Reply,
    FollowUp,
}

pub trait OutputSink: Send {
    fn stream_started(&mut self, _round: Round) {}
    fn text_delta(&mut self, _text: &str) {}
    /// Side-channel only; reasoning is never persisted.
    fn reasoning_delta(&mut self, _text: &str) {}
    fn stream_finished(&mut self, _round: Round) {}
    fn tools_started(&mut self, _count: usize) {}
    fn tool_started(&mut self, _invocation: &ToolInvocation) {}
    fn tool_finished(&mut self, _invocation: &ToolInvocation, _outcome: &ToolOutcome) {}
    fn notice(&mut self, _text: &str) {}
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl OutputSink for NullSink {}
