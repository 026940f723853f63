// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Chat session orchestration
//!
//! The [`runner::SessionRunner`] drives the agentic loop: stream a
//! response, execute any tool calls, feed results back, repeat until
//! the model stops calling tools or a safety cap trips.

pub mod provider;
pub mod runner;

pub use provider::{ChatRequest, HttpInferenceClient, InferenceClient, StreamEvent};
pub use runner::{SessionOutcome, SessionRunner};

use crate::chat::Message;

/// Phase of one agentic-loop run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Request sent, nothing received yet
    AwaitingResponse,
    /// Deltas arriving
    Streaming,
    /// Running tool calls from the last response
    ToolExecution,
    /// Model finished without further tool calls, or a safety cap hit
    Done,
    /// External cancellation; partial content kept, marked stopped
    Cancelled,
    /// A genuine error halted the loop
    Errored,
}

impl LoopState {
    /// Is the loop still making progress?
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            LoopState::AwaitingResponse | LoopState::Streaming | LoopState::ToolExecution
        )
    }
}

/// Where the runner publishes message changes as they happen; the UI
/// message-list store adapts to this.
pub trait MessageSink: Send + Sync {
    /// A new message was appended to the conversation
    fn append(&self, message: &Message);

    /// An existing message's content changed
    fn update(&self, message: &Message);

    /// The loop started or stopped running
    fn set_running(&self, running: bool);

    /// The loop moved to a new phase. Every iteration passes through
    /// `AwaitingResponse`, then `Streaming` once deltas arrive, then
    /// `ToolExecution` when the response called tools; the terminal
    /// state is reported last.
    fn set_state(&self, _state: LoopState) {}
}

/// Sink that discards everything, for headless use and tests
pub struct NullSink;

impl MessageSink for NullSink {
    fn append(&self, _message: &Message) {}
    fn update(&self, _message: &Message) {}
    fn set_running(&self, _running: bool) {}
}
