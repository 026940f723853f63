// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Agentic loop runner
//!
//! Drives iterative request/stream/tool-call cycles for one user turn.
//! Each iteration streams into its own assistant message; tool-call
//! rounds never overwrite earlier iterations. The loop ends when the
//! model stops calling tools, when the iteration or stagnation cap
//! trips, or when the shared cancellation token fires; a cancelled
//! message keeps its partial content and gains a visible "[Stopped]"
//! marker instead of being discarded.

use std::sync::{Arc, Mutex};

use futures::StreamExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::chat::{ContentPart, Conversation, Message, Role};
use crate::config::AgentLoopConfig;
use crate::error::DeckError;
use crate::session::provider::{ChatRequest, InferenceClient, StreamEvent};
use crate::session::{LoopState, MessageSink};
use crate::thinking::{parse_streaming_thinking_content, ReasoningTimer};
use crate::tools::ToolRegistry;

/// Called with genuine (non-cancellation) errors; the loop halts but
/// never panics or propagates past the engine boundary.
pub type ErrorCallback = Box<dyn Fn(&DeckError) + Send + Sync>;

/// How one run ended
#[derive(Debug)]
pub struct SessionOutcome {
    /// Terminal state: `Done`, `Cancelled`, or `Errored`
    pub state: LoopState,
    /// Iterations actually executed
    pub iterations: u32,
}

/// Drives the agentic loop against an inference client
pub struct SessionRunner {
    client: Arc<dyn InferenceClient>,
    model: String,
    config: AgentLoopConfig,
    timer: Arc<Mutex<ReasoningTimer>>,
    on_error: Option<ErrorCallback>,
}

impl SessionRunner {
    pub fn new(client: Arc<dyn InferenceClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            config: AgentLoopConfig::default(),
            timer: Arc::new(Mutex::new(ReasoningTimer::new())),
            on_error: None,
        }
    }

    pub fn with_config(mut self, config: AgentLoopConfig) -> Self {
        self.config = config;
        self
    }

    /// Share a timing tracker with the persistence layer so recorded
    /// reasoning durations reach the stored transcript
    pub fn with_timer(mut self, timer: Arc<Mutex<ReasoningTimer>>) -> Self {
        self.timer = timer;
        self
    }

    pub fn with_error_callback(mut self, callback: ErrorCallback) -> Self {
        self.on_error = Some(callback);
        self
    }

    pub fn timer(&self) -> Arc<Mutex<ReasoningTimer>> {
        Arc::clone(&self.timer)
    }

    fn report_error(&self, error: &DeckError) {
        tracing::error!(error = %error, "session loop halted");
        if let Some(callback) = &self.on_error {
            callback(error);
        }
    }

    /// Run the loop for the user message already present at the end of
    /// the conversation. Assistant messages are appended to the
    /// conversation as they are produced.
    pub async fn run(
        &self,
        conversation: &mut Conversation,
        registry: &ToolRegistry,
        sink: &dyn MessageSink,
        cancel: CancellationToken,
    ) -> SessionOutcome {
        sink.set_running(true);
        let turn_id = Uuid::new_v4();
        let mut iterations = 0u32;
        let mut stagnant = 0u32;
        let mut prev_signature: Option<String> = None;

        let state = 'turn: loop {
            if cancel.is_cancelled() {
                break LoopState::Cancelled;
            }
            if iterations >= self.config.max_iterations {
                tracing::warn!(
                    max_iterations = self.config.max_iterations,
                    "iteration cap reached, stopping loop"
                );
                break LoopState::Done;
            }
            iterations += 1;

            let mut request = ChatRequest::new(self.model.clone(), conversation.messages.clone())
                .with_tools(registry.enabled_definitions());
            if let Some(prompt) = &conversation.system_prompt {
                request = request.with_system_prompt(prompt.clone());
            }

            let mut message = Message::with_parts(Role::Assistant, vec![]).with_turn_id(turn_id);
            sink.append(&message);
            sink.set_state(LoopState::AwaitingResponse);

            let mut stream = match self.client.stream_chat(request, cancel.clone()).await {
                Ok(stream) => stream,
                Err(e) if e.is_cancellation() => {
                    message.mark_stopped();
                    sink.update(&message);
                    conversation.push(message);
                    break LoopState::Cancelled;
                }
                Err(e) => {
                    // Nothing streamed; the empty placeholder is not
                    // worth keeping in the history.
                    self.report_error(&e);
                    break LoopState::Errored;
                }
            };

            let mut content_buf = String::new();
            let mut reasoning_buf = String::new();
            let mut tool_calls: Vec<(String, String, Value)> = Vec::new();
            let mut reasoning_active = false;
            let mut streaming = false;
            let mut interrupted: Option<LoopState> = None;

            while let Some(event) = stream.next().await {
                if !streaming && matches!(event, Ok(ref e) if *e != StreamEvent::Done) {
                    sink.set_state(LoopState::Streaming);
                    streaming = true;
                }
                match event {
                    Ok(StreamEvent::TextDelta(text)) => {
                        content_buf.push_str(&text);
                        self.refresh_message(
                            &mut message,
                            &reasoning_buf,
                            &content_buf,
                            &mut reasoning_active,
                        );
                        sink.update(&message);
                    }
                    Ok(StreamEvent::ReasoningDelta(text)) => {
                        reasoning_buf.push_str(&text);
                        self.refresh_message(
                            &mut message,
                            &reasoning_buf,
                            &content_buf,
                            &mut reasoning_active,
                        );
                        sink.update(&message);
                    }
                    Ok(StreamEvent::ToolCall { id, name, args }) => {
                        tool_calls.push((id, name, args));
                    }
                    Ok(StreamEvent::Done) => break,
                    Err(e) if e.is_cancellation() => {
                        interrupted = Some(LoopState::Cancelled);
                        break;
                    }
                    Err(e) => {
                        self.report_error(&e);
                        interrupted = Some(LoopState::Errored);
                        break;
                    }
                }
            }
            drop(stream);

            if reasoning_active {
                self.timer.lock().unwrap().complete_segment(message.id, 0);
            }

            if let Some(state) = interrupted {
                if state == LoopState::Cancelled {
                    message.mark_stopped();
                    sink.update(&message);
                }
                conversation.push(message);
                break state;
            }

            if tool_calls.is_empty() {
                message.finalize();
                sink.update(&message);
                conversation.push(message);
                break LoopState::Done;
            }

            // Stagnation: consecutive iterations with identical output
            // and identical tool calls make no progress.
            let signature = iteration_signature(&content_buf, &tool_calls);
            if prev_signature.as_deref() == Some(signature.as_str()) {
                stagnant += 1;
            } else {
                stagnant = 0;
            }
            prev_signature = Some(signature);
            if stagnant >= self.config.max_stagnant_iterations {
                tracing::warn!(stagnant, "stagnation cap reached, stopping loop");
                message.finalize();
                sink.update(&message);
                conversation.push(message);
                break LoopState::Done;
            }

            sink.set_state(LoopState::ToolExecution);
            for (id, name, args) in tool_calls {
                if cancel.is_cancelled() {
                    message.mark_stopped();
                    sink.update(&message);
                    conversation.push(message);
                    break 'turn LoopState::Cancelled;
                }

                message.parts.push(ContentPart::ToolCall {
                    id,
                    name: name.clone(),
                    args: args.clone(),
                    result: None,
                    is_error: false,
                });
                sink.update(&message);

                let outcome = registry.dispatch(&name, args).await;
                if let Some(ContentPart::ToolCall {
                    result, is_error, ..
                }) = message.parts.last_mut()
                {
                    *is_error = outcome.is_error();
                    *result = Some(outcome.into_value());
                }
                sink.update(&message);
            }

            message.finalize();
            sink.update(&message);
            conversation.push(message);
        };

        sink.set_state(state);
        sink.set_running(false);
        SessionOutcome { state, iterations }
    }

    /// Rebuild the streaming message's parts from the accumulated
    /// buffers. Reasoning can arrive two ways, sometimes both: a
    /// dedicated `reasoning_content` delta field, or inline `<think>`
    /// tags at the head of the content stream.
    fn refresh_message(
        &self,
        message: &mut Message,
        reasoning_buf: &str,
        content_buf: &str,
        reasoning_active: &mut bool,
    ) {
        let parsed = parse_streaming_thinking_content(content_buf);

        let mut reasoning = reasoning_buf.trim().to_string();
        if let Some(inline) = &parsed.thinking {
            if !inline.is_empty() {
                if !reasoning.is_empty() {
                    reasoning.push_str("\n\n");
                }
                reasoning.push_str(inline);
            }
        }

        let mut timer = self.timer.lock().unwrap();
        if !reasoning.is_empty() && !*reasoning_active && timer.duration_sec(message.id, 0).is_none()
        {
            timer.start_segment(message.id, 0);
            *reasoning_active = true;
        }
        let visible = parsed.content;
        if *reasoning_active && parsed.is_thinking_complete && !visible.is_empty() {
            timer.complete_segment(message.id, 0);
            *reasoning_active = false;
        }
        drop(timer);

        let mut parts = Vec::new();
        if !reasoning.is_empty() {
            parts.push(ContentPart::Reasoning { text: reasoning });
        }
        if !visible.is_empty() {
            parts.push(ContentPart::Text { text: visible });
        }
        message.parts = parts;
    }
}

fn iteration_signature(content: &str, tool_calls: &[(String, String, Value)]) -> String {
    let calls: Vec<String> = tool_calls
        .iter()
        .map(|(_, name, args)| format!("{name}({args})"))
        .collect();
    format!("{}\u{1f}{}", content.trim(), calls.join(","))
}
