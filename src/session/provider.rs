// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Inference endpoint client
//!
//! Speaks the OpenAI-compatible chat-completions protocol used by local
//! inference servers (llama-server and friends): a POST to
//! `/v1/chat/completions` with `stream: true`, answered by SSE messages
//! whose `data:` payloads are JSON chunks carrying `choices[0].delta`,
//! terminated by a literal `[DONE]`.
//!
//! Tool calls arrive as fragments spread across chunks (id and name in
//! one, argument string split over many); they are assembled here and
//! emitted as whole [`StreamEvent::ToolCall`]s when the stream ends.

use std::collections::HashMap;
use std::pin::Pin;

use async_stream::try_stream;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::chat::{ContentPart, Message};
use crate::config::BackoffConfig;
use crate::error::{ApiError, DeckError, Result};
use crate::sse::{Backoff, SseClient, SseRequest};
use crate::tools::ToolDefinition;

/// One request to the inference endpoint
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Model name as known to the server
    pub model: String,
    /// System prompt, sent as the first wire message when present
    pub system_prompt: Option<String>,
    /// Conversation history
    pub messages: Vec<Message>,
    /// Tools offered to the model
    pub tools: Vec<ToolDefinition>,
    /// Response token cap
    pub max_tokens: u32,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            system_prompt: None,
            messages,
            tools: Vec::new(),
            max_tokens: 4096,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }
}

/// Incremental event from a streaming completion
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Visible content fragment
    TextDelta(String),
    /// Reasoning fragment from a server-side `reasoning_content` field
    ReasoningDelta(String),
    /// A fully assembled tool call
    ToolCall {
        id: String,
        name: String,
        args: Value,
    },
    /// End of the response
    Done,
}

/// Streaming chat client abstraction; the session loop talks to this,
/// tests substitute a scripted implementation.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn stream_chat(
        &self,
        request: ChatRequest,
        cancel: CancellationToken,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>>;
}

// ===== Wire chunk shapes =====

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    delta: ChunkDelta,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
    reasoning_content: Option<String>,
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    index: usize,
    id: Option<String>,
    function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct FunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

/// Assembles tool-call fragments by chunk index
#[derive(Default)]
struct ToolCallAssembler {
    partial: HashMap<usize, PartialToolCall>,
}

#[derive(Default)]
struct PartialToolCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

impl ToolCallAssembler {
    fn feed(&mut self, delta: ToolCallDelta) {
        let entry = self.partial.entry(delta.index).or_default();
        if let Some(id) = delta.id {
            entry.id = Some(id);
        }
        if let Some(function) = delta.function {
            if let Some(name) = function.name {
                entry.name = Some(name);
            }
            if let Some(arguments) = function.arguments {
                entry.arguments.push_str(&arguments);
            }
        }
    }

    /// Assembled calls in index order; fragments that never got a name
    /// are dropped.
    fn finish(self) -> Vec<(String, String, Value)> {
        let mut calls: Vec<_> = self.partial.into_iter().collect();
        calls.sort_by_key(|(index, _)| *index);
        calls
            .into_iter()
            .filter_map(|(index, partial)| {
                let name = partial.name?;
                let id = partial
                    .id
                    .unwrap_or_else(|| format!("call_{index}"));
                // A malformed argument string is surfaced to the tool
                // as-is rather than dropped.
                let args = serde_json::from_str(&partial.arguments)
                    .unwrap_or(Value::String(partial.arguments));
                Some((id, name, args))
            })
            .collect()
    }
}

/// Client for an OpenAI-compatible chat-completions endpoint
pub struct HttpInferenceClient {
    sse: SseClient,
    /// Full chat-completions URL
    url: String,
    api_key: Option<String>,
    backoff: BackoffConfig,
    /// Connect attempts before a network failure becomes fatal
    max_connect_attempts: u32,
}

impl HttpInferenceClient {
    /// Create a client for a base URL such as `http://localhost:8080/v1`
    pub fn new(base_url: impl Into<String>) -> Self {
        let base = base_url.into();
        Self {
            url: format!("{}/chat/completions", base.trim_end_matches('/')),
            sse: SseClient::new(),
            api_key: None,
            backoff: BackoffConfig::default(),
            max_connect_attempts: 3,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    fn build_body(request: &ChatRequest) -> Value {
        let mut messages = Vec::new();
        if let Some(prompt) = &request.system_prompt {
            messages.push(json!({"role": "system", "content": prompt}));
        }
        for message in &request.messages {
            wire_messages(message, &mut messages);
        }

        let mut body = json!({
            "model": request.model,
            "messages": messages,
            "stream": true,
            "max_tokens": request.max_tokens,
        });
        if !request.tools.is_empty() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.input_schema,
                        }
                    })
                })
                .collect();
            body["tools"] = Value::Array(tools);
        }
        body
    }
}

/// Convert one domain message into wire messages. An assistant message
/// that called tools expands into an assistant message carrying the
/// calls plus one `tool` role message per result. Reasoning parts are
/// never sent back to the model.
fn wire_messages(message: &Message, out: &mut Vec<Value>) {
    let text = message.text();
    let tool_calls = message.tool_calls();

    if tool_calls.is_empty() {
        if !text.is_empty() {
            out.push(json!({"role": message.role.to_string(), "content": text}));
        }
        return;
    }

    let calls: Vec<Value> = tool_calls
        .iter()
        .map(|part| {
            let ContentPart::ToolCall { id, name, args, .. } = part else {
                unreachable!("tool_calls() returns only ToolCall parts");
            };
            json!({
                "id": id,
                "type": "function",
                "function": {
                    "name": name,
                    "arguments": args.to_string(),
                }
            })
        })
        .collect();

    let content = if text.is_empty() {
        Value::Null
    } else {
        Value::String(text)
    };
    out.push(json!({
        "role": "assistant",
        "content": content,
        "tool_calls": calls,
    }));

    for part in tool_calls {
        let ContentPart::ToolCall { id, result, .. } = part else {
            continue;
        };
        let content = match result {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };
        out.push(json!({
            "role": "tool",
            "tool_call_id": id,
            "content": content,
        }));
    }
}

#[async_trait]
impl InferenceClient for HttpInferenceClient {
    async fn stream_chat(
        &self,
        request: ChatRequest,
        cancel: CancellationToken,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>> {
        let body = Self::build_body(&request);
        let mut sse_request = SseRequest::new(self.url.clone(), body);
        if let Some(key) = &self.api_key {
            sse_request = sse_request.with_header("authorization", format!("Bearer {key}"));
        }

        let sse = self.sse.clone();
        let backoff_config = self.backoff.clone();
        let max_attempts = self.max_connect_attempts;

        let stream = try_stream! {
            let mut backoff = Backoff::new(backoff_config);
            let mut attempt = 0u32;

            'connect: loop {
                let mut inner = sse.stream(sse_request.clone(), cancel.clone());
                let mut assembler = ToolCallAssembler::default();
                let mut received_any = false;

                while let Some(item) = inner.next().await {
                    match item {
                        Ok(msg) => {
                            received_any = true;
                            if msg.data == "[DONE]" {
                                break;
                            }
                            let chunk: CompletionChunk = match serde_json::from_str(&msg.data) {
                                Ok(chunk) => chunk,
                                Err(e) => {
                                    tracing::warn!(error = %e, "skipping malformed chunk");
                                    continue;
                                }
                            };
                            let Some(choice) = chunk.choices.into_iter().next() else {
                                continue;
                            };
                            if let Some(text) = choice.delta.reasoning_content {
                                if !text.is_empty() {
                                    yield StreamEvent::ReasoningDelta(text);
                                }
                            }
                            if let Some(text) = choice.delta.content {
                                if !text.is_empty() {
                                    yield StreamEvent::TextDelta(text);
                                }
                            }
                            for delta in choice.delta.tool_calls.unwrap_or_default() {
                                assembler.feed(delta);
                            }
                        }
                        Err(e) => {
                            let retryable = matches!(
                                e,
                                DeckError::Api(ApiError::Network(_))
                            );
                            if retryable && !received_any && attempt + 1 < max_attempts {
                                attempt += 1;
                                tracing::warn!(
                                    attempt,
                                    error = %e,
                                    "connect failed, backing off before retry"
                                );
                                let delay = backoff.next();
                                tokio::select! {
                                    _ = cancel.cancelled() => {
                                        Err(DeckError::Api(ApiError::Cancelled))
                                    }
                                    _ = tokio::time::sleep(delay) => Ok(()),
                                }?;
                                continue 'connect;
                            }
                            Err::<(), DeckError>(e)?;
                        }
                    }
                }

                for (id, name, args) in assembler.finish() {
                    yield StreamEvent::ToolCall { id, name, args };
                }
                yield StreamEvent::Done;
                break 'connect;
            }
        };

        Ok(Box::pin(stream))
    }
}
