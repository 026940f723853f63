// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Message and conversation types
//!
//! Defines the in-memory message structures the engine operates on. A
//! message owns an ordered sequence of content parts; the visible
//! transcript is a pure function of those parts (see the `transcript`
//! module).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A conversation with the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Store-assigned conversation id
    pub id: i64,

    /// Display title
    pub title: String,

    /// Optional system prompt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// When the conversation was created
    pub created_at: DateTime<Utc>,

    /// When the conversation was last updated
    pub updated_at: DateTime<Utc>,

    /// Ordered messages
    #[serde(default)]
    pub messages: Vec<Message>,
}

/// A message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Transient in-memory id, assigned at creation and never reused
    pub id: Uuid,

    /// Role of the message sender
    pub role: Role,

    /// Ordered content parts
    pub parts: Vec<ContentPart>,

    /// When the message was created
    pub timestamp: DateTime<Utc>,

    /// Engine bookkeeping
    #[serde(default)]
    pub meta: MessageMeta,
}

/// Role of the message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// User message
    User,
    /// Assistant response
    Assistant,
    /// System prompt
    System,
}

/// Bookkeeping attached to a message
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageMeta {
    /// Store-assigned durable id, distinct from the transient `Message::id`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub durable_id: Option<i64>,

    /// Groups all iterations of one agentic-loop run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_id: Option<Uuid>,

    /// No further content mutation expected (except the stopped marker)
    #[serde(default)]
    pub finalized: bool,

    /// Message originated from voice input
    #[serde(default)]
    pub voice: bool,

    /// Message belongs to a research run
    #[serde(default)]
    pub research: bool,
}

/// A part of a message's content
///
/// Closed tagged union: every serialization boundary matches exhaustively,
/// and an unrecognized persisted variant becomes `Unknown` rather than
/// being coerced into a catch-all.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Plain text
    Text { text: String },

    /// Model reasoning, stored unwrapped (tags are a transcript concern)
    Reasoning { text: String },

    /// Tool invocation and, once dispatched, its result
    ToolCall {
        id: String,
        name: String,
        args: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },

    /// Image attachment (base64 data + media type)
    Image { media_type: String, data: String },

    /// Audio attachment
    Audio { media_type: String, data: String },

    /// File attachment
    File { name: String, data: String },

    /// Citation/source reference
    Source { url: String, title: String },

    /// Opaque structured data
    Data { payload: Value },

    /// Unrecognized persisted variant, preserved for round-tripping
    Unknown { kind: String, raw: Value },
}

impl Message {
    /// Create a new user message with plain text content
    pub fn user(text: impl Into<String>) -> Self {
        Self::with_parts(
            Role::User,
            vec![ContentPart::Text { text: text.into() }],
        )
    }

    /// Create a new assistant message with plain text content
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::with_parts(
            Role::Assistant,
            vec![ContentPart::Text { text: text.into() }],
        )
    }

    /// Create a new system message
    pub fn system(text: impl Into<String>) -> Self {
        Self::with_parts(
            Role::System,
            vec![ContentPart::Text { text: text.into() }],
        )
    }

    /// Create a message with explicit parts
    pub fn with_parts(role: Role, parts: Vec<ContentPart>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            parts,
            timestamp: Utc::now(),
            meta: MessageMeta::default(),
        }
    }

    /// Attach a turn id
    pub fn with_turn_id(mut self, turn_id: Uuid) -> Self {
        self.meta.turn_id = Some(turn_id);
        self
    }

    /// Concatenated text of all text parts
    pub fn text(&self) -> String {
        let mut out = String::new();
        for part in &self.parts {
            if let ContentPart::Text { text } = part {
                if !out.is_empty() {
                    out.push_str("\n\n");
                }
                out.push_str(text);
            }
        }
        out
    }

    /// All tool-call parts
    pub fn tool_calls(&self) -> Vec<&ContentPart> {
        self.parts
            .iter()
            .filter(|p| matches!(p, ContentPart::ToolCall { .. }))
            .collect()
    }

    /// Whether the message contains any tool call
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls().is_empty()
    }

    /// Mark the message finalized
    pub fn finalize(&mut self) {
        self.meta.finalized = true;
    }

    /// Append the visible stopped marker and finalize.
    ///
    /// Partial content is kept; this is the only mutation allowed after
    /// finalization.
    pub fn mark_stopped(&mut self) {
        self.parts.push(ContentPart::Text {
            text: "[Stopped]".to_string(),
        });
        self.meta.finalized = true;
    }
}

impl Conversation {
    /// Create a new conversation
    pub fn new(id: i64, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            title: title.into(),
            system_prompt: None,
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
        }
    }

    /// Set the system prompt
    pub fn with_system(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Add a message and touch the updated timestamp
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
        self.updated_at = Utc::now();
    }

    /// Look up a message by its transient id
    pub fn message(&self, id: Uuid) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// Look up a message mutably by its transient id
    pub fn message_mut(&mut self, id: Uuid) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == id)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::System => write!(f, "system"),
        }
    }
}

impl Role {
    /// Parse a stored role string; unknown strings map to User so a
    /// corrupted row never aborts hydration.
    pub fn from_store(s: &str) -> Self {
        match s {
            "assistant" => Role::Assistant,
            "system" => Role::System,
            _ => Role::User,
        }
    }
}
