// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Transcript serialization
//!
//! Converts a message's ordered content parts into a single markdown
//! transcript plus a list of structured (non-text) parts stored
//! alongside it, and rebuilds the parts on load. Serialization is a
//! pure function of the parts: identical parts always yield identical
//! text.
//!
//! Reasoning parts become `<think>` blocks via
//! [`embed_thinking_content`]; adjacent reasoning parts coalesce into
//! one block unless a tool call sits between them, which acts as a
//! boundary so pre-call and post-call reasoning stay distinct.

use std::sync::atomic::{AtomicBool, Ordering};

use uuid::Uuid;

use crate::chat::{ContentPart, Message};
use crate::thinking::{embed_thinking_content, has_thinking_content, ReasoningTimer};

/// Serialized form of a message's content
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    /// Markdown text, reasoning embedded as `<think>` blocks
    pub markdown: String,
    /// Non-text parts stored separately from the markdown
    pub structured: Vec<ContentPart>,
}

impl Transcript {
    /// A message is worth writing if it has any text or any structured
    /// part. A tool-call-only message with no text must never be
    /// dropped.
    pub fn is_persistable(&self) -> bool {
        !self.markdown.trim().is_empty() || !self.structured.is_empty()
    }
}

/// Intermediate chunk in the serialization walk
enum Chunk {
    Text(String),
    /// Coalesced run of reasoning parts
    Reasoning(Vec<String>),
    /// Synthetic marker at a tool-call position; emits nothing but
    /// stops reasoning coalescing across the call
    Boundary,
}

/// Serialize a message's parts
pub fn serialize_message(message: &Message, timer: &ReasoningTimer) -> Transcript {
    serialize_parts(message.id, &message.parts, timer)
}

/// Serialize an ordered part sequence into markdown plus structured
/// parts. Reasoning block durations are looked up from `timer` by a
/// 0-based index that increments once per coalesced block.
pub fn serialize_parts(
    message_id: Uuid,
    parts: &[ContentPart],
    timer: &ReasoningTimer,
) -> Transcript {
    let mut chunks: Vec<Chunk> = Vec::new();
    let mut structured = Vec::new();

    for part in parts {
        match part {
            ContentPart::Text { text } => chunks.push(Chunk::Text(text.clone())),
            ContentPart::Reasoning { text } => match chunks.last_mut() {
                Some(Chunk::Reasoning(run)) => run.push(text.clone()),
                _ => chunks.push(Chunk::Reasoning(vec![text.clone()])),
            },
            ContentPart::ToolCall { .. } => {
                chunks.push(Chunk::Boundary);
                structured.push(part.clone());
            }
            ContentPart::Image { .. }
            | ContentPart::Audio { .. }
            | ContentPart::File { .. }
            | ContentPart::Source { .. }
            | ContentPart::Data { .. } => structured.push(part.clone()),
            ContentPart::Unknown { kind, .. } => warn_unknown_part(kind),
        }
    }

    let mut rendered: Vec<String> = Vec::new();
    let mut reasoning_index = 0usize;

    for chunk in chunks {
        match chunk {
            Chunk::Text(text) => {
                if !text.trim().is_empty() {
                    rendered.push(text);
                }
            }
            Chunk::Reasoning(run) => {
                let block = run
                    .iter()
                    .map(|t| t.trim())
                    .filter(|t| !t.is_empty())
                    .collect::<Vec<_>>()
                    .join("\n\n");
                let duration = timer.duration_sec(message_id, reasoning_index);
                reasoning_index += 1;

                let wrapped = if has_thinking_content(&block) {
                    block
                } else {
                    embed_thinking_content(&block, "", duration)
                };
                if !wrapped.is_empty() {
                    rendered.push(wrapped);
                }
            }
            Chunk::Boundary => {}
        }
    }

    Transcript {
        markdown: rendered.join("\n\n").trim().to_string(),
        structured,
    }
}

/// The structured (non-text) parts of a part sequence, in order
pub fn extract_non_text_parts(parts: &[ContentPart]) -> Vec<ContentPart> {
    parts
        .iter()
        .filter(|part| {
            matches!(
                part,
                ContentPart::ToolCall { .. }
                    | ContentPart::Image { .. }
                    | ContentPart::Audio { .. }
                    | ContentPart::File { .. }
                    | ContentPart::Source { .. }
                    | ContentPart::Data { .. }
            )
        })
        .cloned()
        .collect()
}

/// Rebuild a content-part sequence from stored markdown and structured
/// parts.
///
/// With no structured parts the markdown is returned as a single text
/// part, byte-for-byte unchanged, so transcripts written before
/// structured storage existed still load.
pub fn reconstruct_content(markdown: &str, structured: Option<&[ContentPart]>) -> Vec<ContentPart> {
    let mut parts = Vec::new();
    if !markdown.is_empty() {
        parts.push(ContentPart::Text {
            text: markdown.to_string(),
        });
    }
    if let Some(structured) = structured {
        parts.extend(structured.iter().cloned());
    }
    parts
}

/// Unrecognized part kinds are dropped from the transcript, with one
/// diagnostic per process rather than one per streaming update.
fn warn_unknown_part(kind: &str) {
    static WARNED: AtomicBool = AtomicBool::new(false);
    if !WARNED.swap(true, Ordering::Relaxed) {
        tracing::warn!(kind, "skipping unrecognized content part kind");
    }
}
