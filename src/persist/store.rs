// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Durable store collaborator
//!
//! The engine treats storage as a minimal external collaborator:
//! read a conversation's rows, append a row, update a row by its
//! durable id. No transactions, no schema knowledge.

use async_trait::async_trait;

use crate::chat::ContentPart;
use crate::error::Result;

/// One persisted message row
#[derive(Debug, Clone)]
pub struct StoredMessage {
    /// Store-assigned id, distinct from the transient in-memory id
    pub durable_id: i64,
    pub role: String,
    /// Markdown transcript, reasoning embedded as `<think>` blocks
    pub text: String,
    /// Structured (non-text) parts stored alongside the markdown
    pub parts: Vec<ContentPart>,
}

/// Two-and-a-half operation durable store
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// All rows of a conversation, in insertion order
    async fn messages(&self, conversation_id: i64) -> Result<Vec<StoredMessage>>;

    /// Append a row, returning its durable id
    async fn save_message(
        &self,
        conversation_id: i64,
        role: &str,
        text: &str,
        parts: &[ContentPart],
    ) -> Result<i64>;

    /// Replace a row's content by durable id
    async fn update_message(
        &self,
        durable_id: i64,
        text: &str,
        parts: &[ContentPart],
    ) -> Result<()>;
}
