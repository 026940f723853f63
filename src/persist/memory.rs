// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! In-memory store
//!
//! Backs tests and ephemeral sessions. Keeps a write log so tests can
//! assert exactly how many writes a scenario produced, and can be told
//! to fail the next save to exercise retry paths.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use crate::chat::ContentPart;
use crate::error::{DeckError, Result};
use crate::persist::store::{ChatStore, StoredMessage};

/// A record of one write the store performed
#[derive(Debug, Clone, PartialEq)]
pub enum WriteRecord {
    Insert { durable_id: i64, text: String },
    Update { durable_id: i64, text: String },
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    /// conversation id -> rows
    rows: HashMap<i64, Vec<StoredMessage>>,
    write_log: Vec<WriteRecord>,
}

/// In-memory [`ChatStore`] with a write log
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    fail_next_save: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `save_message` call fail
    pub fn fail_next_save(&self) {
        self.fail_next_save.store(true, Ordering::SeqCst);
    }

    /// Every write performed, in order
    pub fn write_log(&self) -> Vec<WriteRecord> {
        self.inner.lock().unwrap().write_log.clone()
    }

    pub fn write_count(&self) -> usize {
        self.inner.lock().unwrap().write_log.len()
    }

    /// Current text of a row, if it exists
    pub fn text_of(&self, conversation_id: i64, durable_id: i64) -> Option<String> {
        let inner = self.inner.lock().unwrap();
        inner
            .rows
            .get(&conversation_id)?
            .iter()
            .find(|m| m.durable_id == durable_id)
            .map(|m| m.text.clone())
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn messages(&self, conversation_id: i64) -> Result<Vec<StoredMessage>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.rows.get(&conversation_id).cloned().unwrap_or_default())
    }

    async fn save_message(
        &self,
        conversation_id: i64,
        role: &str,
        text: &str,
        parts: &[ContentPart],
    ) -> Result<i64> {
        if self.fail_next_save.swap(false, Ordering::SeqCst) {
            return Err(DeckError::Store("injected save failure".to_string()));
        }

        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let durable_id = inner.next_id;
        inner.rows.entry(conversation_id).or_default().push(StoredMessage {
            durable_id,
            role: role.to_string(),
            text: text.to_string(),
            parts: parts.to_vec(),
        });
        inner.write_log.push(WriteRecord::Insert {
            durable_id,
            text: text.to_string(),
        });
        Ok(durable_id)
    }

    async fn update_message(
        &self,
        durable_id: i64,
        text: &str,
        parts: &[ContentPart],
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let row = inner
            .rows
            .values_mut()
            .flatten()
            .find(|m| m.durable_id == durable_id)
            .ok_or_else(|| DeckError::Store(format!("no row with durable id {durable_id}")))?;
        row.text = text.to_string();
        row.parts = parts.to_vec();
        inner.write_log.push(WriteRecord::Update {
            durable_id,
            text: text.to_string(),
        });
        Ok(())
    }
}
