// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Chat persistence engine
//!
//! Reconciles in-memory message mutations against the durable store
//! with minimal, ordered, non-duplicated writes. The rules:
//!
//! - A digest over (role, content, finalized) suppresses writes that
//!   would store what is already stored.
//! - Every write debounces per message id; a new mutation supersedes
//!   the pending one, so a streaming burst collapses into a single
//!   terminal write carrying the final content.
//! - Writes are fire-and-forget, but serialized per message id through
//!   an in-flight marker checked and set under the state lock before
//!   the write suspends.
//! - A coarser flag holds all other writes while a new-row insert is in
//!   flight, ordering inserts ahead of updates.
//! - A failed insert un-marks its in-flight record so the next
//!   reconcile retries; a failed update waits for the next content
//!   change.
//! - Conversation switch is a hard reset: every timer aborted, every
//!   tracking map cleared, before the new conversation hydrates.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::chat::{Message, Role};
use crate::config::PersistenceConfig;
use crate::error::Result;
use crate::persist::store::ChatStore;
use crate::thinking::ReasoningTimer;
use crate::transcript::{reconstruct_content, serialize_message, Transcript};

/// Per-conversation bookkeeping, rebuilt wholesale on switch
#[derive(Default)]
struct ConversationState {
    conversation_id: Option<i64>,
    /// transient message id -> store row id
    durable_ids: HashMap<Uuid, i64>,
    /// last successfully written digest per message
    digests: HashMap<Uuid, String>,
    /// messages with a write currently in flight
    in_flight: HashSet<Uuid>,
    /// true while a new-row insert is in flight; everything else waits
    insert_in_flight: bool,
    /// latest scheduled write per message; earlier ones exit at wake
    generations: HashMap<Uuid, u64>,
    /// latest debounce task per message, aborted on switch
    timers: HashMap<Uuid, JoinHandle<()>>,
}

impl ConversationState {
    fn reset(&mut self, conversation_id: Option<i64>) {
        for (_, handle) in self.timers.drain() {
            handle.abort();
        }
        self.durable_ids.clear();
        self.digests.clear();
        self.in_flight.clear();
        self.insert_in_flight = false;
        self.generations.clear();
        self.conversation_id = conversation_id;
    }
}

/// Reconciles message mutations against a [`ChatStore`]
pub struct PersistenceEngine {
    store: Arc<dyn ChatStore>,
    config: PersistenceConfig,
    timer: Arc<Mutex<ReasoningTimer>>,
    state: Mutex<ConversationState>,
}

impl PersistenceEngine {
    pub fn new(store: Arc<dyn ChatStore>) -> Self {
        Self::with_config(store, PersistenceConfig::default())
    }

    pub fn with_config(store: Arc<dyn ChatStore>, config: PersistenceConfig) -> Self {
        Self {
            store,
            config,
            timer: Arc::new(Mutex::new(ReasoningTimer::new())),
            state: Mutex::new(ConversationState::default()),
        }
    }

    /// Share the timing tracker that recorded reasoning durations, so
    /// they end up in stored transcripts
    pub fn with_timer(mut self, timer: Arc<Mutex<ReasoningTimer>>) -> Self {
        self.timer = timer;
        self
    }

    /// Hard reset to a new conversation: abort timers, drop all
    /// tracking state, clear timing entries.
    pub fn switch_conversation(&self, conversation_id: i64) {
        self.state.lock().unwrap().reset(Some(conversation_id));
        self.timer.lock().unwrap().clear_all();
    }

    /// Switch to a conversation and load its messages, recording their
    /// durable ids and digests so untouched messages are never
    /// rewritten.
    pub async fn hydrate(&self, conversation_id: i64) -> Result<Vec<Message>> {
        self.switch_conversation(conversation_id);
        let rows = self.store.messages(conversation_id).await?;

        let mut messages = Vec::with_capacity(rows.len());
        let mut state = self.state.lock().unwrap();
        // The engine may have been switched again while we awaited
        if state.conversation_id != Some(conversation_id) {
            return Ok(Vec::new());
        }
        for row in rows {
            let role = Role::from_store(&row.role);
            let structured = (!row.parts.is_empty()).then_some(row.parts.as_slice());
            let parts = reconstruct_content(&row.text, structured);
            let mut message = Message::with_parts(role, parts);
            message.meta.durable_id = Some(row.durable_id);
            message.finalize();

            let digest = digest_for(
                role,
                &Transcript {
                    markdown: row.text.clone(),
                    structured: row.parts.clone(),
                },
                true,
            );
            state.durable_ids.insert(message.id, row.durable_id);
            state.digests.insert(message.id, digest);
            messages.push(message);
        }
        Ok(messages)
    }

    /// Known durable id for a transient message id
    pub fn durable_id(&self, message_id: Uuid) -> Option<i64> {
        self.state
            .lock()
            .unwrap()
            .durable_ids
            .get(&message_id)
            .copied()
    }

    /// Reconcile one message's current content against the store.
    ///
    /// Synchronous: bookkeeping happens under the state lock, the write
    /// itself is a detached task. Empty or unchanged content schedules
    /// nothing; a schedule for already-pending content supersedes it.
    pub fn reconcile(self: &Arc<Self>, message: &Message) {
        let transcript = {
            let timer = self.timer.lock().unwrap();
            serialize_message(message, &timer)
        };
        if !transcript.is_persistable() {
            return;
        }
        let digest = digest_for(message.role, &transcript, message.meta.finalized);

        let mut state = self.state.lock().unwrap();
        let Some(conversation_id) = state.conversation_id else {
            tracing::warn!("reconcile before any conversation was selected");
            return;
        };
        if state.digests.get(&message.id) == Some(&digest) {
            return;
        }

        let generation = {
            let entry = state.generations.entry(message.id).or_insert(0);
            *entry += 1;
            *entry
        };

        let engine = Arc::clone(self);
        let id = message.id;
        let role = message.role;
        let finalized = message.meta.finalized;
        let handle = tokio::spawn(async move {
            engine
                .write_after_debounce(
                    conversation_id,
                    id,
                    generation,
                    role,
                    transcript,
                    digest,
                    finalized,
                )
                .await;
        });
        // The superseded task is not aborted: it may already be
        // writing. It exits on its own at the generation check.
        state.timers.insert(message.id, handle);
    }

    #[allow(clippy::too_many_arguments)]
    async fn write_after_debounce(
        self: Arc<Self>,
        conversation_id: i64,
        id: Uuid,
        generation: u64,
        role: Role,
        transcript: Transcript,
        digest: String,
        finalized: bool,
    ) {
        let debounce = Duration::from_millis(self.config.debounce_ms);
        tokio::time::sleep(debounce).await;

        let durable = loop {
            {
                let mut state = self.state.lock().unwrap();
                if state.conversation_id != Some(conversation_id) {
                    return;
                }
                if state.generations.get(&id) != Some(&generation) {
                    // A newer mutation superseded this one
                    return;
                }
                if state.digests.get(&id) == Some(&digest) {
                    state.timers.remove(&id);
                    return;
                }
                if !state.in_flight.contains(&id) && !state.insert_in_flight {
                    state.in_flight.insert(id);
                    let durable = state.durable_ids.get(&id).copied();
                    if durable.is_none() {
                        state.insert_in_flight = true;
                    }
                    break durable;
                }
            }
            tokio::time::sleep(debounce).await;
        };

        let result = match durable {
            Some(durable_id) => self
                .store
                .update_message(durable_id, &transcript.markdown, &transcript.structured)
                .await
                .map(|_| durable_id),
            None => {
                self.store
                    .save_message(
                        conversation_id,
                        &role.to_string(),
                        &transcript.markdown,
                        &transcript.structured,
                    )
                    .await
            }
        };

        let mut state = self.state.lock().unwrap();
        state.in_flight.remove(&id);
        if durable.is_none() {
            state.insert_in_flight = false;
        }
        if state.generations.get(&id) == Some(&generation) {
            state.timers.remove(&id);
        }
        match result {
            Ok(durable_id) => {
                if state.conversation_id == Some(conversation_id) {
                    state.durable_ids.insert(id, durable_id);
                    state.digests.insert(id, digest);
                }
                drop(state);
                if finalized {
                    self.schedule_timing_cleanup(id);
                }
            }
            Err(e) => {
                // Insert: marker already cleared, the next reconcile
                // retries. Update: no retry, the next content change
                // re-debounces.
                tracing::warn!(error = %e, "message write failed");
            }
        }
    }

    /// After a finalized message lands, its timing entries are only
    /// needed for display a little longer.
    fn schedule_timing_cleanup(&self, id: Uuid) {
        let timer = Arc::clone(&self.timer);
        let grace = Duration::from_millis(self.config.timing_grace_ms);
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            timer.lock().unwrap().clear_message(id);
        });
    }
}

/// Fingerprint of what a write would store; identical fingerprints
/// mean the write is redundant
fn digest_for(role: Role, transcript: &Transcript, finalized: bool) -> String {
    let parts = serde_json::to_string(&transcript.structured).unwrap_or_default();
    format!(
        "{role}\u{1f}{}\u{1f}{parts}\u{1f}{finalized}",
        transcript.markdown
    )
}
