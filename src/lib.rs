// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Modeldeck - streaming chat session engine for locally served models.
//!
//! This crate is the non-presentation core of a desktop control panel
//! for local LLM files: everything between the inference server's SSE
//! socket and the durable conversation store.
//!
//! Architecture highlights:
//! - `sse`: incremental SSE parsing, a single-connection stream client,
//!   and reconnection backoff
//! - `thinking`: reasoning tag normalization/extraction (complete and
//!   streaming-partial) and per-segment timing
//! - `chat`: conversation and message model with typed content parts
//! - `transcript`: content parts to/from persisted markdown plus
//!   structured parts
//! - `tools`: tool registry with per-source registration and sticky
//!   enablement
//! - `session`: the agentic loop runner and inference endpoint client
//! - `persist`: debounced, digest-suppressed, ordered conversation
//!   persistence

pub mod chat;
pub mod config;
pub mod error;
pub mod persist;
pub mod session;
pub mod sse;
pub mod thinking;
pub mod tools;
pub mod transcript;

pub use error::{DeckError, Result};
