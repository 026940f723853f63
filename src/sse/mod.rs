// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Server-Sent Events transport
//!
//! Three pieces: a pure incremental [`parser`], a single-connection
//! [`client`], and [`backoff`] state for callers that reconnect.

pub mod backoff;
pub mod client;
pub mod parser;

pub use backoff::Backoff;
pub use client::{SseClient, SseRequest};
pub use parser::{SseMessage, SseParser};
