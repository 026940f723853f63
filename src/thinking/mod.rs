// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Reasoning extraction and timing

pub mod parser;
pub mod timing;

pub use parser::{
    embed_thinking_content, has_thinking_content, normalize_thinking_tags, parse_thinking_content,
    parse_streaming_thinking_content, ParsedThinking, StreamingThinking,
};
pub use timing::{Clock, ManualClock, ReasoningTimer, SystemClock};
