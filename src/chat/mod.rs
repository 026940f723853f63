// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Conversation data model

pub mod message;

pub use message::{ContentPart, Conversation, Message, MessageMeta, Role};
