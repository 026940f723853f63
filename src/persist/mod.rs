// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Conversation persistence

pub mod engine;
pub mod memory;
pub mod store;

pub use engine::PersistenceEngine;
pub use memory::{MemoryStore, WriteRecord};
pub use store::{ChatStore, StoredMessage};
