// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Engine configuration
//!
//! Serde-deserializable settings with defaults tuned for a local
//! llama-server backend.

use serde::{Deserialize, Serialize};

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Reconnection backoff settings
    #[serde(default)]
    pub backoff: BackoffConfig,

    /// Agentic loop limits
    #[serde(default)]
    pub agent_loop: AgentLoopConfig,

    /// Persistence engine settings
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

/// Reconnection-delay settings for the SSE transport
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Minimum delay in milliseconds
    #[serde(default = "default_backoff_min_ms")]
    pub min_delay_ms: u64,

    /// Maximum delay in milliseconds
    #[serde(default = "default_backoff_max_ms")]
    pub max_delay_ms: u64,

    /// Growth multiplier applied after each attempt
    #[serde(default = "default_backoff_multiplier")]
    pub multiplier: f64,

    /// Upper bound on random jitter added to each delay, in milliseconds
    #[serde(default = "default_backoff_jitter_ms")]
    pub jitter_max_ms: u64,
}

/// Safety limits for the agentic tool-calling loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentLoopConfig {
    /// Maximum request/response/tool-call iterations per user turn
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Maximum consecutive non-progressing iterations before cutoff
    #[serde(default = "default_max_stagnant")]
    pub max_stagnant_iterations: u32,
}

/// Persistence engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Debounce window for update writes, in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Grace delay before reasoning-timing entries of a persisted,
    /// finalized message are released, in milliseconds
    #[serde(default = "default_timing_grace_ms")]
    pub timing_grace_ms: u64,
}

fn default_backoff_min_ms() -> u64 {
    500
}

fn default_backoff_max_ms() -> u64 {
    30_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_backoff_jitter_ms() -> u64 {
    250
}

fn default_max_iterations() -> u32 {
    25
}

fn default_max_stagnant() -> u32 {
    5
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_timing_grace_ms() -> u64 {
    5_000
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: default_backoff_min_ms(),
            max_delay_ms: default_backoff_max_ms(),
            multiplier: default_backoff_multiplier(),
            jitter_max_ms: default_backoff_jitter_ms(),
        }
    }
}

impl Default for AgentLoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_stagnant_iterations: default_max_stagnant(),
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            timing_grace_ms: default_timing_grace_ms(),
        }
    }
}
