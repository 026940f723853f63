// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Exponential backoff for stream reconnection
//!
//! Stateful delay sequence: each call to [`Backoff::next`] returns the
//! current delay (doubled on each consecutive failure, capped, plus a
//! small random jitter to avoid thundering-herd reconnects) and advances
//! the sequence. [`Backoff::reset`] returns to the initial delay after a
//! successful connection.

use std::time::Duration;

use rand::Rng;

use crate::config::BackoffConfig;

/// Exponential backoff state for a single connection
#[derive(Debug)]
pub struct Backoff {
    config: BackoffConfig,
    /// Delay to return on the next failure, without jitter
    current_ms: u64,
}

impl Backoff {
    /// Create backoff state from configuration
    pub fn new(config: BackoffConfig) -> Self {
        let current_ms = config.min_delay_ms;
        Self { config, current_ms }
    }

    /// Delay before the next reconnect attempt, advancing the sequence
    pub fn next(&mut self) -> Duration {
        let base = self.current_ms;
        self.current_ms = ((self.current_ms as f64 * self.config.multiplier) as u64)
            .min(self.config.max_delay_ms);

        let jitter = if self.config.jitter_max_ms > 0 {
            rand::rng().random_range(0..self.config.jitter_max_ms)
        } else {
            0
        };

        Duration::from_millis(base + jitter)
    }

    /// Reset to the initial delay after a successful connection
    pub fn reset(&mut self) {
        self.current_ms = self.config.min_delay_ms;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(BackoffConfig::default())
    }
}
