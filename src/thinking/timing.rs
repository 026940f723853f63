// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Reasoning segment timing
//!
//! Records how long a model spent inside each reasoning segment, keyed
//! by (message id, segment index). Durations are ephemeral; only the
//! resulting seconds value survives, embedded as a `duration` attribute
//! in the persisted transcript. Entries are released on conversation
//! switch or, for finalized messages, after a grace delay once the
//! message is durably stored.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use uuid::Uuid;

/// Monotonic time source, injectable for tests
pub trait Clock: Send + Sync {
    /// Time elapsed since an arbitrary fixed origin
    fn now(&self) -> Duration;
}

/// Wall clock backed by [`Instant`]
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Hand-advanced clock for deterministic tests
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock().unwrap()
    }
}

#[derive(Debug)]
struct SegmentTiming {
    started_at: Duration,
    duration_sec: Option<f64>,
}

/// Per-segment reasoning duration tracker
pub struct ReasoningTimer {
    clock: Box<dyn Clock>,
    segments: HashMap<(Uuid, usize), SegmentTiming>,
}

impl ReasoningTimer {
    /// Create a tracker on the system clock
    pub fn new() -> Self {
        Self::with_clock(Box::new(SystemClock::new()))
    }

    /// Create a tracker on an injected clock
    pub fn with_clock(clock: Box<dyn Clock>) -> Self {
        Self {
            clock,
            segments: HashMap::new(),
        }
    }

    /// Mark a segment as started. Idempotent: a segment already being
    /// timed keeps its original start.
    pub fn start_segment(&mut self, message_id: Uuid, segment_index: usize) {
        let now = self.clock.now();
        self.segments
            .entry((message_id, segment_index))
            .or_insert(SegmentTiming {
                started_at: now,
                duration_sec: None,
            });
    }

    /// Mark a segment as finished, recording the elapsed seconds.
    /// A segment that was never started, or already finished, is left
    /// unchanged.
    pub fn complete_segment(&mut self, message_id: Uuid, segment_index: usize) {
        let now = self.clock.now();
        if let Some(timing) = self.segments.get_mut(&(message_id, segment_index)) {
            if timing.duration_sec.is_none() {
                timing.duration_sec = Some((now - timing.started_at).as_secs_f64());
            }
        }
    }

    /// Recorded duration in seconds, or `None` if unfinished or unknown
    pub fn duration_sec(&self, message_id: Uuid, segment_index: usize) -> Option<f64> {
        self.segments
            .get(&(message_id, segment_index))
            .and_then(|t| t.duration_sec)
    }

    /// Release all segments for one message
    pub fn clear_message(&mut self, message_id: Uuid) {
        self.segments.retain(|(id, _), _| *id != message_id);
    }

    /// Release everything; called on conversation switch
    pub fn clear_all(&mut self) {
        self.segments.clear();
    }
}

impl Default for ReasoningTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timer_with_manual_clock() -> (ReasoningTimer, ManualClock) {
        let clock = ManualClock::new();
        let timer = ReasoningTimer::with_clock(Box::new(clock.clone()));
        (timer, clock)
    }

    #[test]
    fn test_records_elapsed_seconds() {
        let (mut timer, clock) = timer_with_manual_clock();
        let id = Uuid::new_v4();

        timer.start_segment(id, 0);
        clock.advance(Duration::from_millis(300));
        timer.complete_segment(id, 0);

        assert_eq!(timer.duration_sec(id, 0), Some(0.3));
    }

    #[test]
    fn test_unfinished_segment_has_no_duration() {
        let (mut timer, clock) = timer_with_manual_clock();
        let id = Uuid::new_v4();

        timer.start_segment(id, 0);
        clock.advance(Duration::from_secs(1));

        assert_eq!(timer.duration_sec(id, 0), None);
    }

    #[test]
    fn test_unknown_segment_has_no_duration() {
        let (timer, _clock) = timer_with_manual_clock();
        assert_eq!(timer.duration_sec(Uuid::new_v4(), 3), None);
    }

    #[test]
    fn test_start_is_idempotent() {
        let (mut timer, clock) = timer_with_manual_clock();
        let id = Uuid::new_v4();

        timer.start_segment(id, 0);
        clock.advance(Duration::from_millis(500));
        timer.start_segment(id, 0);
        clock.advance(Duration::from_millis(500));
        timer.complete_segment(id, 0);

        assert_eq!(timer.duration_sec(id, 0), Some(1.0));
    }

    #[test]
    fn test_complete_does_not_overwrite() {
        let (mut timer, clock) = timer_with_manual_clock();
        let id = Uuid::new_v4();

        timer.start_segment(id, 0);
        clock.advance(Duration::from_millis(200));
        timer.complete_segment(id, 0);
        clock.advance(Duration::from_secs(5));
        timer.complete_segment(id, 0);

        assert_eq!(timer.duration_sec(id, 0), Some(0.2));
    }

    #[test]
    fn test_segments_independent() {
        let (mut timer, clock) = timer_with_manual_clock();
        let id = Uuid::new_v4();

        timer.start_segment(id, 0);
        clock.advance(Duration::from_millis(100));
        timer.complete_segment(id, 0);
        timer.start_segment(id, 1);
        clock.advance(Duration::from_millis(400));
        timer.complete_segment(id, 1);

        assert_eq!(timer.duration_sec(id, 0), Some(0.1));
        assert_eq!(timer.duration_sec(id, 1), Some(0.4));
    }

    #[test]
    fn test_clear_message_releases_only_that_message() {
        let (mut timer, clock) = timer_with_manual_clock();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        timer.start_segment(a, 0);
        timer.start_segment(b, 0);
        clock.advance(Duration::from_millis(100));
        timer.complete_segment(a, 0);
        timer.complete_segment(b, 0);

        timer.clear_message(a);

        assert_eq!(timer.duration_sec(a, 0), None);
        assert_eq!(timer.duration_sec(b, 0), Some(0.1));
    }

    #[test]
    fn test_clear_all() {
        let (mut timer, clock) = timer_with_manual_clock();
        let id = Uuid::new_v4();

        timer.start_segment(id, 0);
        clock.advance(Duration::from_millis(100));
        timer.complete_segment(id, 0);
        timer.clear_all();

        assert_eq!(timer.duration_sec(id, 0), None);
    }
}
