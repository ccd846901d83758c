// src/exam/timer.rs

use chrono::{DateTime, TimeDelta, Utc};

/// Time budget of one attempt.
///
/// Derived entirely from the persisted start timestamp and the test duration;
/// nothing tick-level is ever stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptTimer {
    started_at: DateTime<Utc>,
    duration: TimeDelta,
}

impl AttemptTimer {
    pub fn new(started_at: DateTime<Utc>, duration_minutes: i32) -> Self {
        Self {
            started_at,
            duration: TimeDelta::minutes(i64::from(duration_minutes.max(0))),
        }
    }

    pub fn duration_seconds(&self) -> i64 {
        self.duration.num_seconds()
    }

    pub fn deadline(&self) -> DateTime<Utc> {
        self.started_at + self.duration
    }

    /// Seconds spent so far, clamped to `[0, duration]`.
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> i64 {
        (now - self.started_at)
            .num_seconds()
            .clamp(0, self.duration_seconds())
    }

    /// Whole seconds left, rounded up so a running attempt never reports 0.
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> i64 {
        let millis = (self.deadline() - now).num_milliseconds();
        if millis <= 0 { 0 } else { (millis + 999) / 1000 }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.deadline()
    }

    /// Expired, and the late-submission slack has also run out.
    pub fn is_past_grace(&self, now: DateTime<Utc>, grace_seconds: i64) -> bool {
        now > self.deadline() + TimeDelta::seconds(grace_seconds.max(0))
    }
}
