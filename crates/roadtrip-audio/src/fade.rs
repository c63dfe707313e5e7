//! Linear volume fades quantized into discrete steps.
//!
//! A fade never writes a volume by itself; the mixer asks it which step is due at `now`
//! and writes the result, so successive writes for one stream are strictly ordered.

use crate::stream::{clamp_volume, AudioCategory};
use std::time::{Duration, Instant};

/// Why a fade is running. Decides what the mixer does when it completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadePurpose {
    Duck(AudioCategory),
    Restore,
    Manual,
}

#[derive(Debug, Clone)]
pub struct Fade {
    from: f32,
    to: f32,
    started_at: Instant,
    duration: Duration,
    steps: u32,
    applied: u32,
    purpose: FadePurpose,
}

impl Fade {
    /// Steps are `max(min_steps, ceil(duration / tick))`.
    pub fn new(
        from: f32,
        to: f32,
        duration: Duration,
        tick: Duration,
        min_steps: u32,
        now: Instant,
        purpose: FadePurpose,
    ) -> Self {
        let by_tick = if tick.is_zero() {
            0
        } else {
            (duration.as_secs_f64() / tick.as_secs_f64()).ceil() as u32
        };
        Self {
            from: clamp_volume(from),
            to: clamp_volume(to),
            started_at: now,
            duration,
            steps: by_tick.max(min_steps).max(1),
            applied: 0,
            purpose,
        }
    }

    pub fn target(&self) -> f32 {
        self.to
    }

    pub fn purpose(&self) -> FadePurpose {
        self.purpose
    }

    pub fn steps(&self) -> u32 {
        self.steps
    }

    pub fn is_complete(&self) -> bool {
        self.applied >= self.steps
    }

    /// Volume of the latest step due at `now`, or `None` when no new step is due.
    /// The last step yields the target exactly.
    pub fn advance(&mut self, now: Instant) -> Option<f32> {
        if self.is_complete() {
            return None;
        }
        let due = self.steps_due(now);
        if due <= self.applied {
            return None;
        }
        self.applied = due;
        if due >= self.steps {
            return Some(self.to);
        }
        let progress = due as f32 / self.steps as f32;
        Some(clamp_volume(self.from + (self.to - self.from) * progress))
    }

    fn steps_due(&self, now: Instant) -> u32 {
        if self.duration.is_zero() {
            return self.steps;
        }
        let elapsed = now.saturating_duration_since(self.started_at);
        let fraction = elapsed.as_secs_f64() / self.duration.as_secs_f64();
        ((fraction * self.steps as f64).floor() as u32).min(self.steps)
    }
}
