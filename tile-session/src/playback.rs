//! Simulated play-out of complete segments
//!
//! Playback starts when the first segment completes and consumes one segment
//! per `segment_duration_secs` of wall time. Stalls are not modelled: the
//! clock keeps running while the driver waits on a late segment.

use std::time::Instant;

#[derive(Debug, Clone)]
pub struct PlaybackClock {
    segment_duration_secs: f64,
    started: Option<Instant>,
    played: u32,
}

impl PlaybackClock {
    pub fn new(segment_duration_secs: f64) -> Self {
        Self {
            segment_duration_secs,
            started: None,
            played: 0,
        }
    }

    /// Start playing at `now`; later calls keep the first start time
    pub fn start(&mut self, now: Instant) {
        if self.started.is_none() {
            self.started = Some(now);
        }
    }

    pub fn is_started(&self) -> bool {
        self.started.is_some()
    }

    /// Move the play head to `now`, never past segment `requested`
    ///
    /// Returns the new count of played segments when it advanced.
    pub fn advance(&mut self, now: Instant, requested: u32) -> Option<u32> {
        let started = self.started?;
        if !(self.segment_duration_secs > 0.0) {
            return None;
        }
        let elapsed = now.saturating_duration_since(started).as_secs_f64();
        let played = ((elapsed / self.segment_duration_secs).floor() as u32).min(requested);
        if played > self.played {
            self.played = played;
            Some(played)
        } else {
            None
        }
    }

    /// Segments fully played out so far
    pub fn played(&self) -> u32 {
        self.played
    }
}
