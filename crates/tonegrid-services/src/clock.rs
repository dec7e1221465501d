//! Transport clock: the audio side's notion of "now"
//!
//! The clock runs in schedule seconds, the modulated timeline the event
//! queue is keyed by, so one schedule second passes per real second no
//! matter where modulation markers sit. Position is stored in beats at the
//! nominal tempo: a tempo change rescales every schedule time by the same
//! factor, so the beat count keeps the playhead in place.

use tonegrid_core::{LoopBounds, MusicalPosition};

/// Stretch of timeline covered during one `advance` call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockSpan {
    /// Schedule seconds, inclusive
    pub start: f64,
    /// Schedule seconds, exclusive
    pub end: f64,
    /// Context time at which `start` was reached
    pub context_start: f64,
}

impl ClockSpan {
    /// Context time at which schedule second `secs` plays
    pub fn context_time_of(&self, secs: f64) -> f64 {
        self.context_start + (secs - self.start)
    }
}

#[derive(Debug, Clone)]
pub struct TransportClock {
    beats: f64,
    bpm: f64,
    running: bool,
    /// Real seconds still to wait before the position starts moving
    start_delay: f64,
    /// Monotonic audio context time
    context_time: f64,
    loop_region: Option<LoopBounds>,
    looping: bool,
    loop_epsilon: f64,
}

impl TransportClock {
    pub fn new(bpm: f64, loop_epsilon: f64) -> Self {
        Self {
            beats: 0.0,
            bpm,
            running: false,
            start_delay: 0.0,
            context_time: 0.0,
            loop_region: None,
            looping: false,
            loop_epsilon,
        }
    }

    pub fn beats(&self) -> f64 {
        self.beats
    }

    pub fn position(&self) -> MusicalPosition {
        MusicalPosition { beats: self.beats }
    }

    /// Position in schedule seconds
    pub fn seconds(&self) -> f64 {
        self.beats * 60.0 / self.bpm
    }

    pub fn context_time(&self) -> f64 {
        self.context_time
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Real seconds left before a pending start begins moving
    pub fn pending_delay(&self) -> f64 {
        self.start_delay
    }

    pub fn loop_region(&self) -> Option<LoopBounds> {
        self.loop_region
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    /// Begin moving from `beats` once `delay` real seconds have passed
    pub fn start_at(&mut self, beats: f64, delay: f64) {
        self.beats = beats;
        self.start_delay = delay.max(0.0);
        self.running = true;
    }

    pub fn pause(&mut self) {
        self.running = false;
    }

    pub fn resume(&mut self) {
        self.running = true;
    }

    /// Stop and rewind to zero
    pub fn halt(&mut self) {
        self.running = false;
        self.beats = 0.0;
        self.start_delay = 0.0;
    }

    /// New nominal tempo; the beat position is kept
    pub fn set_bpm(&mut self, bpm: f64) {
        self.bpm = bpm;
    }

    pub fn set_loop_region(&mut self, bounds: LoopBounds) {
        self.loop_region = Some(bounds);
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    /// Move forward by `real_dt` seconds of audio time and return the
    /// timeline spans that were played, splitting at loop wraps
    pub fn advance(&mut self, real_dt: f64) -> Vec<ClockSpan> {
        let mut spans = Vec::new();
        if real_dt <= 0.0 || !real_dt.is_finite() {
            return spans;
        }

        let mut context = self.context_time;
        self.context_time += real_dt;
        if !self.running {
            return spans;
        }

        let mut travel = real_dt;
        if self.start_delay > 0.0 {
            let waited = travel.min(self.start_delay);
            self.start_delay -= waited;
            travel -= waited;
            context += waited;
        }
        if travel <= 0.0 {
            return spans;
        }

        let mut pos = self.seconds();

        match self.loop_region.filter(|b| self.looping && b.end - b.start > self.loop_epsilon) {
            Some(LoopBounds { start, end }) => {
                let len = end - start;
                if pos >= end {
                    pos = start + (pos - start) % len;
                }
                loop {
                    let to_end = end - pos;
                    if travel < to_end - self.loop_epsilon {
                        spans.push(ClockSpan { start: pos, end: pos + travel, context_start: context });
                        pos += travel;
                        break;
                    }
                    spans.push(ClockSpan { start: pos, end, context_start: context });
                    context += to_end.max(0.0);
                    travel = (travel - to_end).max(0.0);
                    // whole passes inside one block would only repeat themselves
                    if travel >= len {
                        travel %= len;
                    }
                    pos = start;
                }
            }
            None => {
                spans.push(ClockSpan { start: pos, end: pos + travel, context_start: context });
                pos += travel;
            }
        }

        self.beats = pos * self.bpm / 60.0;
        spans
    }
}
