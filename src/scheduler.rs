//! Look-ahead bar scheduler.
//!
//! Bar `k` of a session starts at `session_start + k * bar_duration`, so bar
//! starts never accumulate drift from late wake-ups. A bar becomes due
//! `lookahead` seconds before it starts. If the clock jumps past whole bars,
//! those bars are dropped and scheduling resumes at the bar containing the
//! current time.
//!
//! The resumed bar keeps its grid start, which lies in the past. Its voices
//! are therefore already partway through their envelopes when rendering
//! catches up, and enter at whatever level the envelope has at `now` rather
//! than from silence. Later bars start on the grid as usual.

use tracing::debug;

/// A bar that is ready to be planned.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarSlot {
    pub index: u64,
    /// Absolute start time.
    pub start: f64,
    /// Start time relative to the session start.
    pub elapsed: f64,
}

#[derive(Debug, Clone)]
pub struct Scheduler {
    bar_duration: f64,
    lookahead: f64,
    session_start: Option<f64>,
    next_bar: u64,
}

impl Scheduler {
    pub fn new(bar_duration: f64, lookahead: f64) -> Self {
        Scheduler {
            bar_duration,
            lookahead,
            session_start: None,
            next_bar: 0,
        }
    }

    /// Start a session whose first bar begins at `now`.
    pub fn begin(&mut self, now: f64) {
        self.session_start = Some(now);
        self.next_bar = 0;
    }

    /// Forget the session. No bar is due until the next `begin`.
    pub fn cancel(&mut self) {
        self.session_start = None;
        self.next_bar = 0;
    }

    pub fn is_active(&self) -> bool {
        self.session_start.is_some()
    }

    pub fn session_start(&self) -> Option<f64> {
        self.session_start
    }

    pub fn bar_duration(&self) -> f64 {
        self.bar_duration
    }

    /// Index of the next bar to be handed out.
    pub fn next_bar(&self) -> u64 {
        self.next_bar
    }

    pub fn bar_start(&self, index: u64) -> Option<f64> {
        self.session_start
            .map(|s| s + index as f64 * self.bar_duration)
    }

    /// When the next bar becomes due.
    pub fn next_wake(&self) -> Option<f64> {
        self.bar_start(self.next_bar).map(|t| t - self.lookahead)
    }

    /// Seconds since the session began.
    pub fn elapsed(&self, now: f64) -> Option<f64> {
        self.session_start.map(|s| now - s)
    }

    /// The next due bar, if any. Call repeatedly until it returns `None`.
    pub fn due(&mut self, now: f64) -> Option<BarSlot> {
        let session_start = self.session_start?;
        let current = ((now - session_start) / self.bar_duration).floor().max(0.0) as u64;
        if self.next_bar < current {
            debug!(
                skipped = current - self.next_bar,
                resume = current,
                "clock jumped past bars; skipping"
            );
            self.next_bar = current;
        }

        let start = session_start + self.next_bar as f64 * self.bar_duration;
        if now < start - self.lookahead {
            return None;
        }
        let slot = BarSlot {
            index: self.next_bar,
            start,
            elapsed: start - session_start,
        };
        self.next_bar += 1;
        Some(slot)
    }
}
