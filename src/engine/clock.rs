//! Presentation clock shared by the bundled engines

use std::time::Instant;

/// Media clock: a base position plus scaled wall time while running
#[derive(Debug, Clone)]
pub struct PlaybackClock {
    /// Position at the last start/pause/seek, in seconds
    base: f64,

    /// Wall time the clock was last started, `None` while paused
    started_at: Option<Instant>,

    /// Playback rate multiplier
    rate: f64,
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self {
            base: 0.0,
            started_at: None,
            rate: 1.0,
        }
    }

    /// Current position in seconds
    pub fn position(&self) -> f64 {
        match self.started_at {
            Some(start) => self.base + start.elapsed().as_secs_f64() * self.rate,
            None => self.base,
        }
    }

    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn start(&mut self) {
        if self.started_at.is_none() {
            self.started_at = Some(Instant::now());
        }
    }

    pub fn pause(&mut self) {
        self.base = self.position();
        self.started_at = None;
    }

    /// Jump to `position`, keeping the running state
    pub fn set_position(&mut self, position: f64) {
        self.base = position.max(0.0);
        if self.started_at.is_some() {
            self.started_at = Some(Instant::now());
        }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn set_rate(&mut self, rate: f64) {
        let running = self.is_running();
        self.pause();
        self.rate = rate;
        if running {
            self.start();
        }
    }
}
