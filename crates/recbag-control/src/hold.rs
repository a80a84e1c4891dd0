use std::time::{Duration, Instant};

/// Sampled state of the button for one press episode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ButtonState {
    pub raw_level: bool,
    pub pressed_since: Option<Instant>,
    /// Number of polls so far; zero means the button was never sampled.
    pub sample_count: u64,
}

/// Tracks how long the button has been held continuously.
///
/// The sample that establishes the press start never fires, and the
/// comparison is done in whole seconds: 2.999 s of hold is still 2 s.
/// One timer covers one idle episode; the controller builds a new one
/// once a press episode ends.
#[derive(Debug, Clone)]
pub struct HoldTimer {
    threshold: Duration,
    state: ButtonState,
}

impl HoldTimer {
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            state: ButtonState::default(),
        }
    }

    /// Feed one sample taken at `now`. Returns true once the hold threshold
    /// is reached while the button is still pressed.
    pub fn poll(&mut self, level: bool, now: Instant) -> bool {
        self.state.sample_count += 1;
        self.state.raw_level = level;

        if !level {
            self.state.pressed_since = None;
            return false;
        }

        match self.state.pressed_since {
            None => {
                self.state.pressed_since = Some(now);
                false
            }
            Some(since) => {
                now.saturating_duration_since(since).as_secs() >= self.threshold.as_secs()
            }
        }
    }

    pub fn sample_count(&self) -> u64 {
        self.state.sample_count
    }

    pub fn state(&self) -> &ButtonState {
        &self.state
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }
}
