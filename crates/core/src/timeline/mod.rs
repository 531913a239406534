use crate::TransportClock;

/// Transport clock advanced explicitly by whoever owns playback.
#[derive(Debug, Default, Clone)]
pub struct PlaybackClock {
    time_seconds: f64,
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.time_seconds = 0.0;
    }

    /// Moves the clock forward. Negative or non-finite deltas are ignored so
    /// the clock stays monotonic.
    pub fn advance(&mut self, delta: f64) {
        if delta.is_finite() && delta > 0.0 {
            self.time_seconds += delta;
        }
    }

    pub fn time_seconds(&self) -> f64 {
        self.time_seconds
    }
}

impl TransportClock for PlaybackClock {
    fn now(&self) -> f64 {
        self.time_seconds
    }
}
