use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// One tick of synthetic input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticFrame {
    pub time: f64,
    pub magnitudes: Vec<u8>,
    /// Whether this frame carries an impulse.
    pub impulse: bool,
}

/// Perfectly periodic energy impulses over a flat background, sampled at a
/// fixed tick rate. Beat `k` lands on the tick closest to `k * period`.
#[derive(Debug, Clone)]
pub struct ImpulseTrain {
    bins: usize,
    tick_rate: f64,
    period: f64,
    background: u8,
    peak: u8,
    dropped: BTreeSet<u64>,
    tick: u64,
    limit: Option<u64>,
}

impl ImpulseTrain {
    pub fn new(bins: usize, period_seconds: f64, tick_rate: f64) -> Self {
        Self {
            bins,
            tick_rate,
            period: period_seconds,
            background: 20,
            peak: 200,
            dropped: BTreeSet::new(),
            tick: 0,
            limit: None,
        }
    }

    /// Builds a train from a tempo in beats per minute.
    pub fn from_bpm(bins: usize, bpm: f64, tick_rate: f64) -> Self {
        Self::new(bins, 60.0 / bpm, tick_rate)
    }

    pub fn with_levels(mut self, background: u8, peak: u8) -> Self {
        self.background = background;
        self.peak = peak;
        self
    }

    /// Stops the iterator after `seconds` of ticks.
    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.limit = Some((seconds * self.tick_rate).round().max(0.0) as u64);
        self
    }

    /// Silently omits the listed beats (zero-based beat indices).
    pub fn drop_beats(mut self, beats: impl IntoIterator<Item = u64>) -> Self {
        self.dropped.extend(beats);
        self
    }

    pub fn period(&self) -> f64 {
        self.period
    }

    fn ticks_per_beat(&self) -> f64 {
        self.period * self.tick_rate
    }

    fn is_impulse(&self, tick: u64) -> bool {
        let per_beat = self.ticks_per_beat();
        if per_beat.is_nan() || per_beat < 1.0 {
            return false;
        }

        let beat = (tick as f64 / per_beat).round();
        let beat_tick = (beat * per_beat).round() as u64;
        beat_tick == tick && !self.dropped.contains(&(beat as u64))
    }
}

impl Iterator for ImpulseTrain {
    type Item = SyntheticFrame;

    fn next(&mut self) -> Option<Self::Item> {
        if self.limit.is_some_and(|limit| self.tick >= limit) {
            return None;
        }

        let tick = self.tick;
        self.tick += 1;

        let impulse = self.is_impulse(tick);
        let level = if impulse { self.peak } else { self.background };

        Some(SyntheticFrame {
            time: tick as f64 / self.tick_rate,
            magnitudes: vec![level; self.bins],
            impulse,
        })
    }
}
