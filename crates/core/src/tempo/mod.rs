use std::fmt;

use serde::{Deserialize, Serialize};

/// Hypotheses seen more often than this, while ranked in the top two, count
/// as a confirmed tempo.
const CONFIRMATION_COUNT: u32 = 3;

/// One candidate beat-to-beat period, quantised to whole milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TempoHypothesis {
    pub interval_ms: u32,
    pub occurrences: u32,
}

impl TempoHypothesis {
    pub fn interval_seconds(&self) -> f64 {
        f64::from(self.interval_ms) / 1000.0
    }

    /// Tempo implied by this interval alone.
    pub fn bpm(&self) -> f64 {
        60.0 / self.interval_seconds()
    }
}

/// Best-effort tempo guess in beats per minute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TempoEstimate {
    /// Mean over intervals observed more than once.
    pub conservative: Option<f64>,
    /// Mean over every distinct interval seen.
    pub all: Option<f64>,
}

impl TempoEstimate {
    pub fn is_available(&self) -> bool {
        self.all.is_some()
    }
}

impl fmt::Display for TempoEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn bpm(value: Option<f64>) -> String {
            value
                .map(|bpm| format!("{bpm:.0} BPM"))
                .unwrap_or_else(|| "unavailable".to_string())
        }

        write!(
            f,
            "conservative: {}, all: {}",
            bpm(self.conservative),
            bpm(self.all)
        )
    }
}

/// Competing tempo hypotheses, unique by interval and kept sorted by
/// descending occurrence count.
#[derive(Debug, Clone, Default)]
pub struct TempoTable {
    hypotheses: Vec<TempoHypothesis>,
}

impl TempoTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an observed inter-beat interval. Returns the inserted or
    /// reinforced hypothesis, or `None` when the interval is not a positive
    /// number of milliseconds.
    pub fn record(&mut self, interval_seconds: f64) -> Option<TempoHypothesis> {
        let interval_ms = quantize_ms(interval_seconds)?;

        let hypothesis = match self
            .hypotheses
            .iter_mut()
            .find(|h| h.interval_ms == interval_ms)
        {
            Some(existing) => {
                existing.occurrences += 1;
                *existing
            }
            None => {
                let fresh = TempoHypothesis {
                    interval_ms,
                    occurrences: 1,
                };
                self.hypotheses.push(fresh);
                fresh
            }
        };

        self.hypotheses
            .sort_by(|a, b| b.occurrences.cmp(&a.occurrences));
        Some(hypothesis)
    }

    /// Finds the hypothesis whose period divides `elapsed` most evenly,
    /// provided the leftover fraction of a period stays below `tolerance`.
    pub fn matching_period(&self, elapsed: f64, tolerance: f64) -> Option<TempoHypothesis> {
        self.hypotheses
            .iter()
            .filter_map(|h| {
                let periods = elapsed / h.interval_seconds();
                let whole = periods.round();
                if whole < 1.0 {
                    return None;
                }
                let deviation = (periods - whole).abs();
                (deviation < tolerance).then_some((*h, deviation))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(h, _)| h)
    }

    pub fn estimate(&self) -> TempoEstimate {
        if self.hypotheses.len() <= 2 {
            return TempoEstimate::default();
        }

        let all = mean_bpm(self.hypotheses.iter());
        let conservative = mean_bpm(self.hypotheses.iter().filter(|h| h.occurrences > 1));

        TempoEstimate { conservative, all }
    }

    /// Top-ranked hypothesis that has been reinforced often enough to be
    /// trusted.
    pub fn confirmed(&self) -> Option<&TempoHypothesis> {
        self.hypotheses
            .iter()
            .take(2)
            .find(|h| h.occurrences > CONFIRMATION_COUNT)
    }

    pub fn hypotheses(&self) -> &[TempoHypothesis] {
        &self.hypotheses
    }

    pub fn top(&self, count: usize) -> impl Iterator<Item = &TempoHypothesis> {
        self.hypotheses.iter().take(count)
    }

    pub fn len(&self) -> usize {
        self.hypotheses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hypotheses.is_empty()
    }

    pub fn clear(&mut self) {
        self.hypotheses.clear();
    }
}

fn quantize_ms(seconds: f64) -> Option<u32> {
    if !seconds.is_finite() {
        return None;
    }

    let ms = (seconds * 1000.0).round();
    if ms < 1.0 || ms > f64::from(u32::MAX) {
        return None;
    }
    Some(ms as u32)
}

fn mean_bpm<'a>(hypotheses: impl Iterator<Item = &'a TempoHypothesis>) -> Option<f64> {
    let (sum, count) = hypotheses.fold((0.0, 0usize), |(sum, count), h| {
        (sum + h.interval_seconds(), count + 1)
    });

    if count == 0 || sum <= 0.0 {
        return None;
    }
    Some(60.0 / (sum / count as f64))
}
