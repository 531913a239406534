use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    DetectorConfig, HistoryWindow, InstantEnergy, MagnitudeSource, Result, TempoEstimate,
    TempoTable, TransportClock,
};

/// Transport time below which no beat is reported while the stream settles.
const WARM_UP_SECONDS: f64 = 0.29;
/// Shortest accepted beat spacing (200 BPM).
const MIN_BEAT_INTERVAL: f64 = 0.29;
/// Longest accepted beat spacing (40 BPM).
const MAX_BEAT_INTERVAL: f64 = 2.0;
/// Gaps longer than this drop the timing reference altogether.
const CLOCK_RESET_SECONDS: f64 = 3.0;
/// Largest leftover fraction of a period still treated as a whole multiple.
const RECOVERY_TOLERANCE: f64 = 0.05;
const SNAPSHOT_HYPOTHESES: usize = 10;

/// Online beat detector fed one magnitude frame per polling tick.
///
/// Each evaluation compares the energy of the latest frame(s) against the
/// average over roughly the last second. A beat is declared when the spike
/// clears the sensitivity threshold and the spacing to the previous beat is
/// a plausible tempo. Observed spacings feed a [`TempoTable`].
///
/// The detector is not synchronised; callers must serialise access.
pub struct BeatDetector {
    config: DetectorConfig,
    sensitivity: f64,
    bins: usize,
    history: HistoryWindow,
    energy: InstantEnergy,
    tempo: TempoTable,
    last_beat: Option<f64>,
    instant_energy: f64,
    local_energy: f64,
    scratch: Vec<u8>,
}

impl BeatDetector {
    pub fn new(config: DetectorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_validated(config))
    }

    fn from_validated(config: DetectorConfig) -> Self {
        Self {
            sensitivity: config.sensitivity(),
            bins: config.bin_count(),
            history: fresh_history(&config),
            energy: InstantEnergy::new(config.bin_count()),
            tempo: TempoTable::new(),
            last_beat: None,
            instant_energy: 0.0,
            local_energy: 0.0,
            scratch: Vec::with_capacity(config.bin_count()),
            config,
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Ingests one frame captured at transport time `now` and reports whether
    /// it lands on a beat. Bins beyond the configured count are ignored.
    pub fn evaluate(&mut self, frame: &[u8], now: f64) -> bool {
        let frame = &frame[..frame.len().min(self.bins)];
        self.history.extend_from_slice(frame);
        self.energy.accumulate(frame);

        let collect_threshold = self.config.collect_threshold;
        if !self.energy.is_ready(collect_threshold) {
            return false;
        }

        let is_beat = if self.history.is_full() {
            let instant = self.energy.finalize(collect_threshold);
            let baseline = self.history.rolling_average();
            self.check_beat(instant, baseline, now)
        } else {
            self.energy.reset();
            false
        };

        self.history.evict_oldest(self.config.cycle_len());
        is_beat
    }

    /// Pulls the next frame from `source` and evaluates it at `clock.now()`.
    pub fn poll<S, C>(&mut self, source: &mut S, clock: &C) -> bool
    where
        S: MagnitudeSource + ?Sized,
        C: TransportClock + ?Sized,
    {
        let mut frame = std::mem::take(&mut self.scratch);
        frame.clear();
        frame.resize(source.bin_count(), 0);
        source.fill_magnitudes(&mut frame);

        let is_beat = self.evaluate(&frame, clock.now());
        self.scratch = frame;
        is_beat
    }

    pub fn tempo_estimate(&self) -> TempoEstimate {
        self.tempo.estimate()
    }

    pub fn tempo_table(&self) -> &TempoTable {
        &self.tempo
    }

    /// Transport time of the last confirmed beat, `None` before the first
    /// beat and after a clock reset.
    pub fn last_beat(&self) -> Option<f64> {
        self.last_beat
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn history_capacity(&self) -> usize {
        self.history.capacity()
    }

    pub fn debug_snapshot(&self) -> DebugSnapshot {
        DebugSnapshot {
            hypotheses: self
                .tempo
                .top(SNAPSHOT_HYPOTHESES)
                .map(|h| HypothesisSummary {
                    interval_seconds: h.interval_seconds(),
                    occurrences: h.occurrences,
                    bpm: h.bpm().round() as u32,
                })
                .collect(),
            history_len: self.history.len(),
            instant_energy: self.instant_energy,
            local_energy: self.local_energy,
            bin_count: self.bins,
            sensitivity_percent: (self.sensitivity - 1.0) * 100.0,
        }
    }

    /// Clears all accumulated state while preserving configuration.
    pub fn reset(&mut self) {
        self.history = fresh_history(&self.config);
        self.energy.reset();
        self.tempo.clear();
        self.last_beat = None;
        self.instant_energy = 0.0;
        self.local_energy = 0.0;
    }

    /// Applies the trigger rules. A beat with no preceding beat (the first
    /// one, or the first after a clock reset) records no tempo interval,
    /// since the time since transport start is not a beat spacing.
    fn check_beat(&mut self, instant: f64, baseline: f64, now: f64) -> bool {
        self.instant_energy = instant;
        self.local_energy = baseline;

        let elapsed = self.elapsed_since_last_beat(now);
        let plausible_spacing = elapsed
            .map(|e| e > MIN_BEAT_INTERVAL && e < MAX_BEAT_INTERVAL)
            .unwrap_or(true);

        let is_beat = now > WARM_UP_SECONDS
            && instant > baseline
            && instant > self.sensitivity * baseline
            && plausible_spacing;

        if !is_beat {
            return false;
        }

        self.last_beat = Some(now);
        tracing::debug!(time = now, instant, baseline, ?elapsed, "beat");

        if let Some(interval) = elapsed {
            self.tempo.record(interval);
            if let Some(confirmed) = self.tempo.confirmed() {
                tracing::debug!(
                    interval_ms = confirmed.interval_ms,
                    occurrences = confirmed.occurrences,
                    "tempo hypothesis confirmed"
                );
            }
        }

        true
    }

    /// Time since the last beat, after folding long gaps that are a whole
    /// number of known periods back onto that period. Gaps that stay too
    /// long drop the timing reference and yield `None`.
    fn elapsed_since_last_beat(&mut self, now: f64) -> Option<f64> {
        let last = self.last_beat?;
        let mut elapsed = now - last;

        if elapsed > MAX_BEAT_INTERVAL && !self.tempo.is_empty() {
            if let Some(period) = self.tempo.matching_period(elapsed, RECOVERY_TOLERANCE) {
                tracing::trace!(
                    elapsed,
                    interval_ms = period.interval_ms,
                    "gap matches a multiple of a known period"
                );
                elapsed = period.interval_seconds();
            }
        }

        // A backwards jump means the transport restarted.
        if elapsed > CLOCK_RESET_SECONDS || elapsed < 0.0 {
            tracing::trace!(elapsed, "beat clock reset");
            self.last_beat = None;
            return None;
        }

        Some(elapsed)
    }
}

impl Default for BeatDetector {
    fn default() -> Self {
        Self::from_validated(DetectorConfig::default())
    }
}

impl fmt::Debug for BeatDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeatDetector")
            .field("config", &self.config)
            .field("history", &self.history.len())
            .field("hypotheses", &self.tempo.len())
            .field("last_beat", &self.last_beat)
            .field("instant_energy", &self.instant_energy)
            .field("local_energy", &self.local_energy)
            .finish()
    }
}

/// Leaves room for exactly one cycle of real samples before the window is
/// at capacity.
fn fresh_history(config: &DetectorConfig) -> HistoryWindow {
    let capacity = config.history_capacity();
    HistoryWindow::with_placeholders(capacity, capacity.saturating_sub(config.cycle_len()))
}

/// Live diagnostics: leading tempo hypotheses and the latest energy levels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugSnapshot {
    pub hypotheses: Vec<HypothesisSummary>,
    pub history_len: usize,
    pub instant_energy: f64,
    pub local_energy: f64,
    pub bin_count: usize,
    pub sensitivity_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HypothesisSummary {
    pub interval_seconds: f64,
    pub occurrences: u32,
    pub bpm: u32,
}

impl fmt::Display for DebugSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, h) in self.hypotheses.iter().enumerate() {
            writeln!(
                f,
                "Beat {index}: {:.3}, counter: {}, calc. bpm: {}",
                h.interval_seconds, h.occurrences, h.bpm
            )?;
        }
        writeln!(f, "history buffer size: {}", self.history_len)?;
        writeln!(f, "instant energy: {}", self.instant_energy)?;
        writeln!(f, "local energy: {}", self.local_energy)?;
        writeln!(f, "bins: {}", self.bin_count)?;
        write!(f, "sensitivity: {:.2}", self.sensitivity_percent)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::{ImpulseTrain, PlaybackClock};

    const TICK_RATE: f64 = 40.0;
    const BINS: usize = 128;

    fn detector() -> BeatDetector {
        BeatDetector::new(DetectorConfig::default()).unwrap()
    }

    /// Feeds every frame and returns the tick indices reported as beats.
    fn run(detector: &mut BeatDetector, train: ImpulseTrain) -> Vec<usize> {
        train
            .enumerate()
            .filter_map(|(tick, frame)| {
                detector
                    .evaluate(&frame.magnitudes, frame.time)
                    .then_some(tick)
            })
            .collect()
    }

    #[test]
    fn periodic_impulses_trigger_once_per_period() {
        let mut detector = detector();
        let train = ImpulseTrain::new(BINS, 0.5, TICK_RATE).with_duration(15.0);
        let impulses: Vec<usize> = train
            .clone()
            .enumerate()
            .filter(|(_, f)| f.impulse)
            .map(|(tick, _)| tick)
            .collect();

        let beats = run(&mut detector, train);

        assert!(beats.len() >= impulses.len() - 3, "beats: {beats:?}");
        assert!(beats.iter().all(|tick| impulses.contains(tick)));
        assert!(beats.windows(2).all(|pair| pair[1] - pair[0] == 20));

        let table = detector.tempo_table();
        assert_eq!(table.len(), 1);
        assert_eq!(table.hypotheses()[0].interval_ms, 500);
        assert!(!detector.tempo_estimate().is_available());
    }

    #[test]
    fn tempo_converges_on_jittered_impulses() {
        const JITTER: [f64; 6] = [0.0, 0.003, -0.002, 0.001, -0.003, 0.002];
        let mut detector = detector();
        let mut beats = 0;

        for tick in 0..600 {
            let impulse = tick % 20 == 0;
            let mut time = tick as f64 / TICK_RATE;
            if impulse {
                time += JITTER[(tick / 20) % JITTER.len()];
            }
            let level = if impulse { 200 } else { 20 };

            if detector.evaluate(&[level; BINS], time) {
                assert!(impulse, "beat on background tick {tick}");
                beats += 1;
            }
        }

        assert!(beats >= 5);
        let estimate = detector.tempo_estimate();
        let all = estimate.all.expect("enough hypotheses for an estimate");
        let conservative = estimate.conservative.expect("hypotheses were repeated");
        assert!((all - 120.0).abs() <= 1.0, "all = {all}");
        assert!((conservative - 120.0).abs() <= 1.0, "conservative = {conservative}");
    }

    #[test]
    fn constant_input_never_beats() {
        for level in [0_u8, 1, 37, 128, 255] {
            let mut detector = detector();
            for tick in 0..500 {
                let time = tick as f64 / 43.0;
                assert!(
                    !detector.evaluate(&[level; BINS], time),
                    "level {level} beat at tick {tick}"
                );
            }
        }
    }

    #[test]
    fn recovers_from_a_missed_beat() {
        let mut detector = detector();
        let train = ImpulseTrain::new(BINS, 1.2, TICK_RATE)
            .drop_beats([4])
            .with_duration(8.0);

        let beats = run(&mut detector, train);

        assert_eq!(beats, vec![48, 96, 144, 240, 288]);
        let top = detector.tempo_table().hypotheses()[0];
        assert_eq!(top.interval_ms, 1200);
        assert_eq!(top.occurrences, 4);
        assert_eq!(detector.tempo_table().len(), 1);
    }

    #[test]
    fn long_gap_resets_the_beat_clock() {
        let mut detector = detector();
        let mut frames = ImpulseTrain::new(BINS, 0.5, TICK_RATE)
            .drop_beats(10..=16)
            .with_duration(10.0);

        for frame in frames.by_ref().take(340) {
            detector.evaluate(&frame.magnitudes, frame.time);
        }
        assert_eq!(detector.last_beat(), None);

        let resumed = frames.next().unwrap();
        assert!(resumed.impulse);
        assert!(detector.evaluate(&resumed.magnitudes, resumed.time));
        assert_eq!(detector.last_beat(), Some(resumed.time));
        assert!(detector
            .tempo_table()
            .hypotheses()
            .iter()
            .all(|h| h.interval_ms == 500));

        let beats_after = frames
            .filter(|frame| detector.evaluate(&frame.magnitudes, frame.time))
            .count();
        assert_eq!(beats_after, 2);
    }

    #[test]
    fn backwards_clock_resets_the_beat_clock() {
        let mut detector = detector();
        let mut frames = ImpulseTrain::new(BINS, 0.5, TICK_RATE).with_duration(5.0);

        for frame in frames.by_ref().take(81) {
            detector.evaluate(&frame.magnitudes, frame.time);
        }
        assert_eq!(detector.last_beat(), Some(2.0));

        let background = frames.next().unwrap();
        assert!(!background.impulse);
        assert!(!detector.evaluate(&background.magnitudes, 1.0));
        assert_eq!(detector.last_beat(), None);

        // Spacing checks are skipped without a previous beat.
        assert!(detector.evaluate(&[200; BINS], 1.1));
        assert_eq!(detector.last_beat(), Some(1.1));
        assert_eq!(detector.tempo_table().hypotheses()[0].occurrences, 1);
    }

    #[test]
    fn high_sensitivity_suppresses_beats() {
        let config = DetectorConfig {
            sensitivity_percent: 1000.0,
            ..Default::default()
        };
        let mut detector = BeatDetector::new(config).unwrap();
        let train = ImpulseTrain::new(BINS, 0.5, TICK_RATE).with_duration(10.0);

        assert!(run(&mut detector, train).is_empty());
    }

    #[test]
    fn history_never_exceeds_capacity() {
        let config = DetectorConfig {
            collect_threshold: 3,
            ..Default::default()
        };
        let mut detector = BeatDetector::new(config).unwrap();
        let capacity = detector.history_capacity();

        for tick in 0..2_000_usize {
            let len = match tick % 3 {
                0 => BINS,
                1 => BINS + 72,
                _ => 50,
            };
            let frame: Vec<u8> = (0..len).map(|i| ((tick * 7 + i) % 256) as u8).collect();
            detector.evaluate(&frame, tick as f64 / 43.0);
            assert!(detector.history_len() <= capacity);
        }
    }

    #[test]
    fn polls_injected_source_and_clock() {
        struct Replay(VecDeque<Vec<u8>>);

        impl MagnitudeSource for Replay {
            fn bin_count(&self) -> usize {
                BINS
            }

            fn fill_magnitudes(&mut self, out: &mut [u8]) {
                if let Some(frame) = self.0.pop_front() {
                    out.copy_from_slice(&frame);
                }
            }
        }

        let train = ImpulseTrain::new(BINS, 0.5, TICK_RATE).with_duration(5.0);
        let mut source = Replay(train.map(|f| f.magnitudes).collect());
        let mut clock = PlaybackClock::new();
        let mut detector = detector();
        let mut beats = Vec::new();

        while !source.0.is_empty() {
            if detector.poll(&mut source, &clock) {
                beats.push(clock.time_seconds());
            }
            clock.advance(1.0 / TICK_RATE);
        }

        assert!(!beats.is_empty());
        assert!(beats
            .windows(2)
            .all(|pair| (pair[1] - pair[0] - 0.5).abs() < 1e-9));
    }

    #[test]
    fn snapshot_reports_hypotheses_and_energy() {
        let mut detector = detector();
        run(
            &mut detector,
            ImpulseTrain::new(BINS, 0.5, TICK_RATE).with_duration(5.0),
        );

        let snapshot = detector.debug_snapshot();
        assert_eq!(snapshot.bin_count, BINS);
        assert_eq!(snapshot.hypotheses[0].bpm, 120);
        assert!(snapshot.local_energy > 0.0);

        let text = snapshot.to_string();
        assert!(text.starts_with("Beat 0: 0.500, counter: "));
        assert!(text.contains("calc. bpm: 120"));
        assert!(text.contains(&format!("history buffer size: {}", snapshot.history_len)));
        assert!(text.ends_with("sensitivity: 5.00"));
    }

    #[test]
    fn reset_restores_fresh_state() {
        let mut detector = detector();
        run(
            &mut detector,
            ImpulseTrain::new(BINS, 0.5, TICK_RATE).with_duration(5.0),
        );
        assert!(detector.last_beat().is_some());

        detector.reset();

        assert!(detector.last_beat().is_none());
        assert!(detector.tempo_table().is_empty());
        assert_eq!(
            detector.history_len(),
            detector.history_capacity() - detector.config().cycle_len()
        );
    }

    #[test]
    fn rejects_invalid_configuration() {
        let config = DetectorConfig {
            transform_size: 0,
            ..Default::default()
        };
        assert!(BeatDetector::new(config).is_err());
    }
}
