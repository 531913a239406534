use std::collections::VecDeque;

/// Value used to pre-fill the window before real audio arrives. Non-zero so
/// that early frames are compared against a floor rather than silence.
pub const NEUTRAL_SAMPLE: u8 = 1;

/// Fixed-capacity FIFO of flattened magnitude samples, roughly one second of
/// audio. Supplies the baseline ("local average energy") for beat decisions.
#[derive(Debug, Clone)]
pub struct HistoryWindow {
    samples: VecDeque<u8>,
    capacity: usize,
    /// Number of neutral pre-fill samples still held at the front.
    placeholders: usize,
}

impl HistoryWindow {
    /// Creates a window holding `prefill` neutral placeholder samples.
    pub fn with_placeholders(capacity: usize, prefill: usize) -> Self {
        let prefill = prefill.min(capacity);
        let mut samples = VecDeque::with_capacity(capacity);
        samples.extend(std::iter::repeat(NEUTRAL_SAMPLE).take(prefill));

        Self {
            samples,
            capacity,
            placeholders: prefill,
        }
    }

    /// Appends one sample, dropping the oldest when the window is at capacity.
    pub fn push(&mut self, sample: u8) {
        if self.capacity == 0 {
            return;
        }

        if self.samples.len() == self.capacity {
            self.evict_oldest(1);
        }
        self.samples.push_back(sample);
    }

    pub fn extend_from_slice(&mut self, samples: &[u8]) {
        for &sample in samples {
            self.push(sample);
        }
    }

    /// Drops the `n` oldest samples. Placeholders are always the oldest.
    pub fn evict_oldest(&mut self, n: usize) {
        let n = n.min(self.samples.len());
        self.samples.drain(..n);
        self.placeholders = self.placeholders.saturating_sub(n);
    }

    /// Arithmetic mean of every sample currently held.
    pub fn rolling_average(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }

        let sum: u64 = self.samples.iter().map(|&s| u64::from(s)).sum();
        sum as f64 / self.samples.len() as f64
    }

    /// True once the window is at capacity and only holds real samples.
    pub fn is_full(&self) -> bool {
        self.samples.len() == self.capacity && self.placeholders == 0
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn placeholders(&self) -> usize {
        self.placeholders
    }
}
