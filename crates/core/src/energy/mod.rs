/// Running sum of the magnitudes ingested since the last evaluation cycle.
#[derive(Debug, Clone)]
pub struct InstantEnergy {
    bins_per_frame: usize,
    sum: u64,
    samples: usize,
}

impl InstantEnergy {
    pub fn new(bins_per_frame: usize) -> Self {
        Self {
            bins_per_frame,
            sum: 0,
            samples: 0,
        }
    }

    /// Adds every bin of `frame` to the running sum.
    pub fn accumulate(&mut self, frame: &[u8]) {
        self.sum += frame.iter().map(|&bin| u64::from(bin)).sum::<u64>();
        self.samples += frame.len();
    }

    /// Whether `collect_threshold` frames worth of bins have been gathered.
    pub fn is_ready(&self, collect_threshold: usize) -> bool {
        self.samples >= collect_threshold * self.bins_per_frame
    }

    /// Returns the energy normalised to a single bin's average magnitude and
    /// clears the accumulator.
    pub fn finalize(&mut self, collect_threshold: usize) -> f64 {
        let divisor = (collect_threshold * self.bins_per_frame).max(1);
        let energy = self.sum as f64 / divisor as f64;
        self.reset();
        energy
    }

    pub fn reset(&mut self) {
        self.sum = 0;
        self.samples = 0;
    }

    pub fn samples(&self) -> usize {
        self.samples
    }
}
