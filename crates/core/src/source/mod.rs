/// Supplier of magnitude frames, one per polling tick. Audio capture,
/// decoding and the transform live behind this seam.
pub trait MagnitudeSource {
    /// Number of bins written by [`MagnitudeSource::fill_magnitudes`].
    fn bin_count(&self) -> usize;

    /// Writes the latest magnitudes, one byte per bin, into `out`.
    fn fill_magnitudes(&mut self, out: &mut [u8]);
}

/// Monotonic transport time in seconds. Only advances while audio plays.
pub trait TransportClock {
    fn now(&self) -> f64;
}
