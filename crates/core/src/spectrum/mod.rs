use std::{collections::VecDeque, f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};

use crate::{BandpassFilter, BeatError, MagnitudeSource, Result, SpectrumConfig};

/// Turns a stream of mono PCM samples into byte magnitude frames, the same
/// shape a browser analyser node reports: Blackman window, smoothed linear
/// magnitudes, decibel scale mapped onto `0..=255`.
pub struct SpectrumAnalyser {
    transform_size: usize,
    config: SpectrumConfig,
    samples: VecDeque<f32>,
    smoothed: Vec<f32>,
    window: Vec<f32>,
    filter: Option<BandpassFilter>,
    fft: FftResources,
}

impl SpectrumAnalyser {
    pub fn new(transform_size: usize, config: &SpectrumConfig) -> Result<Self> {
        if !transform_size.is_power_of_two() || transform_size < 2 {
            return Err(BeatError::config(format!(
                "transform size must be a power of two, got {transform_size}"
            )));
        }
        config.validate()?;

        let filter = config
            .pass_frequency
            .map(|centre| BandpassFilter::new(centre, config.pass_q, config.sample_rate))
            .transpose()?;

        if filter.is_some() {
            tracing::debug!(
                centre = ?config.pass_frequency,
                q = config.pass_q,
                "using band-pass pre-filter"
            );
        }

        let mut planner = RealFftPlanner::<f32>::new();
        let plan = planner.plan_fft_forward(transform_size);

        Ok(Self {
            transform_size,
            config: config.clone(),
            samples: VecDeque::from(vec![0.0; transform_size]),
            smoothed: vec![0.0; transform_size / 2],
            window: blackman_window(transform_size),
            filter,
            fft: FftResources::new(plan),
        })
    }

    /// Appends PCM samples, keeping only the most recent transform's worth.
    pub fn push_samples(&mut self, samples: &[f32]) {
        for &sample in samples {
            let sample = match self.filter.as_mut() {
                Some(filter) => filter.process(sample),
                None => sample,
            };
            if self.samples.len() == self.transform_size {
                self.samples.pop_front();
            }
            self.samples.push_back(sample);
        }
    }

    /// Computes the current byte spectrum into `out`.
    pub fn byte_frequency_data(&mut self, out: &mut [u8]) -> Result<()> {
        for ((slot, sample), weight) in self
            .fft
            .input
            .iter_mut()
            .zip(self.samples.iter())
            .zip(self.window.iter())
        {
            *slot = sample * weight;
        }

        self.fft.plan.process_with_scratch(
            &mut self.fft.input,
            &mut self.fft.spectrum,
            &mut self.fft.scratch,
        )?;

        let scale = 1.0 / self.transform_size as f32;
        let smoothing = self.config.smoothing;
        let range = self.config.max_decibels - self.config.min_decibels;

        for (index, (smoothed, bin)) in self
            .smoothed
            .iter_mut()
            .zip(self.fft.spectrum.iter())
            .enumerate()
        {
            let magnitude = bin.norm() * scale;
            *smoothed = smoothing * *smoothed + (1.0 - smoothing) * magnitude;

            if let Some(byte) = out.get_mut(index) {
                *byte = if *smoothed <= f32::MIN_POSITIVE {
                    0
                } else {
                    let decibels = 20.0 * smoothed.log10();
                    let scaled = 255.0 * (decibels - self.config.min_decibels) / range;
                    scaled.floor().clamp(0.0, 255.0) as u8
                };
            }
        }

        Ok(())
    }
}

impl MagnitudeSource for SpectrumAnalyser {
    fn bin_count(&self) -> usize {
        self.transform_size / 2
    }

    fn fill_magnitudes(&mut self, out: &mut [u8]) {
        if let Err(err) = self.byte_frequency_data(out) {
            tracing::warn!(%err, "spectrum unavailable, emitting silence");
            out.iter_mut().for_each(|b| *b = 0);
        }
    }
}

struct FftResources {
    plan: Arc<dyn RealToComplex<f32>>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
    input: Vec<f32>,
}

impl FftResources {
    fn new(plan: Arc<dyn RealToComplex<f32>>) -> Self {
        Self {
            scratch: plan.make_scratch_vec(),
            spectrum: plan.make_output_vec(),
            input: plan.make_input_vec(),
            plan,
        }
    }
}

impl fmt::Debug for SpectrumAnalyser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectrumAnalyser")
            .field("transform_size", &self.transform_size)
            .field("config", &self.config)
            .field("filtered", &self.filter.is_some())
            .finish()
    }
}

fn blackman_window(len: usize) -> Vec<f32> {
    const ALPHA: f32 = 0.16;
    let a0 = 0.5 * (1.0 - ALPHA);
    let a1 = 0.5;
    let a2 = 0.5 * ALPHA;

    (0..len)
        .map(|n| {
            let x = n as f32 / len as f32;
            a0 - a1 * (2.0 * PI * x).cos() + a2 * (4.0 * PI * x).cos()
        })
        .collect()
}
