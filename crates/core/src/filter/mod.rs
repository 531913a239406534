use std::f32::consts::PI;

use crate::{BeatError, Result};

/// Second-order band-pass section (constant 0 dB peak gain), used to isolate
/// the band that carries kick drums before the spectrum is taken.
#[derive(Debug, Clone)]
pub struct BandpassFilter {
    b0: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl BandpassFilter {
    pub fn new(center_hz: f32, q: f32, sample_rate: u32) -> Result<Self> {
        let sample_rate = sample_rate as f32;
        let nyquist = sample_rate * 0.5;

        if !(center_hz > 0.0 && center_hz < nyquist) {
            return Err(BeatError::config(format!(
                "band-pass centre {center_hz} Hz must lie below the {nyquist} Hz nyquist limit"
            )));
        }
        if !(q > 0.0 && q.is_finite()) {
            return Err(BeatError::config(format!(
                "band-pass Q must be positive, got {q}"
            )));
        }

        let w0 = 2.0 * PI * center_hz / sample_rate;
        let alpha = w0.sin() / (2.0 * q);
        let a0 = 1.0 + alpha;

        Ok(Self {
            b0: alpha / a0,
            b2: -alpha / a0,
            a1: -2.0 * w0.cos() / a0,
            a2: (1.0 - alpha) / a0,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        })
    }

    pub fn process(&mut self, sample: f32) -> f32 {
        let output =
            self.b0 * sample + self.b2 * self.x2 - self.a1 * self.y1 - self.a2 * self.y2;

        self.x2 = self.x1;
        self.x1 = sample;
        self.y2 = self.y1;
        self.y1 = output;
        output
    }

    pub fn process_block(&mut self, samples: &mut [f32]) {
        for sample in samples {
            *sample = self.process(*sample);
        }
    }
}
