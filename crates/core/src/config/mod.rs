use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{BeatError, Result};

const MIN_TRANSFORM_SIZE: usize = 32;
const MAX_TRANSFORM_SIZE: usize = 32_768;
const MAX_FRAMES_PER_SECOND: usize = 1_000;

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub detector: DetectorConfig,
    pub spectrum: SpectrumConfig,
}

impl AppConfig {
    /// Parses a JSON document and validates the result.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        self.detector.validate()?;
        self.spectrum.validate()
    }
}

/// Tuning of the beat detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Percentage an instant energy spike must rise above the rolling
    /// baseline before it counts as a beat. `5.0` means a 1.05 multiplier.
    pub sensitivity_percent: f64,
    /// Size of the transform producing the magnitude frames. Frames carry
    /// half as many bins.
    pub transform_size: usize,
    /// Number of frames aggregated into one instant energy measurement.
    pub collect_threshold: usize,
    /// Assumed polling cadence, used to size roughly one second of history.
    pub frames_per_second: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            sensitivity_percent: 5.0,
            transform_size: 256,
            collect_threshold: 1,
            frames_per_second: 43,
        }
    }
}

impl DetectorConfig {
    /// Threshold multiplier applied to the baseline energy.
    pub fn sensitivity(&self) -> f64 {
        1.0 + self.sensitivity_percent / 100.0
    }

    /// Number of magnitude bins per frame.
    pub fn bin_count(&self) -> usize {
        self.transform_size / 2
    }

    /// Maximum number of samples held by the history window.
    pub fn history_capacity(&self) -> usize {
        self.frames_per_second.saturating_mul(self.bin_count())
    }

    /// Number of samples consumed by one evaluation cycle.
    pub fn cycle_len(&self) -> usize {
        self.collect_threshold * self.bin_count()
    }

    pub fn validate(&self) -> Result<()> {
        if !self.sensitivity_percent.is_finite() || self.sensitivity_percent <= 0.0 {
            return Err(BeatError::config(format!(
                "sensitivity must be a positive percentage, got {}",
                self.sensitivity_percent
            )));
        }

        if !self.transform_size.is_power_of_two()
            || !(MIN_TRANSFORM_SIZE..=MAX_TRANSFORM_SIZE).contains(&self.transform_size)
        {
            return Err(BeatError::config(format!(
                "transform size must be a power of two between {MIN_TRANSFORM_SIZE} and \
                 {MAX_TRANSFORM_SIZE}, got {}",
                self.transform_size
            )));
        }

        if !(1..=MAX_FRAMES_PER_SECOND).contains(&self.frames_per_second) {
            return Err(BeatError::config(format!(
                "frames per second must be between 1 and {MAX_FRAMES_PER_SECOND}, got {}",
                self.frames_per_second
            )));
        }

        if self.frames_per_second.checked_mul(self.bin_count()).is_none() {
            return Err(BeatError::config("history capacity overflows"));
        }

        if self.collect_threshold == 0 || self.collect_threshold >= self.frames_per_second {
            return Err(BeatError::config(format!(
                "collect threshold must be between 1 and {}, got {}",
                self.frames_per_second.saturating_sub(1),
                self.collect_threshold
            )));
        }

        Ok(())
    }
}

/// Settings for turning raw PCM into magnitude frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrumConfig {
    pub sample_rate: u32,
    /// Centre of the optional band-pass pre-filter in Hz.
    pub pass_frequency: Option<f32>,
    pub pass_q: f32,
    /// Exponential smoothing between consecutive spectra, in `[0, 1)`.
    pub smoothing: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
}

impl Default for SpectrumConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            pass_frequency: None,
            pass_q: 0.5,
            smoothing: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
        }
    }
}

impl SpectrumConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(BeatError::config("sample rate must be non-zero"));
        }

        if !(0.0..1.0).contains(&self.smoothing) {
            return Err(BeatError::config(format!(
                "smoothing must lie in [0, 1), got {}",
                self.smoothing
            )));
        }

        if self.min_decibels >= self.max_decibels {
            return Err(BeatError::config(format!(
                "decibel range is empty: {} >= {}",
                self.min_decibels, self.max_decibels
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_detector() {
        let config = DetectorConfig::default();

        assert!((config.sensitivity() - 1.05).abs() < 1e-12);
        assert_eq!(config.bin_count(), 128);
        assert_eq!(config.history_capacity(), 43 * 128);
        assert_eq!(config.cycle_len(), 128);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_values() {
        let bad_size = DetectorConfig {
            transform_size: 300,
            ..Default::default()
        };
        assert!(matches!(
            bad_size.validate(),
            Err(BeatError::InvalidConfig(_))
        ));

        let bad_collect = DetectorConfig {
            collect_threshold: 0,
            ..Default::default()
        };
        assert!(bad_collect.validate().is_err());

        let bad_sensitivity = DetectorConfig {
            sensitivity_percent: f64::NAN,
            ..Default::default()
        };
        assert!(bad_sensitivity.validate().is_err());

        let bad_rate = DetectorConfig {
            frames_per_second: usize::MAX / 2,
            ..Default::default()
        };
        assert!(matches!(
            bad_rate.validate(),
            Err(BeatError::InvalidConfig(_))
        ));
        assert!(crate::BeatDetector::new(bad_rate).is_err());

        let no_rate = DetectorConfig {
            frames_per_second: 0,
            ..Default::default()
        };
        assert!(no_rate.validate().is_err());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config =
            AppConfig::from_json_str(r#"{ "detector": { "sensitivity_percent": 12.5 } }"#)
                .unwrap();

        assert_eq!(config.detector.sensitivity_percent, 12.5);
        assert_eq!(config.detector.transform_size, 256);
        assert_eq!(config.spectrum, SpectrumConfig::default());
    }

    #[test]
    fn invalid_json_config_is_rejected() {
        let err = AppConfig::from_json_str(r#"{ "spectrum": { "smoothing": 1.5 } }"#)
            .unwrap_err();
        assert!(format!("{err}").contains("smoothing"));
    }
}
