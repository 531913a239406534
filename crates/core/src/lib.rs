//! Online beat detection and tempo estimation.
//!
//! The crate consumes a stream of frequency-domain magnitude frames, one per
//! polling tick, together with a monotonic transport clock. Each module owns
//! one piece of the pipeline: the rolling history that provides the energy
//! baseline, the instant energy accumulator, the beat trigger itself and the
//! table of competing tempo hypotheses. Audio capture and decoding stay
//! outside the crate behind the [`MagnitudeSource`] and [`TransportClock`]
//! traits; [`SpectrumAnalyser`] adapts raw PCM when that is all a caller has.

pub mod config;
pub mod detector;
pub mod energy;
pub mod error;
pub mod filter;
pub mod history;
pub mod signal;
pub mod source;
pub mod spectrum;
pub mod tempo;
pub mod timeline;

pub use config::{AppConfig, DetectorConfig, SpectrumConfig};
pub use detector::{BeatDetector, DebugSnapshot, HypothesisSummary};
pub use energy::InstantEnergy;
pub use error::{BeatError, Result};
pub use filter::BandpassFilter;
pub use history::{HistoryWindow, NEUTRAL_SAMPLE};
pub use signal::{ImpulseTrain, SyntheticFrame};
pub use source::{MagnitudeSource, TransportClock};
pub use spectrum::SpectrumAnalyser;
pub use tempo::{TempoEstimate, TempoHypothesis, TempoTable};
pub use timeline::PlaybackClock;
