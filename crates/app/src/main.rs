use std::path::{Path, PathBuf};

use beat_detector_core::{
    AppConfig, BeatDetector, BeatError, DebugSnapshot, ImpulseTrain, PlaybackClock,
    SpectrumAnalyser, TempoEstimate,
};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

fn main() -> beat_detector_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref(), cli.sensitivity)?;

    let report = match cli.command {
        Commands::Simulate {
            bpm,
            seconds,
            fps,
            background,
            peak,
            drop,
        } => {
            let train = ImpulseTrain::from_bpm(config.detector.bin_count(), bpm, fps)
                .with_levels(background, peak)
                .drop_beats(drop)
                .with_duration(seconds);
            run_simulation(&config, train)?
        }
        Commands::Replay { input } => run_replay(&config, &input)?,
        Commands::Analyse { input } => run_analyse(&config, &input)?,
    };

    tracing::info!(tempo = %report.tempo, beats = report.beats.len(), "finished");
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn load_config(
    path: Option<&Path>,
    sensitivity: Option<f64>,
) -> beat_detector_core::Result<AppConfig> {
    let mut config = match path {
        Some(path) => {
            tracing::info!(?path, "loading configuration");
            AppConfig::load(path)?
        }
        None => AppConfig::default(),
    };

    if let Some(percent) = sensitivity {
        config.detector.sensitivity_percent = percent;
    }
    config.validate()?;
    Ok(config)
}

fn run_simulation(
    config: &AppConfig,
    train: ImpulseTrain,
) -> beat_detector_core::Result<Report> {
    tracing::info!(period = train.period(), "running synthetic impulse train");
    let mut detector = BeatDetector::new(config.detector.clone())?;
    let mut beats = Vec::new();

    for frame in train {
        if detector.evaluate(&frame.magnitudes, frame.time) {
            tracing::info!(time = frame.time, "beat");
            beats.push(frame.time);
        }
    }

    Ok(Report::new(beats, &detector))
}

fn run_replay(config: &AppConfig, input: &Path) -> beat_detector_core::Result<Report> {
    tracing::info!(?input, "replaying magnitude frames");
    let contents = std::fs::read_to_string(input)?;
    let mut detector = BeatDetector::new(config.detector.clone())?;
    let mut beats = Vec::new();

    for (index, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        let frame: ReplayFrame = serde_json::from_str(line)
            .map_err(|err| BeatError::msg(format!("line {}: {err}", index + 1)))?;

        if detector.evaluate(&frame.magnitudes, frame.time) {
            tracing::info!(time = frame.time, "beat");
            beats.push(frame.time);
        }
    }

    Ok(Report::new(beats, &detector))
}

fn run_analyse(config: &AppConfig, input: &Path) -> beat_detector_core::Result<Report> {
    tracing::info!(?input, "analysing raw f32 PCM");
    let bytes = std::fs::read(input)?;
    if bytes.len() % 4 != 0 {
        return Err(BeatError::msg(format!(
            "{} is not a whole number of little-endian f32 samples",
            input.display()
        )));
    }

    let samples: Vec<f32> = bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    let sample_rate = f64::from(config.spectrum.sample_rate);
    let hop = (sample_rate / config.detector.frames_per_second as f64)
        .round()
        .max(1.0) as usize;

    let mut analyser = SpectrumAnalyser::new(config.detector.transform_size, &config.spectrum)?;
    let mut detector = BeatDetector::new(config.detector.clone())?;
    let mut clock = PlaybackClock::new();
    let mut beats = Vec::new();

    for chunk in samples.chunks(hop) {
        analyser.push_samples(chunk);
        clock.advance(chunk.len() as f64 / sample_rate);

        if detector.poll(&mut analyser, &clock) {
            tracing::info!(time = clock.time_seconds(), "beat");
            beats.push(clock.time_seconds());
        }
    }

    Ok(Report::new(beats, &detector))
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Debug, Serialize)]
struct Report {
    beats: Vec<f64>,
    tempo: TempoEstimate,
    snapshot: DebugSnapshot,
}

impl Report {
    fn new(beats: Vec<f64>, detector: &BeatDetector) -> Self {
        Self {
            beats,
            tempo: detector.tempo_estimate(),
            snapshot: detector.debug_snapshot(),
        }
    }
}

/// One line of a replay file.
#[derive(Debug, Deserialize)]
struct ReplayFrame {
    time: f64,
    magnitudes: Vec<u8>,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Energy-based beat detector", long_about = None)]
struct Cli {
    /// JSON configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Override the trigger sensitivity in percent above the baseline.
    #[arg(short, long, global = true)]
    sensitivity: Option<f64>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a synthetic impulse train through the detector.
    Simulate {
        /// Tempo of the impulse train.
        #[arg(long, default_value_t = 120.0)]
        bpm: f64,
        /// Length of the simulation in seconds.
        #[arg(long, default_value_t = 20.0)]
        seconds: f64,
        /// Polling ticks per second.
        #[arg(long, default_value_t = 43.0)]
        fps: f64,
        /// Magnitude of every bin between impulses.
        #[arg(long, default_value_t = 20)]
        background: u8,
        /// Magnitude of every bin on an impulse.
        #[arg(long, default_value_t = 200)]
        peak: u8,
        /// Zero-based beat indices to leave out.
        #[arg(long, value_delimiter = ',')]
        drop: Vec<u64>,
    },
    /// Replay magnitude frames stored as JSON lines of `{"time", "magnitudes"}`.
    Replay {
        /// Path to the JSON lines file.
        input: PathBuf,
    },
    /// Analyse raw little-endian mono f32 PCM at the configured sample rate.
    Analyse {
        /// Path to the raw sample file.
        input: PathBuf,
    },
}
