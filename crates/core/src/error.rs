/// Result alias that carries the custom [`BeatError`] type.
pub type Result<T> = std::result::Result<T, BeatError>;

/// Common error type for the core crate.
///
/// Beat evaluation itself never fails; errors only come from building a
/// detector, loading configuration or running the PCM adapter.
#[derive(Debug, thiserror::Error)]
pub enum BeatError {
    /// A configuration value is outside the range the detector supports.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Free-form failure surfaced to the command line.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Configuration or replay data could not be parsed.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    /// The FFT planner rejected the provided buffers.
    #[error("{0}")]
    Fft(#[from] realfft::FftError),
}

impl BeatError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub(crate) fn config<T: Into<String>>(msg: T) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

impl From<&str> for BeatError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for BeatError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
