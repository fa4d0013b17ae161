/// Result alias that carries the custom [`BeatFrameError`] type.
pub type Result<T> = std::result::Result<T, BeatFrameError>;

/// Common error type for the core crate.
///
/// Starved or empty ticks are deliberately absent: the pipeline treats them as
/// no-op ticks rather than failures.
#[derive(Debug, thiserror::Error)]
pub enum BeatFrameError {
    /// Invalid construction-time parameters. No partially built component is
    /// ever handed back alongside this error.
    #[error("invalid configuration: {0}")]
    Configuration(String),
    /// The audio backend failed to open, start or stop a stream.
    #[error("audio device error: {0}")]
    Device(String),
    /// The transform rejected its buffers.
    #[error("fft error: {0}")]
    Fft(#[from] realfft::FftError),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Configuration or report (de)serialisation failures.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    /// Free-form message for collaborators that have no dedicated variant.
    #[error("{0}")]
    Message(String),
}

impl BeatFrameError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub fn config<T: Into<String>>(msg: T) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn device<T: Into<String>>(msg: T) -> Self {
        Self::Device(msg.into())
    }
}

impl From<&str> for BeatFrameError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for BeatFrameError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
