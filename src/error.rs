use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The host could not provide an audio output context.
    #[error("Audio output unavailable: {0}")]
    AudioUnavailable(String),

    /// An offline context could not be allocated for these parameters.
    #[error("Cannot allocate offline context ({frames} frames at {sample_rate} Hz)")]
    OfflineContext { sample_rate: f64, frames: usize },

    #[error("Invalid fundamental frequency {0} Hz")]
    InvalidFrequency(f64),

    #[error("Invalid note set: {0}")]
    InvalidNoteSet(String),

    #[error("Invalid config: {0}")]
    Config(String),

    #[error("Config parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The engine was disposed and can no longer produce audio.
    #[error("Engine has been disposed")]
    Disposed,
}
