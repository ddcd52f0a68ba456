use thiserror::Error;

/// All errors produced by pipeplay-core.
#[derive(Debug, Error)]
pub enum PipeError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("could not allocate {what}: {detail}")]
    Allocation { what: &'static str, detail: String },

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("no default output device found")]
    NoDefaultOutputDevice,

    #[error("stream unexpectedly stopped: {0}")]
    StreamInactive(String),

    #[error("input pipe error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipeError>;
