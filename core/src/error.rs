use thiserror::Error;

#[derive(Debug, Error)]
pub enum TapeError {
    #[error("Wave file format error: {0}")]
    WaveFormat(String),

    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TapeError>;
