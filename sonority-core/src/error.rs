//! Error types for Sonority

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SonorityError {
    /// A handle does not refer to a live source, buffer or context.
    #[error("Invalid name: {0}")]
    InvalidName(String),

    /// An argument is out of range.
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// The operation is not valid in the current state.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Audio format error: {0}")]
    AudioFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Engine error: {0}")]
    Engine(String),
}

impl From<std::collections::TryReserveError> for SonorityError {
    fn from(e: std::collections::TryReserveError) -> Self {
        Self::OutOfMemory(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SonorityError>;
