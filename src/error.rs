//! Error taxonomy for the capture pipeline and the session catalog.
//!
//! Decode errors never leave the controller; writer and transport failures
//! surface as [`PipelineError`] values to whoever drives the recording.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Malformed packet: {len} bytes, need at least {min}")]
    MalformedPacket { len: usize, min: usize },
}

#[derive(Error, Debug)]
pub enum WriterError {
    #[error("Failed to create {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
    #[error("Writer is {state}, cannot {operation}")]
    InvalidState {
        state: &'static str,
        operation: &'static str,
    },
    #[error("WAV data chunk is full at {max_samples} samples")]
    DataLimit { max_samples: u64 },
    #[error("Invalid WAV header: {0}")]
    InvalidHeader(String),
    #[error("Writer task ended unexpectedly: {0}")]
    TaskFailed(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Device did not acknowledge {command} command: {reason}")]
    CommandFailed {
        command: &'static str,
        reason: String,
    },
    #[error("Device is disconnected")]
    Disconnected,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Session not found: {0}")]
    SessionNotFound(String),
    #[error("Recording not found: {0}")]
    RecordingNotFound(String),
    #[error("Invalid name: {0:?}")]
    InvalidName(String),
}

/// Failures reported by the recording controller.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("A stream is already active")]
    AlreadyStreaming,
    #[error("No stream is active")]
    NotStreaming,
    #[error("Writer error: {0}")]
    Writer(#[from] WriterError),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Writer channel closed")]
    WriterClosed,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}
