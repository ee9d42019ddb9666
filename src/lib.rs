//! Capture pipeline for BLE audio recorders.
//!
//! Notification packets from the device are decoded, checked for sequence
//! gaps and streamed into WAV files whose header is patched when the
//! recording ends. Finished recordings are filed into named sessions.

pub mod audio;
pub mod capture;
pub mod command;
pub mod config;
pub mod db;
pub mod error;
pub mod session;
pub mod storage;

pub use audio::{AudioFormat, CHANNELS, SAMPLE_RATE};
pub use capture::{
    CaptureMode, CaptureTransport, ConnectionState, FinishedRecording, RecordingController,
    StreamPhase, StreamStats,
};
pub use config::Config;
pub use error::{DecodeError, PipelineError, StoreError, TransportError, WriterError};
pub use session::{RecordingEntry, Session, SessionStore};
