//! Audio error types

use thiserror::Error;

/// Errors that can occur in the audio subsystem
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open device: {0}")]
    DeviceOpenFailed(String),

    #[error("Stream error: {0}")]
    StreamError(String),

    #[error("Unsupported buffer file: {0}")]
    UnsupportedFile(String),

    #[error("Invalid buffer layout: {0}")]
    InvalidLayout(String),

    #[error("Operation already running")]
    Busy,

    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("Session thread stopped")]
    SessionClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
