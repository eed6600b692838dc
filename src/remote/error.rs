//! Remote client error types

use thiserror::Error;

use crate::protocol::{CommandKind, FrameError};

/// Errors that can occur talking to the device
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Connection to {0} timed out")]
    ConnectTimeout(String),

    #[error("Not connected")]
    Disconnected,

    #[error("{0:?} already in progress")]
    Busy(CommandKind),

    #[error("Timed out waiting for {0:?}")]
    Timeout(CommandKind),

    #[error("Device rejected {kind:?} with status {status}")]
    DeviceStatus { kind: CommandKind, status: u32 },

    #[error("{kind:?} reply carries {len} bytes, more than the {capacity} expected")]
    PayloadTooLarge {
        kind: CommandKind,
        len: usize,
        capacity: usize,
    },

    #[error("Unknown buffer: {0}")]
    UnknownBuffer(String),

    #[error("Framing error: {0}")]
    Frame(#[from] FrameError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
