//! Remote device client
//!
//! Drives the device side of the audio protocol over TCP: buffer download,
//! playback, recording and device information.

mod client;
mod error;
mod slots;

pub use client::{RemoteAudio, RemoteTimeouts};
pub use error::RemoteError;
pub use slots::{CommandSlots, Expectation, Reply, ReplyBody, ReplyResult};
