//! Audio module
//!
//! PCM buffers, test signal generation, and host playback/recording.

mod buffer;
mod device;
mod error;
mod local;
pub mod signal;

pub use buffer::{Buffer, MonoMode, SharedBuffer, BYTES_PER_SAMPLE, MONO_EXT, STEREO_EXT};
pub use device::{list_input_devices, list_output_devices, AudioDevice};
pub use error::AudioError;
pub use local::{
    completion_timeout, CpalLocalAudio, LocalAudio, SessionState, SharedLocalAudio,
    COMPLETION_SLACK,
};
