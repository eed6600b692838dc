//! Remote audio wire protocol
//!
//! Defines the command and reply framing spoken with the device.

mod command;

pub use command::{
    mode_word, Command, CommandKind, FrameError, ReplyHeader, COMMAND_HEADER_SIZE,
    COMMAND_ID_BASE, REPLY_HEADER_SIZE, REPLY_ID_BASE, STATUS_OK, STEREO_FLAG,
};
