//! Command and reply framing for the remote audio protocol
//!
//! All words are big-endian `u32`.
//!
//! Command: `[command id][payload length]` followed by the payload.
//! Reply:   `[0x4321 << 16 | command id low 16][status][payload length]`
//! followed by the payload.
//!
//! Payloads:
//! - Download:       `[buffer id][raw PCM bytes]`
//! - StartPlayback:  `[buffer id][sampling rate][stereo(MSB)|mode][volume][repeat]`
//! - StartRecording: `[sampling rate][stereo(MSB)|mode][volume][sample count]`
//! - others:         empty

use thiserror::Error;

use crate::audio::{Buffer, SharedBuffer};

/// Command header size in bytes
pub const COMMAND_HEADER_SIZE: usize = 8;

/// Reply header size in bytes
pub const REPLY_HEADER_SIZE: usize = 12;

/// High half of every command id
pub const COMMAND_ID_BASE: u32 = 0x1234_0000;

/// High half of every reply id
pub const REPLY_ID_BASE: u32 = 0x4321_0000;

/// Stereo bit in the mode word
pub const STEREO_FLAG: u32 = 0x8000_0000;

/// Status word for a successful reply
pub const STATUS_OK: u32 = 0;

const START_PLAYBACK_PAYLOAD: u32 = 20;
const START_RECORDING_PAYLOAD: u32 = 16;

/// Framing failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Invalid reply id 0x{0:08x}")]
    BadReplyId(u32),

    #[error("Unknown command id 0x{0:08x}")]
    UnknownCommand(u32),

    #[error("Truncated frame: need {need} bytes, got {got}")]
    Truncated { need: usize, got: usize },

    #[error("Unexpected payload length {len} for {kind:?}")]
    BadPayloadLength { kind: CommandKind, len: u32 },
}

/// Command kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum CommandKind {
    Download = 0x1234_0001,
    StartPlayback = 0x1234_0002,
    StopPlayback = 0x1234_0003,
    StartRecording = 0x1234_0004,
    StopRecording = 0x1234_0005,
    GetDeviceInfo = 0x1234_0006,
}

impl CommandKind {
    /// Every kind, in id order
    pub const ALL: [CommandKind; 6] = [
        CommandKind::Download,
        CommandKind::StartPlayback,
        CommandKind::StopPlayback,
        CommandKind::StartRecording,
        CommandKind::StopRecording,
        CommandKind::GetDeviceInfo,
    ];

    /// Position in [`CommandKind::ALL`]
    pub fn index(self) -> usize {
        (self as u32 - COMMAND_ID_BASE - 1) as usize
    }

    /// Low 16 bits carried in the reply id
    pub fn low16(self) -> u32 {
        self as u32 & 0xffff
    }

    /// Reply id answering this command
    pub fn reply_id(self) -> u32 {
        REPLY_ID_BASE | self.low16()
    }

    fn from_low16(low: u32) -> Option<Self> {
        Self::try_from(COMMAND_ID_BASE | low).ok()
    }
}

impl TryFrom<u32> for CommandKind {
    type Error = FrameError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0x1234_0001 => Ok(CommandKind::Download),
            0x1234_0002 => Ok(CommandKind::StartPlayback),
            0x1234_0003 => Ok(CommandKind::StopPlayback),
            0x1234_0004 => Ok(CommandKind::StartRecording),
            0x1234_0005 => Ok(CommandKind::StopRecording),
            0x1234_0006 => Ok(CommandKind::GetDeviceInfo),
            _ => Err(FrameError::UnknownCommand(value)),
        }
    }
}

/// Pack the stereo flag and the device mode into one word
pub fn mode_word(stereo: bool, mode: u32) -> u32 {
    let mode = mode & !STEREO_FLAG;
    if stereo {
        mode | STEREO_FLAG
    } else {
        mode
    }
}

/// A command sent to the device
#[derive(Debug, Clone)]
pub enum Command {
    Download {
        id: u32,
        buffer: SharedBuffer,
    },
    StartPlayback {
        id: u32,
        sampling_rate: u32,
        stereo: bool,
        mode: u32,
        volume: u32,
        repeat: u32,
    },
    StopPlayback,
    StartRecording {
        sampling_rate: u32,
        stereo: bool,
        mode: u32,
        volume: u32,
        samples: u32,
    },
    StopRecording,
    GetDeviceInfo,
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Download { .. } => CommandKind::Download,
            Command::StartPlayback { .. } => CommandKind::StartPlayback,
            Command::StopPlayback => CommandKind::StopPlayback,
            Command::StartRecording { .. } => CommandKind::StartRecording,
            Command::StopRecording => CommandKind::StopRecording,
            Command::GetDeviceInfo => CommandKind::GetDeviceInfo,
        }
    }

    /// Payload length announced in the header
    pub fn payload_len(&self) -> u32 {
        match self {
            Command::Download { buffer, .. } => 4 + buffer.size() as u32,
            Command::StartPlayback { .. } => START_PLAYBACK_PAYLOAD,
            Command::StartRecording { .. } => START_RECORDING_PAYLOAD,
            _ => 0,
        }
    }

    /// Serialize header and payload
    pub fn to_bytes(&self) -> Vec<u8> {
        let len = self.payload_len();
        let mut buf = Vec::with_capacity(COMMAND_HEADER_SIZE + len as usize);

        put(&mut buf, self.kind() as u32);
        put(&mut buf, len);
        match self {
            Command::Download { id, buffer } => {
                put(&mut buf, *id);
                buf.extend_from_slice(buffer.data());
            }
            Command::StartPlayback {
                id,
                sampling_rate,
                stereo,
                mode,
                volume,
                repeat,
            } => {
                put(&mut buf, *id);
                put(&mut buf, *sampling_rate);
                put(&mut buf, mode_word(*stereo, *mode));
                put(&mut buf, *volume);
                put(&mut buf, *repeat);
            }
            Command::StartRecording {
                sampling_rate,
                stereo,
                mode,
                volume,
                samples,
            } => {
                put(&mut buf, *sampling_rate);
                put(&mut buf, mode_word(*stereo, *mode));
                put(&mut buf, *volume);
                put(&mut buf, *samples);
            }
            Command::StopPlayback | Command::StopRecording | Command::GetDeviceInfo => {}
        }
        buf
    }

    /// Parse a command header, returning the kind and payload length
    pub fn parse_header(data: &[u8]) -> Result<(CommandKind, u32), FrameError> {
        check_len(data, COMMAND_HEADER_SIZE)?;
        let kind = CommandKind::try_from(word(data, 0))?;
        Ok((kind, word(data, 1)))
    }

    /// Rebuild a command from its kind and payload (device side)
    ///
    /// Downloaded data carries no channel layout and is decoded as mono.
    pub fn from_payload(kind: CommandKind, payload: &[u8]) -> Result<Self, FrameError> {
        let bad_len = || FrameError::BadPayloadLength {
            kind,
            len: payload.len() as u32,
        };
        match kind {
            CommandKind::Download => {
                if payload.len() < 4 {
                    return Err(bad_len());
                }
                Ok(Command::Download {
                    id: word(payload, 0),
                    buffer: Buffer::with_data(payload[4..].to_vec(), false).into_shared(),
                })
            }
            CommandKind::StartPlayback => {
                if payload.len() != START_PLAYBACK_PAYLOAD as usize {
                    return Err(bad_len());
                }
                let mode = word(payload, 2);
                Ok(Command::StartPlayback {
                    id: word(payload, 0),
                    sampling_rate: word(payload, 1),
                    stereo: mode & STEREO_FLAG != 0,
                    mode: mode & !STEREO_FLAG,
                    volume: word(payload, 3),
                    repeat: word(payload, 4),
                })
            }
            CommandKind::StartRecording => {
                if payload.len() != START_RECORDING_PAYLOAD as usize {
                    return Err(bad_len());
                }
                let mode = word(payload, 1);
                Ok(Command::StartRecording {
                    sampling_rate: word(payload, 0),
                    stereo: mode & STEREO_FLAG != 0,
                    mode: mode & !STEREO_FLAG,
                    volume: word(payload, 2),
                    samples: word(payload, 3),
                })
            }
            CommandKind::StopPlayback => Ok(Command::StopPlayback),
            CommandKind::StopRecording => Ok(Command::StopRecording),
            CommandKind::GetDeviceInfo => Ok(Command::GetDeviceInfo),
        }
    }
}

/// Reply header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyHeader {
    pub kind: CommandKind,
    pub status: u32,
    pub payload_len: u32,
}

impl ReplyHeader {
    pub fn new(kind: CommandKind, status: u32, payload_len: u32) -> Self {
        Self {
            kind,
            status,
            payload_len,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }

    pub fn to_bytes(&self) -> [u8; REPLY_HEADER_SIZE] {
        let mut buf = [0u8; REPLY_HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.kind.reply_id().to_be_bytes());
        buf[4..8].copy_from_slice(&self.status.to_be_bytes());
        buf[8..12].copy_from_slice(&self.payload_len.to_be_bytes());
        buf
    }

    /// Decode a reply header
    ///
    /// The high half must be `0x4321` and the low half must name a known
    /// command.
    pub fn from_bytes(data: &[u8]) -> Result<Self, FrameError> {
        check_len(data, REPLY_HEADER_SIZE)?;
        let id = word(data, 0);
        if id & 0xffff_0000 != REPLY_ID_BASE {
            return Err(FrameError::BadReplyId(id));
        }
        let kind = CommandKind::from_low16(id & 0xffff).ok_or(FrameError::BadReplyId(id))?;
        Ok(Self {
            kind,
            status: word(data, 1),
            payload_len: word(data, 2),
        })
    }
}

fn put(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_be_bytes());
}

fn word(data: &[u8], index: usize) -> u32 {
    let i = index * 4;
    u32::from_be_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]])
}

fn check_len(data: &[u8], need: usize) -> Result<(), FrameError> {
    if data.len() < need {
        return Err(FrameError::Truncated {
            need,
            got: data.len(),
        });
    }
    Ok(())
}
