//! Voice-file block layout: a one-byte type, a 24-bit little-endian length
//! and a type-specific run of fixed fields, followed by payload for the
//! audio-bearing types.

use crate::error::{Result, StreamError};

pub const BLOCK_HEADER_LEN: usize = 4;
/// Largest length a block header can carry.
pub const MAX_BLOCK_LEN: u32 = 0x00ff_ffff;
pub const TERMINATOR: u8 = 0;
pub const MODE_STEREO: u8 = 1;
/// Repeat count meaning "loop forever".
pub const REPEAT_FOREVER: u16 = 0xffff;

const TAG_TERMINATOR: u8 = 0;
const TAG_VOICE_DATA: u8 = 1;
const TAG_CONTINUATION: u8 = 2;
const TAG_SILENCE: u8 = 3;
const TAG_MARKER: u8 = 4;
const TAG_ASCII_TEXT: u8 = 5;
const TAG_REPEAT_START: u8 = 6;
const TAG_REPEAT_END: u8 = 7;
const TAG_EXTENDED: u8 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub tag: u8,
    /// Fixed fields plus payload.
    pub len: u32,
}

impl BlockHeader {
    pub fn parse(bytes: &[u8]) -> Self {
        Self {
            tag: bytes[0],
            len: u32::from_le_bytes([bytes[1], bytes[2], bytes[3], 0]),
        }
    }

    /// Size of the fixed fields that follow the header, or `None` for an
    /// unknown block type.
    pub fn fixed_len(&self) -> Option<usize> {
        match self.tag {
            TAG_TERMINATOR | TAG_CONTINUATION | TAG_ASCII_TEXT | TAG_REPEAT_END => Some(0),
            TAG_VOICE_DATA | TAG_MARKER | TAG_REPEAT_START => Some(2),
            TAG_SILENCE => Some(3),
            TAG_EXTENDED => Some(4),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VocBlock {
    Terminator,
    VoiceData { rate_code: u8, pack: u8 },
    Continuation,
    /// `frames` silent frames at the rate given by `rate_code`.
    Silence { frames: u16, rate_code: u8 },
    Marker(u16),
    AsciiText,
    RepeatStart { count: u16 },
    RepeatEnd,
    ExtendedStereo { time_constant: u16, pack: u8, mode: u8 },
}

impl VocBlock {
    /// Builds a block from its header tag and exactly
    /// [`fixed_len`](BlockHeader::fixed_len) bytes of fields.
    pub fn decode(header: BlockHeader, fields: &[u8]) -> Result<Self> {
        let u16_at = |at: usize| u16::from_le_bytes([fields[at], fields[at + 1]]);
        let block = match header.tag {
            TAG_TERMINATOR => Self::Terminator,
            TAG_VOICE_DATA => Self::VoiceData {
                rate_code: fields[0],
                pack: fields[1],
            },
            TAG_CONTINUATION => Self::Continuation,
            TAG_SILENCE => Self::Silence {
                frames: u16_at(0),
                rate_code: fields[2],
            },
            TAG_MARKER => Self::Marker(u16_at(0)),
            TAG_ASCII_TEXT => Self::AsciiText,
            TAG_REPEAT_START => Self::RepeatStart { count: u16_at(0) },
            TAG_REPEAT_END => Self::RepeatEnd,
            TAG_EXTENDED => Self::ExtendedStereo {
                time_constant: u16_at(0),
                pack: fields[2],
                mode: fields[3],
            },
            tag => {
                return Err(StreamError::protocol(format!(
                    "unknown blocktype {tag}. terminate."
                )));
            }
        };
        Ok(block)
    }

    fn tag(&self) -> u8 {
        match self {
            Self::Terminator => TAG_TERMINATOR,
            Self::VoiceData { .. } => TAG_VOICE_DATA,
            Self::Continuation => TAG_CONTINUATION,
            Self::Silence { .. } => TAG_SILENCE,
            Self::Marker(_) => TAG_MARKER,
            Self::AsciiText => TAG_ASCII_TEXT,
            Self::RepeatStart { .. } => TAG_REPEAT_START,
            Self::RepeatEnd => TAG_REPEAT_END,
            Self::ExtendedStereo { .. } => TAG_EXTENDED,
        }
    }

    /// Appends the block header and fixed fields; `payload_len` bytes of
    /// payload are expected to follow. Oversized lengths are clamped to
    /// what 24 bits can express.
    pub fn encode_into(&self, payload_len: u64, out: &mut Vec<u8>) {
        let mut fields = Vec::with_capacity(4);
        match *self {
            Self::Terminator
            | Self::Continuation
            | Self::AsciiText
            | Self::RepeatEnd => {}
            Self::VoiceData { rate_code, pack } => fields.extend_from_slice(&[rate_code, pack]),
            Self::Silence { frames, rate_code } => {
                fields.extend_from_slice(&frames.to_le_bytes());
                fields.push(rate_code);
            }
            Self::Marker(id) => fields.extend_from_slice(&id.to_le_bytes()),
            Self::RepeatStart { count } => fields.extend_from_slice(&count.to_le_bytes()),
            Self::ExtendedStereo {
                time_constant,
                pack,
                mode,
            } => {
                fields.extend_from_slice(&time_constant.to_le_bytes());
                fields.extend_from_slice(&[pack, mode]);
            }
        }

        out.push(self.tag());
        if *self == Self::Terminator {
            return;
        }
        let len = (payload_len + fields.len() as u64).min(u64::from(MAX_BLOCK_LEN)) as u32;
        out.extend_from_slice(&len.to_le_bytes()[..3]);
        out.extend_from_slice(&fields);
    }
}

/// Sample rate encoded by a voice-data or silence rate byte.
pub fn voice_rate(rate_code: u8) -> u32 {
    1_000_000 / (256 - u32::from(rate_code))
}

pub fn voice_rate_code(rate: u32) -> u8 {
    let period = (1_000_000 / rate.max(1)).clamp(1, 256);
    (256 - period) as u8
}

/// Per-channel sample rate encoded by an extended block.
pub fn extended_rate(time_constant: u16, stereo: bool) -> u32 {
    let rate = 256_000_000 / (65_536 - u32::from(time_constant));
    if stereo { rate / 2 } else { rate }
}

pub fn extended_time_constant(rate: u32, stereo: bool) -> u16 {
    let total = if stereo { rate * 2 } else { rate };
    let period = (256_000_000 / total.max(1)).clamp(1, 65_536);
    (65_536 - period) as u16
}
