//! Creative Voice File header. Blocks live in [`crate::voc::block`].

use std::io::Read;

use pcm_params::{HardwareConfig, SampleFormat};

use super::{ContainerWriter, Lookahead, Probe};
use crate::{
    error::{Result, StreamError},
    voc::block::{self, VocBlock},
};

pub const MAGIC: &[u8; 20] = b"Creative Voice File\x1a";
pub const HEADER_LEN: usize = 26;
/// Version written to new files (1.10).
pub const VERSION: u16 = 0x010a;
const CHECKSUM_BASE: u16 = 0x1233;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VocHeader {
    pub version: u16,
    /// Offset of the first block from the start of the file.
    pub header_len: u16,
}

impl VocHeader {
    pub fn major(&self) -> u8 {
        (self.version >> 8) as u8
    }

    pub fn minor(&self) -> u8 {
        (self.version & 0xff) as u8
    }

    fn to_bytes(self) -> [u8; HEADER_LEN] {
        let mut bytes = [0u8; HEADER_LEN];
        bytes[..20].copy_from_slice(MAGIC);
        bytes[20..22].copy_from_slice(&self.header_len.to_le_bytes());
        bytes[22..24].copy_from_slice(&self.version.to_le_bytes());
        bytes[24..26].copy_from_slice(&CHECKSUM_BASE.wrapping_sub(self.version).to_le_bytes());
        bytes
    }
}

fn le_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

/// A matching magic commits to VOC: a bad version checksum is a corrupt
/// file, not a reason to try WAVE. Leaves the lookahead at the first block.
pub fn probe<R: Read + ?Sized>(lookahead: &mut Lookahead<'_, R>) -> Result<Probe<VocHeader>> {
    let bytes = lookahead.fill_to(HEADER_LEN)?;
    if bytes.len() < HEADER_LEN || &bytes[..20] != MAGIC {
        return Ok(Probe::NoMatch);
    }

    let header = VocHeader {
        header_len: le_u16(bytes, 20),
        version: le_u16(bytes, 22),
    };
    let coded = le_u16(bytes, 24);
    if header.version != CHECKSUM_BASE.wrapping_sub(coded) {
        return Err(StreamError::format(format!(
            "{}: corrupt VOC header (version {:#06x}, check {:#06x})",
            lookahead.name(),
            header.version,
            coded
        )));
    }
    if usize::from(header.header_len) < HEADER_LEN {
        return Err(StreamError::format(format!(
            "{}: invalid VOC header length {}",
            lookahead.name(),
            header.header_len
        )));
    }

    lookahead.skip(u64::from(header.header_len))?;
    Ok(Probe::Match(header))
}

#[derive(Debug, Clone, Copy)]
pub struct VocWriter;

impl ContainerWriter for VocWriter {
    /// File header, a stereo extension when recording more than one
    /// channel, and the header of the single voice-data block.
    fn emit_header(&self, config: &HardwareConfig, payload_bytes: u64) -> Result<Vec<u8>> {
        if config.format != SampleFormat::U8 {
            return Err(StreamError::format(format!(
                "VOC doesn't support {} format...",
                config.format
            )));
        }

        let header = VocHeader {
            version: VERSION,
            header_len: HEADER_LEN as u16,
        };
        let mut bytes = header.to_bytes().to_vec();

        if config.channels > 1 {
            VocBlock::ExtendedStereo {
                time_constant: block::extended_time_constant(config.rate, true),
                pack: 0,
                mode: block::MODE_STEREO,
            }
            .encode_into(0, &mut bytes);
        }
        VocBlock::VoiceData {
            rate_code: block::voice_rate_code(config.rate),
            pack: 0,
        }
        .encode_into(payload_bytes, &mut bytes);

        Ok(bytes)
    }

    fn trailer(&self) -> &'static [u8] {
        &[block::TERMINATOR]
    }
}
