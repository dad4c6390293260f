//! RIFF/WAVE header. Fields are little-endian.

use std::io::Read;

use pcm_params::{HardwareConfig, SampleFormat};

use super::{ContainerWriter, Lookahead, Probe};
use crate::error::{Result, StreamError};

const RIFF: &[u8; 4] = b"RIFF";
const WAVE: &[u8; 4] = b"WAVE";
const FMT: &[u8; 4] = b"fmt ";
const DATA: &[u8; 4] = b"data";

const RIFF_HEADER_LEN: usize = 12;
const CHUNK_HEADER_LEN: usize = 8;
/// The PCM fields of a `fmt ` chunk; anything beyond is ignored.
const FMT_BODY_LEN: usize = 16;
const PCM_CODE: u16 = 1;

pub const HEADER_LEN: usize = RIFF_HEADER_LEN + CHUNK_HEADER_LEN + FMT_BODY_LEN + CHUNK_HEADER_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaveHeader {
    pub config: HardwareConfig,
    /// Length declared by the `data` chunk.
    pub data_len: u32,
}

fn le_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn le_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn parse_fmt(body: &[u8]) -> Result<HardwareConfig> {
    if le_u16(body, 0) != PCM_CODE {
        return Err(StreamError::format("can't play not PCM-coded WAVE-files"));
    }
    let channels = le_u16(body, 2);
    if channels < 1 {
        return Err(StreamError::format(format!(
            "can't play WAVE-files with {channels} tracks"
        )));
    }
    let format = match le_u16(body, 14) {
        8 => SampleFormat::U8,
        16 => SampleFormat::S16Le,
        bits => {
            return Err(StreamError::format(format!(
                "can't play WAVE-files with sample {bits} bits wide"
            )));
        }
    };
    Ok(HardwareConfig::new(
        format,
        u32::from(channels),
        le_u32(body, 4),
    ))
}

/// Walks the chunk list up to `data`. Chunks other than `fmt ` and `data`
/// are read and discarded, including the pad byte of odd-sized chunks.
pub fn probe<R: Read + ?Sized>(lookahead: &mut Lookahead<'_, R>) -> Result<Probe<WaveHeader>> {
    let bytes = lookahead.fill_to(RIFF_HEADER_LEN)?;
    if bytes.len() < RIFF_HEADER_LEN || &bytes[..4] != RIFF || &bytes[8..12] != WAVE {
        return Ok(Probe::NoMatch);
    }
    lookahead.consume(RIFF_HEADER_LEN);

    let mut config = None;
    loop {
        let chunk = lookahead.require(CHUNK_HEADER_LEN)?;
        let tag = [chunk[0], chunk[1], chunk[2], chunk[3]];
        let len = le_u32(chunk, 4);
        lookahead.consume(CHUNK_HEADER_LEN);
        let padded = u64::from(len) + u64::from(len % 2);

        match &tag {
            FMT => {
                if (len as usize) < FMT_BODY_LEN {
                    return Err(StreamError::format(format!(
                        "unknown length of 'fmt ' chunk (read {len}, should be {FMT_BODY_LEN} at least)"
                    )));
                }
                config = Some(parse_fmt(lookahead.require(FMT_BODY_LEN)?)?);
                lookahead.skip(padded)?;
            }
            DATA => {
                let Some(config) = config else {
                    return Err(StreamError::format(format!(
                        "{}: 'data' chunk before 'fmt ' chunk",
                        lookahead.name()
                    )));
                };
                return Ok(Probe::Match(WaveHeader {
                    config,
                    data_len: len,
                }));
            }
            _ => lookahead.skip(padded)?,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WaveWriter;

impl ContainerWriter for WaveWriter {
    fn emit_header(&self, config: &HardwareConfig, payload_bytes: u64) -> Result<Vec<u8>> {
        let bits: u16 = match config.format {
            SampleFormat::U8 => 8,
            SampleFormat::S16Le => 16,
            other => {
                return Err(StreamError::format(format!(
                    "Wave doesn't support {other} format..."
                )));
            }
        };
        let channels = u16::try_from(config.channels)
            .map_err(|_| StreamError::format(format!("{} channels", config.channels)))?;
        let data_len = u32::try_from(payload_bytes).unwrap_or(u32::MAX);
        let riff_len = data_len.saturating_add((HEADER_LEN - CHUNK_HEADER_LEN) as u32);
        let block_align = channels * bits.div_ceil(8);
        let byte_rate = u32::from(block_align) * config.rate;

        let mut bytes = Vec::with_capacity(HEADER_LEN);
        bytes.extend_from_slice(RIFF);
        bytes.extend_from_slice(&riff_len.to_le_bytes());
        bytes.extend_from_slice(WAVE);

        bytes.extend_from_slice(FMT);
        bytes.extend_from_slice(&(FMT_BODY_LEN as u32).to_le_bytes());
        bytes.extend_from_slice(&PCM_CODE.to_le_bytes());
        bytes.extend_from_slice(&channels.to_le_bytes());
        bytes.extend_from_slice(&config.rate.to_le_bytes());
        bytes.extend_from_slice(&byte_rate.to_le_bytes());
        bytes.extend_from_slice(&block_align.to_le_bytes());
        bytes.extend_from_slice(&bits.to_le_bytes());

        bytes.extend_from_slice(DATA);
        bytes.extend_from_slice(&data_len.to_le_bytes());
        Ok(bytes)
    }
}
