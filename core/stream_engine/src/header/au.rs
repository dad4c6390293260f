//! Sun/NeXT `.snd` header. Every field is a big-endian u32.

use std::io::Read;

use pcm_params::{
    HardwareConfig, SampleFormat,
    hw::{CHANNEL_RANGE, RATE_RANGE},
};

use super::{ContainerWriter, Lookahead, Probe};
use crate::error::{Result, StreamError};

pub const MAGIC: &[u8; 4] = b".snd";
pub const HEADER_LEN: usize = 24;
const MAX_HEADER_LEN: u32 = 128;

const ENCODING_MULAW: u32 = 1;
const ENCODING_LIN8: u32 = 2;
const ENCODING_LIN16: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuHeader {
    pub config: HardwareConfig,
    /// Declared payload length; `0xFFFF_FFFF` when the writer did not know.
    pub data_size: u32,
}

fn be_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn parse(bytes: &[u8]) -> Option<(AuHeader, u32)> {
    if bytes.len() < HEADER_LEN || &bytes[..4] != MAGIC {
        return None;
    }
    let header_len = be_u32(bytes, 4);
    if !(HEADER_LEN as u32..=MAX_HEADER_LEN).contains(&header_len) {
        return None;
    }

    let format = match be_u32(bytes, 12) {
        ENCODING_MULAW => SampleFormat::MuLaw,
        ENCODING_LIN8 => SampleFormat::U8,
        ENCODING_LIN16 => SampleFormat::U16Le,
        _ => return None,
    };
    let rate = be_u32(bytes, 16);
    let channels = be_u32(bytes, 20);
    if !RATE_RANGE.contains(&rate) || !CHANNEL_RANGE.contains(&channels) {
        return None;
    }

    let header = AuHeader {
        config: HardwareConfig::new(format, channels, rate),
        data_size: be_u32(bytes, 8),
    };
    Some((header, header_len))
}

/// Anything that does not look exactly like a supported AU header falls
/// through to the next probe.
pub fn probe<R: Read + ?Sized>(lookahead: &mut Lookahead<'_, R>) -> Result<Probe<AuHeader>> {
    let Some((header, header_len)) = parse(lookahead.fill_to(HEADER_LEN)?) else {
        return Ok(Probe::NoMatch);
    };
    // annotation fields after the fixed part are not used
    lookahead.skip(u64::from(header_len))?;
    Ok(Probe::Match(header))
}

#[derive(Debug, Clone, Copy)]
pub struct AuWriter;

impl ContainerWriter for AuWriter {
    fn emit_header(&self, config: &HardwareConfig, payload_bytes: u64) -> Result<Vec<u8>> {
        let encoding = match config.format {
            SampleFormat::MuLaw => ENCODING_MULAW,
            SampleFormat::U8 => ENCODING_LIN8,
            SampleFormat::S16Le => ENCODING_LIN16,
            other => {
                return Err(StreamError::format(format!(
                    "Sparc Audio doesn't support {other} format..."
                )));
            }
        };
        let data_size = u32::try_from(payload_bytes).unwrap_or(u32::MAX);

        let mut bytes = Vec::with_capacity(HEADER_LEN);
        bytes.extend_from_slice(MAGIC);
        for field in [
            HEADER_LEN as u32,
            data_size,
            encoding,
            config.rate,
            config.channels,
        ] {
            bytes.extend_from_slice(&field.to_be_bytes());
        }
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Read};

    use super::*;
    use crate::header::{ContainerHeader, detect};

    fn au_bytes(header_len: u32, encoding: u32, rate: u32, channels: u32) -> Vec<u8> {
        let mut bytes = MAGIC.to_vec();
        for field in [header_len, 1000, encoding, rate, channels] {
            bytes.extend_from_slice(&field.to_be_bytes());
        }
        bytes.resize(header_len.max(24) as usize, 0xAA);
        bytes.extend_from_slice(&[1, 2, 3, 4]);
        bytes
    }

    #[test]
    fn test_detects_mulaw_and_skips_annotation() {
        let mut source = Cursor::new(au_bytes(32, ENCODING_MULAW, 8000, 1));
        let detected = detect(&mut source, "tone.au").unwrap();
        let ContainerHeader::Au(header) = detected.header else {
            panic!("expected AU, got {:?}", detected.header);
        };
        assert_eq!(header.config.format, SampleFormat::MuLaw);
        assert_eq!(header.config.rate, 8000);
        assert_eq!(header.data_size, 1000);

        // the annotation may be skipped straight from the reader
        let mut payload = detected.lookahead;
        source.read_to_end(&mut payload).unwrap();
        assert_eq!(payload, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_lin16_reads_as_u16_le() {
        let mut source = Cursor::new(au_bytes(24, ENCODING_LIN16, 22050, 2));
        let detected = detect(&mut source, "x.au").unwrap();
        assert_eq!(
            detected.header.config(),
            Some(HardwareConfig::new(SampleFormat::U16Le, 2, 22050))
        );
    }

    #[test]
    fn test_header_size_out_of_range_falls_through_to_raw() {
        for header_len in [16, 129, 4096] {
            let bytes = au_bytes(header_len, ENCODING_LIN8, 8000, 1);
            let mut source = Cursor::new(bytes.clone());
            let detected = detect(&mut source, "odd.au").unwrap();
            assert_eq!(detected.header, ContainerHeader::Raw);
            assert_eq!(&detected.lookahead[..], &bytes[..detected.lookahead.len()]);
        }
    }

    #[test]
    fn test_unknown_encoding_falls_through() {
        let mut source = Cursor::new(au_bytes(24, 27, 8000, 1));
        assert_eq!(
            detect(&mut source, "adpcm.au").unwrap().header,
            ContainerHeader::Raw
        );
    }

    #[test]
    fn test_emit_is_big_endian() {
        let config = HardwareConfig::new(SampleFormat::S16Le, 2, 44100);
        let bytes = AuWriter.emit_header(&config, 0x0102_0304).unwrap();
        assert_eq!(bytes.len(), HEADER_LEN);
        assert_eq!(&bytes[..4], b".snd");
        assert_eq!(&bytes[4..8], &[0, 0, 0, 24]);
        assert_eq!(&bytes[8..12], &[1, 2, 3, 4]);
        assert_eq!(&bytes[12..16], &[0, 0, 0, 3]);
        assert_eq!(&bytes[16..20], &44100u32.to_be_bytes());
        assert_eq!(&bytes[20..24], &[0, 0, 0, 2]);
    }

    #[test]
    fn test_emit_rejects_unsupported_format() {
        let config = HardwareConfig::new(SampleFormat::FloatLe, 1, 8000);
        assert!(matches!(
            AuWriter.emit_header(&config, 10),
            Err(StreamError::Format(_))
        ));
    }
}
