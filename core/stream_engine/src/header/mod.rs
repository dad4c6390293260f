//! Container detection and header emission.
//!
//! Detection runs a fixed chain of probes (AU, VOC, WAVE) over one shared
//! lookahead buffer; whatever no probe claims is raw data. Probes read only
//! forward, so pipes work.

use std::{
    fmt,
    io::{self, Read},
    str::FromStr,
};

use pcm_params::{HardwareConfig, ParseError};

use crate::{
    error::{Result, StreamError},
    source::read_full,
};

pub mod au;
pub mod voc;
pub mod wave;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Raw,
    Voc,
    Wave,
    Au,
}

impl ContainerKind {
    /// Human-readable name used in the per-file banner.
    pub fn what(self) -> &'static str {
        match self {
            Self::Raw => "raw data",
            Self::Voc => "VOC",
            Self::Wave => "WAVE",
            Self::Au => "Sparc Audio",
        }
    }

    pub fn writer(self) -> &'static dyn ContainerWriter {
        match self {
            Self::Raw => &RawWriter,
            Self::Voc => &voc::VocWriter,
            Self::Wave => &wave::WaveWriter,
            Self::Au => &au::AuWriter,
        }
    }
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Raw => "raw",
            Self::Voc => "voc",
            Self::Wave => "wav",
            Self::Au => "au",
        })
    }
}

impl FromStr for ContainerKind {
    type Err = ParseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "raw" => Ok(Self::Raw),
            "voc" => Ok(Self::Voc),
            "wav" | "wave" => Ok(Self::Wave),
            "au" | "sparc" => Ok(Self::Au),
            _ => Err(ParseError::UnknownFileType(s.to_owned())),
        }
    }
}

/// Per-format header metadata found at the start of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerHeader {
    Raw,
    Voc(voc::VocHeader),
    Wave(wave::WaveHeader),
    Au(au::AuHeader),
}

impl ContainerHeader {
    pub fn kind(&self) -> ContainerKind {
        match self {
            Self::Raw => ContainerKind::Raw,
            Self::Voc(_) => ContainerKind::Voc,
            Self::Wave(_) => ContainerKind::Wave,
            Self::Au(_) => ContainerKind::Au,
        }
    }

    /// Hardware parameters declared by the container. Raw has none and VOC
    /// declares them block by block.
    pub fn config(&self) -> Option<HardwareConfig> {
        match self {
            Self::Wave(h) => Some(h.config),
            Self::Au(h) => Some(h.config),
            Self::Raw | Self::Voc(_) => None,
        }
    }

    /// Declared payload length in bytes.
    pub fn payload_len(&self) -> Option<u64> {
        match self {
            Self::Wave(h) => Some(u64::from(h.data_len)),
            Self::Au(h) => Some(u64::from(h.data_size)),
            Self::Raw | Self::Voc(_) => None,
        }
    }
}

/// Result of a single probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe<T> {
    Match(T),
    NoMatch,
}

impl<T> Probe<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Probe<U> {
        match self {
            Self::Match(value) => Probe::Match(f(value)),
            Self::NoMatch => Probe::NoMatch,
        }
    }
}

/// Bytes read ahead of the payload while probing.
///
/// Nothing is handed back to the reader: a probe that does not match simply
/// leaves its bytes unconsumed for the next probe, and whatever is left at
/// the end becomes the first part of the payload.
pub struct Lookahead<'a, R: ?Sized> {
    reader: &'a mut R,
    name: &'a str,
    buf: Vec<u8>,
    pos: usize,
}

impl<'a, R: Read + ?Sized> Lookahead<'a, R> {
    pub fn new(reader: &'a mut R, name: &'a str) -> Self {
        Self {
            reader,
            name,
            buf: Vec::new(),
            pos: 0,
        }
    }

    /// Buffers up to `n` unconsumed bytes and returns what is available,
    /// which is shorter than `n` only at end of file.
    pub fn fill_to(&mut self, n: usize) -> Result<&[u8]> {
        let have = self.buf.len() - self.pos;
        if have < n {
            let start = self.buf.len();
            self.buf.resize(start + n - have, 0);
            let got = read_full(self.reader, &mut self.buf[start..])
                .map_err(|e| StreamError::io(self.name, e))?;
            self.buf.truncate(start + got);
        }
        Ok(&self.buf[self.pos..])
    }

    /// Like [`fill_to`](Self::fill_to), but end of file is an error.
    pub fn require(&mut self, n: usize) -> Result<&[u8]> {
        let name = self.name;
        let bytes = self.fill_to(n)?;
        if bytes.len() < n {
            return Err(StreamError::io(name, unexpected_eof()));
        }
        Ok(&bytes[..n])
    }

    pub fn consume(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.buf.len());
    }

    /// Consumes `n` bytes, reading and discarding whatever is not buffered
    /// yet.
    pub fn skip(&mut self, n: u64) -> Result<()> {
        let buffered = (self.buf.len() - self.pos) as u64;
        if n <= buffered {
            self.pos += n as usize;
            return Ok(());
        }
        self.buf.clear();
        self.pos = 0;

        let rest = n - buffered;
        let mut limited = (&mut *self.reader).take(rest);
        let skipped =
            io::copy(&mut limited, &mut io::sink()).map_err(|e| StreamError::io(self.name, e))?;
        if skipped < rest {
            return Err(StreamError::io(self.name, unexpected_eof()));
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        self.name
    }

    pub fn into_remainder(mut self) -> Vec<u8> {
        self.buf.drain(..self.pos);
        self.buf
    }
}

fn unexpected_eof() -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, "read error")
}

/// A detected header plus the payload bytes already read past it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detected {
    pub header: ContainerHeader,
    pub lookahead: Vec<u8>,
}

const PROBE_ORDER: [ContainerKind; 3] = [ContainerKind::Au, ContainerKind::Voc, ContainerKind::Wave];

/// Classifies the stream by its first bytes.
///
/// A short or unrecognised start is raw data. Once a probe has matched its
/// magic, any later inconsistency is a hard error rather than a fallback.
pub fn detect<R: Read + ?Sized>(reader: &mut R, name: &str) -> Result<Detected> {
    let mut lookahead = Lookahead::new(reader, name);

    for kind in PROBE_ORDER {
        let probe = match kind {
            ContainerKind::Au => au::probe(&mut lookahead)?.map(ContainerHeader::Au),
            ContainerKind::Voc => voc::probe(&mut lookahead)?.map(ContainerHeader::Voc),
            ContainerKind::Wave => wave::probe(&mut lookahead)?.map(ContainerHeader::Wave),
            ContainerKind::Raw => Probe::NoMatch,
        };
        if let Probe::Match(header) = probe {
            return Ok(Detected {
                header,
                lookahead: lookahead.into_remainder(),
            });
        }
    }

    Ok(Detected {
        header: ContainerHeader::Raw,
        lookahead: lookahead.into_remainder(),
    })
}

/// Per-format output hooks, chosen once when recording starts.
pub trait ContainerWriter {
    /// Header bytes for `payload_bytes` of audio at `config`.
    fn emit_header(&self, config: &HardwareConfig, payload_bytes: u64) -> Result<Vec<u8>>;

    /// Bytes written after the payload.
    fn trailer(&self) -> &'static [u8] {
        &[]
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RawWriter;

impl ContainerWriter for RawWriter {
    fn emit_header(&self, _config: &HardwareConfig, _payload_bytes: u64) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }
}
