use std::{fmt, str::FromStr};

use crate::error::ParseError;

/// Sample encodings understood by the engine.
///
/// Wide formats are stored in the byte order named by the variant. The 24-bit
/// formats occupy a 32-bit container, so their physical width is 32.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    S8,
    U8,
    S16Le,
    S16Be,
    U16Le,
    U16Be,
    S24Le,
    S24Be,
    S32Le,
    S32Be,
    U32Le,
    U32Be,
    FloatLe,
    FloatBe,
    MuLaw,
    ALaw,
}

impl SampleFormat {
    pub const ALL: [Self; 16] = [
        Self::S8,
        Self::U8,
        Self::S16Le,
        Self::S16Be,
        Self::U16Le,
        Self::U16Be,
        Self::S24Le,
        Self::S24Be,
        Self::S32Le,
        Self::S32Be,
        Self::U32Le,
        Self::U32Be,
        Self::FloatLe,
        Self::FloatBe,
        Self::MuLaw,
        Self::ALaw,
    ];

    /// Bits per sample as laid out in memory.
    pub fn physical_width(self) -> usize {
        match self {
            Self::S8 | Self::U8 | Self::MuLaw | Self::ALaw => 8,
            Self::S16Le | Self::S16Be | Self::U16Le | Self::U16Be => 16,
            Self::S24Le
            | Self::S24Be
            | Self::S32Le
            | Self::S32Be
            | Self::U32Le
            | Self::U32Be
            | Self::FloatLe
            | Self::FloatBe => 32,
        }
    }

    pub fn sample_bytes(self) -> usize {
        self.physical_width() / 8
    }

    /// Number of bytes needed to store `samples` samples.
    pub fn byte_size(self, samples: u64) -> u64 {
        samples * self.physical_width() as u64 / 8
    }

    /// Bit pattern of one silent sample, in storage order.
    fn silence_pattern(self) -> &'static [u8] {
        match self {
            Self::U8 => &[0x80],
            Self::MuLaw => &[0x7f],
            Self::ALaw => &[0x55],
            Self::U16Le => &[0x00, 0x80],
            Self::U16Be => &[0x80, 0x00],
            Self::U32Le => &[0x00, 0x00, 0x00, 0x80],
            Self::U32Be => &[0x80, 0x00, 0x00, 0x00],
            Self::S8 => &[0x00],
            Self::S16Le | Self::S16Be => &[0x00, 0x00],
            Self::S24Le
            | Self::S24Be
            | Self::S32Le
            | Self::S32Be
            | Self::FloatLe
            | Self::FloatBe => &[0x00, 0x00, 0x00, 0x00],
        }
    }

    /// Overwrites `buf` with silence. A trailing partial sample is filled
    /// with the leading bytes of the pattern.
    pub fn fill_silence(self, buf: &mut [u8]) {
        let pattern = self.silence_pattern();
        for (byte, value) in buf.iter_mut().zip(pattern.iter().cycle()) {
            *byte = *value;
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::S8 => "S8",
            Self::U8 => "U8",
            Self::S16Le => "S16_LE",
            Self::S16Be => "S16_BE",
            Self::U16Le => "U16_LE",
            Self::U16Be => "U16_BE",
            Self::S24Le => "S24_LE",
            Self::S24Be => "S24_BE",
            Self::S32Le => "S32_LE",
            Self::S32Be => "S32_BE",
            Self::U32Le => "U32_LE",
            Self::U32Be => "U32_BE",
            Self::FloatLe => "FLOAT_LE",
            Self::FloatBe => "FLOAT_BE",
            Self::MuLaw => "MU_LAW",
            Self::ALaw => "A_LAW",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::S8 => "Signed 8 bit",
            Self::U8 => "Unsigned 8 bit",
            Self::S16Le => "Signed 16 bit Little Endian",
            Self::S16Be => "Signed 16 bit Big Endian",
            Self::U16Le => "Unsigned 16 bit Little Endian",
            Self::U16Be => "Unsigned 16 bit Big Endian",
            Self::S24Le => "Signed 24 bit Little Endian",
            Self::S24Be => "Signed 24 bit Big Endian",
            Self::S32Le => "Signed 32 bit Little Endian",
            Self::S32Be => "Signed 32 bit Big Endian",
            Self::U32Le => "Unsigned 32 bit Little Endian",
            Self::U32Be => "Unsigned 32 bit Big Endian",
            Self::FloatLe => "Float 32 bit Little Endian",
            Self::FloatBe => "Float 32 bit Big Endian",
            Self::MuLaw => "Mu-Law",
            Self::ALaw => "A-Law",
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SampleFormat {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|format| format.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseError::UnknownFormat(s.to_owned()))
    }
}
