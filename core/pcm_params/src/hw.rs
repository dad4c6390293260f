use std::ops::RangeInclusive;

use crate::{error::ParseError, format::SampleFormat};

pub const DEFAULT_RATE: u32 = 8000;
pub const CHANNEL_RANGE: RangeInclusive<u32> = 1..=128;
pub const RATE_RANGE: RangeInclusive<u32> = 2000..=256_000;

/// How frames are laid out when handed to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    #[default]
    Interleaved,
    /// One buffer per channel.
    NonInterleaved,
    MemoryMapped,
}

/// The transfer configuration a device session negotiates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardwareConfig {
    pub format: SampleFormat,
    pub channels: u32,
    pub rate: u32,
    pub access: AccessMode,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            format: SampleFormat::U8,
            channels: 1,
            rate: DEFAULT_RATE,
            access: AccessMode::Interleaved,
        }
    }
}

impl HardwareConfig {
    pub fn new(format: SampleFormat, channels: u32, rate: u32) -> Self {
        Self {
            format,
            channels,
            rate,
            access: AccessMode::Interleaved,
        }
    }

    pub fn with_access(mut self, access: AccessMode) -> Self {
        self.access = access;
        self
    }

    pub fn validate(&self) -> Result<(), ParseError> {
        if !CHANNEL_RANGE.contains(&self.channels) {
            return Err(ParseError::InvalidChannels(self.channels));
        }
        if !RATE_RANGE.contains(&self.rate) {
            return Err(ParseError::InvalidRate(self.rate));
        }
        Ok(())
    }

    pub fn bits_per_sample(&self) -> usize {
        self.format.physical_width()
    }

    pub fn bits_per_frame(&self) -> usize {
        self.bits_per_sample() * self.channels as usize
    }

    pub fn frame_bytes(&self) -> usize {
        self.bits_per_frame() / 8
    }

    /// "Mono", "Stereo" or "Channels N", as printed in the per-file banner.
    pub fn channel_label(&self) -> String {
        match self.channels {
            1 => "Mono".to_owned(),
            2 => "Stereo".to_owned(),
            n => format!("Channels {n}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_8khz_unsigned_mono() {
        let config = HardwareConfig::default();
        assert_eq!(config.format, SampleFormat::U8);
        assert_eq!(config.channels, 1);
        assert_eq!(config.rate, 8000);
        assert_eq!(config.frame_bytes(), 1);
    }

    #[test]
    fn test_frame_width_follows_format_and_channels() {
        let cd = HardwareConfig::new(SampleFormat::S16Le, 2, 44100);
        assert_eq!(cd.bits_per_frame(), 32);
        assert_eq!(cd.frame_bytes(), 4);
    }

    #[test]
    fn test_validate_rejects_zero_channels_and_bad_rates() {
        let mut config = HardwareConfig::default();
        config.channels = 0;
        assert_eq!(config.validate(), Err(ParseError::InvalidChannels(0)));

        config.channels = 2;
        config.rate = 1000;
        assert_eq!(config.validate(), Err(ParseError::InvalidRate(1000)));

        config.rate = 48000;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_channel_label() {
        let mut config = HardwareConfig::default();
        assert_eq!(config.channel_label(), "Mono");
        config.channels = 2;
        assert_eq!(config.channel_label(), "Stereo");
        config.channels = 6;
        assert_eq!(config.channel_label(), "Channels 6");
    }
}
