use crate::hw::HardwareConfig;

/// Budget used when no duration was requested. Large enough to never be
/// reached in practice, but finite so loop counts stay bounded.
pub const UNLIMITED_BYTES: u64 = 0x7fff_ffff;

/// Byte budget for `seconds` of audio at `config`, or the unlimited
/// sentinel when no (or a zero) duration is given.
pub fn byte_budget(config: &HardwareConfig, seconds: Option<u32>) -> u64 {
    match seconds {
        None | Some(0) => UNLIMITED_BYTES,
        Some(secs) => config
            .format
            .byte_size(u64::from(secs) * u64::from(config.rate) * u64::from(config.channels)),
    }
}

/// RIFF data wants an even byte count; only 8-bit mono can produce an odd
/// one, so only that case is rounded.
pub fn even_for_wave(config: &HardwareConfig, bytes: u64) -> u64 {
    if config.bits_per_frame() == 8 {
        bytes + bytes % 2
    } else {
        bytes
    }
}

/// Progress through one transfer run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamCounters {
    remaining: u64,
    transferred: u64,
}

impl StreamCounters {
    pub fn new(budget: u64) -> Self {
        Self {
            remaining: budget,
            transferred: 0,
        }
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn transferred(&self) -> u64 {
        self.transferred
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    pub fn consume(&mut self, bytes: u64) {
        let bytes = bytes.min(self.remaining);
        self.remaining -= bytes;
        self.transferred += bytes;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::SampleFormat;

    #[test]
    fn test_no_duration_is_unlimited() {
        let config = HardwareConfig::default();
        assert_eq!(byte_budget(&config, None), UNLIMITED_BYTES);
        assert_eq!(byte_budget(&config, Some(0)), UNLIMITED_BYTES);
    }

    #[test]
    fn test_duration_uses_rate_channels_and_width() {
        let config = HardwareConfig::new(SampleFormat::S16Le, 2, 44100);
        assert_eq!(byte_budget(&config, Some(2)), 2 * 44100 * 2 * 2);
    }

    #[test]
    fn test_even_rounding_only_for_8bit_mono() {
        let mono8 = HardwareConfig::new(SampleFormat::U8, 1, 8000);
        assert_eq!(even_for_wave(&mono8, 8001), 8002);
        assert_eq!(even_for_wave(&mono8, 8000), 8000);

        let stereo8 = HardwareConfig::new(SampleFormat::U8, 3, 8000);
        assert_eq!(even_for_wave(&stereo8, 8001), 8001);
    }

    #[test]
    fn test_counters_never_go_negative() {
        let mut counters = StreamCounters::new(10);
        counters.consume(4);
        assert_eq!(counters.remaining(), 6);
        counters.consume(100);
        assert_eq!(counters.remaining(), 0);
        assert_eq!(counters.transferred(), 10);
        assert!(counters.is_exhausted());
    }
}
