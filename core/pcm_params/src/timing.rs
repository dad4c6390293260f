/// Requested device timing, in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingHints {
    pub fragment_us: u32,
    pub buffer_us: u32,
    pub avail_min_us: u32,
    pub xfer_min_us: u32,
}

impl Default for TimingHints {
    fn default() -> Self {
        Self {
            fragment_us: 125_000,
            buffer_us: 500_000,
            avail_min_us: 50_000,
            xfer_min_us: 50_000,
        }
    }
}

impl TimingHints {
    pub fn period_frames(&self, rate: u32) -> usize {
        frames_for_micros(rate, self.fragment_us).max(1)
    }

    pub fn buffer_frames(&self, rate: u32) -> usize {
        frames_for_micros(rate, self.buffer_us).max(1)
    }
}

/// What the device does when the application cannot keep up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum XrunMode {
    /// Transfers are whole periods; short writes are padded with silence.
    #[default]
    Fragment,
    /// Transfers go out as soon as any frames are available.
    Asap,
}

pub fn frames_for_micros(rate: u32, micros: u32) -> usize {
    (u64::from(rate) * u64::from(micros) / 1_000_000) as usize
}

pub fn micros_for_frames(rate: u32, frames: usize) -> u64 {
    frames as u64 * 1_000_000 / u64::from(rate.max(1))
}

/// Software-side thresholds derived from the negotiated hardware sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwParams {
    /// Room (in frames) the device must report before a waiting writer wakes.
    pub avail_min: usize,
    pub xfer_min: usize,
    pub xfer_align: usize,
}

impl SwParams {
    pub fn derive(
        rate: u32,
        period_frames: usize,
        buffer_frames: usize,
        hints: &TimingHints,
        mode: XrunMode,
    ) -> Self {
        let xfer_align = match mode {
            XrunMode::Fragment => period_frames.max(1),
            XrunMode::Asap => 1,
        };

        let clamp = |frames: usize| {
            let aligned = frames - frames % xfer_align;
            if aligned == 0 {
                xfer_align
            } else if aligned >= buffer_frames {
                buffer_frames.saturating_sub(xfer_align).max(1)
            } else {
                aligned
            }
        };

        Self {
            avail_min: clamp(frames_for_micros(rate, hints.avail_min_us)),
            xfer_min: clamp(frames_for_micros(rate, hints.xfer_min_us)),
            xfer_align,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 8000;

    #[test]
    fn test_default_hints_at_8khz() {
        let hints = TimingHints::default();
        // 125 ms fragments, 500 ms buffer
        assert_eq!(hints.period_frames(RATE), 1000);
        assert_eq!(hints.buffer_frames(RATE), 4000);
    }

    #[test]
    fn test_micros_round_trip_whole_frames() {
        assert_eq!(frames_for_micros(44100, 1_000_000), 44100);
        assert_eq!(micros_for_frames(44100, 44100), 1_000_000);
        assert_eq!(frames_for_micros(48000, 125), 6);
    }

    #[test]
    fn test_fragment_mode_aligns_thresholds_to_period() {
        let hints = TimingHints::default();
        let sw = SwParams::derive(RATE, 1000, 4000, &hints, XrunMode::Fragment);
        // 50 ms = 400 frames, below one period, so it snaps to the alignment
        assert_eq!(sw.xfer_align, 1000);
        assert_eq!(sw.avail_min, 1000);
        assert_eq!(sw.xfer_min, 1000);
    }

    #[test]
    fn test_asap_mode_keeps_exact_thresholds() {
        let hints = TimingHints::default();
        let sw = SwParams::derive(RATE, 1000, 4000, &hints, XrunMode::Asap);
        assert_eq!(sw.xfer_align, 1);
        assert_eq!(sw.avail_min, 400);
        assert_eq!(sw.xfer_min, 400);
    }

    #[test]
    fn test_thresholds_beyond_buffer_are_pulled_back() {
        let hints = TimingHints {
            avail_min_us: 2_000_000,
            ..TimingHints::default()
        };
        let sw = SwParams::derive(RATE, 1000, 4000, &hints, XrunMode::Fragment);
        assert_eq!(sw.avail_min, 3000);
    }
}
