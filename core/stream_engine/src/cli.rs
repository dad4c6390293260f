//! Command-line surface of the `stream_engine` binary.

use std::path::Path;

use clap::Parser;
use pcm_params::{AccessMode, ParseError, SampleFormat, hw::RATE_RANGE, timing::XrunMode};

use crate::{
    config::{DEFAULT_DEVICE, StreamOptions},
    device::Direction,
    header::ContainerKind,
};

/// Highest rate accepted on the command line.
const MAX_CLI_RATE: u32 = 128_000;
/// Rates below this are taken to be in kHz.
const KHZ_THRESHOLD: u32 = 300;

/// A `-f` value: a sample format name or one of the preset shortcuts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatArg {
    Sample(SampleFormat),
    /// 16 bit little endian, 44100 Hz, stereo.
    Cd,
    /// 16 bit little endian, 48000 Hz, stereo.
    Dat,
}

fn parse_format(s: &str) -> Result<FormatArg, ParseError> {
    match s.to_ascii_lowercase().as_str() {
        "cd" => Ok(FormatArg::Cd),
        "dat" => Ok(FormatArg::Dat),
        _ => s.parse().map(FormatArg::Sample),
    }
}

fn parse_rate(s: &str) -> Result<u32, String> {
    let mut rate: u32 = s.parse().map_err(|e| format!("{s}: {e}"))?;
    if rate < KHZ_THRESHOLD {
        rate = rate.saturating_mul(1000);
    }
    if rate < *RATE_RANGE.start() || rate > MAX_CLI_RATE {
        return Err(ParseError::InvalidRate(rate).to_string());
    }
    Ok(rate)
}

#[derive(Debug, Parser)]
#[command(name = "stream_engine")]
#[command(about = "Play or record raw, VOC, WAVE and Sparc Audio files")]
#[command(version)]
pub struct Cli {
    /// Select PCM by name
    #[arg(short = 'D', long, default_value = DEFAULT_DEVICE)]
    pub device: String,

    /// Quiet mode
    #[arg(short, long)]
    pub quiet: bool,

    /// File type (voc, wav, raw or au)
    #[arg(short = 't', long = "file-type")]
    pub file_type: Option<ContainerKind>,

    /// Channels
    #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..=32))]
    pub channels: Option<u32>,

    /// Sample format (case insensitive), or `cd` / `dat`
    #[arg(short, long, value_parser = parse_format)]
    pub format: Option<FormatArg>,

    /// Sample rate in Hz; values below 300 are kHz
    #[arg(short, long, value_parser = parse_rate)]
    pub rate: Option<u32>,

    /// Interrupt after # seconds
    #[arg(short, long)]
    pub duration: Option<u32>,

    /// Frame mode: transfer as soon as any frames are ready
    #[arg(short = 'e', long = "frame-mode")]
    pub frame_mode: bool,

    /// Memory-mapped access
    #[arg(short = 'M', long)]
    pub mmap: bool,

    /// Non-blocking mode
    #[arg(short = 'N', long)]
    pub nonblock: bool,

    /// Fragment length in us
    #[arg(short = 'F', long = "fragment-length")]
    pub fragment_length: Option<u32>,

    /// Buffer length in us
    #[arg(short = 'B', long = "buffer-length")]
    pub buffer_length: Option<u32>,

    /// Min available space for wakeup in us
    #[arg(short = 'A', long = "avail-min")]
    pub avail_min: Option<u32>,

    /// Min xfer size in us
    #[arg(short = 'X', long = "xfer-min")]
    pub xfer_min: Option<u32>,

    /// Show the negotiated PCM setup
    #[arg(short, long)]
    pub verbose: bool,

    /// One file per channel
    #[arg(short = 'I', long = "separate-channels")]
    pub separate_channels: bool,

    /// Record instead of play
    #[arg(long)]
    pub capture: bool,

    /// Files to play or record; stdin/stdout when omitted
    pub files: Vec<String>,
}

/// Recording is selected by `--capture` or by running as `arecord`.
pub fn direction_for(program: &str, capture: bool) -> Direction {
    let invoked_as = Path::new(program)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(program);
    if capture || invoked_as.contains("arecord") {
        Direction::Capture
    } else {
        Direction::Playback
    }
}

impl Cli {
    pub fn into_options(self, program: &str) -> StreamOptions {
        let mut options = StreamOptions {
            device: self.device,
            direction: direction_for(program, self.capture),
            quiet: self.quiet,
            verbose: self.verbose,
            file_type: self.file_type,
            duration: self.duration.filter(|&secs| secs > 0),
            nonblock: self.nonblock,
            separate_channels: self.separate_channels,
            files: self.files,
            ..StreamOptions::default()
        };

        // presets first so explicit -c / -r win
        match self.format {
            Some(FormatArg::Sample(format)) => options.config.format = format,
            Some(FormatArg::Cd) => {
                options.config.format = SampleFormat::S16Le;
                options.config.rate = 44_100;
                options.config.channels = 2;
            }
            Some(FormatArg::Dat) => {
                options.config.format = SampleFormat::S16Le;
                options.config.rate = 48_000;
                options.config.channels = 2;
            }
            None => {}
        }
        if let Some(channels) = self.channels {
            options.config.channels = channels;
        }
        if let Some(rate) = self.rate {
            options.config.rate = rate;
        }
        if self.mmap {
            options.config.access = AccessMode::MemoryMapped;
        }
        if self.frame_mode {
            options.xrun = XrunMode::Asap;
        }

        let timing = &mut options.timing;
        for (value, slot) in [
            (self.fragment_length, &mut timing.fragment_us),
            (self.buffer_length, &mut timing.buffer_us),
            (self.avail_min, &mut timing.avail_min_us),
            (self.xfer_min, &mut timing.xfer_min_us),
        ] {
            if let Some(value) = value {
                *slot = value;
            }
        }

        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> StreamOptions {
        let program = args[0];
        Cli::try_parse_from(args).unwrap().into_options(program)
    }

    #[test]
    fn test_no_arguments_gives_defaults() {
        assert_eq!(parse(&["aplay"]), StreamOptions::default());
    }

    #[test]
    fn test_rate_below_300_is_khz() {
        assert_eq!(parse(&["aplay", "-r", "44"]).config.rate, 44_000);
        assert_eq!(parse(&["aplay", "-r", "22050"]).config.rate, 22_050);
    }

    #[test]
    fn test_out_of_range_values_are_rejected() {
        for args in [
            &["aplay", "-r", "1000"][..],
            &["aplay", "-r", "200000"],
            &["aplay", "-c", "0"],
            &["aplay", "-c", "33"],
            &["aplay", "-f", "S20_LE"],
            &["aplay", "-t", "mp3"],
        ] {
            assert!(Cli::try_parse_from(args).is_err(), "{args:?}");
        }
    }

    #[test]
    fn test_cd_preset_with_channel_override() {
        let options = parse(&["aplay", "-f", "cd", "-c", "1"]);
        assert_eq!(options.config.format, SampleFormat::S16Le);
        assert_eq!(options.config.rate, 44_100);
        assert_eq!(options.config.channels, 1);
    }

    #[test]
    fn test_format_name_is_case_insensitive() {
        let options = parse(&["aplay", "-f", "s32_le"]);
        assert_eq!(options.config.format, SampleFormat::S32Le);
    }

    #[test]
    fn test_mode_flags() {
        let options = parse(&[
            "aplay", "-e", "-M", "-N", "-I", "-F", "20000", "-B", "80000", "-t", "voc", "a", "b",
        ]);
        assert_eq!(options.xrun, XrunMode::Asap);
        assert_eq!(options.config.access, AccessMode::MemoryMapped);
        assert!(options.nonblock);
        assert!(options.separate_channels);
        assert_eq!(options.timing.fragment_us, 20_000);
        assert_eq!(options.timing.buffer_us, 80_000);
        assert_eq!(options.file_type, Some(ContainerKind::Voc));
        assert_eq!(options.files, vec!["a".to_owned(), "b".to_owned()]);
    }

    #[test]
    fn test_direction_from_program_name() {
        assert_eq!(direction_for("/usr/bin/arecord", false), Direction::Capture);
        assert_eq!(direction_for("aplay", false), Direction::Playback);
        assert_eq!(direction_for("aplay", true), Direction::Capture);
        assert_eq!(parse(&["arecord", "-d", "3"]).direction, Direction::Capture);
    }

    #[test]
    fn test_zero_duration_means_unlimited() {
        assert_eq!(parse(&["aplay", "-d", "0"]).duration, None);
        assert_eq!(parse(&["aplay", "-d", "5"]).duration, Some(5));
    }
}
