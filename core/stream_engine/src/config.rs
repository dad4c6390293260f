use pcm_params::{
    AccessMode, HardwareConfig,
    timing::{TimingHints, XrunMode},
};

use crate::{device::Direction, header::ContainerKind, session::SessionSettings};

pub const DEFAULT_DEVICE: &str = "default";
/// File name standing for stdin on playback and stdout on capture.
pub const STDIO_NAME: &str = "-";

/// Everything one run of the player or recorder needs to know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamOptions {
    pub device: String,
    pub direction: Direction,
    pub quiet: bool,
    pub verbose: bool,
    /// Forced container; playback detects it when `None`.
    pub file_type: Option<ContainerKind>,
    /// Parameters for headerless input and for capture.
    pub config: HardwareConfig,
    /// Stop after this many seconds.
    pub duration: Option<u32>,
    pub timing: TimingHints,
    pub xrun: XrunMode,
    pub nonblock: bool,
    /// One file per channel instead of one interleaved file.
    pub separate_channels: bool,
    pub files: Vec<String>,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            device: DEFAULT_DEVICE.to_owned(),
            direction: Direction::Playback,
            quiet: false,
            verbose: false,
            file_type: None,
            config: HardwareConfig::default(),
            duration: None,
            timing: TimingHints::default(),
            xrun: XrunMode::default(),
            nonblock: false,
            separate_channels: false,
            files: Vec::new(),
        }
    }
}

impl StreamOptions {
    pub fn session_settings(&self) -> SessionSettings {
        let access = if self.separate_channels {
            AccessMode::NonInterleaved
        } else {
            self.config.access
        };
        SessionSettings {
            timing: self.timing,
            xrun: self.xrun,
            access,
        }
    }

    /// Container written by capture.
    pub fn capture_kind(&self) -> ContainerKind {
        self.file_type.unwrap_or(ContainerKind::Wave)
    }

    /// Files to stream, stdin/stdout when none were named.
    pub fn file_names(&self) -> Vec<String> {
        if self.files.is_empty() {
            vec![STDIO_NAME.to_owned()]
        } else {
            self.files.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use pcm_params::SampleFormat;

    use super::*;

    #[test]
    fn test_defaults() {
        let options = StreamOptions::default();
        assert_eq!(options.device, "default");
        assert_eq!(
            options.config,
            HardwareConfig::new(SampleFormat::U8, 1, 8000)
        );
        assert_eq!(options.xrun, XrunMode::Fragment);
        assert_eq!(options.duration, None);
        assert_eq!(options.capture_kind(), ContainerKind::Wave);
        assert_eq!(options.file_names(), vec!["-".to_owned()]);
    }

    #[test]
    fn test_separate_channels_forces_noninterleaved_access() {
        let options = StreamOptions {
            separate_channels: true,
            ..StreamOptions::default()
        };
        assert_eq!(
            options.session_settings().access,
            AccessMode::NonInterleaved
        );
    }
}
