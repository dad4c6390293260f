use std::time::{Duration, Instant};

use pcm_params::{HardwareConfig, timing::SwParams};
use thiserror::Error;

pub mod cpal_pcm;
#[cfg(test)]
pub mod mock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Playback,
    Capture,
}

impl Direction {
    pub fn verb(self) -> &'static str {
        match self {
            Self::Playback => "Playing",
            Self::Capture => "Recording",
        }
    }
}

#[derive(Clone, Debug, Error)]
pub enum DeviceError {
    #[error("device '{0}' not found")]
    DeviceNotFound(String),
    #[error("unsupported configuration: {0}")]
    UnsupportedConfig(String),
    #[error("failed to build stream: {0}")]
    StreamBuildFailed(String),
    #[error("failed to start stream: {0}")]
    StreamStartFailed(String),
    #[error("{0}")]
    Failed(String),
}

/// Outcome of a single read/write attempt that moved no frames.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TransferError {
    #[error("device not ready")]
    WouldBlock,
    #[error("buffer underrun")]
    Underrun,
    #[error("{0}")]
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcmState {
    Open,
    Setup,
    Prepared,
    Running,
    Xrun,
    Draining,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmStatus {
    pub state: PcmState,
    /// When the last state change that matters to recovery happened.
    pub trigger: Option<Instant>,
}

/// What the session asks the endpoint for on every (re)configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HwRequest {
    pub config: HardwareConfig,
    pub period_frames: usize,
    pub buffer_frames: usize,
}

/// What the endpoint actually settled on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Negotiated {
    pub config: HardwareConfig,
    pub period_frames: usize,
    pub buffer_frames: usize,
}

/// A PCM device as seen by the device session.
///
/// Transfers never block indefinitely: an endpoint that cannot take or
/// deliver any frame right now reports [`TransferError::WouldBlock`] and the
/// caller decides when to [`wait`](PcmEndpoint::wait) and retry. Closing is
/// dropping.
pub trait PcmEndpoint {
    fn direction(&self) -> Direction;

    fn configure(&mut self, request: &HwRequest) -> Result<Negotiated, DeviceError>;

    fn set_sw_params(&mut self, _params: &SwParams) -> Result<(), DeviceError> {
        Ok(())
    }

    fn write_interleaved(&mut self, data: &[u8], frames: usize) -> Result<usize, TransferError>;

    /// `channels[c]` holds at least `frames` samples of channel `c`.
    fn write_noninterleaved(
        &mut self,
        channels: &[&[u8]],
        frames: usize,
    ) -> Result<usize, TransferError>;

    fn read_interleaved(&mut self, data: &mut [u8], frames: usize)
    -> Result<usize, TransferError>;

    fn read_noninterleaved(
        &mut self,
        channels: &mut [&mut [u8]],
        frames: usize,
    ) -> Result<usize, TransferError>;

    /// Blocks until the device is ready for another transfer or `timeout`
    /// elapses, whichever comes first.
    fn wait(&mut self, timeout: Duration) -> Result<(), DeviceError>;

    fn status(&self) -> Result<PcmStatus, DeviceError>;

    fn prepare(&mut self) -> Result<(), DeviceError>;

    /// Blocks until every queued frame has been played.
    fn drain(&mut self) -> Result<(), DeviceError>;
}

/// Interleaves per-channel sample slices into `out`.
pub fn interleave(channels: &[&[u8]], sample_bytes: usize, frames: usize, out: &mut Vec<u8>) {
    out.clear();
    out.reserve(frames * sample_bytes * channels.len());
    for frame in 0..frames {
        let at = frame * sample_bytes;
        for channel in channels {
            out.extend_from_slice(&channel[at..at + sample_bytes]);
        }
    }
}

/// Splits interleaved `data` into per-channel slices.
pub fn deinterleave(data: &[u8], sample_bytes: usize, frames: usize, channels: &mut [&mut [u8]]) {
    let frame_bytes = sample_bytes * channels.len();
    for frame in 0..frames {
        for (index, channel) in channels.iter_mut().enumerate() {
            let from = frame * frame_bytes + index * sample_bytes;
            let to = frame * sample_bytes;
            channel[to..to + sample_bytes].copy_from_slice(&data[from..from + sample_bytes]);
        }
    }
}
